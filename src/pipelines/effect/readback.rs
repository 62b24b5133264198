// SPDX-License-Identifier: MPL-2.0

//! Two-slot staging ring
//!
//! The scheduler only tracks slot indices; the staging buffers themselves
//! belong to the [`DeviceResourceSet`](super::resources::DeviceResourceSet).
//!
//! ```text
//! Synchronous:  frame N ─▶ write slot s ─▶ read slot s        (stall, no lag)
//! Pipelined:    frame N ─▶ write slot s ─▶ read slot s^1      (frame N-1)
//! ```

use crate::constants::STAGING_RING_SIZE;
use serde::{Deserialize, Serialize};

/// When rendered pixels are copied back to the caller's frame
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ReadbackPolicy {
    /// Read the slot written this frame; waits for the transfer to finish
    Synchronous,
    /// Read the slot written one frame ago; output lags input by one frame
    #[default]
    Pipelined,
}

impl std::fmt::Display for ReadbackPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadbackPolicy::Synchronous => write!(f, "synchronous"),
            ReadbackPolicy::Pipelined => write!(f, "pipelined"),
        }
    }
}

/// Slots touched by one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadbackStep {
    /// Slot receiving this frame's transfer
    pub write: usize,
    /// Slot to copy into the caller's frame, `None` while the ring is priming
    pub read: Option<usize>,
}

/// Parity cursor over [`STAGING_RING_SIZE`] staging slots
#[derive(Debug, Clone)]
pub struct ReadbackScheduler {
    policy: ReadbackPolicy,
    current: usize,
    /// Slot holds a transfer that has not been handed to the caller yet
    filled: [bool; STAGING_RING_SIZE],
}

impl ReadbackScheduler {
    pub fn new(policy: ReadbackPolicy) -> Self {
        Self {
            policy,
            current: 0,
            filled: [false; STAGING_RING_SIZE],
        }
    }

    pub fn policy(&self) -> ReadbackPolicy {
        self.policy
    }

    /// Index of the slot written last
    pub fn current(&self) -> usize {
        self.current
    }

    /// Back to slot 0 with nothing resident; called whenever the ring is
    /// reallocated
    pub fn reset(&mut self) {
        self.current = 0;
        self.filled = [false; STAGING_RING_SIZE];
    }

    /// Rotate the cursor and pick the slots for this frame
    ///
    /// The write slot is not marked resident until [`Self::commit`].
    pub fn advance(&mut self) -> ReadbackStep {
        let previous = self.current;
        self.current = (self.current + 1) % STAGING_RING_SIZE;
        self.filled[self.current] = false;

        let read = match self.policy {
            ReadbackPolicy::Synchronous => Some(self.current),
            ReadbackPolicy::Pipelined => self.filled[previous].then_some(previous),
        };
        ReadbackStep {
            write: self.current,
            read,
        }
    }

    /// Undo [`Self::advance`] after the transfer into `step.write` failed
    ///
    /// The cursor goes back to the slot written before, so a frame waiting
    /// there is still read by the next step.
    pub fn abandon(&mut self, step: ReadbackStep) {
        self.filled[step.write] = false;
        self.current = (step.write + STAGING_RING_SIZE - 1) % STAGING_RING_SIZE;
    }

    /// Record that the transfer into `step.write` was issued
    pub fn commit(&mut self, step: ReadbackStep) {
        self.filled[step.write] = true;
        match step.read {
            Some(read) if read != step.write => self.filled[read] = false,
            _ => {}
        }
    }

    /// Take the slot still holding an undelivered frame (pipelined only)
    pub fn take_pending(&mut self) -> Option<usize> {
        match self.policy {
            ReadbackPolicy::Synchronous => None,
            ReadbackPolicy::Pipelined => {
                let slot = self.current;
                std::mem::take(&mut self.filled[slot]).then_some(slot)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(scheduler: &mut ReadbackScheduler) -> ReadbackStep {
        let step = scheduler.advance();
        scheduler.commit(step);
        step
    }

    #[test]
    fn test_synchronous_reads_what_it_writes() {
        let mut scheduler = ReadbackScheduler::new(ReadbackPolicy::Synchronous);
        let steps: Vec<_> = (0..4).map(|_| run(&mut scheduler)).collect();
        assert_eq!(steps.iter().map(|s| s.write).collect::<Vec<_>>(), [1, 0, 1, 0]);
        assert!(steps.iter().all(|s| s.read == Some(s.write)));
        assert_eq!(scheduler.take_pending(), None);
    }

    #[test]
    fn test_pipelined_lags_one_frame() {
        let mut scheduler = ReadbackScheduler::new(ReadbackPolicy::Pipelined);
        assert_eq!(
            run(&mut scheduler),
            ReadbackStep {
                write: 1,
                read: None
            }
        );
        assert_eq!(
            run(&mut scheduler),
            ReadbackStep {
                write: 0,
                read: Some(1)
            }
        );
        assert_eq!(
            run(&mut scheduler),
            ReadbackStep {
                write: 1,
                read: Some(0)
            }
        );
        assert_eq!(scheduler.take_pending(), Some(1));
        assert_eq!(scheduler.take_pending(), None);
    }

    #[test]
    fn test_reset_primes_again() {
        let mut scheduler = ReadbackScheduler::new(ReadbackPolicy::Pipelined);
        run(&mut scheduler);
        run(&mut scheduler);
        scheduler.reset();
        assert_eq!(scheduler.current(), 0);
        assert_eq!(run(&mut scheduler).read, None);
    }

    #[test]
    fn test_abandoned_write_keeps_previous_frame() {
        let mut scheduler = ReadbackScheduler::new(ReadbackPolicy::Pipelined);
        run(&mut scheduler);
        // Transfer into slot 0 failed; slot 1 still holds the first frame
        let failed = scheduler.advance();
        assert_eq!(failed.read, Some(1));
        scheduler.abandon(failed);
        assert_eq!(scheduler.current(), 1);

        assert_eq!(
            run(&mut scheduler),
            ReadbackStep {
                write: 0,
                read: Some(1)
            }
        );
        assert_eq!(scheduler.take_pending(), Some(0));
    }

    #[test]
    fn test_abandoned_write_while_priming_stays_primed() {
        let mut scheduler = ReadbackScheduler::new(ReadbackPolicy::Pipelined);
        let failed = scheduler.advance();
        scheduler.abandon(failed);
        assert_eq!(scheduler.take_pending(), None);
        assert_eq!(run(&mut scheduler).read, None);
    }

    #[test]
    fn test_default_policy_is_pipelined() {
        assert_eq!(ReadbackPolicy::default(), ReadbackPolicy::Pipelined);
    }
}
