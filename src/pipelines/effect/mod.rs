// SPDX-License-Identifier: MPL-2.0

//! NV12 effect filter
//!
//! Runs one caller-owned NV12 frame through the device and writes the result
//! back into the same buffer:
//!
//! ```text
//! VideoFrame ─▶ upload Y / UV ─▶ draw quad ─▶ copy to staging[slot] ─▶ read ─▶ pack ─▶ VideoFrame
//!   (NV12)       (R8 / RG8)     (effect)      (two-slot ring)       (RGBA8)   (NV12)
//! ```
//!
//! # Stages
//!
//! - [`resources`]: program, quad, plane textures and staging ring
//! - [`uploader`]: plane uploads before every draw
//! - [`readback`]: which ring slot is written and which is read
//!
//! Repacking lives in [`crate::media::packer`].

pub mod readback;
pub mod resources;
pub mod uploader;

pub use readback::{ReadbackPolicy, ReadbackScheduler, ReadbackStep};
pub use resources::{DeviceResourceSet, PlaneTextures};

use crate::backends::{self, DrawPass, RenderBackend, ResourceStats};
use crate::config::Config;
use crate::errors::{FilterError, FilterResult};
use crate::media::{FrameSize, VideoFrame, pack_rgba_into_nv12};
use crate::shaders::Effect;
use tracing::{debug, error, info, warn};

/// Result of a successfully processed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was overwritten with a filtered frame
    Filtered,
    /// Pipelined readback has no earlier result yet; the frame is untouched
    Primed,
}

/// Single-pass NV12 effect filter
///
/// Owns every device resource it creates on `B`. Resources are created lazily
/// by the first frame if [`Nv12EffectFilter::initialize`] was not called and
/// are released by [`Nv12EffectFilter::close`] or on drop.
pub struct Nv12EffectFilter<B: RenderBackend = Box<dyn RenderBackend>> {
    backend: B,
    effect: Effect,
    resources: DeviceResourceSet,
    scheduler: ReadbackScheduler,
    /// RGBA8 readback of one frame
    pixels: Vec<u8>,
    /// Program build failure; returned until `initialize` is called again
    init_error: Option<FilterError>,
    frames_filtered: u64,
    frames_dropped: u64,
}

impl Nv12EffectFilter {
    /// Create the backend the configuration selects and a filter on it
    pub fn from_config(config: &Config) -> FilterResult<Self> {
        let backend = backends::create_backend(config)?;
        Ok(Self::new(backend, config.effect, config.readback_policy))
    }
}

impl<B: RenderBackend> Nv12EffectFilter<B> {
    pub fn new(backend: B, effect: Effect, policy: ReadbackPolicy) -> Self {
        info!(
            backend = %backend.describe(),
            effect = effect.display_name(),
            policy = %policy,
            "Creating NV12 effect filter"
        );
        Self {
            backend,
            effect,
            resources: DeviceResourceSet::new(),
            scheduler: ReadbackScheduler::new(policy),
            pixels: Vec::new(),
            init_error: None,
            frames_filtered: 0,
            frames_dropped: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn effect(&self) -> Effect {
        self.effect
    }

    /// Switch the effect; takes hold with the next drawn frame
    pub fn set_effect(&mut self, effect: Effect) {
        self.effect = effect;
    }

    pub fn policy(&self) -> ReadbackPolicy {
        self.scheduler.policy()
    }

    pub fn is_initialized(&self) -> bool {
        self.resources.is_initialized()
    }

    /// Frames written back to callers so far (flushes included)
    pub fn frames_filtered(&self) -> u64 {
        self.frames_filtered
    }

    /// Filtered frames discarded before they could be handed back
    ///
    /// Under the pipelined policy the frame waiting in the staging ring is
    /// lost when the frame size changes or the filter is closed without a
    /// [`Nv12EffectFilter::flush`].
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Build the effect program and quad geometry
    ///
    /// Idempotent. After a failure, frames are rejected with the same error
    /// until this is called again.
    pub fn initialize(&mut self) -> FilterResult<()> {
        self.init_error = None;
        if let Err(e) = self.resources.initialize(&mut self.backend) {
            if e.is_fatal() {
                self.init_error = Some(e.clone());
            }
            return Err(e);
        }
        Ok(())
    }

    /// Apply the effect to `frame` in place
    ///
    /// # Returns
    /// * `Ok(FrameOutcome::Filtered)` - `frame.data` holds a filtered frame
    ///   (the previous input's under the pipelined policy)
    /// * `Ok(FrameOutcome::Primed)` - Nothing to hand back yet; frame untouched
    /// * `Err(FilterError::Precondition)` - Rejected before any device call
    /// * `Err(FilterError::ResourceCreation)` - Program could not be built
    /// * `Err(FilterError::DeviceState)` - The device failed this frame
    pub fn process_frame(&mut self, frame: &mut VideoFrame<'_>) -> FilterResult<FrameOutcome> {
        let size = frame.validate()?;
        if let Some(e) = &self.init_error {
            return Err(e.clone());
        }
        if !self.resources.is_initialized() {
            self.initialize()?;
        }

        self.run_frame(frame, size).inspect_err(|e| {
            if !e.is_fatal() {
                warn!(error = %e, size = %size, "Frame failed");
            }
        })
    }

    fn run_frame(
        &mut self,
        frame: &mut VideoFrame<'_>,
        size: FrameSize,
    ) -> FilterResult<FrameOutcome> {
        // The staging ring is about to be reallocated
        let previous = self.resources.size();
        if previous != Some(size) {
            self.discard_pending(previous, "frame size changed");
            self.scheduler.reset();
        }
        if self.resources.ensure_size(&mut self.backend, size)? {
            self.pixels.clear();
            self.pixels.resize(size.rgba_len(), 0);
        }

        let (Some(program), Some(geometry), Some(planes)) = (
            self.resources.program(),
            self.resources.geometry(),
            self.resources.planes(),
        ) else {
            return Err(FilterError::DeviceState(
                "device resources missing".to_string(),
            ));
        };

        uploader::upload_frame(&mut self.backend, planes, frame)?;
        self.backend.draw(&DrawPass {
            program,
            geometry,
            luma: planes.luma,
            chroma: planes.chroma,
            width: size.width,
            height: size.height,
            effect: self.effect,
        })?;

        let step = self.scheduler.advance();
        let issued = self
            .staging(step.write)
            .and_then(|target| self.backend.request_readback(target));
        if let Err(e) = issued {
            self.scheduler.abandon(step);
            return Err(e);
        }
        self.scheduler.commit(step);

        let Some(slot) = step.read else {
            debug!(slot = step.write, "Readback ring primed");
            return Ok(FrameOutcome::Primed);
        };
        self.deliver(slot, frame)?;
        Ok(FrameOutcome::Filtered)
    }

    /// Hand the frame still held by the staging ring to the caller
    ///
    /// Only the pipelined policy holds frames back. `frame` must have the size
    /// of the frames processed last.
    ///
    /// # Returns
    /// * `Ok(true)` - `frame.data` holds the last processed frame, filtered
    /// * `Ok(false)` - Nothing pending; frame untouched
    pub fn flush(&mut self, frame: &mut VideoFrame<'_>) -> FilterResult<bool> {
        let size = frame.validate()?;
        let Some(current) = self.resources.size() else {
            return Ok(false);
        };
        if size != current {
            return Err(FilterError::Precondition(format!(
                "flush needs a {} frame, got {}",
                current, size
            )));
        }

        match self.scheduler.take_pending() {
            Some(slot) => {
                debug!(slot, "Flushing pending readback");
                self.deliver(slot, frame)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn discard_pending(&mut self, size: Option<FrameSize>, reason: &str) {
        if self.scheduler.take_pending().is_some() {
            self.frames_dropped += 1;
            warn!(
                size = ?size,
                dropped = self.frames_dropped,
                reason,
                "Discarding pending filtered frame"
            );
        }
    }

    fn staging(&self, slot: usize) -> FilterResult<backends::BufferId> {
        self.resources
            .staging(slot)
            .ok_or_else(|| FilterError::DeviceState(format!("staging slot {} missing", slot)))
    }

    fn deliver(&mut self, slot: usize, frame: &mut VideoFrame<'_>) -> FilterResult<()> {
        let buffer = self.staging(slot)?;
        self.backend.read_staging(buffer, &mut self.pixels)?;
        pack_rgba_into_nv12(&self.pixels, frame)?;
        self.frames_filtered += 1;
        Ok(())
    }

    /// Resource counters of the backend
    pub fn stats(&self) -> ResourceStats {
        self.backend.stats()
    }

    /// Byte sizes of the two staging buffers, empty before the first frame
    pub fn staging_buffer_sizes(&self) -> Vec<u64> {
        self.resources.staging_buffer_sizes(&self.backend)
    }

    /// Extents of the (luma, chroma) textures
    pub fn texture_extents(&self) -> Option<((u32, u32), (u32, u32))> {
        self.resources.texture_extents(&self.backend)
    }

    /// Release every device resource
    ///
    /// A later frame initializes the filter again.
    pub fn close(&mut self) {
        if self.resources.is_initialized() || self.resources.size().is_some() {
            info!(
                frames = self.frames_filtered,
                "Releasing NV12 effect filter resources"
            );
        }
        self.discard_pending(self.resources.size(), "filter closed");
        self.resources.release(&mut self.backend);
        self.scheduler.reset();
        self.pixels = Vec::new();
        self.init_error = None;
    }
}

impl<B: RenderBackend> Drop for Nv12EffectFilter<B> {
    fn drop(&mut self) {
        self.close();
        let leaked = self.backend.stats().live_total();
        if leaked > 0 {
            error!(leaked, "Device resources still alive after close");
        }
    }
}
