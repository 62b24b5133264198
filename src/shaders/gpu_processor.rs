// SPDX-License-Identifier: GPL-3.0-only

//! Shared GPU readback infrastructure
//!
//! Provides common functionality for the render backends:
//! - Dimension caching so resources are only reallocated on size change
//! - Row padding math for texture→buffer copies
//! - Async buffer mapping and unpadded readback

use crate::gpu::wgpu;
use futures::channel::oneshot;

/// Cached resource dimensions - avoids reallocation when dimensions match
///
/// Used to track whether size-dependent resources need to be recreated when
/// the incoming frame size changes.
#[derive(Default, Clone, Copy, PartialEq, Debug)]
pub struct CachedDimensions {
    pub width: u32,
    pub height: u32,
}

impl CachedDimensions {
    /// Check if dimensions have changed and need update
    pub fn needs_update(&self, width: u32, height: u32) -> bool {
        self.width != width || self.height != height
    }

    pub fn update(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Forget the cached size so the next request reallocates
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Bytes per row of an RGBA8 texture→buffer copy, rounded up to
/// `COPY_BYTES_PER_ROW_ALIGNMENT`
#[inline]
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * crate::constants::BYTES_PER_PIXEL;
    unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
}

/// Mapping requested for a staging buffer, not yet waited on
pub struct PendingMap {
    receiver: oneshot::Receiver<Result<(), wgpu::BufferAsyncError>>,
    /// Submission that last wrote the buffer
    submission: Option<wgpu::SubmissionIndex>,
}

/// Start mapping a buffer for reading without waiting for it
///
/// `submission` is the queue submission that last wrote the buffer; waiting on
/// the mapping later blocks only until that submission has finished. `None`
/// waits for everything submitted so far.
pub fn request_map_read(
    buffer: &wgpu::Buffer,
    submission: Option<wgpu::SubmissionIndex>,
) -> PendingMap {
    let (sender, receiver) = oneshot::channel();
    buffer.slice(..).map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    PendingMap {
        receiver,
        submission,
    }
}

/// Wait for a mapping requested with [`request_map_read`], copy the rows out
/// without their padding, and unmap.
///
/// Polls without blocking first so an already finished transfer returns at
/// once. Otherwise it blocks on the submission recorded in `pending`, never on
/// work submitted after it.
///
/// # Arguments
/// * `device` - The wgpu device for polling
/// * `buffer` - The buffer being mapped (must be MAP_READ)
/// * `pending` - The mapping in flight for `buffer`
/// * `out` - Destination, one `unpadded_row` slice per buffer row
/// * `unpadded_row` - Bytes of pixel data per row
/// * `padded_row` - Row pitch inside the buffer
pub async fn read_buffer_async(
    device: &wgpu::Device,
    buffer: &wgpu::Buffer,
    pending: PendingMap,
    out: &mut [u8],
    unpadded_row: usize,
    padded_row: usize,
) -> Result<(), String> {
    let PendingMap {
        mut receiver,
        submission,
    } = pending;
    let _ = device.poll(wgpu::PollType::Poll);

    let mapped = match receiver.try_recv() {
        Ok(Some(result)) => result,
        Ok(None) => {
            device
                .poll(wgpu::PollType::Wait {
                    submission_index: submission,
                    timeout: None,
                })
                .map_err(|e| format!("Failed to wait for readback: {:?}", e))?;
            receiver
                .await
                .map_err(|_| "Failed to receive buffer mapping".to_string())?
        }
        Err(_) => return Err("Buffer mapping was cancelled".to_string()),
    };
    mapped.map_err(|e| format!("Failed to map buffer: {:?}", e))?;

    {
        let data = buffer.slice(..).get_mapped_range();
        for (dst, src) in out
            .chunks_exact_mut(unpadded_row)
            .zip(data.chunks_exact(padded_row))
        {
            dst.copy_from_slice(&src[..unpadded_row]);
        }
    }
    buffer.unmap();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_dimensions() {
        let mut dims = CachedDimensions::default();
        assert!(dims.needs_update(640, 480));

        dims.update(640, 480);
        assert!(!dims.needs_update(640, 480));
        assert!(dims.needs_update(1280, 720));

        dims.reset();
        assert!(dims.needs_update(640, 480));
    }

    #[test]
    fn test_padded_bytes_per_row() {
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(640), 2560);
        assert_eq!(padded_bytes_per_row(4), 256);
        assert_eq!(padded_bytes_per_row(66), 512);
    }
}
