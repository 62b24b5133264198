// SPDX-License-Identifier: MPL-2.0

//! NV12 frame descriptor
//!
//! A [`VideoFrame`] borrows the caller's byte buffer for the duration of one
//! filter call. The buffer holds the full-resolution luma plane followed by the
//! interleaved, 2×2-subsampled chroma plane:
//!
//! ```text
//! ┌──────────────────────────┐  offset 0
//! │  Y plane  (W × H bytes)  │
//! ├──────────────────────────┤  offset W*H
//! │  UV plane (W × H/2 bytes)│  U0 V0 U1 V1 ... one pair per 2×2 block
//! └──────────────────────────┘  offset W*H*3/2
//! ```

use crate::errors::{FilterError, FilterResult};

/// Dimensions of a validated frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    /// Check NV12 constraints: both dimensions even and non-zero
    pub fn new(width: u32, height: u32) -> FilterResult<Self> {
        if width == 0 || height == 0 {
            return Err(FilterError::Precondition(format!(
                "frame dimensions must be non-zero, got {}x{}",
                width, height
            )));
        }
        if width % 2 != 0 || height % 2 != 0 {
            return Err(FilterError::Precondition(format!(
                "frame dimensions must be even for 4:2:0 chroma, got {}x{}",
                width, height
            )));
        }
        // The RGBA readback must fit the 32-bit sizes the device copies use
        let rgba = (width as u64) * (height as u64) * crate::constants::BYTES_PER_PIXEL as u64;
        if rgba > u32::MAX as u64 {
            return Err(FilterError::Precondition(format!(
                "frame {}x{} is too large",
                width, height
            )));
        }
        Ok(Self { width, height })
    }

    /// Number of luma bytes (one per pixel)
    #[inline]
    pub fn luma_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Number of interleaved chroma bytes (two per 2×2 block)
    #[inline]
    pub fn chroma_len(&self) -> usize {
        self.luma_len() / 2
    }

    /// Total NV12 buffer length
    #[inline]
    pub fn nv12_len(&self) -> usize {
        self.luma_len() + self.chroma_len()
    }

    /// RGBA8 readback length
    #[inline]
    pub fn rgba_len(&self) -> usize {
        self.luma_len() * crate::constants::BYTES_PER_PIXEL as usize
    }

    /// Chroma plane dimensions in samples: (W/2, H/2)
    #[inline]
    pub fn chroma_dims(&self) -> (u32, u32) {
        (self.width / 2, self.height / 2)
    }
}

impl std::fmt::Display for FrameSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Mutable view of a caller-owned NV12 frame
///
/// The filter overwrites `data` in place and never resizes it.
#[derive(Debug)]
pub struct VideoFrame<'a> {
    pub width: u32,
    pub height: u32,
    pub data: &'a mut [u8],
}

impl<'a> VideoFrame<'a> {
    pub fn new(width: u32, height: u32, data: &'a mut [u8]) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    /// Validate dimensions and buffer length
    ///
    /// # Returns
    /// * `Ok(FrameSize)` - The frame can be processed
    /// * `Err(FilterError::Precondition)` - Odd/zero dimensions or length mismatch
    pub fn validate(&self) -> FilterResult<FrameSize> {
        let size = FrameSize::new(self.width, self.height)?;
        if self.data.len() != size.nv12_len() {
            return Err(FilterError::Precondition(format!(
                "NV12 buffer for {} must be {} bytes, got {}",
                size,
                size.nv12_len(),
                self.data.len()
            )));
        }
        Ok(size)
    }

    /// Split into (luma, chroma) planes
    ///
    /// Assumes the frame has been validated.
    pub fn planes(&self) -> (&[u8], &[u8]) {
        let luma_len = self.width as usize * self.height as usize;
        self.data.split_at(luma_len)
    }

    /// Split into mutable (luma, chroma) planes
    pub fn planes_mut(&mut self) -> (&mut [u8], &mut [u8]) {
        let luma_len = self.width as usize * self.height as usize;
        self.data.split_at_mut(luma_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_lengths() {
        let size = FrameSize::new(640, 480).unwrap();
        assert_eq!(size.luma_len(), 307_200);
        assert_eq!(size.chroma_len(), 153_600);
        assert_eq!(size.nv12_len(), 460_800);
        assert_eq!(size.rgba_len(), 1_228_800);
        assert_eq!(size.chroma_dims(), (320, 240));
    }

    #[test]
    fn test_rejects_odd_and_zero_dimensions() {
        for (w, h) in [(3, 4), (4, 3), (0, 4), (4, 0), (1, 1)] {
            match FrameSize::new(w, h) {
                Err(FilterError::Precondition(_)) => {}
                other => panic!("{}x{} should be rejected, got {:?}", w, h, other),
            }
        }
    }

    #[test]
    fn test_rgba_size_bounded_by_u32() {
        // 32768 * 32768 * 4 is exactly 2^32
        assert!(matches!(
            FrameSize::new(32768, 32768),
            Err(FilterError::Precondition(_))
        ));
        assert!(FrameSize::new(32768, 32766).is_ok());
    }

    #[test]
    fn test_validate_checks_buffer_length() {
        let mut data = vec![0u8; 4 * 4 * 3 / 2 - 1];
        let frame = VideoFrame::new(4, 4, &mut data);
        assert!(matches!(frame.validate(), Err(FilterError::Precondition(_))));

        let mut data = vec![0u8; 4 * 4 * 3 / 2];
        let frame = VideoFrame::new(4, 4, &mut data);
        assert_eq!(frame.validate(), Ok(FrameSize::new(4, 4).unwrap()));
    }

    #[test]
    fn test_planes_split_at_luma_end() {
        let mut data: Vec<u8> = (0..24).collect();
        let frame = VideoFrame::new(4, 4, &mut data);
        let (y, uv) = frame.planes();
        assert_eq!(y.len(), 16);
        assert_eq!(uv, &[16, 17, 18, 19, 20, 21, 22, 23]);
    }
}
