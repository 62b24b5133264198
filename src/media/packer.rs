// SPDX-License-Identifier: MPL-2.0

//! RGBA readback → NV12 repacking
//!
//! The effect program writes (Y', U', V', 1) into every output pixel, so the
//! rendered RGBA buffer carries full-resolution chroma. Repacking keeps the R
//! channel of every pixel as luma and picks G/B from the top-left pixel of
//! each 2×2 block as the chroma pair.

use crate::constants::BYTES_PER_PIXEL;
use crate::errors::{FilterError, FilterResult};
use crate::media::frame::{FrameSize, VideoFrame};

/// Rewrite `frame.data` in place from an RGBA8 buffer of the same dimensions
///
/// # Arguments
/// * `rgba` - Rendered pixels, `W*H*4` bytes, row 0 first
/// * `frame` - Destination NV12 frame, left untouched when validation fails
pub fn pack_rgba_into_nv12(rgba: &[u8], frame: &mut VideoFrame<'_>) -> FilterResult<()> {
    let size = frame.validate()?;
    if rgba.len() != size.rgba_len() {
        return Err(FilterError::Precondition(format!(
            "RGBA buffer for {} must be {} bytes, got {}",
            size,
            size.rgba_len(),
            rgba.len()
        )));
    }

    let (luma, chroma) = frame.planes_mut();
    pack_luma(rgba, luma);
    pack_chroma(rgba, chroma, size);
    Ok(())
}

/// R channel of every pixel becomes the luma byte
fn pack_luma(rgba: &[u8], luma: &mut [u8]) {
    let bpp = BYTES_PER_PIXEL as usize;
    for (dst, pixel) in luma.iter_mut().zip(rgba.chunks_exact(bpp)) {
        *dst = pixel[0];
    }
}

/// G/B of each block's top-left pixel become the interleaved U/V pair
///
/// `cursor` walks the full-resolution pixel grid two columns at a time; once
/// `column` reaches the frame width it skips the odd luma row below.
fn pack_chroma(rgba: &[u8], chroma: &mut [u8], size: FrameSize) {
    let width = size.width as usize;
    let bpp = BYTES_PER_PIXEL as usize;

    let mut column = 0usize;
    let mut cursor = 0usize;
    for pair in chroma.chunks_exact_mut(2) {
        let src = bpp * cursor;
        pair[0] = rgba[src + 1];
        pair[1] = rgba[src + 2];

        column += 2;
        cursor += 2;
        if column >= width {
            cursor += width;
            column %= width;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// RGBA buffer whose pixel `i` carries `(i, 100 + block, 200 + block, 255)`
    fn labelled_rgba(size: FrameSize) -> Vec<u8> {
        let (cw, _) = size.chroma_dims();
        let mut rgba = vec![0u8; size.rgba_len()];
        for y in 0..size.height {
            for x in 0..size.width {
                let i = (y * size.width + x) as usize;
                let block = (y / 2) * cw + x / 2;
                rgba[4 * i] = i as u8;
                rgba[4 * i + 1] = 100 + block as u8;
                rgba[4 * i + 2] = 200 + block as u8;
                rgba[4 * i + 3] = 255;
            }
        }
        rgba
    }

    #[test]
    fn test_luma_comes_from_red_channel() {
        let size = FrameSize::new(4, 4).unwrap();
        let rgba = labelled_rgba(size);
        let mut data = vec![0u8; size.nv12_len()];
        let mut frame = VideoFrame::new(4, 4, &mut data);

        pack_rgba_into_nv12(&rgba, &mut frame).unwrap();

        let expected: Vec<u8> = (0..16).collect();
        assert_eq!(&data[..16], expected.as_slice());
    }

    #[test]
    fn test_chroma_wrap_places_each_block() {
        let size = FrameSize::new(4, 4).unwrap();
        let rgba = labelled_rgba(size);
        let mut data = vec![0u8; size.nv12_len()];
        let mut frame = VideoFrame::new(4, 4, &mut data);

        pack_rgba_into_nv12(&rgba, &mut frame).unwrap();

        // Blocks 0..4 in raster order, one (U, V) pair each
        assert_eq!(&data[16..], &[100, 200, 101, 201, 102, 202, 103, 203]);
    }

    #[test]
    fn test_chroma_wrap_on_wide_frame() {
        let size = FrameSize::new(6, 4).unwrap();
        let rgba = labelled_rgba(size);
        let mut data = vec![0u8; size.nv12_len()];
        let mut frame = VideoFrame::new(6, 4, &mut data);

        pack_rgba_into_nv12(&rgba, &mut frame).unwrap();

        let chroma = &data[24..];
        for block in 0..6u8 {
            let at = 2 * block as usize;
            assert_eq!(chroma[at], 100 + block, "U of block {}", block);
            assert_eq!(chroma[at + 1], 200 + block, "V of block {}", block);
        }
    }

    #[test]
    fn test_rejects_mismatched_rgba_length() {
        let mut data = vec![0u8; 24];
        let mut frame = VideoFrame::new(4, 4, &mut data);
        let rgba = vec![0u8; 63];
        assert!(matches!(
            pack_rgba_into_nv12(&rgba, &mut frame),
            Err(FilterError::Precondition(_))
        ));
        // Untouched on rejection
        assert!(data.iter().all(|&b| b == 0));
    }
}
