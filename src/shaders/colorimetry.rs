// SPDX-License-Identifier: GPL-3.0-only

//! CPU mirror of the effect program in `nv12_effect.wgsl`
//!
//! Evaluates the same three steps per pixel with the same constants and the
//! same operation order, so the software backend and the GPU agree to within
//! one quantization step.

use super::Effect;
use crate::constants::{
    CHROMA_OFFSET, LUMA_OFFSET, LUMINANCE_WEIGHTS, RGB_TO_YUV, YUV_TO_RGB,
};

/// Biased 8-bit samples to unclamped RGB
#[inline]
pub fn nv12_to_rgb(y: f32, u: f32, v: f32) -> [f32; 3] {
    let y = y - LUMA_OFFSET;
    let u = u - CHROMA_OFFSET;
    let v = v - CHROMA_OFFSET;

    let [r_row, g_row, b_row] = YUV_TO_RGB;
    [
        r_row[0] * y + r_row[2] * v,
        g_row[0] * y + g_row[2] * v + g_row[1] * u,
        b_row[0] * y + b_row[1] * u,
    ]
}

#[inline]
pub fn apply_effect(rgb: [f32; 3], effect: Effect) -> [f32; 3] {
    match effect {
        Effect::Identity => rgb,
        Effect::Grayscale => {
            let [wr, wg, wb] = LUMINANCE_WEIGHTS;
            let luminance = wr * rgb[0] + wg * rgb[1] + wb * rgb[2];
            [luminance; 3]
        }
    }
}

/// RGB back to biased (Y', U', V') in normalized units
#[inline]
pub fn rgb_to_nv12(rgb: [f32; 3]) -> [f32; 3] {
    let [r, g, b] = rgb;
    let [y_row, u_row, v_row] = RGB_TO_YUV;
    [
        y_row[0] * r + y_row[1] * g + y_row[2] * b + LUMA_OFFSET,
        u_row[0] * r + u_row[1] * g + u_row[2] * b + CHROMA_OFFSET,
        v_row[0] * r + v_row[1] * g + v_row[2] * b + CHROMA_OFFSET,
    ]
}

/// Normalized float to an 8-bit UNORM channel, as a render target stores it
#[inline]
pub fn unorm_to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[inline]
pub fn u8_to_unorm(value: u8) -> f32 {
    value as f32 / 255.0
}

/// Full per-pixel program: sampled (Y, U, V) bytes to the RGBA8 output pixel
pub fn shade_pixel(y: u8, u: u8, v: u8, effect: Effect) -> [u8; 4] {
    let rgb = nv12_to_rgb(u8_to_unorm(y), u8_to_unorm(u), u8_to_unorm(v));
    let [y, u, v] = rgb_to_nv12(apply_effect(rgb, effect));
    [unorm_to_u8(y), unorm_to_u8(u), unorm_to_u8(v), 255]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::NEUTRAL_CHROMA;

    fn assert_close(actual: u8, expected: u8, what: &str) {
        assert!(
            actual.abs_diff(expected) <= 1,
            "{}: expected {} ± 1, got {}",
            what,
            expected,
            actual
        );
    }

    #[test]
    fn test_grayscale_removes_chroma() {
        for (y, u, v) in [(200, 90, 160), (16, 16, 240), (81, 90, 240), (235, 128, 128)] {
            let out = shade_pixel(y, u, v, Effect::Grayscale);
            assert_close(out[1], NEUTRAL_CHROMA, "U'");
            assert_close(out[2], NEUTRAL_CHROMA, "V'");
            assert_eq!(out[3], 255);
        }
    }

    #[test]
    fn test_grayscale_keeps_gray_luma() {
        // Colorless input keeps its luma through the effect
        for y in [16u8, 64, 128, 235] {
            let out = shade_pixel(y, 128, 128, Effect::Grayscale);
            assert_close(out[0], y, "Y'");
        }
    }

    #[test]
    fn test_identity_round_trip() {
        for y in (16..=235u8).step_by(13) {
            for u in (16..=240u8).step_by(28) {
                for v in (16..=240u8).step_by(28) {
                    let out = shade_pixel(y, u, v, Effect::Identity);
                    assert_close(out[0], y, "Y'");
                    assert_close(out[1], u, "U'");
                    assert_close(out[2], v, "V'");
                }
            }
        }
    }

    #[test]
    fn test_unorm_quantization() {
        assert_eq!(unorm_to_u8(-0.2), 0);
        assert_eq!(unorm_to_u8(1.7), 255);
        assert_eq!(unorm_to_u8(0.5), 128);
        assert_eq!(unorm_to_u8(u8_to_unorm(77)), 77);
    }
}
