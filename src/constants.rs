// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline-wide constants
//!
//! The colorimetry values here are mirrored in `shaders/nv12_effect.wgsl`.
//! Keep both in sync: the CPU reference backend and the GPU program must
//! produce the same bytes.

/// Video-range luma bias removed before the color matrix (16/256)
pub const LUMA_OFFSET: f32 = 0.0625;

/// Chroma bias removed before the color matrix
pub const CHROMA_OFFSET: f32 = 0.5;

/// BT.601 video-range YUV→RGB matrix, rows are R, G, B; columns are Y, U, V
pub const YUV_TO_RGB: [[f32; 3]; 3] = [
    [1.164, 0.0, 1.596],
    [1.164, -0.391, -0.813],
    [1.164, 2.018, 0.0],
];

/// BT.601 video-range RGB→YUV matrix, rows are Y, U, V; columns are R, G, B
pub const RGB_TO_YUV: [[f32; 3]; 3] = [
    [0.257, 0.504, 0.098],
    [-0.148, -0.291, 0.439],
    [0.439, -0.368, -0.071],
];

/// Luminance weights used by the grayscale effect
pub const LUMINANCE_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// Output bytes per rendered pixel (RGBA8)
pub const BYTES_PER_PIXEL: u32 = 4;

/// Number of staging buffers in the readback ring
pub const STAGING_RING_SIZE: usize = 2;

/// Neutral chroma byte (U'=V'=0.5 after 8-bit quantization)
pub const NEUTRAL_CHROMA: u8 = 128;

/// Application name used for config directories and device labels
pub const APP_NAME: &str = "nv12-effect";

/// Version string baked in by the build script
pub fn app_version() -> &'static str {
    env!("GIT_VERSION")
}
