// SPDX-License-Identifier: GPL-3.0-only
//! Effect program definitions
//!
//! This module is the single source of truth for the per-pixel effect:
//! the WGSL program run by the GPU backend, its uniform layout, the
//! full-screen quad it is drawn with, and the CPU mirror in [`colorimetry`]
//! used by the software backend.

pub mod colorimetry;
pub mod gpu_processor;

use serde::{Deserialize, Serialize};

pub use gpu_processor::{CachedDimensions, padded_bytes_per_row, read_buffer_async};

/// NV12 → RGB → effect → NV12 program (vertex `vs_main`, fragment `fs_main`)
pub const NV12_EFFECT_SHADER: &str = include_str!("nv12_effect.wgsl");

/// Per-pixel effect applied between the two color matrices
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    /// No change: decode and re-encode only
    Identity = 0,
    /// Replace RGB with BT.601 luminance
    #[default]
    Grayscale = 1,
}

impl Effect {
    pub fn display_name(&self) -> &'static str {
        match self {
            Effect::Identity => "Identity",
            Effect::Grayscale => "Grayscale",
        }
    }
}

/// Effect uniform
///
/// Must match the `EffectParams` struct in `nv12_effect.wgsl`.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct EffectParams {
    pub effect_mode: u32,
    pub _pad: [u32; 3],
}

impl EffectParams {
    pub fn new(effect: Effect) -> Self {
        Self {
            effect_mode: effect as u32,
            _pad: [0; 3],
        }
    }
}

/// Quad vertex: clip-space position + texture coordinate
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 3],
    pub tex_coord: [f32; 2],
}

/// Full-screen quad
///
/// The top edge of clip space samples texture row 0, so the first row of
/// the readback is the first row of the input frame.
pub const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex {
        position: [-1.0, -1.0, 0.0],
        tex_coord: [0.0, 1.0],
    },
    QuadVertex {
        position: [1.0, -1.0, 0.0],
        tex_coord: [1.0, 1.0],
    },
    QuadVertex {
        position: [-1.0, 1.0, 0.0],
        tex_coord: [0.0, 0.0],
    },
    QuadVertex {
        position: [1.0, 1.0, 0.0],
        tex_coord: [1.0, 0.0],
    },
];

/// Two triangles over [`QUAD_VERTICES`]
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 1, 3];
