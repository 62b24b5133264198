// SPDX-License-Identifier: MPL-2.0

//! NV12 effect - GPU color-space conversion and luminance effect for NV12 frames
//!
//! This library filters caller-owned NV12 frames in place: the planes are
//! uploaded as textures, a single-pass program decodes them to RGB, applies an
//! effect, re-encodes to YUV, and the rendered pixels are read back through a
//! two-slot staging ring and repacked into the caller's buffer.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`pipelines`]: The [`Nv12EffectFilter`] and its stages
//! - [`backends`]: Render device abstraction (wgpu and CPU)
//! - [`media`]: Frame descriptor and RGBA → NV12 repacking
//! - [`shaders`]: Effect program, uniform layout and CPU colorimetry
//! - [`config`]: User configuration handling
//!
//! # Example
//!
//! ```no_run
//! use nv12_effect::backends::SoftwareBackend;
//! use nv12_effect::{Effect, Nv12EffectFilter, ReadbackPolicy, VideoFrame};
//!
//! let mut filter =
//!     Nv12EffectFilter::new(SoftwareBackend::new(), Effect::Grayscale, ReadbackPolicy::Synchronous);
//! let mut data = vec![128u8; 640 * 480 * 3 / 2];
//! filter.process_frame(&mut VideoFrame::new(640, 480, &mut data))?;
//! # Ok::<(), nv12_effect::FilterError>(())
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod gpu;
pub mod media;
pub mod pipelines;
pub mod shaders;

// Re-export commonly used types
pub use backends::{BackendType, RenderBackend};
pub use config::Config;
pub use errors::{FilterError, FilterResult};
pub use media::{FrameSize, VideoFrame};
pub use pipelines::effect::{FrameOutcome, Nv12EffectFilter, ReadbackPolicy};
pub use shaders::Effect;
