// SPDX-License-Identifier: MPL-2.0

//! NV12 frame handling on the CPU side
//!
//! - [`frame`]: the borrowed [`VideoFrame`] descriptor and its validation
//! - [`packer`]: repacking of the rendered RGBA readback into NV12 layout

pub mod frame;
pub mod packer;

pub use frame::{FrameSize, VideoFrame};
pub use packer::pack_rgba_into_nv12;
