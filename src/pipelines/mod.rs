// SPDX-License-Identifier: MPL-2.0

//! Frame processing pipelines
//!
//! - [`effect`]: NV12 → RGB → effect → NV12 filter with staged readback

pub mod effect;
