// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Filtering a raw NV12 file frame by frame
//! - Reporting which render device is available

use image::GrayImage;
use nv12_effect::backends::{RenderBackend, WgpuBackend};
use nv12_effect::config::Config;
use nv12_effect::media::{FrameSize, VideoFrame};
use nv12_effect::pipelines::effect::{FrameOutcome, Nv12EffectFilter};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Paths and geometry of one `process` run
pub struct ProcessArgs {
    pub input: PathBuf,
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub preview: Option<PathBuf>,
}

/// Load the configuration from `path` or the default location
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    debug!(?config, "Configuration loaded");
    Ok(config)
}

/// Run every frame of `args.input` through the filter and write the results
///
/// Under the pipelined policy the output lags by one frame; the frame still
/// in flight is flushed at the end so input and output hold the same number
/// of frames.
pub fn process_file(config: &Config, args: ProcessArgs) -> Result<(), Box<dyn std::error::Error>> {
    let size = FrameSize::new(args.width, args.height)?;
    let frame_len = size.nv12_len();

    let mut input = std::fs::read(&args.input)
        .map_err(|e| format!("Failed to read {}: {}", args.input.display(), e))?;
    if input.is_empty() || input.len() % frame_len != 0 {
        return Err(format!(
            "{} is {} bytes, not a whole number of {} NV12 frames ({} bytes each)",
            args.input.display(),
            input.len(),
            size,
            frame_len
        )
        .into());
    }
    let frame_count = input.len() / frame_len;

    let mut filter = Nv12EffectFilter::from_config(config)?;
    println!("Backend: {}", filter.backend().describe());
    println!(
        "Processing {} frame(s) at {} ({}, {})",
        frame_count,
        size,
        config.effect.display_name(),
        config.readback_policy
    );

    let mut writer = BufWriter::new(
        File::create(&args.output)
            .map_err(|e| format!("Failed to create {}: {}", args.output.display(), e))?,
    );

    let start = Instant::now();
    let mut written = 0usize;
    let mut last_frame: Option<Vec<u8>> = None;

    for (index, data) in input.chunks_exact_mut(frame_len).enumerate() {
        let mut frame = VideoFrame::new(size.width, size.height, data);
        match filter.process_frame(&mut frame)? {
            FrameOutcome::Filtered => {
                writer.write_all(frame.data)?;
                written += 1;
                if args.preview.is_some() {
                    last_frame = Some(frame.data.to_vec());
                }
            }
            FrameOutcome::Primed => debug!(index, "First frame queued"),
        }
    }

    let mut pending = vec![0u8; frame_len];
    if filter.flush(&mut VideoFrame::new(size.width, size.height, &mut pending))? {
        writer.write_all(&pending)?;
        written += 1;
        last_frame = Some(pending);
    }
    writer.flush()?;
    filter.close();

    let elapsed = start.elapsed();
    info!(
        frames = written,
        dropped = filter.frames_dropped(),
        elapsed_ms = elapsed.as_millis() as u64,
        "Processing finished"
    );
    println!(
        "Wrote {} frame(s) to {} in {:.2?}",
        written,
        args.output.display(),
        elapsed
    );

    if let (Some(path), Some(frame)) = (args.preview.as_ref(), last_frame) {
        save_luma_preview(path, size, frame)?;
        println!("Preview: {}", path.display());
    }

    Ok(())
}

/// Save the luma plane of an NV12 frame as a grayscale PNG
fn save_luma_preview(
    path: &Path,
    size: FrameSize,
    mut frame: Vec<u8>,
) -> Result<(), Box<dyn std::error::Error>> {
    frame.truncate(size.luma_len());
    let image = GrayImage::from_raw(size.width, size.height, frame)
        .ok_or("Failed to create preview image")?;
    image
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| format!("Failed to save preview PNG: {}", e))?;
    Ok(())
}

/// Print the GPU adapter the filter would use
pub fn print_device_info(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    match WgpuBackend::new(config.power_preference.into()) {
        Ok(backend) => {
            let info = backend.device_info();
            println!("GPU adapter: {}", info.adapter_name);
            println!("  Backend:     {:?}", info.backend);
            println!("  Device type: {:?}", info.device_type);
        }
        Err(e) => {
            println!("No GPU adapter available ({})", e);
            println!("Only the software backend can be used.");
        }
    }
    println!("Configured backend: {}", config.backend);
    Ok(())
}
