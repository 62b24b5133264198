// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use nv12_effect::backends::BackendType;
use nv12_effect::config::PowerPreference;
use nv12_effect::pipelines::effect::ReadbackPolicy;
use nv12_effect::shaders::Effect;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "nv12-effect")]
#[command(about = "Apply a per-pixel effect to raw NV12 video frames")]
#[command(version = nv12_effect::constants::app_version())]
struct Cli {
    /// Configuration file (default: <config dir>/nv12-effect/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Filter a raw file of concatenated NV12 frames
    Process {
        /// Input file (frames of width*height*3/2 bytes)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Frame width in pixels (even)
        #[arg(long)]
        width: u32,

        /// Frame height in pixels (even)
        #[arg(long)]
        height: u32,

        /// Effect to apply (overrides the config file)
        #[arg(short, long, value_enum)]
        effect: Option<Effect>,

        /// Readback policy (overrides the config file)
        #[arg(short, long, value_enum)]
        policy: Option<ReadbackPolicy>,

        /// Render backend (overrides the config file)
        #[arg(short, long, value_enum)]
        backend: Option<BackendType>,

        /// Write the luma plane of the last output frame as a PNG
        #[arg(long)]
        preview: Option<PathBuf>,
    },

    /// Show which render device would be used
    Info {
        /// Adapter preference (overrides the config file)
        #[arg(long, value_enum)]
        power_preference: Option<PowerPreference>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=nv12_effect=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let mut config = cli::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Process {
            input,
            output,
            width,
            height,
            effect,
            policy,
            backend,
            preview,
        } => {
            if let Some(effect) = effect {
                config.effect = effect;
            }
            if let Some(policy) = policy {
                config.readback_policy = policy;
            }
            if let Some(backend) = backend {
                config.backend = backend;
            }
            cli::process_file(
                &config,
                cli::ProcessArgs {
                    input,
                    output,
                    width,
                    height,
                    preview,
                },
            )
        }
        Commands::Info { power_preference } => {
            if let Some(preference) = power_preference {
                config.power_preference = preference;
            }
            cli::print_device_info(&config)
        }
    }
}
