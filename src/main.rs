// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camswap")]
#[command(about = "Replace camera output with a substitute video")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show settings and the media library
    Info,

    /// Select the next substitute video
    Next,

    /// Select the previous substitute video
    Prev,

    /// Produce a replacement photo without a camera
    Snapshot {
        /// Output file path (default: ~/Pictures/camswap/photo_TIMESTAMP.jpg)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long, default_value = "1280")]
        width: u32,

        #[arg(long, default_value = "720")]
        height: u32,
    },

    /// Run a simulated camera session against a headless preview
    Simulate {
        #[arg(long, default_value = "1280")]
        width: u32,

        #[arg(long, default_value = "720")]
        height: u32,

        /// Session duration in seconds
        #[arg(short, long, default_value = "5")]
        seconds: u64,

        /// Rotation in degrees, overriding the settings file
        #[arg(short, long)]
        rotation: Option<i32>,

        /// Composite on the GPU when an adapter is available
        #[arg(long)]
        gpu: bool,

        /// Where to save the last presented frame
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control the log level, e.g. RUST_LOG=camswap=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Info => cli::show_info(),
        Commands::Next => cli::switch_video(true),
        Commands::Prev => cli::switch_video(false),
        Commands::Snapshot {
            output,
            width,
            height,
        } => cli::snapshot(output, width, height),
        Commands::Simulate {
            width,
            height,
            seconds,
            rotation,
            gpu,
            output,
        } => cli::simulate(cli::SimulateOptions {
            width,
            height,
            seconds,
            rotation,
            gpu,
            output,
        }),
    }
}
