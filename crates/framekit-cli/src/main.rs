//! Framekit Tool
//!
//! Inspects and decodes panel image formats and benchmarks the decoders
//! against an emulated LCD panel.

mod bench;
mod config;
mod export;
mod source;

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use framekit_core::{ImageFormat, ImageInfo, PalettePreset, PaletteTable};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "framekit")]
#[command(about = "Decode, inspect and benchmark panel image formats")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// How to read an input file.
#[derive(Args)]
struct SourceArgs {
    /// Input format: raw565, pal256, pal16, bmp, gif, jpeg (detected when omitted)
    #[arg(long)]
    format: Option<String>,

    /// Image width, required for raw formats
    #[arg(long)]
    width: Option<u16>,

    /// Image height, required for raw formats
    #[arg(long)]
    height: Option<u16>,

    /// Palette preset for headerless pal256/pal16 dumps
    #[arg(long)]
    palette: Option<String>,

    /// Decode JPEG at 1/8 scale
    #[arg(long)]
    reduce: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show format, dimensions and frame count of an image
    Info {
        /// Input file
        file: PathBuf,

        #[command(flatten)]
        source: SourceArgs,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Decode an image and export it as PNG
    Decode {
        /// Input file
        file: PathBuf,

        #[command(flatten)]
        source: SourceArgs,

        /// Output PNG path
        #[arg(short, long, default_value = "out.png")]
        output: PathBuf,

        /// Write every animation frame as a PNG into this directory
        #[arg(long)]
        frames: Option<PathBuf>,
    },
    /// Run decode and transfer benchmarks
    Bench {
        /// Benchmark configuration (default settings and fills when omitted)
        config: Option<PathBuf>,

        /// Write the default configuration to this path and exit
        #[arg(long)]
        write_default: Option<PathBuf>,
    },
    /// List built-in palette presets
    Palettes,
}

#[derive(Serialize)]
struct InfoReport {
    file: String,
    format: String,
    width: u32,
    height: u32,
    bits_per_pixel: u8,
    surface_format: String,
    frames: u32,
}

impl InfoReport {
    fn new(path: &Path, info: &ImageInfo) -> Self {
        Self {
            file: path.display().to_string(),
            format: info.format.to_string(),
            width: info.width,
            height: info.height,
            bits_per_pixel: info.bits_per_pixel,
            surface_format: info.surface_format.to_string(),
            frames: info.frames,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Info { file, source, json } => handle_info(&file, &source, json),
        Commands::Decode {
            file,
            source,
            output,
            frames,
        } => handle_decode(&file, &source, &output, frames.as_deref()),
        Commands::Bench {
            config,
            write_default,
        } => handle_bench(config.as_deref(), write_default.as_deref()),
        Commands::Palettes => handle_palettes(),
    }
}

/// Reads `path` and builds the codec for it.
fn open_input(path: &Path, args: &SourceArgs) -> Result<(Vec<u8>, framekit_core::FormatCodec)> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let format = source::resolve_format(path, &bytes, args.format.as_deref())?;
    debug!("{}: {} bytes, {}", path.display(), bytes.len(), format);
    let codec = source::build_codec(
        format,
        args.width,
        args.height,
        args.palette.as_deref(),
        args.reduce,
    )?;
    Ok((bytes, codec))
}

fn handle_info(path: &Path, args: &SourceArgs, json: bool) -> Result<()> {
    let (bytes, mut codec) = open_input(path, args)?;
    let info = codec
        .info(&mut &bytes[..])
        .with_context(|| format!("Failed to read {} header", codec.format()))?;
    let report = InfoReport::new(path, &info);

    if json {
        let text = serde_json::to_string_pretty(&report).context("Failed to serialize info")?;
        println!("{}", text);
        return Ok(());
    }

    println!("{}:", report.file);
    println!("  Format: {}", report.format);
    println!("  Dimensions: {}x{}", report.width, report.height);
    println!("  Bits per pixel: {}", report.bits_per_pixel);
    println!("  Surface: {}", report.surface_format);
    if info.format == ImageFormat::Gif {
        println!("  Frames: {}", report.frames);
    }
    Ok(())
}

fn handle_decode(path: &Path, args: &SourceArgs, output: &Path, frames: Option<&Path>) -> Result<()> {
    let (bytes, mut codec) = open_input(path, args)?;
    let surface = codec
        .decode(&mut &bytes[..])
        .with_context(|| format!("Failed to decode {}", path.display()))?;
    export::save_png(&surface, output)?;
    println!(
        "Decoded {}x{} {} to {}",
        surface.width(),
        surface.height(),
        surface.format(),
        output.display()
    );

    let Some(dir) = frames else {
        return Ok(());
    };
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let mut failure = None;
    let count = codec
        .decode_frames(&mut &bytes[..], |frame| {
            let file = dir.join(format!("frame_{:03}.png", frame.index));
            match export::save_png(frame.surface, &file) {
                Ok(()) => {
                    info!("Frame {} ({} cs) -> {}", frame.index, frame.delay_cs, file.display());
                    ControlFlow::Continue(())
                }
                Err(e) => {
                    failure = Some(e);
                    ControlFlow::Break(())
                }
            }
        })
        .with_context(|| format!("Failed to decode frames of {}", path.display()))?;
    if let Some(e) = failure {
        return Err(e);
    }
    println!("Wrote {} frame(s) to {}", count, dir.display());
    Ok(())
}

fn handle_bench(path: Option<&Path>, write_default: Option<&Path>) -> Result<()> {
    if let Some(target) = write_default {
        Config::default().save(target)?;
        println!("Default configuration written to {}", target.display());
        return Ok(());
    }

    let (config, base) = match path {
        Some(path) => {
            let config = Config::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
            (config, base)
        }
        None => (Config::default(), PathBuf::from(".")),
    };

    let rows = bench::run(&config, &base)?;
    match &config.output {
        Some(out) => {
            let out = base.join(out);
            let file = std::fs::File::create(&out)
                .with_context(|| format!("Failed to create {}", out.display()))?;
            bench::write_csv(&rows, std::io::BufWriter::new(file))?;
            println!("Results written to {}", out.display());
        }
        None => bench::write_csv(&rows, std::io::stdout().lock())?,
    }
    Ok(())
}

fn handle_palettes() -> Result<()> {
    println!("Available palettes:");
    for preset in PalettePreset::ALL {
        let table = PaletteTable::preset(preset);
        println!("  {:<14} {} colors", preset.to_string(), table.len());
    }
    Ok(())
}
