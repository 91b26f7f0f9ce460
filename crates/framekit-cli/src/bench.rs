//! Decode and transfer benchmarks against an emulated panel.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use framekit_core::color::parse_hex_color;
use framekit_core::{
    DisplayTransfer, FormatCodec, LinkPanel, MemoryPanel, PalettePreset, PaletteTable,
    PixelFormat, PixelSurface, Window,
};
use tracing::{debug, info};

use crate::config::{BlitEntry, Config, ImageEntry};
use crate::source::{build_codec, resolve_format};

/// One CSV row.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchRow {
    pub decoder: String,
    pub format: String,
    pub iterations: u32,
    pub decode_ms: f64,
    pub transfer_ms: f64,
}

pub const CSV_HEADER: &str = "decoder;format;iterations;decode_ms;transfer_ms";

fn mean_ms(total: Duration, iterations: u32) -> f64 {
    total.as_secs_f64() * 1000.0 / iterations.max(1) as f64
}

/// Runs every entry of `config`; image paths are resolved against `base`.
pub fn run(config: &Config, base: &Path) -> Result<Vec<BenchRow>> {
    if config.iterations == 0 {
        bail!("Iterations must be at least 1");
    }
    let (width, height) = (config.panel.width, config.panel.height);
    let mut panel = LinkPanel::new(MemoryPanel::new(width, height), width, height);
    let mut rows = Vec::with_capacity(config.images.len() + config.blits.len());

    for entry in &config.images {
        let row = bench_image(entry, base, config.iterations, &mut panel)
            .with_context(|| format!("Benchmark of {} failed", entry.path.display()))?;
        info!(
            "{}: decode {:.3} ms, transfer {:.3} ms",
            entry.path.display(),
            row.decode_ms,
            row.transfer_ms
        );
        rows.push(row);
    }
    for entry in &config.blits {
        let row = bench_blit(entry, config.iterations, &mut panel)
            .with_context(|| format!("Blit benchmark of {} failed", entry.format))?;
        info!("{} fill: transfer {:.3} ms", row.format, row.transfer_ms);
        rows.push(row);
    }
    Ok(rows)
}

/// Part of `surface` that fits on the panel.
fn panel_window(surface: &PixelSurface, panel: &LinkPanel<MemoryPanel>) -> Window {
    Window::new(
        0,
        0,
        surface.width().min(panel.width()),
        surface.height().min(panel.height()),
    )
}

fn time_transfers(
    surface: &PixelSurface,
    panel: &mut LinkPanel<MemoryPanel>,
    iterations: u32,
) -> Result<Duration> {
    let window = panel_window(surface, panel);
    let start = Instant::now();
    for _ in 0..iterations {
        panel
            .transfer(surface, Some(window))
            .context("Transfer failed")?;
    }
    Ok(start.elapsed())
}

fn bench_image(
    entry: &ImageEntry,
    base: &Path,
    iterations: u32,
    panel: &mut LinkPanel<MemoryPanel>,
) -> Result<BenchRow> {
    let path = base.join(&entry.path);
    let bytes = std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let format = resolve_format(&path, &bytes, Some(&entry.format))?;
    let mut codec = build_codec(
        format,
        entry.width,
        entry.height,
        entry.palette.as_deref(),
        entry.reduce,
    )?;

    // Warm-up decode sizes the reused target.
    let first = codec.decode(&mut &bytes[..]).context("Decode failed")?;
    let mut target = match codec {
        FormatCodec::Raw(_) => first,
        _ => PixelSurface::new(first.width(), first.height(), PixelFormat::Rgb565)?,
    };
    debug!(
        "Benchmarking {} as {} into {}x{} {}",
        path.display(),
        format,
        target.width(),
        target.height(),
        target.format()
    );

    let start = Instant::now();
    for _ in 0..iterations {
        codec
            .decode_into(&mut &bytes[..], &mut target, (0, 0))
            .context("Decode failed")?;
    }
    let decode = start.elapsed();
    let transfer = time_transfers(&target, panel, iterations)?;

    Ok(BenchRow {
        decoder: format.to_string(),
        format: target.format().to_string(),
        iterations,
        decode_ms: mean_ms(decode, iterations),
        transfer_ms: mean_ms(transfer, iterations),
    })
}

/// Parses a fill value: `#RRGGBB` color or a decimal palette index.
fn parse_fill(fill: &str) -> Result<u32> {
    if fill.starts_with('#') {
        return parse_hex_color(fill).with_context(|| format!("Invalid fill color '{}'", fill));
    }
    fill.parse()
        .with_context(|| format!("Invalid fill value '{}'", fill))
}

fn bench_blit(
    entry: &BlitEntry,
    iterations: u32,
    panel: &mut LinkPanel<MemoryPanel>,
) -> Result<BenchRow> {
    let format: PixelFormat = entry
        .format
        .parse()
        .with_context(|| format!("Invalid surface format '{}'", entry.format))?;
    let mut surface = PixelSurface::new(panel.width(), panel.height(), format)?;
    if format.is_indexed() {
        let preset = match entry.palette.as_deref() {
            Some(name) => name
                .parse()
                .with_context(|| format!("Invalid palette preset '{}'", name))?,
            None if format == PixelFormat::Pal256 => PalettePreset::Rgb676,
            None => PalettePreset::Default,
        };
        surface
            .set_palette(Arc::new(PaletteTable::preset(preset)))
            .with_context(|| format!("Palette '{}' does not fit {}", preset, format))?;
    }
    let color = parse_fill(&entry.fill)?;

    let start = Instant::now();
    for _ in 0..iterations {
        surface.fill(color).context("Fill failed")?;
    }
    let fill = start.elapsed();
    let transfer = time_transfers(&surface, panel, iterations)?;

    Ok(BenchRow {
        decoder: "fill".to_string(),
        format: format.to_string(),
        iterations,
        decode_ms: mean_ms(fill, iterations),
        transfer_ms: mean_ms(transfer, iterations),
    })
}

/// Writes `rows` as semicolon-separated CSV with a header line.
pub fn write_csv<W: Write>(rows: &[BenchRow], mut out: W) -> Result<()> {
    writeln!(out, "{}", CSV_HEADER)?;
    for row in rows {
        writeln!(
            out,
            "{};{};{};{:.3};{:.3}",
            row.decoder, row.format, row.iterations, row.decode_ms, row.transfer_ms
        )?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PanelConfig;
    use std::path::PathBuf;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("framekit-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_parse_fill() {
        assert_eq!(parse_fill("#00FF00").unwrap(), 0x00FF00);
        assert_eq!(parse_fill("12").unwrap(), 12);
        assert!(parse_fill("#12").is_err());
        assert!(parse_fill("red").is_err());
    }

    #[test]
    fn test_blits() {
        let config = Config {
            iterations: 2,
            panel: PanelConfig {
                width: 16,
                height: 8,
            },
            ..Config::default()
        };
        let rows = run(&config, Path::new(".")).unwrap();
        let formats: Vec<&str> = rows.iter().map(|r| r.format.as_str()).collect();
        assert_eq!(formats, vec!["RGB565", "PAL256", "PAL16"]);
        assert!(rows.iter().all(|r| r.decoder == "fill" && r.iterations == 2));
    }

    #[test]
    fn test_blit_index_out_of_range() {
        let config = Config {
            iterations: 1,
            blits: vec![BlitEntry {
                format: "pal16".to_string(),
                palette: None,
                fill: "16".to_string(),
            }],
            ..Config::default()
        };
        assert!(run(&config, Path::new(".")).is_err());
    }

    #[test]
    fn test_raw_image_entry() {
        let dir = scratch_dir("bench");
        std::fs::write(dir.join("red.r565"), [0xF8, 0x00].repeat(4 * 2)).unwrap();
        let config = Config {
            iterations: 3,
            images: vec![ImageEntry {
                path: PathBuf::from("red.r565"),
                format: "auto".to_string(),
                width: Some(4),
                height: Some(2),
                palette: None,
                reduce: false,
            }],
            blits: Vec::new(),
            ..Config::default()
        };
        let rows = run(&config, &dir).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].decoder, "raw565");
        assert_eq!(rows[0].format, "RGB565");

        let mut csv = Vec::new();
        write_csv(&rows, &mut csv).unwrap();
        let csv = String::from_utf8(csv).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(CSV_HEADER));
        assert!(lines.next().unwrap().starts_with("raw565;RGB565;3;"));
    }

    #[test]
    fn test_missing_image_reported() {
        let config = Config {
            images: vec![ImageEntry {
                path: PathBuf::from("does-not-exist.bmp"),
                format: "auto".to_string(),
                width: None,
                height: None,
                palette: None,
                reduce: false,
            }],
            ..Config::default()
        };
        let err = run(&config, Path::new("/nonexistent")).unwrap_err();
        assert!(format!("{:#}", err).contains("does-not-exist.bmp"));
    }
}
