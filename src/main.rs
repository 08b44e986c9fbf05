//! fbcompositor CLI
//!
//! Command-line interface for probing display surfaces and testing playback.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use fbcompositor::{
    composite::fit_aspect, CompositorConfig, DisplaySurface, FormatNegotiator, FrameSink,
    NegotiatedFormat, Pipeline, PixelFormat, PlaybackEvent, Resolution, ScalePreset,
    SurfaceBackend,
};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Surface backend for CLI
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Backend {
    /// Probe fbdev, otherwise run without a surface
    Auto,
    /// Force a framebuffer device
    Fbdev,
    /// Headless in-memory surface
    Memory,
}

impl From<Backend> for SurfaceBackend {
    fn from(b: Backend) -> Self {
        match b {
            Backend::Auto => SurfaceBackend::Auto,
            Backend::Fbdev => SurfaceBackend::Fbdev,
            Backend::Memory => SurfaceBackend::Memory,
        }
    }
}

#[derive(Parser)]
#[command(name = "fbcompositor")]
#[command(about = "Framebuffer video compositor - Negotiate, Scale, Display")]
#[command(version)]
struct Cli {
    /// Config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Surface backend override
    #[arg(short, long, global = true, value_enum)]
    backend: Option<Backend>,

    /// Framebuffer device override
    #[arg(short, long, global = true)]
    device: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show display surface geometry and negotiation policy
    Info,

    /// Print the working format negotiated for a source resolution
    Negotiate {
        width: u32,
        height: u32,
    },

    /// Play a synthetic test pattern until Ctrl+C
    Play {
        /// Source resolution (e.g., 1280x720)
        #[arg(short, long, default_value = "1280x720")]
        resolution: String,

        /// Frames per second produced by the test decoder
        #[arg(short, long, default_value = "30")]
        fps: u32,

        /// Stop after this many seconds
        #[arg(short, long)]
        seconds: Option<u64>,

        /// Negotiation preset (low-power, balanced, native)
        #[arg(short, long)]
        preset: Option<String>,
    },

    /// Blank the display surface
    Clear,

    /// List available negotiation presets
    Presets,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fbcompositor=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Info => cmd_info(&config),
        Commands::Negotiate { width, height } => cmd_negotiate(&config, width, height),
        Commands::Play {
            resolution,
            fps,
            seconds,
            preset,
        } => cmd_play(config, resolution, fps, seconds, preset).await,
        Commands::Clear => cmd_clear(&config),
        Commands::Presets => cmd_presets(),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<CompositorConfig> {
    let mut config = match &cli.config {
        Some(path) => CompositorConfig::load(path)?,
        None => CompositorConfig::default(),
    };
    if let Some(backend) = cli.backend {
        config = config.with_backend(backend.into());
    }
    if let Some(device) = &cli.device {
        config = config.with_device(device.clone());
    }
    Ok(config)
}

fn negotiator_for(config: &CompositorConfig, surface: &DisplaySurface) -> FormatNegotiator {
    let pixel_format = if surface.is_available() {
        surface.pixel_format()
    } else {
        config.surface.pixel_format.unwrap_or_default()
    };
    FormatNegotiator::new(config.scale.clone(), pixel_format)
}

fn cmd_info(config: &CompositorConfig) -> anyhow::Result<()> {
    println!("fbcompositor {}", fbcompositor::VERSION);
    println!("====================\n");

    println!("=== Display Surface ===");
    let surface = DisplaySurface::open_or_degraded(&config.surface);
    println!("Backend: {}", surface.name());
    if surface.is_available() {
        let geometry = surface.geometry();
        println!("Resolution: {}", geometry.resolution());
        println!("Depth: {} bpp", geometry.bpp);
        println!("Stride: {} bytes", geometry.stride_bytes);
        println!("Mapped: {} bytes", geometry.total_size_bytes);
        println!("Pages: {}", geometry.pages());
        println!("Pixel format: {}", surface.pixel_format());
    } else {
        println!(
            "Available: No ({})",
            surface.unavailable_reason().unwrap_or("unknown")
        );
    }

    println!("\n=== Negotiation ===");
    let negotiator = negotiator_for(config, &surface);
    for tier in &config.scale.tiers {
        println!("  height > {:<5} /{}", tier.above_height, tier.factor);
    }
    println!("  otherwise     /{}", config.scale.default_factor);
    println!("  floor         {}", config.scale.floor());

    println!("\nCommon sources:");
    for source in [Resolution::FHD_1080P, Resolution::HD_720P, Resolution::SD_480P] {
        let format = negotiator.negotiate(source);
        print!("  {:<10} -> {:<8}", source.to_string(), format.scaled.to_string());
        if surface.is_available() {
            let rect = fit_aspect(format.scaled, surface.geometry().resolution());
            print!(" shown at {}x{}+{}+{}", rect.width, rect.height, rect.x, rect.y);
        }
        println!();
    }

    Ok(())
}

fn cmd_negotiate(config: &CompositorConfig, width: u32, height: u32) -> anyhow::Result<()> {
    let source = Resolution::new(width, height);
    let pixel_format = config.surface.pixel_format.unwrap_or_default();
    let negotiator = FormatNegotiator::new(config.scale.clone(), pixel_format);
    let format = negotiator
        .try_negotiate(source)
        .with_context(|| format!("cannot negotiate source {}", source))?;

    println!("Source:       {}", format.source);
    println!("Scale factor: 1/{}", format.scale_factor);
    println!("Working size: {}", format.scaled);
    println!(
        "Chroma:       {} ({})",
        String::from_utf8_lossy(&format.pixel_format.fourcc()),
        format.pixel_format
    );
    println!("Pitch:        {} bytes", format.pitch());
    println!("Lines:        {}", format.lines());
    println!("Buffer size:  {} bytes (x2 slots)", format.buffer_size());

    Ok(())
}

fn parse_preset(name: &str) -> Option<ScalePreset> {
    match name.to_lowercase().as_str() {
        "low-power" | "lowpower" | "low" => Some(ScalePreset::LowPower),
        "balanced" => Some(ScalePreset::Balanced),
        "native" | "full" => Some(ScalePreset::Native),
        _ => None,
    }
}

fn parse_resolution(text: &str) -> Option<Resolution> {
    let (w, h) = text.split_once('x')?;
    let resolution = Resolution::new(w.trim().parse().ok()?, h.trim().parse().ok()?);
    (!resolution.is_empty()).then_some(resolution)
}

async fn cmd_play(
    mut config: CompositorConfig,
    resolution: String,
    fps: u32,
    seconds: Option<u64>,
    preset: Option<String>,
) -> anyhow::Result<()> {
    let Some(source) = parse_resolution(&resolution) else {
        anyhow::bail!("Invalid resolution: {} (expected WxH)", resolution);
    };
    if let Some(name) = preset {
        let Some(preset) = parse_preset(&name) else {
            eprintln!(
                "Unknown preset: {}. Use 'fbcompositor presets' to see available.",
                name
            );
            return Ok(());
        };
        config = config.with_scale_preset(preset);
    }

    let mut pipeline = Pipeline::new(config)?;
    let events = pipeline.events();

    println!("Configuration:");
    match pipeline.surface_geometry() {
        Some(geometry) => println!("  Surface: {}", geometry),
        None => println!("  Surface: unavailable (nothing will be drawn)"),
    }
    println!("  Source: {}", source);
    println!("  FPS: {}", fps);
    println!();

    pipeline.play()?;

    let running = Arc::new(AtomicBool::new(true));
    let decoder = {
        let sink = pipeline.sink();
        let running = running.clone();
        let frame_time = Duration::from_secs(1) / fps.max(1);
        std::thread::Builder::new()
            .name("test-decoder".into())
            .spawn(move || run_test_decoder(sink, source, frame_time, running))?
    };

    println!("Playback started. Press Ctrl+C to stop.\n");

    let event_task = tokio::task::spawn_blocking(move || {
        for event in events.iter() {
            match event {
                PlaybackEvent::FirstFrameReady => println!("First frame on screen"),
                PlaybackEvent::SurfaceUnavailable { reason } => {
                    println!("Display surface unavailable: {}", reason)
                }
            }
        }
    });

    match seconds {
        Some(secs) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
            }
        }
        None => tokio::signal::ctrl_c().await?,
    }

    println!("\nStopping...");
    running.store(false, Ordering::SeqCst);
    if decoder.join().is_err() {
        eprintln!("Test decoder panicked");
    }
    pipeline.shutdown()?;

    let stats = pipeline.stats();
    drop(pipeline);
    let _ = event_task.await;

    println!("\nStatistics:");
    println!("  Frames committed: {}", stats.frames_committed);
    println!("  Frames dropped: {}", stats.frames_dropped);
    println!("  Frames composited: {}", stats.frames_composited);
    println!("  Composites skipped: {}", stats.composites_skipped);

    Ok(())
}

/// Synthetic decoder: moving color bars at a fixed frame rate
fn run_test_decoder(
    sink: impl FrameSink,
    source: Resolution,
    frame_time: Duration,
    running: Arc<AtomicBool>,
) {
    let format = match sink.on_format_proposed(source) {
        Ok(format) => format,
        Err(e) => {
            tracing::error!("Test decoder negotiation failed: {}", e);
            return;
        }
    };
    tracing::info!("Test decoder producing {}", format);

    let mut frame = 0u32;
    while running.load(Ordering::SeqCst) {
        if let Some(mut window) = sink.on_lock() {
            draw_test_pattern(window.as_mut_slice(), &format, frame);
            sink.on_unlock(window);
            sink.on_display();
        }
        frame = frame.wrapping_add(1);
        std::thread::sleep(frame_time);
    }

    sink.on_format_cleanup();
}

fn draw_test_pattern(pixels: &mut [u8], format: &NegotiatedFormat, frame: u32) {
    const BARS: [(u8, u8, u8); 7] = [
        (0xc0, 0xc0, 0xc0),
        (0xc0, 0xc0, 0x00),
        (0x00, 0xc0, 0xc0),
        (0x00, 0xc0, 0x00),
        (0xc0, 0x00, 0xc0),
        (0xc0, 0x00, 0x00),
        (0x00, 0x00, 0xc0),
    ];
    let width = format.scaled.width.max(1);
    let pitch = format.pitch() as usize;
    let bars = precompute_bars(format.pixel_format, &BARS);

    for (y, row) in pixels.chunks_exact_mut(pitch).enumerate() {
        for (x, px) in row.chunks_exact_mut(4).enumerate() {
            let shifted = (x as u32 + frame + y as u32 / 8) % width;
            let bar = (shifted as usize * bars.len()) / width as usize;
            px.copy_from_slice(&bars[bar]);
        }
    }
}

fn precompute_bars(format: PixelFormat, colors: &[(u8, u8, u8)]) -> Vec<[u8; 4]> {
    colors.iter().map(|&(r, g, b)| format.pack(r, g, b)).collect()
}

fn cmd_clear(config: &CompositorConfig) -> anyhow::Result<()> {
    let mut surface = DisplaySurface::open(&config.surface)?;
    surface.clear();
    println!("Cleared {} surface ({})", surface.name(), surface.geometry());
    surface.close();
    Ok(())
}

fn cmd_presets() -> anyhow::Result<()> {
    println!("Available Presets");
    println!("=================\n");

    let presets = [
        ("low-power", ScalePreset::LowPower),
        ("balanced", ScalePreset::Balanced),
        ("native", ScalePreset::Native),
    ];

    for (name, preset) in presets {
        println!("  {:<10} ({:?}) - {}", name, preset, preset.description());
    }

    println!("\nUsage: fbcompositor play --preset <name>");

    Ok(())
}
