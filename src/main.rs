//! lossless-recorder: capture the screen as PNG frames and splice them with ffmpeg.
//!
//! Usage:
//!   lossless-recorder record [OPTIONS]   Record until Ctrl+C (or --duration)
//!   lossless-recorder splice <DIR>       Encode an existing session directory
//!   lossless-recorder check              Re-detect ffmpeg installations
//!   lossless-recorder targets            List monitors and windows
//!   lossless-recorder config [--init]    Show or create the config file

use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;

use lossless_recorder::capture::{list_monitors, list_windows};
use lossless_recorder::config::EncoderConfig;
use lossless_recorder::encoder::resolve;
use lossless_recorder::{
    CaptureTarget, Config, Encoder, FfmpegEncoder, FfmpegInstall, FrameCapture, Installations,
    Recorder, ScreenFrameCapture, Session, StopReport,
};

/// Give up on a session after this many capture failures in a row.
const MAX_CONSECUTIVE_CAPTURE_FAILURES: u32 = 30;

/// Exit status after a second Ctrl+C abandons the splice.
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Parser)]
#[command(
    name = "lossless-recorder",
    about = "Record the screen as a PNG sequence and splice it into a lossless video",
    version
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum InstallArg {
    Global,
    Local,
}

impl From<InstallArg> for FfmpegInstall {
    fn from(arg: InstallArg) -> Self {
        match arg {
            InstallArg::Global => FfmpegInstall::Global,
            InstallArg::Local => FfmpegInstall::Local,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Record until Ctrl+C, then splice the frames into a video
    Record {
        /// Parent directory for the session directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Capture frame rate
        #[arg(short = 'r', long)]
        frame_rate: Option<u32>,

        /// Integer upscale applied to every frame (1-4)
        #[arg(short, long)]
        multiplier: Option<u32>,

        /// Monitor id to record (see `targets`); defaults to the primary monitor
        #[arg(long, conflicts_with = "window")]
        monitor: Option<u32>,

        /// Window id to record (see `targets`)
        #[arg(long)]
        window: Option<u32>,

        /// Stop automatically after this many seconds
        #[arg(short, long)]
        duration: Option<f64>,

        /// Host update rate in Hz; defaults to twice the frame rate
        #[arg(long)]
        tick_rate: Option<u32>,

        /// Which ffmpeg installation to use
        #[arg(long, value_enum)]
        ffmpeg: Option<InstallArg>,
    },

    /// Splice the image sequence in an existing session directory
    Splice {
        /// Session directory containing the numbered frames
        dir: PathBuf,

        /// Frame rate of the output video
        #[arg(short = 'r', long)]
        frame_rate: Option<u32>,

        /// Which ffmpeg installation to use
        #[arg(long, value_enum)]
        ffmpeg: Option<InstallArg>,
    },

    /// Re-detect global and local ffmpeg installations
    Check,

    /// List monitors and windows that can be recorded
    Targets,

    /// Show the config file, or write the defaults with --init
    Config {
        /// Overwrite the config file with defaults
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    };

    match cli.command {
        Commands::Record {
            output,
            frame_rate,
            multiplier,
            monitor,
            window,
            duration,
            tick_rate,
            ffmpeg,
        } => {
            let mut config = config;
            if let Some(output) = output {
                config.output.directory = output;
            }
            if let Some(rate) = frame_rate {
                config.capture.frame_rate = rate;
            }
            if let Some(multiplier) = multiplier {
                config.capture.size_multiplier = multiplier;
            }
            if let Some(install) = ffmpeg {
                config.encoder.install = install.into();
            }
            config.validate()?;

            let target = match window {
                Some(id) => CaptureTarget::Window(id),
                None => CaptureTarget::Monitor(monitor),
            };
            let tick_rate = tick_rate.unwrap_or(config.capture.frame_rate.saturating_mul(2));
            record(config, target, duration, tick_rate).await
        }
        Commands::Splice {
            dir,
            frame_rate,
            ffmpeg,
        } => {
            let mut config = config;
            if let Some(rate) = frame_rate {
                config.capture.frame_rate = rate;
            }
            if let Some(install) = ffmpeg {
                config.encoder.install = install.into();
            }
            config.validate()?;
            splice(&config, dir)
        }
        Commands::Check => check(config),
        Commands::Targets => targets(),
        Commands::Config { init } => show_config(config, init),
    }
}

async fn record(
    config: Config,
    target: CaptureTarget,
    duration: Option<f64>,
    tick_rate: u32,
) -> Result<()> {
    if tick_rate == 0 {
        bail!("tick rate must be greater than zero");
    }
    let duration = match duration {
        Some(secs) if secs.is_finite() && secs > 0.0 => Some(Duration::from_secs_f64(secs)),
        Some(secs) => bail!("invalid duration: {secs}"),
        None => None,
    };
    let encoder = FfmpegEncoder::from_config(&config.encoder)?;
    let capture = ScreenFrameCapture::for_target(target, config.capture.size_multiplier);
    let mut recorder = Recorder::new(config, capture, encoder);

    let session = recorder.start()?;
    println!("Recording to {}", session.directory().display());
    println!("Press Ctrl+C to stop recording...");

    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / f64::from(tick_rate)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let deadline = duration.map(|d| Instant::now() + d);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut last = Instant::now();
    let mut failures = 0u32;
    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                res.context("Failed to listen for Ctrl+C")?;
                println!();
                break;
            }
            _ = ticker.tick() => {
                let now = Instant::now();
                let delta = now.duration_since(last);
                last = now;

                match recorder.tick(delta.as_secs_f64()) {
                    Ok(_) => failures = 0,
                    Err(_) => {
                        failures += 1;
                        if failures >= MAX_CONSECUTIVE_CAPTURE_FAILURES {
                            tracing::error!(failures, "Capture keeps failing, stopping");
                            break;
                        }
                    }
                }

                if deadline.is_some_and(|d| now >= d) {
                    break;
                }
            }
        }
    }

    println!("Splicing {} frames... (Ctrl+C again to abort)", recorder.frame_count());
    let Some(report) = finish(recorder, tokio::signal::ctrl_c()).await? else {
        eprintln!("Interrupted, the frames are kept for `splice`");
        std::process::exit(INTERRUPTED_EXIT_CODE);
    };
    if report.dropped > 0 {
        tracing::warn!(
            dropped = report.dropped,
            "Some frames could not be written, the video ends early"
        );
    }
    if !report.status.success() {
        bail!("ffmpeg exited with code {:?}", report.status.code);
    }
    println!("Video saved to: {}", report.video.display());
    Ok(())
}

/// Stops the recorder on the blocking pool so `interrupt` can still fire
/// while ffmpeg runs. Returns `None` when interrupted.
async fn finish<C, E, I>(mut recorder: Recorder<C, E>, interrupt: I) -> Result<Option<StopReport>>
where
    C: FrameCapture + Send + 'static,
    E: Encoder + Send + 'static,
    I: Future<Output = std::io::Result<()>>,
{
    let stopping = tokio::task::spawn_blocking(move || recorder.stop());
    tokio::select! {
        joined = stopping => {
            let report = joined.context("Stop task panicked")??;
            Ok(Some(report))
        }
        res = interrupt => {
            res.context("Failed to listen for Ctrl+C")?;
            Ok(None)
        }
    }
}

fn splice(config: &Config, dir: PathBuf) -> Result<()> {
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    let session = Session::open(dir, &config.output);
    let frames = session.count_frames();
    if frames == 0 {
        bail!("No frames found at {}", session.frame_path(0).display());
    }

    let encoder = FfmpegEncoder::from_config(&config.encoder)?;
    println!("Splicing {} frames...", frames);
    let status = encoder.encode(&session.encode_job(config.capture.frame_rate))?;
    if !status.success() {
        bail!("ffmpeg exited with code {:?}", status.code);
    }
    println!("Video saved to: {}", session.video_path().display());
    Ok(())
}

fn check(mut config: Config) -> Result<()> {
    let found = Installations::detect(&config.encoder);
    found.apply(&mut config.encoder);
    config.save()?;

    let mark = |ok: bool| if ok { "found" } else { "missing" };
    println!("global ffmpeg (PATH): {}", mark(found.global));
    println!(
        "local ffmpeg ({}): {}",
        config.encoder.local_path.display(),
        mark(found.local)
    );
    println!("selected: {}", config.encoder.install.display_name());

    resolve(&config.encoder, found)?;
    if let Some(hint) = found.hint(config.encoder.install) {
        println!("{hint}");
    }
    Ok(())
}

fn targets() -> Result<()> {
    println!("Monitors:");
    for monitor in list_monitors()? {
        println!(
            "  {:>10}  {}x{} at ({}, {}){}  {}",
            monitor.id,
            monitor.width,
            monitor.height,
            monitor.x,
            monitor.y,
            if monitor.is_primary { " primary" } else { "" },
            monitor.name
        );
    }

    println!("Windows:");
    for window in list_windows()? {
        println!(
            "  {:>10}  {}x{}{}  {} ({})",
            window.id,
            window.width,
            window.height,
            if window.is_visible { "" } else { " minimized" },
            window.title,
            window.app_name
        );
    }
    Ok(())
}

fn show_config(config: Config, init: bool) -> Result<()> {
    let path = Config::config_path().ok_or_else(|| anyhow!("No config directory available"))?;
    let config = if init {
        let defaults = Config::default();
        defaults.save_to(&path)?;
        println!("Wrote defaults to {}", path.display());
        defaults
    } else {
        println!("# {}", path.display());
        config
    };
    print!("{}", toml::to_string_pretty(&config)?);

    println!();
    for line in cached_install_status(&config.encoder) {
        println!("# {line}");
    }
    Ok(())
}

/// Installation status as recorded by the last `check`; nothing is re-detected.
fn cached_install_status(encoder: &EncoderConfig) -> Vec<String> {
    let known = Installations::from_config(encoder);
    let mut lines = vec!["Last check (run `check` to refresh):".to_string()];
    for install in [FfmpegInstall::Global, FfmpegInstall::Local] {
        let status = if known.found(install) { "found" } else { "missing" };
        let selected = if install == encoder.install { " (selected)" } else { "" };
        lines.push(format!("  {} ffmpeg: {}{}", install.display_name(), status, selected));
    }
    lines.extend(known.hint(encoder.install));
    lines
}
