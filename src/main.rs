//! Motion Session Recorder CLI
//!
//! Records body-tracking sessions and listens to motion-sensor packets.

use anyhow::{bail, Context};
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use motion_session_recorder::{
    collector::ReplaySource,
    config::{Config, SessionConfig, DEFAULT_TARGETS},
    export::write_packets,
    listener::{Listener, PacketKind, TcpTransport, Transport},
    recorder::{ExitReason, Recorder},
    SessionExporter, SessionState, VERSION,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::warn;

#[derive(Parser)]
#[command(name = "motion-recorder")]
#[command(version = VERSION)]
#[command(about = "Body-tracking session recorder and motion-sensor listener", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a session from a captured JSON Lines stream
    Record {
        /// Capture file with one frame or input event per line
        #[arg(long)]
        replay: PathBuf,

        /// Root directory for session directories
        #[arg(long)]
        recordings: Option<PathBuf>,

        /// Do not write session artifacts
        #[arg(long)]
        no_csv: bool,

        /// Maximum loop iterations per second
        #[arg(long)]
        frame_rate: Option<u32>,
    },

    /// Listen for motion-sensor packets until Ctrl+C
    Listen {
        /// Publisher address
        #[arg(long)]
        address: Option<String>,

        /// Accept a publisher on the address instead of connecting to it
        #[arg(long)]
        bind: bool,

        /// Packet types to print (switch, battery, fused, or all)
        #[arg(long, default_value = "all")]
        types: String,

        /// Log every decoded packet
        #[arg(long)]
        verbose: bool,
    },

    /// List recorded sessions
    Sessions,

    /// Show the target labels written with each session
    Targets,

    /// Show configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Record {
            replay,
            recordings,
            no_csv,
            frame_rate,
        } => cmd_record(replay, recordings, no_csv, frame_rate),
        Commands::Listen {
            address,
            bind,
            types,
            verbose,
        } => cmd_listen(address, bind, &types, verbose),
        Commands::Sessions => cmd_sessions(),
        Commands::Targets => {
            cmd_targets();
            Ok(())
        }
        Commands::Config => cmd_config(),
    }
}

fn load_config() -> Config {
    match Config::load() {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Could not load configuration, using defaults");
            Config::default()
        }
    }
}

fn cmd_record(
    replay: PathBuf,
    recordings: Option<PathBuf>,
    no_csv: bool,
    frame_rate: Option<u32>,
) -> anyhow::Result<()> {
    let mut config = load_config();
    if let Some(path) = recordings {
        config.recordings_path = path;
    }
    if let Some(rate) = frame_rate {
        config.frame_rate_hz = rate;
    }
    if no_csv {
        config.write_csv = false;
    }

    let triggers = config.triggers()?;
    if config.write_csv {
        config.ensure_directories()?;
    }

    let source = ReplaySource::open(&replay)
        .with_context(|| format!("could not read capture {}", replay.display()))?;

    println!("Motion Session Recorder v{VERSION}");
    println!();
    println!("  Capture: {}", replay.display());
    println!("  Tire keys: {}", triggers.tires.iter().collect::<String>());
    println!("  Field keys: {}", triggers.fields.iter().collect::<String>());
    println!("  Tracked joint: {}", config.tracked_joint);
    println!("  Frame rate: {} Hz", config.frame_rate_hz);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let state = SessionState::new(triggers, config.tracked_joint, config.hand_tip_joint);
    let exporter = SessionExporter::new(SessionConfig::new(&config.recordings_path, Local::now()));

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(Arc::clone(&running))?;

    let summary = Recorder::new(source, state, exporter, &config).run(running);

    println!();
    println!("Session ended: {}", summary.exit);
    println!("  Frames recorded: {}", summary.frames_processed);
    println!("  Frames skipped: {}", summary.frames_skipped);
    println!("  Input events: {}", summary.events);

    if let Some(report) = &summary.export {
        println!();
        println!("Wrote {} artifacts to {}", report.written.len(), report.session_dir.display());
        for failure in &report.failures {
            eprintln!("  Failed: {} ({})", failure.artifact, failure.error);
        }
    }

    if let ExitReason::SourceError(e) = summary.exit {
        bail!("session ended early: {e}");
    }
    Ok(())
}

fn cmd_listen(
    address: Option<String>,
    bind: bool,
    types: &str,
    verbose: bool,
) -> anyhow::Result<()> {
    let config = load_config();
    let address = address.unwrap_or_else(|| config.listener_address.clone());
    let kinds = PacketKind::parse_list(types)?;

    let transport: Box<dyn Transport> = if bind {
        Box::new(TcpTransport::bind(address.as_str())?)
    } else {
        Box::new(
            TcpTransport::connect(address.as_str())
                .with_context(|| format!("could not connect to {address}"))?,
        )
    };

    let mut listener = Listener::with_options(transport, config.poll_timeout, verbose);
    listener.register_observer(
        |packet| match serde_json::to_string(packet) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "Could not format packet"),
        },
        Some(kinds.as_slice()),
    );

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(Arc::clone(&running))?;

    listener.start()?;
    println!("Listening on {address}. Press Ctrl+C to stop");
    while running.load(Ordering::SeqCst) && listener.is_running() {
        thread::sleep(Duration::from_millis(100));
    }
    listener.close();

    let packets = listener.get_recorded(None);
    if !packets.is_empty() {
        config.ensure_directories()?;
        let path = config.recordings_path.join(format!(
            "sensor-{}.csv",
            Utc::now().format("%Y%m%d-%H%M%S")
        ));
        let rows = write_packets(&path, &packets)?;
        println!("Wrote {rows} packets to {}", path.display());
    }

    println!();
    println!("{}", listener.summary());
    Ok(())
}

fn cmd_sessions() -> anyhow::Result<()> {
    let config = load_config();
    let index = config.recordings_path.join("session_names.csv");

    if !index.exists() {
        println!("No sessions found in {}", config.recordings_path.display());
        println!("Run 'motion-recorder record' to record one.");
        return Ok(());
    }

    let content = std::fs::read_to_string(&index)
        .with_context(|| format!("could not read {}", index.display()))?;
    let names: Vec<&str> = content
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .collect();

    println!("{} session(s) in {}", names.len(), config.recordings_path.display());
    for name in names {
        let dir = config.recordings_path.join(name);
        let marker = if dir.is_dir() { "" } else { " (missing)" };
        println!("  {name}{marker}");
    }
    Ok(())
}

fn cmd_targets() {
    println!("Targets");
    println!("=======");
    for (i, target) in DEFAULT_TARGETS.iter().enumerate() {
        println!("  {:02}  {target}", i + 1);
    }
}

fn cmd_config() -> anyhow::Result<()> {
    let config = load_config();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")
}
