//! AutoStop - counter-strafe emergency stop for WASD movement
//!
//! Watches W/A/S/D and, when the last held movement key is released,
//! taps the opposite key for a short randomized time to kill the drift.

use autostop::config::{Backend, Config, HoldRange};
use autostop::observer::create_event_channel;
use autostop::{AutoStopError, Controller, KeyInjector, RdevHook, RdevInjector, YdotoolInjector};
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Counter-strafe emergency stop for WASD movement
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// TOML config file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Releases shorter than this get a short stop (ms)
    #[arg(short, long, conflicts_with = "threshold_secs")]
    threshold_ms: Option<u64>,

    /// Same threshold in fractional seconds, e.g. 0.1
    #[arg(long)]
    threshold_secs: Option<f64>,

    /// Short stop hold range in ms, e.g. 20-40
    #[arg(short, long)]
    emergency: Option<HoldRange>,

    /// Long stop hold range in ms, e.g. 60-90
    #[arg(short, long)]
    long: Option<HoldRange>,

    /// Counter diagonal combos with both opposite keys
    #[arg(long)]
    combo_reverse: bool,

    /// Delay the stop after the last release and cancel it on a new press (ms)
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Key simulation backend
    #[arg(short, long, value_enum)]
    backend: Option<Backend>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> Result<Config, AutoStopError> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(ms) = self.threshold_ms {
            config = config.with_threshold_ms(ms);
        }
        if let Some(secs) = self.threshold_secs {
            config = config.with_threshold_secs(secs);
        }
        if let Some(range) = self.emergency {
            config = config.with_emergency_hold(range);
        }
        if let Some(range) = self.long {
            config = config.with_long_hold(range);
        }
        if self.combo_reverse {
            config = config.with_combo_reverse(true);
        }
        if let Some(ms) = self.debounce_ms {
            config = config.with_release_debounce_ms(ms);
        }
        if let Some(backend) = self.backend {
            config = config.with_backend(backend);
        }
        if self.verbose {
            config = config.with_verbose(true);
        }
        Ok(config)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let cli_verbose = cli.verbose;
    let config = cli.into_config();
    let verbose = config.as_ref().map_or(cli_verbose, |c| c.verbose);

    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .compact()
        .init();

    match config.and_then(run) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: Config) -> Result<(), AutoStopError> {
    info!("AutoStop starting...");

    let engine_config = config.engine_config()?;
    info!(
        "Config: threshold={}ms, short={}-{}ms, long={}-{}ms, combo_reverse={}, backend={:?}",
        engine_config.policy.press_threshold.as_millis(),
        config.emergency_hold.min_ms,
        config.emergency_hold.max_ms,
        config.long_hold.min_ms,
        config.long_hold.max_ms,
        config.combo_reverse,
        config.backend
    );

    // Set up Ctrl+C handler for graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    ctrlc::set_handler(move || {
        info!("Shutdown signal received");
        running_clone.store(false, Ordering::SeqCst);
    })
    .map_err(|e| AutoStopError::InputAccess(format!("Failed to set Ctrl+C handler: {}", e)))?;

    let injector: Arc<dyn KeyInjector> = match config.backend {
        Backend::Rdev => Arc::new(RdevInjector::new()),
        Backend::Ydotool => Arc::new(YdotoolInjector::new()?),
    };
    info!("Input simulator ready");

    let (observer, events) = create_event_channel();
    let mut controller = Controller::new(Arc::new(RdevHook::new()), injector, Arc::new(observer));
    controller.configure(engine_config)?;
    controller.start()?;

    info!("Listening for W/A/S/D releases");
    info!("Press Ctrl+C to exit");

    // Main event loop
    while running.load(Ordering::SeqCst) {
        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => info!("{}", event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Engine event channel disconnected");
                break;
            }
        }
    }

    info!("AutoStop shutting down...");
    controller.stop();
    for event in events.try_iter() {
        info!("{}", event);
    }

    Ok(())
}
