//! Binary entrypoint for the dragtap daemon.
//!
//! Parses CLI flags into the initial settings snapshot, checks permissions,
//! starts the engine, and runs until interrupted. The persistent settings
//! store and the menu/preferences surface live outside this process; flags
//! are the only configuration input here.
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use dragtap_engine::{DeviceFilter, Engine, SettingsSnapshot, StopMode};
use logging as logshared;
use tracing::{error, info};

/// CLI mirror of [`StopMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StopArg {
    /// A further tap while dragging drops immediately.
    TapAgain,
    /// The drag drops after the finger has been lifted for the delay.
    DelayOnLift,
}

impl From<StopArg> for StopMode {
    fn from(arg: StopArg) -> Self {
        match arg {
            StopArg::TapAgain => Self::TapAgain,
            StopArg::DelayOnLift => Self::DelayOnLift,
        }
    }
}

/// CLI mirror of [`DeviceFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FilterArg {
    /// Treat every pointer event as eligible.
    Any,
    /// Only trackpad-originated events start gestures.
    TrackpadOnly,
}

impl From<FilterArg> for DeviceFilter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::Any => Self::Any,
            FilterArg::TrackpadOnly => Self::TrackpadOnly,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "dragtap", about = "Double-tap-to-drag for macOS trackpads", version)]
/// Command-line interface for the `dragtap` binary.
struct Cli {
    /// Optional subcommand.
    #[command(subcommand)]
    command: Option<Command>,

    /// Double-tap confirmation window in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 300)]
    window_ms: u64,

    /// Finger-lift release delay in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 250)]
    lift_ms: u64,

    /// How an active drag is ended
    #[arg(long, value_enum, default_value_t = StopArg::DelayOnLift)]
    stop_mode: StopArg,

    /// Which devices may start a gesture
    #[arg(long, value_enum, default_value_t = FilterArg::TrackpadOnly)]
    device_filter: FilterArg,

    /// Start with gesture processing disabled
    #[arg(long)]
    disabled: bool,

    /// Logging controls
    #[command(flatten)]
    log: logshared::LogArgs,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Print permission status and exit
    Status,
}

impl Cli {
    /// Initial settings derived from the flags. Out-of-range values are
    /// clamped by the settings layer.
    fn initial_settings(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            enabled: !self.disabled,
            double_tap_window: self.window_ms as f64 / 1000.0,
            lift_delay: self.lift_ms as f64 / 1000.0,
            stop_mode: self.stop_mode.into(),
            device_filter: self.device_filter.into(),
        }
    }
}

/// Print the permission preflight in a readable form.
fn print_status() {
    let status = permissions::check_permissions();
    println!(
        "accessibility:    {}",
        if status.accessibility_ok { "ok" } else { "missing" }
    );
    println!(
        "input monitoring: {}",
        if status.input_ok { "ok" } else { "missing" }
    );
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logshared::init(&cli.log);

    if let Some(Command::Status) = cli.command {
        print_status();
        return;
    }

    let status = permissions::check_permissions();
    if !status.input_ok {
        eprintln!(
            "dragtap needs the Input Monitoring permission. Grant it in \
             System Settings > Privacy & Security, then start dragtap again."
        );
        process::exit(1);
    }
    if !status.accessibility_ok {
        eprintln!(
            "dragtap needs the Accessibility permission to inject drag \
             events. Grant it in System Settings > Privacy & Security, then \
             start dragtap again."
        );
        process::exit(1);
    }

    let engine = Engine::new(cli.initial_settings());
    if let Err(e) = engine.start() {
        error!(error = %e, "engine_start_failed");
        if e.is_permission_denied() {
            eprintln!(
                "failed to start: {e}. Grant the permission in System \
                 Settings, then start dragtap again."
            );
        } else {
            eprintln!("failed to start: {e}");
        }
        process::exit(1);
    }
    info!("dragtap_running");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "signal_wait_failed");
    }

    info!("shutting_down");
    engine.stop();
}
