use clap::Parser;
use load_location::config::{ConfigError, FlowConfig};
use load_location::location::desktop::DesktopPlatform;
use load_location::location::sim::{self, Scenario, SimulatedPlatform};
use load_location::location::{FetchMode, FlowEvent, FlowPhase, LocationAcquisitionFlow};
use load_location::server;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const POLL_TICK: Duration = Duration::from_millis(100);

/// Load Location — get a one-time location fix and open it in a map app
///
/// Runs the permission → provider → settings → fetch chain and prints the
/// resulting view as JSON. On the desktop, location comes from IP
/// geolocation with the last stored fix as fallback.
///
/// Examples:
///   load-location
///   load-location --mode oneshot --open
///   load-location --watch
///   load-location --offline
///   load-location --scenario denied.json
///   load-location --serve --port 3000
#[derive(Parser)]
#[command(name = "load-location", version, about, long_about = None)]
struct Cli {
    /// Fetch mode: "oneshot" (last known location, no settings check)
    /// or "continuous" (settings check, then location updates).
    #[arg(long, value_parser = parse_mode)]
    mode: Option<FetchMode>,

    /// Open the fix in the default map application.
    #[arg(long)]
    open: bool,

    /// Offline mode: only use the last stored fix.
    #[arg(long)]
    offline: bool,

    /// Keep printing continuous updates until interrupted.
    #[arg(long)]
    watch: bool,

    /// Give up if no fix arrives within this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Config file. Defaults to ~/.loadlocation/config.json.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Replay the flow against a simulated device described by a JSON scenario.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Serve the HTTP control surface over a simulated device.
    #[arg(long)]
    serve: bool,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 3000)]
    port: u16,

    /// Debug logging (RUST_LOG overrides).
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn parse_mode(s: &str) -> Result<FetchMode, String> {
    match s.to_lowercase().as_str() {
        "oneshot" | "one-shot" | "one_shot" => Ok(FetchMode::OneShot),
        "continuous" => Ok(FetchMode::Continuous),
        _ => Err(format!("Unknown mode '{}'. Use 'oneshot' or 'continuous'.", s)),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if cli.serve {
        return serve(&cli, config);
    }
    if let Some(ref path) = cli.scenario {
        return replay(path, &cli, config);
    }
    run_desktop(&cli, config)
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "load_location=debug" } else { "load_location=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn load_config(cli: &Cli) -> Result<FlowConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => FlowConfig::load_from(path)?,
        None => FlowConfig::load()?,
    };
    if let Some(mode) = cli.mode {
        config.fetch_mode = mode;
    }
    if let Some(secs) = cli.timeout_secs {
        config.set_fetch_timeout_secs(secs);
    }
    Ok(config)
}

fn load_scenario(path: &Path) -> Result<Scenario, String> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read scenario '{}': {}", path.display(), e))?;
    serde_json::from_str(&data).map_err(|e| format!("Invalid scenario '{}': {}", path.display(), e))
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error: cannot encode output: {}", e),
    }
}

// ── --serve ─────────────────────────────────────────────────────

fn serve(cli: &Cli, config: FlowConfig) -> ExitCode {
    let scenario = match &cli.scenario {
        Some(path) => match load_scenario(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => Scenario::default(),
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: cannot start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(server::start(&cli.host, cli.port, config, scenario)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

// ── --scenario ──────────────────────────────────────────────────

fn replay(path: &Path, cli: &Cli, config: FlowConfig) -> ExitCode {
    let scenario = match load_scenario(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let timeout = config.fetch_timeout();
    let mut flow = LocationAcquisitionFlow::new(SimulatedPlatform::new(scenario), config);
    flow.dispatch(FlowEvent::GetLocationPressed);
    flow.pump();

    if let Some(timeout) = timeout {
        flow.platform_mut().advance(timeout);
        flow.pump();
    }
    if cli.open {
        flow.dispatch(FlowEvent::OpenMapPressed);
    }
    flow.dispatch(FlowEvent::Stopped);

    print_json(&sim::snapshot(&flow));
    if flow.fix().is_some() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

// ── desktop ─────────────────────────────────────────────────────

fn run_desktop(cli: &Cli, config: FlowConfig) -> ExitCode {
    let mut flow = LocationAcquisitionFlow::new(DesktopPlatform::new(cli.offline), config);
    flow.dispatch(FlowEvent::GetLocationPressed);

    loop {
        flow.pump();
        match flow.phase() {
            FlowPhase::Idle => break,
            FlowPhase::Ready if !cli.watch => break,
            _ => {}
        }
        std::thread::sleep(POLL_TICK);
    }

    if cli.open {
        flow.dispatch(FlowEvent::OpenMapPressed);
    }
    flow.dispatch(FlowEvent::Stopped);

    let view = flow.view();
    print_json(&view);
    match (&view.fix, &view.last_error) {
        (Some(_), _) => ExitCode::SUCCESS,
        (None, Some(err)) => {
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
        (None, None) => ExitCode::FAILURE,
    }
}
