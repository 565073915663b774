use clap::{Args, Parser, Subcommand};
use hub_test_harness::config::{Config, ConfigLoader};
use hub_test_harness::mqtt::{self, MqttSession};
use hub_test_harness::port::available_ports;
use hub_test_harness::{catalog, logging, DeviceLink, HarnessError, HarnessResult, Runner, TestCase};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "hub-test",
    version,
    about = "Runs the hub firmware's on-device tests over serial and MQTT.",
    long_about = "Triggers the test routines built into the hub firmware over its serial console, \
plays the broker side of the MQTT echo test, and reports each routine's TEST RESULT code."
)]
struct Cli {
    /// Config file (JSON, TOML or the legacy flat JSON layout).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "hub_test_harness=trace". RUST_LOG wins if set.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Print results as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run test routines on the hub (all of them when none are named).
    Run(RunArgs),
    /// List the routines the firmware exports.
    List,
    /// List serial ports found on this machine.
    Ports,
    /// Print messages published on a topic filter.
    Monitor(MonitorArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Routine slug, name or numeric id.
    selectors: Vec<String>,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Args, Debug)]
struct MonitorArgs {
    /// Topic filter; defaults to topics.monitor.
    #[arg(short, long)]
    topic: Option<String>,

    /// Seconds to listen; defaults to timing.monitor_secs.
    #[arg(short, long)]
    duration: Option<u64>,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Args, Debug, Default)]
struct Overrides {
    /// Serial port or alias.
    #[arg(short, long)]
    port: Option<String>,

    #[arg(short, long)]
    baud: Option<u32>,

    #[arg(long)]
    broker_host: Option<String>,

    #[arg(long)]
    broker_port: Option<u16>,
}

impl Overrides {
    fn apply(&self, config: &mut Config) {
        if let Some(port) = &self.port {
            config.serial.port = Some(port.clone());
        }
        if let Some(baud) = self.baud {
            config.serial.baud = baud;
        }
        if let Some(host) = &self.broker_host {
            config.broker.host = host.clone();
        }
        if let Some(port) = self.broker_port {
            config.broker.port = port;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("hub-test: {e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(&config.logging, cli.log_level.as_deref());

    let result = tokio::select! {
        result = dispatch(&cli, config) => result,
        _ = shutdown_signal() => {
            warn!("Interrupted");
            Ok(false)
        }
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> HarnessResult<Config> {
    let loader = match &cli.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    let mut config = loader.into_config();

    let overrides = match &cli.command {
        Command::Run(args) => Some(&args.overrides),
        Command::Monitor(args) => Some(&args.overrides),
        Command::List | Command::Ports => None,
    };
    if let Some(overrides) = overrides {
        overrides.apply(&mut config);
        config.validate()?;
    }
    Ok(config)
}

/// Returns whether the command succeeded.
async fn dispatch(cli: &Cli, config: Config) -> HarnessResult<bool> {
    match &cli.command {
        Command::Run(args) => run(config, &args.selectors, cli.json).await,
        Command::List => {
            list(cli.json)?;
            Ok(true)
        }
        Command::Ports => {
            ports(cli.json)?;
            Ok(true)
        }
        Command::Monitor(args) => {
            monitor(config, args, cli.json).await?;
            Ok(true)
        }
    }
}

fn select_cases(selectors: &[String]) -> HarnessResult<Vec<&'static TestCase>> {
    if selectors.is_empty() {
        return Ok(catalog::catalog().iter().collect());
    }
    selectors
        .iter()
        .map(|s| catalog::find(s).ok_or_else(|| HarnessError::UnknownTest(s.clone())))
        .collect()
}

async fn run(config: Config, selectors: &[String], json: bool) -> HarnessResult<bool> {
    let cases = select_cases(selectors)?;

    let link = DeviceLink::open(&config.serial)?;
    let session = if cases.iter().any(|case| case.needs_mqtt()) {
        Some(MqttSession::connect(&config.broker, &config.timing).await?)
    } else {
        None
    };

    let mut runner = Runner::new(config, link, session);
    runner.settle().await;
    let report = runner.run(&cases).await;
    if let Err(e) = runner.shutdown().await {
        warn!("Failed to close broker session: {}", e);
    }
    let report = report?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report).map_err(std::io::Error::from)?);
    } else {
        println!("{report}");
    }
    info!(
        passed = report.cases.len() - report.failed_count(),
        failed = report.failed_count(),
        "Run complete"
    );
    Ok(report.passed())
}

fn list(json: bool) -> HarnessResult<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(catalog::catalog()).map_err(std::io::Error::from)?
        );
    } else {
        for case in catalog::catalog() {
            println!("{case}");
        }
    }
    Ok(())
}

fn ports(json: bool) -> HarnessResult<()> {
    let ports = available_ports()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&ports).map_err(std::io::Error::from)?);
    } else if ports.is_empty() {
        println!("No serial ports found");
    } else {
        for port in &ports {
            println!("{port}");
        }
    }
    Ok(())
}

async fn monitor(config: Config, args: &MonitorArgs, json: bool) -> HarnessResult<()> {
    let filter = args.topic.clone().unwrap_or_else(|| config.topics.monitor.clone());
    let duration = args
        .duration
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.timing.monitor_duration());

    let mut session = MqttSession::connect(&config.broker, &config.timing).await?;
    let seen = mqtt::monitor(&mut session, &filter, duration, |msg| {
        if json {
            match serde_json::to_string(&msg) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!("Failed to encode message: {}", e),
            }
        } else {
            println!("{msg}");
        }
    })
    .await;
    session.disconnect().await?;

    seen.map(|_| ())
}

// --- Graceful Shutdown Handler ---
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
