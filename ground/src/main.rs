//! Ground control station: the host-side counterpart to the aircraft's
//! radio nodes. Owns a direct and a relay radio link, runs the ground-side
//! failover state machine between them, and exposes an interactive command
//! loop for the operator.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use aerolink_ground::station::GroundStation;
use aerolink_shared::config::Config;
use aerolink_shared::time::Millis;
use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Ground control station for the aerolink telemetry link.
#[derive(Debug, Parser)]
#[command(name = "ground-station", version, about)]
struct Cli {
    /// Path to a TOML configuration file, layered over the built-in
    /// defaults and under `AEROLINK_*` environment overrides.
    #[arg(long, value_name = "FILE")]
    config: Option<std::path::PathBuf>,

    /// Direct-link radio frequency in Hz.
    #[arg(long, default_value_t = 915_000_000)]
    direct_freq_hz: u32,

    /// Relay-link radio frequency in Hz.
    #[arg(long, default_value_t = 433_000_000)]
    relay_freq_hz: u32,

    /// Tracing verbosity (`error`, `warn`, `info`, `debug`, `trace`).
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Loads [`Config`] by layering built-in defaults, an optional TOML file,
/// and `AEROLINK_*` environment variables, in that order of increasing
/// precedence.
fn load_config(cli: &Cli) -> Result<Config> {
    let defaults = Config::default();
    let mut builder = config::Config::builder()
        .add_source(config::Config::try_from(&defaults).context("serialising default config")?);

    if let Some(path) = &cli.config {
        builder = builder.add_source(config::File::from(path.clone()));
    }

    builder = builder.add_source(config::Environment::with_prefix("AEROLINK").separator("__"));

    let layered: Config = builder
        .build()
        .context("loading layered configuration")?
        .try_deserialize()
        .context("deserialising configuration")?;

    layered.validate().context("validating configuration")?;
    Ok(layered)
}

fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn now(boot: Instant) -> Millis {
    Millis::new(u64::try_from(boot.elapsed().as_millis()).unwrap_or(u64::MAX))
}

/// Interactive commands the operator can issue against the running link.
enum OperatorCommand {
    Status,
    Dump,
    Clear,
    Quit,
    Unknown(String),
}

impl From<&str> for OperatorCommand {
    fn from(line: &str) -> Self {
        match line.trim().to_ascii_lowercase().as_str() {
            "status" => Self::Status,
            "dump" => Self::Dump,
            "clear" => Self::Clear,
            "quit" | "exit" => Self::Quit,
            other => Self::Unknown(other.to_string()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = load_config(&cli)?;
    info!(role = ?config.role, "starting ground station");

    let station = Arc::new(Mutex::new(
        GroundStation::new(&config, cli.direct_freq_hz, cli.relay_freq_hz)
            .context("initialising ground radios")?,
    ));

    let boot = Instant::now();
    let link_station = Arc::clone(&station);
    let link_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_millis(10));
        let mut buf = [0u8; 256];
        loop {
            interval.tick().await;
            let t = now(boot);
            let mut guard = link_station.lock().expect("link state mutex poisoned");
            if let Some(len) = guard.tick(t, &mut buf) {
                info!(bytes = len, "telemetry received");
            }
        }
    });

    run_command_loop(Arc::clone(&station)).await;
    link_task.abort();
    Ok(())
}

/// Reads operator commands from stdin until `quit`/`exit` or EOF.
async fn run_command_loop(station: Arc<Mutex<GroundStation>>) {
    println!("aerolink ground station ready. commands: status, dump, clear, quit");
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        print!("> ");
        use std::io::Write as _;
        let _ = std::io::stdout().flush();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!(%err, "reading operator command");
                continue;
            }
        };

        match OperatorCommand::from(line.as_str()) {
            OperatorCommand::Status => {
                let guard = station.lock().expect("link state mutex poisoned");
                println!("mode={:?} duplicates_dropped={}", guard.mode(), guard.duplicates_dropped());
            }
            OperatorCommand::Dump => {
                println!("event log is streamed through the tracing subscriber; see log output above");
            }
            OperatorCommand::Clear => {
                println!("nothing buffered locally to clear; ground-side events are not retained beyond the log stream");
            }
            OperatorCommand::Quit => {
                println!("shutting down");
                break;
            }
            OperatorCommand::Unknown(other) => {
                println!("unrecognised command: {other}");
            }
        }
    }
}
