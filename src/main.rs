//! # rfspy-probe
//!
//! Connects to an rfcat-compatible dongle and prints what it reports about
//! itself: firmware build, radio configuration page and current frequency.

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use rfspy::config::{Config, LoggingConfig};
use rfspy::error::RfspyError;
use rfspy::radio::regs::CONFIG_PAGE;
use rfspy::rpc::client::{nicebits, RpcClient};
use rfspy::usb::{connect, UsbTransport};

/// Log file name prefix inside `logging.directory`
const LOG_FILE_PREFIX: &str = "rfspy-probe.log";

/// Set up console logging and, when a directory is configured, a daily log file
///
/// `RUST_LOG` overrides the configured level. The returned guard must be held
/// until exit so buffered file output is flushed.
fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let (file_layer, guard) = match &logging.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    guard
}

fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path).with_context(|| format!("loading {}", path))?,
        None => Config::default(),
    };

    let _guard = init_logging(&config.logging);
    info!("rfspy-probe v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut client = connect(&config).context("opening dongle")?;
    println!("{}", client.transport());

    match probe(&mut client) {
        Ok(()) => {
            client.into_inner().close(false)?;
            Ok(())
        }
        Err(err) => {
            // a device that failed a transfer gets reset on the way out
            let force_reset = matches!(err, RfspyError::Transport(_));
            if let Err(e) = client.into_inner().close(force_reset) {
                warn!("close after failure: {}", e);
            }
            Err(err).context("probing dongle")
        }
    }
}

/// Ping the dongle and print its build, configuration page and frequency
fn probe(client: &mut RpcClient<UsbTransport>) -> rfspy::error::Result<()> {
    if !client.ping(None)? {
        warn!("ping echo did not match");
    }

    let build = client.get_build_info()?;
    println!("Build: {}", build);

    let mut radio = client.get_radio_config()?;
    for reg in CONFIG_PAGE.iter().filter(|reg| !reg.reserved) {
        println!("  {:<10} {}", reg.name, nicebits(&radio.wire_bytes(reg)));
    }

    let hz = radio.current_frequency_hz(client)?;
    println!("Frequency: {:.3} MHz", hz / 1_000_000.0);
    Ok(())
}
