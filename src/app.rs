//! Core application runner for `ble-receptor`.
//!
//! This module is decoupled from CLI parsing and process exit codes so it can
//! be tested deterministically with an injected scanner and output streams.

use crate::address::DeviceAddress;
use crate::decoder::{self, DEFAULT_VENDOR_ID, RejectReason};
use crate::event::ScanEvent;
use crate::output::{OutputFormat, OutputFormatter};
use crate::registry::{DeviceRegistry, ObservePolicy};
use crate::scanner::{Backend, ScanError};
use clap::Parser;
use std::future::Future;
use std::io;
use std::io::Write;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Configuration for the core run loop.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Company identifier whose manufacturer data carries the readings.
    /// Decimal (76) or hex (0x004C).
    #[arg(long, value_parser = decoder::parse_vendor_id, default_value_t = DEFAULT_VENDOR_ID)]
    pub vendor_id: u16,

    /// Bluetooth scanner backend to use
    #[arg(long, default_value_t, value_enum)]
    pub backend: Backend,

    /// Output format for listed devices
    #[arg(long, default_value_t, value_enum)]
    pub format: OutputFormat,

    /// The name of the measurement in InfluxDB line protocol.
    #[arg(long, default_value = "ble_device")]
    pub influxdb_measurement: String,

    /// Address of the device to show in detail when the scan ends or is interrupted.
    /// Format: --select AA:BB:CC:DD:EE:FF
    #[arg(long, value_name = "ADDRESS")]
    pub select: Option<DeviceAddress>,

    /// Stop scanning after this long.
    /// Accepts duration with suffix: 3s, 1m, 500ms, 2h.
    /// Without suffix, value is interpreted as seconds.
    #[arg(long, value_parser = crate::duration::parse_duration)]
    pub scan_duration: Option<Duration>,

    /// Update known devices with their latest reading instead of keeping the first
    #[arg(long)]
    pub refresh: bool,

    /// Verbose output, print rejected payloads from matching vendors
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Scanner abstraction to enable deterministic unit tests without Bluetooth hardware.
pub trait Scanner: Send + Sync {
    fn start_scan(
        &self,
        backend: Backend,
    ) -> Pin<Box<dyn Future<Output = Result<mpsc::Receiver<ScanEvent>, ScanError>> + Send + '_>>;
}

/// Real scanner implementation that delegates to the compiled-in backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealScanner;

impl Scanner for RealScanner {
    fn start_scan(
        &self,
        backend: Backend,
    ) -> Pin<Box<dyn Future<Output = Result<mpsc::Receiver<ScanEvent>, ScanError>> + Send + '_>>
    {
        Box::pin(async move { crate::scanner::start_scan(backend).await })
    }
}

/// Decode one event and fold it into the registry.
///
/// Writes a line to `out` when a device is listed for the first time, or, under
/// the latest-wins policy, whenever a known device reports again.
fn handle_event(
    event: &ScanEvent,
    options: &Options,
    registry: &mut DeviceRegistry,
    formatter: &dyn OutputFormatter,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> io::Result<()> {
    let reading = match decoder::decode(event, options.vendor_id) {
        Ok(reading) => reading,
        Err(RejectReason::NoVendorPayload(_)) => return Ok(()),
        Err(reason @ RejectReason::PayloadTooShort { .. }) => {
            if options.verbose {
                writeln!(err, "{}: {reason}", event.address)?;
            }
            return Ok(());
        }
    };

    let address = reading.address;
    let inserted = registry.observe(reading);
    if (inserted || registry.policy() == ObservePolicy::LatestWins)
        && let Some(record) = registry.get(&address)
    {
        writeln!(out, "{}", formatter.format(record))?;
    }
    Ok(())
}

/// Run the core processing loop until the scan ends or Ctrl-C is pressed.
///
/// See [`run_until`]; the shutdown signal here is `SIGINT`.
pub async fn run_with_io(
    options: Options,
    scanner: &dyn Scanner,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<DeviceRegistry, RunError> {
    let interrupted = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };
    run_until(options, scanner, out, err, interrupted).await
}

/// Run the core processing loop, writing listed devices to `out` and verbose
/// rejections to `err`.
///
/// Events are consumed one at a time from a single channel, which is what
/// keeps the registry single-writer. The loop ends when the scanner closes
/// the channel, `options.scan_duration` elapses or `shutdown` completes.
/// Afterwards the device given by `options.select`, if it was seen, is
/// written in detail.
///
/// Returns the final registry.
pub async fn run_until(
    options: Options,
    scanner: &dyn Scanner,
    out: &mut dyn Write,
    err: &mut dyn Write,
    shutdown: impl Future<Output = ()>,
) -> Result<DeviceRegistry, RunError> {
    let formatter = options.format.formatter(&options.influxdb_measurement);
    let policy = if options.refresh {
        ObservePolicy::LatestWins
    } else {
        ObservePolicy::FirstWins
    };
    let mut registry = DeviceRegistry::with_policy(policy);

    let mut events = scanner.start_scan(options.backend).await?;
    let deadline = async {
        match options.scan_duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline, shutdown);

    loop {
        let event = tokio::select! {
            next = events.recv() => match next {
                Some(event) => event,
                None => {
                    log::info!("scan event stream closed");
                    break;
                }
            },
            _ = &mut deadline => {
                log::info!("scan duration elapsed");
                break;
            }
            _ = &mut shutdown => {
                log::info!("scan interrupted");
                break;
            }
        };

        handle_event(
            &event,
            &options,
            &mut registry,
            formatter.as_ref(),
            out,
            err,
        )?;
    }

    log::info!("{} device(s) listed", registry.len());

    if let Some(address) = options.select {
        match registry.select(&address) {
            Some(record) => writeln!(out, "{}", formatter.format_selected(record))?,
            None => log::warn!("selected device {address} was not seen"),
        }
    }

    Ok(registry)
}
