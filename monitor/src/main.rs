// lwlink-monitor -- watches a LightwaveRF Link and logs what its devices
// report, naming them from a YAML file of serial numbers.
//
// Usage:
//   lwlink-monitor
//   lwlink-monitor --verbose --names radiators.yaml
//   lwlink-monitor --hub 192.168.4.71 --stats-interval 30
//   lwlink-monitor --unpair
//
// New devices are appended to the names file with a "[New]" placeholder.

mod names;

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use lwlink::{LinkClientBuilder, commands};

use crate::names::DeviceNames;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Monitor a LightwaveRF Link and report device status and battery levels.
#[derive(Parser)]
#[command(name = "lwlink-monitor", version, about)]
struct Cli {
    /// Log at DEBUG level. RUST_LOG takes precedence when set.
    #[arg(long)]
    verbose: bool,

    /// Unpair from the Link before registering again.
    #[arg(long)]
    unpair: bool,

    /// YAML file mapping device serial numbers to names.
    #[arg(long, default_value = "config.yaml")]
    names: PathBuf,

    /// Link IP address. Commands are broadcast until the Link answers if
    /// this is not given.
    #[arg(long)]
    hub: Option<IpAddr>,

    /// Local port replies arrive on.
    #[arg(long, default_value_t = 9761)]
    listen_port: u16,

    /// Link command port.
    #[arg(long, default_value_t = 9760)]
    command_port: u16,

    /// Seconds between latency reports and name file saves.
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    stats_interval: u64,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn save(names: &mut DeviceNames) {
    if let Err(e) = names.write() {
        tracing::error!(path = %names.path().display(), error = %e, "Failed to write device names");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut names = DeviceNames::load(&cli.names)?;

    let mut builder = LinkClientBuilder::new()
        .listen_port(cli.listen_port)
        .command_port(cli.command_port);
    if let Some(ip) = cli.hub {
        builder = builder.hub_ip(ip);
    }
    let client = builder
        .build()
        .await
        .with_context(|| format!("failed to listen on port {}", cli.listen_port))?;

    // Subscribed before anything is sent so no event is missed. Sized for a
    // full radiator scan arriving while the main loop is not yet draining.
    let (_events_guard, mut events) = client.subscribe_events(128);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    if cli.unpair {
        let deregister = commands::DEREGISTER.instance()?;
        let response = client.do_legacy(deregister.text()).await?;
        tracing::info!(response = %response, "Deregister");
    }

    tokio::select! {
        registered = client.ensure_registered() => registered.context("pairing with Link failed")?,
        _ = cancel.cancelled() => {
            tracing::info!("Exiting due to signal");
            return Ok(());
        }
    }

    let hub_call = commands::HUB_CALL.instance()?;
    let response = client.do_legacy(hub_call.text()).await?;
    tracing::info!(response = %response, "@H");

    match client.query_all_radiators(&cancel).await {
        Ok(radiators) => tracing::info!(count = radiators.len(), "Radiator scan complete"),
        Err(e) => tracing::error!(error = %e, "Radiator scan failed"),
    }

    let period = Duration::from_secs(cli.stats_interval);
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    tracing::info!("Starting main loop");
    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                let name = names.seen(&event);
                tracing::info!(name = %name, event = %event, "Event");
            }
            _ = ticker.tick() => {
                tracing::info!(client = ?client, "Status");
                let stats = client.stats();
                if !stats.is_empty() {
                    tracing::info!("Latency\n{}", stats);
                }
                save(&mut names);
            }
            stopped = client.closed() => {
                save(&mut names);
                return stopped.context("Link client stopped");
            }
            _ = cancel.cancelled() => {
                tracing::info!("Exiting due to signal");
                break;
            }
        }
    }

    save(&mut names);
    client.close();
    Ok(())
}
