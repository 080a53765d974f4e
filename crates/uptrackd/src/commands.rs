//! Subcommand handlers.
//!
//! redb locks the database file for as long as it is open, and only one
//! process can hold it. Every command therefore opens the store just for
//! its own work and waits up to `[storage] lock_wait` for the lock. The
//! monitor started by `run` releases the file between sweeps and while
//! probes are in flight, so `add`, `list`, `show`, `history` and `remove`
//! keep working next to a running daemon.

use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{DateTime, SecondsFormat, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info};

use uptrack_core::{Endpoint, EndpointId, EndpointUpdated, UptrackConfig};
use uptrack_health::{AnyProber, StoreAccess, TracingPublisher, UptimeMonitor};
use uptrack_state::StateStore;

fn ensure_data_dir(config: &UptrackConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.storage.data_dir).with_context(|| {
        format!("creating data dir {}", config.storage.data_dir.display())
    })
}

/// Open (creating if needed) the store under the configured data directory.
fn open_store(config: &UptrackConfig) -> anyhow::Result<StateStore> {
    ensure_data_dir(config)?;
    let path = config.database_path();
    let store = StateStore::open_waiting(&path, config.storage_lock_wait()?)
        .with_context(|| format!("opening {}", path.display()))?;
    debug!(path = ?path, "state store opened");
    Ok(store)
}

fn build_monitor(config: &UptrackConfig) -> anyhow::Result<UptimeMonitor<AnyProber>> {
    ensure_data_dir(config)?;
    let store = StoreAccess::OnDemand {
        path: config.database_path(),
        lock_wait: config.storage_lock_wait()?,
    };
    let prober = AnyProber::from_config(&config.probe, config.probe_timeout()?);
    Ok(UptimeMonitor::new(store, prober, Arc::new(TracingPublisher))
        .with_concurrency(config.monitor.concurrency))
}

pub async fn run(config: &UptrackConfig) -> anyhow::Result<()> {
    let interval = config.monitor_interval()?;
    let monitor = build_monitor(config)?;
    info!(kind = ?config.probe.kind, "uptrack daemon starting");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => error!(error = %e, "failed to listen for Ctrl-C"),
        }
        let _ = shutdown_tx.send(true);
    });

    monitor.run(interval, shutdown_rx).await;

    info!("uptrack daemon stopped");
    Ok(())
}

pub async fn sweep(config: &UptrackConfig) -> anyhow::Result<()> {
    let summary = build_monitor(config)?.sweep().await?;
    println!(
        "probed {} endpoint(s): {} up, {} down, {} skipped, {} failed",
        summary.probed, summary.up, summary.down, summary.skipped, summary.failed
    );
    Ok(())
}

pub fn add(config: &UptrackConfig, owner: &str, url: &str, name: &str) -> anyhow::Result<()> {
    let endpoint = Endpoint::create(owner, url, name)?;
    open_store(config)?.save_endpoint(&endpoint)?;
    println!("{}", endpoint.id());
    Ok(())
}

pub fn list(config: &UptrackConfig) -> anyhow::Result<()> {
    let now = Utc::now();
    for endpoint in open_store(config)?.list_endpoints()? {
        println!("{}", endpoint_line(&endpoint, now));
    }
    Ok(())
}

pub fn show(config: &UptrackConfig, raw_id: &str) -> anyhow::Result<()> {
    let endpoint = find(&open_store(config)?, raw_id)?;
    println!("{}", serde_json::to_string_pretty(&endpoint)?);
    Ok(())
}

pub fn history(config: &UptrackConfig, raw_id: &str, limit: usize) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let endpoint = find(&store, raw_id)?;
    for check in store.list_health_checks(endpoint.id(), limit)? {
        println!("{}", check_line(&check));
    }
    Ok(())
}

pub fn remove(config: &UptrackConfig, raw_id: &str) -> anyhow::Result<()> {
    let id = EndpointId::parse(raw_id)?;
    if !open_store(config)?.delete_endpoint(&id)? {
        bail!("no endpoint with id {id}");
    }
    println!("✓ removed {id}");
    Ok(())
}

fn find(store: &StateStore, raw_id: &str) -> anyhow::Result<Endpoint> {
    let id = EndpointId::parse(raw_id)?;
    match store.find_endpoint(&id)? {
        Some(endpoint) => Ok(endpoint),
        None => bail!("no endpoint with id {id}"),
    }
}

// ── Output ─────────────────────────────────────────────────────────

/// `id  name  url  state  availability%`
fn endpoint_line(endpoint: &Endpoint, now: DateTime<Utc>) -> String {
    let state = if endpoint.first_health_check_at().is_none() {
        "unchecked"
    } else if endpoint.is_down() {
        "down"
    } else {
        "up"
    };
    format!(
        "{}  {}  {}  {}  {:.4}%",
        endpoint.id(),
        endpoint.name(),
        endpoint.url(),
        state,
        endpoint.availability_at(now)
    )
}

fn check_line(check: &EndpointUpdated) -> String {
    let at = check.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true);
    match check.latency_ms {
        Some(ms) if check.succeeded => format!("{at}  up    {ms:.1} ms"),
        _ => format!("{at}  down"),
    }
}
