//! Reactor service entry-point: routes store changes and runs scheduled jobs
//! until interrupted.

use std::sync::Arc;

use color_eyre::eyre::{Context, Result};
use mockable::{Clock, DefaultClock};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use ortho_config::OrthoConfig;
use reactors::domain::ports::DocumentStore;
use reactors::outbound::memory_store::{InMemoryDocumentStore, read_dump};
use reactors::settings::ReactorSettings;
use reactors::wiring::{build_router, build_scheduler, push_gateway};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let settings = ReactorSettings::load_from_iter(std::env::args_os())
        .wrap_err("load reactor settings")?;
    let memory = Arc::new(load_store(&settings)?);
    let store: Arc<dyn DocumentStore> = memory.clone();
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);

    let gateway = push_gateway(&settings).wrap_err("configure push gateway")?;
    let router = build_router(&store, &clock).wrap_err("register change subscriptions")?;
    let scheduler =
        build_scheduler(&store, gateway, &clock, &settings).wrap_err("register scheduled jobs")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let changes = memory.subscribe()?;
    let jobs = scheduler.spawn(&shutdown_rx);
    let routing = tokio::spawn(async move { router.run(changes, shutdown_rx).await });
    info!(jobs = ?scheduler.job_names(), "reactors running");

    tokio::signal::ctrl_c().await.wrap_err("wait for ctrl-c")?;
    info!("shutdown requested");
    shutdown_tx.send_replace(true);

    for handle in jobs {
        if let Err(error) = handle.await {
            warn!(error = %error, "scheduled job task ended abnormally");
        }
    }
    routing.await.wrap_err("join trigger router")?;
    Ok(())
}

fn load_store(settings: &ReactorSettings) -> Result<InMemoryDocumentStore> {
    let Some(path) = &settings.snapshot_path else {
        return Ok(InMemoryDocumentStore::new());
    };
    let dump = read_dump(path)?;
    info!(path = %path.display(), documents = dump.len(), "store snapshot loaded");
    Ok(InMemoryDocumentStore::from_dump(dump)?)
}
