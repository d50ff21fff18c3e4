//! Run one scheduled job, or issue one document number, against a JSON store
//! snapshot and write the resulting snapshot back.
//!
//! Every change the command causes is routed through the same subscriptions
//! as the service before the snapshot is written, so audit entries and
//! notifications triggered by the run land in the output.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result};
use mockable::{Clock, DefaultClock};
use ortho_config::OrthoConfig;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use reactors::domain::ports::DocumentStore;
use reactors::outbound::memory_store::{InMemoryDocumentStore, read_dump, write_dump};
use reactors::settings::ReactorSettings;
use reactors::wiring::{build_router, build_scheduler, build_sequencer, push_gateway, run_job_and_route};

/// `reactor-tick` command arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "reactor-tick",
    about = "Run reactor jobs once against a store snapshot",
    version
)]
struct CliArgs {
    /// JSON snapshot mapping document paths to fields.
    #[arg(long = "snapshot", value_name = "path")]
    snapshot: PathBuf,
    /// Where to write the resulting snapshot; defaults to `--snapshot`.
    #[arg(long = "output", value_name = "path")]
    output: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run one scheduled job once.
    Run {
        /// Job name, e.g. `task_reminders` or `notification_dispatcher`.
        job: String,
    },
    /// Issue the next document number for a document type.
    NextNumber {
        /// Document type, e.g. `invoice`.
        document_type: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let args = CliArgs::parse();
    let settings = ReactorSettings::load_from_iter([std::ffi::OsString::from("reactor-tick")])
        .wrap_err("load reactor settings")?;

    let dump = read_dump(&args.snapshot)?;
    let memory = Arc::new(InMemoryDocumentStore::from_dump(dump)?);
    let store: Arc<dyn DocumentStore> = memory.clone();
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let router = build_router(&store, &clock).wrap_err("register change subscriptions")?;
    let mut changes = memory.subscribe()?;

    match args.command {
        Command::Run { job } => {
            let gateway = push_gateway(&settings).wrap_err("configure push gateway")?;
            let scheduler = build_scheduler(&store, gateway, &clock, &settings)
                .wrap_err("register scheduled jobs")?;
            let (report, routed) = run_job_and_route(&scheduler, &router, &mut changes, &job)
                .await
                .wrap_err_with(|| format!("run job `{job}`"))?;
            info!(
                job,
                examined = report.examined,
                written = report.written,
                failed = report.failed,
                reactors = routed.invoked,
                "job finished"
            );
        }
        Command::NextNumber { document_type } => {
            let number = build_sequencer(&store, &clock, &settings)
                .next_number(&document_type)
                .await
                .wrap_err_with(|| format!("issue number for `{document_type}`"))?;
            router.drain(&mut changes).await;
            info!(document_type, number, "document number issued");
        }
    }

    let output = args.output.unwrap_or(args.snapshot);
    write_dump(&output, &memory.dump()?)?;
    info!(path = %output.display(), "snapshot written");
    Ok(())
}
