//! Timer-driven inbound adapter running each scheduled job on its cadence.
//!
//! Every job gets its own task. A failed tick is logged and the job waits
//! for its next fire instant; shutdown stops new ticks but never interrupts
//! a tick in progress.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mockable::Clock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::domain::{Error, ScheduledJob, TickReport};

/// Async sleeping abstraction so tests can drive the scheduler without
/// waiting on wall-clock time.
#[async_trait]
pub trait SchedulerSleeper: Send + Sync {
    /// Suspend execution for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Tokio-based sleeper implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl SchedulerSleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Registry of scheduled jobs.
pub struct Scheduler {
    jobs: Vec<Arc<dyn ScheduledJob>>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn SchedulerSleeper>,
}

impl Scheduler {
    /// Build a scheduler sleeping on the Tokio timer.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_sleeper(clock, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(clock: Arc<dyn Clock>, sleeper: Arc<dyn SchedulerSleeper>) -> Self {
        Self {
            jobs: Vec::new(),
            clock,
            sleeper,
        }
    }

    pub fn register(&mut self, job: Arc<dyn ScheduledJob>) -> &mut Self {
        self.jobs.push(job);
        self
    }

    pub fn job_names(&self) -> Vec<&'static str> {
        self.jobs.iter().map(|job| job.name()).collect()
    }

    /// Run the named job once, immediately.
    pub async fn run_once(&self, name: &str) -> Result<TickReport, Error> {
        let job = self
            .jobs
            .iter()
            .find(|job| job.name() == name)
            .ok_or_else(|| {
                Error::not_found(format!("no scheduled job named `{name}`"))
                    .with_details(serde_json::json!({ "known": self.job_names() }))
            })?;
        job.run_tick().await
    }

    /// Spawn one task per job; tasks end once `shutdown` becomes `true`.
    pub fn spawn(&self, shutdown: &watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        self.jobs
            .iter()
            .map(|job| {
                tokio::spawn(run_job(
                    Arc::clone(job),
                    Arc::clone(&self.clock),
                    Arc::clone(&self.sleeper),
                    shutdown.clone(),
                ))
            })
            .collect()
    }
}

async fn run_job(
    job: Arc<dyn ScheduledJob>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn SchedulerSleeper>,
    mut shutdown: watch::Receiver<bool>,
) {
    let cadence = job.cadence();
    info!(job = job.name(), %cadence, "scheduled job started");
    loop {
        if *shutdown.borrow() {
            break;
        }
        let now = clock.utc();
        let next = cadence.next_after(now);
        let delay = next.signed_duration_since(now).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            () = sleeper.sleep(delay) => {}
        }

        match job.run_tick().await {
            Ok(report) => info!(
                job = job.name(),
                examined = report.examined,
                written = report.written,
                failed = report.failed,
                "scheduled tick finished"
            ),
            Err(err) => error!(job = job.name(), error = %err, "scheduled tick failed"),
        }
    }
    info!(job = job.name(), "scheduled job stopped");
}
