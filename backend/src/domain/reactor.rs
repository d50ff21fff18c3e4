//! Handler contracts shared by every reactor.
//!
//! Change reactors receive one observed write; scheduled jobs run one tick.
//! Neither kind calls another: they interact only through store writes, which
//! the trigger router may feed back to other change reactors.

use async_trait::async_trait;

use super::document::DocumentChange;
use super::schedule::Cadence;
use super::Error;

/// Summary of one scheduled tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Documents read and evaluated.
    pub examined: usize,
    /// Documents written, created or deleted.
    pub written: usize,
    /// Items that failed and were skipped.
    pub failed: usize,
}

/// Writes issued while reacting to one change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reaction {
    pub writes: usize,
}

impl Reaction {
    /// A reaction that wrote nothing.
    pub const fn skipped() -> Self {
        Self { writes: 0 }
    }

    pub const fn wrote(writes: usize) -> Self {
        Self { writes }
    }
}

/// Handler invoked for each matching document write.
///
/// Implementations must tolerate duplicate and out-of-order delivery.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChangeReactor: Send + Sync {
    /// Stable handler name used in logs.
    fn name(&self) -> &'static str;

    /// React to one observed write.
    async fn react(&self, change: &DocumentChange) -> Result<Reaction, Error>;
}

/// Job run by the scheduler on a fixed cadence.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    /// Stable job name used in logs and by `reactor-tick`.
    fn name(&self) -> &'static str;

    fn cadence(&self) -> Cadence;

    /// Run one tick to completion.
    async fn run_tick(&self) -> Result<TickReport, Error>;
}
