//! Routes change-feed events to the change reactors subscribed to them.
//!
//! Each subscription binds a [`PathPattern`] and a set of change kinds to one
//! named reactor. Every matching reactor runs independently: a failure is
//! logged and never prevents the remaining reactors from seeing the change.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use super::path_pattern::{PathPattern, PathPatternError};
use crate::domain::{ChangeKind, ChangeReactor, DocumentChange};

/// Creates, updates and deletes.
pub const ALL_CHANGES: &[ChangeKind] = &[ChangeKind::Create, ChangeKind::Update, ChangeKind::Delete];

struct Subscription {
    pattern: PathPattern,
    kinds: Vec<ChangeKind>,
    reactor: Arc<dyn ChangeReactor>,
}

/// Outcome of routing one change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Reactors whose subscription matched.
    pub invoked: usize,
    /// Matched reactors that returned an error.
    pub failed: usize,
}

/// Registry of change subscriptions.
#[derive(Default)]
pub struct TriggerRouter {
    subscriptions: Vec<Subscription>,
}

impl TriggerRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `reactor` to writes matching `pattern` and one of `kinds`.
    pub fn subscribe(
        &mut self,
        pattern: &str,
        kinds: &[ChangeKind],
        reactor: Arc<dyn ChangeReactor>,
    ) -> Result<&mut Self, PathPatternError> {
        let parsed: PathPattern = pattern.parse()?;
        debug!(pattern = %parsed, reactor = reactor.name(), "subscription registered");
        self.subscriptions.push(Subscription {
            pattern: parsed,
            kinds: kinds.to_vec(),
            reactor,
        });
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Names of the reactors subscribed to `change`, in registration order.
    pub fn matching(&self, change: &DocumentChange) -> Vec<&'static str> {
        self.matching_subscriptions(change)
            .map(|subscription| subscription.reactor.name())
            .collect()
    }

    fn matching_subscriptions<'a>(
        &'a self,
        change: &'a DocumentChange,
    ) -> impl Iterator<Item = &'a Subscription> + 'a {
        let kind = change.kind();
        self.subscriptions.iter().filter(move |subscription| {
            subscription.kinds.contains(&kind) && subscription.pattern.matches(change.path()).is_some()
        })
    }

    /// Invoke every reactor subscribed to `change`.
    pub async fn dispatch(&self, change: &DocumentChange) -> DispatchReport {
        let mut report = DispatchReport::default();
        for subscription in self.matching_subscriptions(change) {
            report.invoked += 1;
            let reactor = subscription.reactor.name();
            match subscription.reactor.react(change).await {
                Ok(reaction) => {
                    debug!(reactor, path = %change.path(), writes = reaction.writes, "reactor finished");
                }
                Err(err) => {
                    report.failed += 1;
                    error!(reactor, path = %change.path(), error = %err, "reactor failed");
                }
            }
        }
        report
    }

    /// Dispatch every change already queued on `changes`.
    ///
    /// Changes the reactors cause while draining are queued on the same feed
    /// and dispatched before this returns.
    pub async fn drain(&self, changes: &mut mpsc::UnboundedReceiver<DocumentChange>) -> DispatchReport {
        let mut report = DispatchReport::default();
        while let Ok(change) = changes.try_recv() {
            let outcome = self.dispatch(&change).await;
            report.invoked += outcome.invoked;
            report.failed += outcome.failed;
        }
        report
    }

    /// Consume the change feed until it closes or `shutdown` flips to `true`.
    pub async fn run(
        &self,
        mut changes: mpsc::UnboundedReceiver<DocumentChange>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(subscriptions = self.len(), "trigger router started");
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                received = changes.recv() => match received {
                    Some(change) => {
                        self.dispatch(&change).await;
                    }
                    None => break,
                },
            }
        }
        info!("trigger router stopped");
    }
}
