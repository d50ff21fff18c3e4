//! Change-triggered and scheduled reactors over a shared document store.
//!
//! - [`domain`]: reactors, scheduled jobs and the ports they depend on
//! - [`inbound`]: change-feed routing and the job scheduler
//! - [`outbound`]: the in-memory document store and push gateways
//! - [`settings`] and [`wiring`]: runtime configuration and assembly

pub mod domain;
pub mod inbound;
pub mod outbound;
pub mod settings;
pub mod wiring;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
