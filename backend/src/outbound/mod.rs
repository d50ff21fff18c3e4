//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **memory_store**: in-process document store with a change feed
//! - **push**: HTTP and log-only push gateways
//!
//! Adapters are thin translators between domain types and
//! infrastructure-specific representations. They contain no business logic.

pub mod memory_store;
pub mod push;
