//! Domain ports and supporting types for the hexagonal boundary.
//!
//! Ports describe how reactors expect to interact with driven adapters (the
//! document store and the push gateway). Each trait exposes strongly typed
//! errors so adapters map their failures into predictable variants.

mod macros;
pub(crate) use macros::define_port_error;

mod document_store;
mod push_gateway;

#[cfg(test)]
pub use document_store::MockDocumentStore;
pub use document_store::{
    DocumentQuery, DocumentStore, DocumentStoreError, FieldFilter, FilterOp, WriteBatch, WriteOp,
};
#[cfg(test)]
pub use push_gateway::MockPushGateway;
pub use push_gateway::{PushContent, PushGateway, PushGatewayError, PushMessage};
