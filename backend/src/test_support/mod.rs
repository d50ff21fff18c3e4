//! Test utilities for the reactors crate.
//!
//! Shared by unit tests (in `src/`) and integration tests (in `tests/`,
//! through the `test-support` feature).

mod clock;
mod faulty_store;
mod push;

pub use clock::MutableClock;
pub use faulty_store::FaultyStore;
pub use push::RecordingPushGateway;
