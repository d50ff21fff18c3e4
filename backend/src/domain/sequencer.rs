//! Sequential, human-readable document numbers such as `2025-0042`.
//!
//! Counters live in `counters/{documentType}_{year}` and advance through a
//! compare-and-set on the counter document's version, so concurrent callers
//! never receive the same number.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use mockable::Clock;
use serde_json::Value;
use tracing::{debug, warn};

use super::Error;
use super::collections::COUNTERS;
use super::document::{DocumentPath, Fields, timestamp_value};
use super::mapping::map_store_error;
use super::ports::DocumentStore;

/// Sequencer retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencerConfig {
    /// Compare-and-set attempts before giving up with a conflict.
    pub max_attempts: u32,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self { max_attempts: 8 }
    }
}

/// Format a sequence number for `year`.
///
/// # Examples
/// ```
/// use reactors::domain::format_document_number;
///
/// assert_eq!(format_document_number(2025, 7), "2025-0007");
/// assert_eq!(format_document_number(2025, 12345), "2025-12345");
/// ```
pub fn format_document_number(year: i32, seq: u64) -> String {
    format!("{year}-{seq:04}")
}

/// Issues document numbers per document type and calendar year.
pub struct DocumentNumberSequencer {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    config: SequencerConfig,
}

impl DocumentNumberSequencer {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, config: SequencerConfig) -> Self {
        Self { store, clock, config }
    }

    /// Reserve the next number for `document_type` in the current year.
    ///
    /// Fails with `invalid_request` for blank types or types containing `/`,
    /// and with `conflict` once every attempt lost a race.
    pub async fn next_number(&self, document_type: &str) -> Result<String, Error> {
        let counter_type = validate_document_type(document_type)?;
        let now = self.clock.utc();
        let year = now.year();
        let path = DocumentPath::new(COUNTERS, format!("{counter_type}_{year}"));
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let current = self.store.get(&path).await.map_err(map_store_error)?;
            let (expected_version, seq, mut fields) = match current {
                Some(snapshot) => {
                    let version = snapshot.version();
                    let fields = snapshot.into_fields();
                    let seq = fields.get("seq").and_then(Value::as_u64).unwrap_or(0);
                    (Some(version), seq, fields)
                }
                None => (None, 0, Fields::new()),
            };
            let next = seq.saturating_add(1);
            write_counter(&mut fields, counter_type, year, next, now);

            match self.store.compare_and_set(&path, expected_version, fields).await {
                Ok(()) => {
                    debug!(counter = %path, seq = next, attempt, "document number issued");
                    return Ok(format_document_number(year, next));
                }
                Err(error) if error.is_conflict() => {
                    debug!(counter = %path, attempt, "counter raced; retrying");
                }
                Err(error) => return Err(map_store_error(error)),
            }
        }

        warn!(counter = %path, attempts = max_attempts, "document number attempts exhausted");
        Err(Error::conflict(format!(
            "counter {path} kept changing after {max_attempts} attempts"
        )))
    }
}

fn validate_document_type(raw: &str) -> Result<&str, Error> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid_request("document type must not be empty"));
    }
    if trimmed.contains('/') {
        return Err(Error::invalid_request(format!(
            "document type `{trimmed}` must not contain `/`"
        )));
    }
    Ok(trimmed)
}

fn write_counter(fields: &mut Fields, document_type: &str, year: i32, seq: u64, now: DateTime<Utc>) {
    fields.insert("seq".to_owned(), Value::from(seq));
    fields.insert("documentType".to_owned(), Value::from(document_type));
    fields.insert("year".to_owned(), Value::from(year));
    fields.insert("updatedAt".to_owned(), timestamp_value(now));
}

#[cfg(test)]
mod tests {
    //! Unit tests for number formatting, validation and conflict retries.

    use super::*;
    use crate::domain::ErrorCode;
    use crate::domain::document::Snapshot;
    use crate::domain::ports::{DocumentStoreError, MockDocumentStore};
    use crate::outbound::memory_store::InMemoryDocumentStore;
    use crate::test_support::MutableClock;
    use chrono::TimeZone;
    use mockall::Sequence;
    use rstest::{fixture, rstest};
    use serde_json::json;

    #[fixture]
    fn clock() -> Arc<MutableClock> {
        Arc::new(MutableClock::new(
            Utc.with_ymd_and_hms(2025, 3, 14, 10, 0, 0)
                .single()
                .expect("valid time"),
        ))
    }

    #[rstest]
    #[tokio::test]
    async fn numbers_increase_per_type_and_year(clock: Arc<MutableClock>) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let sequencer = DocumentNumberSequencer::new(store.clone(), clock, SequencerConfig::default());

        let mut issued = Vec::new();
        for _ in 0..3 {
            issued.push(sequencer.next_number("invoice").await.expect("number"));
        }
        let other = sequencer.next_number("offer").await.expect("number");

        assert_eq!(issued, vec!["2025-0001", "2025-0002", "2025-0003"]);
        assert_eq!(other, "2025-0001");
        let counter = store
            .get(&DocumentPath::new(COUNTERS, "invoice_2025"))
            .await
            .expect("get")
            .expect("counter");
        assert_eq!(counter.fields().get("seq"), Some(&json!(3)));
        assert_eq!(counter.fields().get("documentType"), Some(&json!("invoice")));
        assert_eq!(counter.fields().get("year"), Some(&json!(2025)));
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_receive_distinct_numbers(clock: Arc<MutableClock>) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let sequencer = Arc::new(DocumentNumberSequencer::new(
            store,
            clock,
            SequencerConfig { max_attempts: 64 },
        ));
        let start = Arc::new(tokio::sync::Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let sequencer = Arc::clone(&sequencer);
                let start = Arc::clone(&start);
                tokio::spawn(async move {
                    start.wait().await;
                    sequencer.next_number("invoice").await
                })
            })
            .collect();
        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.expect("join").expect("number"));
        }
        numbers.sort();
        numbers.dedup();

        assert_eq!(numbers.len(), 16);
        assert_eq!(numbers.last().map(String::as_str), Some("2025-0016"));
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("invoice/2025")]
    #[tokio::test]
    async fn malformed_types_are_rejected(clock: Arc<MutableClock>, #[case] document_type: &str) {
        let mut store = MockDocumentStore::new();
        store.expect_get().never();
        let sequencer = DocumentNumberSequencer::new(Arc::new(store), clock, SequencerConfig::default());

        let error = sequencer
            .next_number(document_type)
            .await
            .expect_err("invalid type");
        assert_eq!(error.code(), ErrorCode::InvalidRequest);
    }

    #[rstest]
    #[tokio::test]
    async fn conflicts_are_retried_then_exhausted(clock: Arc<MutableClock>) {
        let mut store = MockDocumentStore::new();
        store.expect_get().times(3).returning(|path| {
            Ok(Some(Snapshot::new(path.clone(), Fields::new(), 4)))
        });
        store
            .expect_compare_and_set()
            .times(3)
            .withf(|_, version, fields| *version == Some(4) && fields.get("seq") == Some(&json!(1)))
            .returning(|path, _, _| Err(DocumentStoreError::conflict(path.to_string())));
        let sequencer = DocumentNumberSequencer::new(
            Arc::new(store),
            clock,
            SequencerConfig { max_attempts: 3 },
        );

        let error = sequencer.next_number("invoice").await.expect_err("exhausted");
        assert_eq!(error.code(), ErrorCode::Conflict);
    }

    #[rstest]
    #[tokio::test]
    async fn a_single_conflict_is_absorbed(clock: Arc<MutableClock>) {
        let mut sequence = Sequence::new();
        let mut store = MockDocumentStore::new();
        store
            .expect_get()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(None));
        store
            .expect_compare_and_set()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|path, _, _| Err(DocumentStoreError::conflict(path.to_string())));
        store
            .expect_get()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|path| {
                let mut fields = Fields::new();
                fields.insert("seq".to_owned(), json!(1));
                Ok(Some(Snapshot::new(path.clone(), fields, 1)))
            });
        store
            .expect_compare_and_set()
            .times(1)
            .in_sequence(&mut sequence)
            .withf(|_, version, _| *version == Some(1))
            .returning(|_, _, _| Ok(()));
        let sequencer = DocumentNumberSequencer::new(Arc::new(store), clock, SequencerConfig::default());

        assert_eq!(
            sequencer.next_number("invoice").await.expect("number"),
            "2025-0002"
        );
    }

    #[rstest]
    #[tokio::test]
    async fn store_errors_other_than_conflicts_surface(clock: Arc<MutableClock>) {
        let mut store = MockDocumentStore::new();
        store
            .expect_get()
            .times(1)
            .returning(|_| Err(DocumentStoreError::unavailable("down")));
        let sequencer = DocumentNumberSequencer::new(Arc::new(store), clock, SequencerConfig::default());

        let error = sequencer.next_number("invoice").await.expect_err("unavailable");
        assert_eq!(error.code(), ErrorCode::ServiceUnavailable);
    }
}
