//! Document paths, snapshots and change events observed by the reactors.
//!
//! The store is schemaless: documents are JSON objects addressed by a
//! slash-separated path that alternates collection and document segments
//! (`project_documents/d1/comments/c1`). Reactors read fields through the
//! helpers here so wire names stay in one place per reactor.

use std::fmt;

use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Field map stored for one document.
pub type Fields = Map<String, Value>;

/// Validation errors returned by [`DocumentPath::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentPathError {
    /// Path is empty after trimming slashes.
    #[error("document path must not be empty")]
    Empty,
    /// Path has an odd number of segments, so it names a collection.
    #[error("document path `{path}` must alternate collection and document segments")]
    NotADocument { path: String },
    /// A segment between slashes is empty.
    #[error("document path `{path}` contains an empty segment")]
    EmptySegment { path: String },
}

/// Address of one document: its collection path plus its identifier.
///
/// # Examples
/// ```
/// use reactors::domain::DocumentPath;
///
/// let path = DocumentPath::parse("project_documents/d1/comments/c9").expect("valid path");
/// assert_eq!(path.collection(), "project_documents/d1/comments");
/// assert_eq!(path.id(), "c9");
/// assert_eq!(path.parent().expect("parent").to_string(), "project_documents/d1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath {
    collection: String,
    id: String,
}

impl DocumentPath {
    /// Build a path from a collection path and a document identifier.
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Parse a full slash-separated document path.
    pub fn parse(raw: &str) -> Result<Self, DocumentPathError> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Err(DocumentPathError::Empty);
        }
        let segments: Vec<&str> = trimmed.split('/').collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(DocumentPathError::EmptySegment {
                path: raw.to_owned(),
            });
        }
        if !segments.chunks_exact(2).remainder().is_empty() {
            return Err(DocumentPathError::NotADocument {
                path: raw.to_owned(),
            });
        }
        let Some((id, collection)) = segments.split_last() else {
            return Err(DocumentPathError::Empty);
        };
        Ok(Self::new(collection.join("/"), *id))
    }

    /// Collection path holding this document.
    pub fn collection(&self) -> &str {
        self.collection.as_str()
    }

    /// Document identifier within its collection.
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Path of the document owning this document's sub-collection, if any.
    pub fn parent(&self) -> Option<DocumentPath> {
        let (parent_path, _sub_collection) = self.collection.rsplit_once('/')?;
        DocumentPath::parse(parent_path).ok()
    }

    /// Iterate over all path segments in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.collection
            .split('/')
            .chain(std::iter::once(self.id.as_str()))
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Current state of a stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    path: DocumentPath,
    fields: Fields,
    version: u64,
}

impl Snapshot {
    /// Wrap stored fields together with the store-assigned version.
    pub fn new(path: DocumentPath, fields: Fields, version: u64) -> Self {
        Self {
            path,
            fields,
            version,
        }
    }

    pub fn path(&self) -> &DocumentPath {
        &self.path
    }

    pub fn id(&self) -> &str {
        self.path.id()
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Monotonic per-document version used for compare-and-set.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn into_fields(self) -> Fields {
        self.fields
    }
}

/// Classification of a document write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

/// One observed write with the document state before and after it.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    path: DocumentPath,
    before: Option<Fields>,
    after: Option<Fields>,
    actor_id: Option<String>,
}

impl DocumentChange {
    pub fn new(path: DocumentPath, before: Option<Fields>, after: Option<Fields>) -> Self {
        Self {
            path,
            before,
            after,
            actor_id: None,
        }
    }

    /// Attach the authenticated caller that issued the write.
    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn path(&self) -> &DocumentPath {
        &self.path
    }

    pub fn before(&self) -> Option<&Fields> {
        self.before.as_ref()
    }

    pub fn after(&self) -> Option<&Fields> {
        self.after.as_ref()
    }

    pub fn actor_id(&self) -> Option<&str> {
        self.actor_id.as_deref()
    }

    /// Classify the write by snapshot existence.
    ///
    /// # Examples
    /// ```
    /// use reactors::domain::{ChangeKind, DocumentChange, DocumentPath};
    ///
    /// let change = DocumentChange::new(DocumentPath::new("tasks", "t1"), None, Some(Default::default()));
    /// assert_eq!(change.kind(), ChangeKind::Create);
    /// ```
    pub fn kind(&self) -> ChangeKind {
        match (&self.before, &self.after) {
            (None, Some(_)) => ChangeKind::Create,
            (Some(_), None) => ChangeKind::Delete,
            _ => ChangeKind::Update,
        }
    }
}

/// Read a string field, treating non-strings and blanks as absent.
pub fn str_field<'a>(fields: &'a Fields, name: &str) -> Option<&'a str> {
    fields
        .get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Read an array of identifiers, ignoring non-string entries.
pub fn string_list(fields: &Fields, name: &str) -> Vec<String> {
    fields
        .get(name)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// Whether a field is missing or explicitly `null`.
pub fn is_unset(fields: &Fields, name: &str) -> bool {
    fields.get(name).is_none_or(Value::is_null)
}

/// Render an instant in the store's timestamp format.
pub fn timestamp_value(instant: DateTime<Utc>) -> Value {
    Value::String(instant.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Resolve the instant a stored timestamp refers to.
///
/// Accepts RFC 3339 strings, `YYYY-MM-DD` dates (midnight UTC), epoch
/// milliseconds and `{seconds, nanoseconds}` objects as written by the
/// application's clients.
///
/// # Examples
/// ```
/// use reactors::domain::resolve_instant;
/// use serde_json::json;
///
/// let a = resolve_instant(&json!("2025-01-01T00:00:00Z")).expect("rfc3339");
/// let b = resolve_instant(&json!({ "seconds": 1735689600, "nanoseconds": 0 })).expect("object");
/// let c = resolve_instant(&json!(1735689600000_i64)).expect("millis");
/// assert_eq!(a, b);
/// assert_eq!(b, c);
/// assert!(resolve_instant(&json!(null)).is_none());
/// ```
pub fn resolve_instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(raw) => parse_instant_str(raw.trim()),
        Value::Number(number) => number
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        Value::Object(map) => {
            let seconds = map
                .get("seconds")
                .or_else(|| map.get("_seconds"))
                .and_then(Value::as_i64)?;
            let nanos = map
                .get("nanoseconds")
                .or_else(|| map.get("_nanoseconds"))
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0);
            Utc.timestamp_opt(seconds, nanos).single()
        }
        _ => None,
    }
}

/// Resolve a named timestamp field.
pub fn instant_field(fields: &Fields, name: &str) -> Option<DateTime<Utc>> {
    fields.get(name).and_then(resolve_instant)
}

/// Serialise a record into a document field map.
///
/// Records that do not serialise to a JSON object are rejected.
pub fn to_fields<T: Serialize>(record: &T) -> Result<Fields, serde_json::Error> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => Err(serde::ser::Error::custom(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

/// Serde adapter for instants stored in the store's timestamp format.
///
/// Deserialisation accepts every shape [`resolve_instant`] understands.
pub mod store_timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(instant: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&instant.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        super::resolve_instant(&value)
            .ok_or_else(|| D::Error::custom(format!("unresolvable timestamp {value}")))
    }

    /// Optional variant; absent, `null` and unresolvable values read as `None`.
    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};
        use serde_json::Value;

        pub fn serialize<S: Serializer>(
            instant: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match instant {
                Some(instant) => super::serialize(instant, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let value = Value::deserialize(deserializer)?;
            Ok(super::super::resolve_instant(&value))
        }
    }
}

fn parse_instant_str(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
