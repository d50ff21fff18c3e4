//! Maintains `commentCount` on documents owning a `comments` sub-collection.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::Error;
use super::document::{ChangeKind, DocumentChange};
use super::mapping::map_store_error;
use super::ports::DocumentStore;
use super::reactor::{ChangeReactor, Reaction};

/// Field on the parent document holding the comment count.
pub const COMMENT_COUNT_FIELD: &str = "commentCount";

/// Change reactor keeping the parent's comment count in step with comment
/// creates and deletes.
///
/// The count is adjusted with the store's atomic increment and never
/// recomputed, so duplicate deliveries drift the count.
pub struct CommentCounter {
    store: Arc<dyn DocumentStore>,
}

impl CommentCounter {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ChangeReactor for CommentCounter {
    fn name(&self) -> &'static str {
        "comment_counter"
    }

    async fn react(&self, change: &DocumentChange) -> Result<Reaction, Error> {
        let delta = match change.kind() {
            ChangeKind::Create => 1,
            ChangeKind::Delete => -1,
            ChangeKind::Update => return Ok(Reaction::skipped()),
        };
        let Some(parent) = change.path().parent() else {
            warn!(path = %change.path(), "comment has no parent document; count not adjusted");
            return Ok(Reaction::skipped());
        };

        self.store
            .increment(&parent, COMMENT_COUNT_FIELD, delta)
            .await
            .map_err(map_store_error)?;
        debug!(parent = %parent, delta, "comment count adjusted");
        Ok(Reaction::wrote(1))
    }
}
