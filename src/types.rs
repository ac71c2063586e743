//! Core types: events and the attempt report

use crate::error::AttemptError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Event emitted while fetching
///
/// Delivered on a broadcast channel; see [`crate::FetchScheduler::subscribe`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A task was appended to the fetch queue
    TaskQueued {
        /// Artifact code of the queued document
        identifier: String,
        /// Whether the document is expected to be an index
        index: bool,
    },

    /// An attempt was dispatched to a mirror
    AttemptStarted {
        /// Artifact code being fetched
        identifier: String,
        /// Mirror base URL
        server: String,
    },

    /// An attempt failed; the task will be retried on another mirror
    AttemptFailed {
        /// Artifact code being fetched
        identifier: String,
        /// Mirror base URL
        server: String,
        /// Error message
        error: String,
    },

    /// A document was written to the output
    DocumentEmitted {
        /// URI of the written document
        uri: String,
        /// Documents written so far
        count: u64,
    },

    /// Progress tick, every `progress_interval` written documents
    Progress {
        /// Documents written so far
        count: u64,
    },

    /// The queue drained
    RunFinished {
        /// Documents written by this run
        count: u64,
    },
}

/// One suppressed attempt failure
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptFailure {
    /// Artifact code that was being fetched
    pub identifier: String,
    /// Mirror that failed
    pub server: String,
    /// Machine-readable error code
    pub code: String,
    /// Error message
    pub error: String,
    /// When the failure was observed
    pub at: DateTime<Utc>,
}

impl AttemptFailure {
    /// Record `error` for an attempt on `server`, timestamped now
    pub fn new(identifier: &str, server: &str, error: &AttemptError) -> Self {
        Self {
            identifier: identifier.to_string(),
            server: server.to_string(),
            code: error.code().to_string(),
            error: error.to_string(),
            at: Utc::now(),
        }
    }
}

/// Collected attempt failures, shared between the fetch paths
///
/// Cloning is cheap; clones record into the same list.
#[derive(Clone, Debug, Default)]
pub struct FetchReport {
    failures: Arc<tokio::sync::Mutex<Vec<AttemptFailure>>>,
}

impl FetchReport {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a failure
    pub async fn record(&self, failure: AttemptFailure) {
        self.failures.lock().await.push(failure);
    }

    /// Number of failures recorded so far
    pub async fn len(&self) -> usize {
        self.failures.lock().await.len()
    }

    /// Whether nothing has been recorded
    pub async fn is_empty(&self) -> bool {
        self.failures.lock().await.is_empty()
    }

    /// Copy of all failures in the order they were recorded
    pub async fn failures(&self) -> Vec<AttemptFailure> {
        self.failures.lock().await.clone()
    }
}
