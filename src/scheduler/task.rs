//! Fetch task state machine.

use super::expansion::Lineage;
use crate::document::Document;
use crate::identifier::ArtifactCode;
use std::collections::HashSet;
use std::sync::Arc;

/// Position-independent task handle, unique within a run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct TaskId(pub(crate) u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
pub(crate) enum TaskState {
    /// Waiting for a mirror
    Idle,
    /// One attempt running against `server`
    InFlight { server: String },
    /// Verified document, waiting to reach the queue head
    Resolved(Document),
}

/// One identifier to resolve
///
/// `tried` only grows: a mirror is added when an attempt is dispatched to it,
/// so no mirror is asked twice for the same task.
#[derive(Debug)]
pub(crate) struct FetchTask {
    pub(crate) code: ArtifactCode,
    /// Present for index tasks, which expand into child tasks once resolved
    lineage: Option<Arc<Lineage>>,
    tried: HashSet<String>,
    state: TaskState,
}

impl FetchTask {
    pub(crate) fn new(code: ArtifactCode, lineage: Option<Arc<Lineage>>) -> Self {
        Self {
            code,
            lineage,
            tried: HashSet::new(),
            state: TaskState::Idle,
        }
    }

    pub(crate) fn is_index(&self) -> bool {
        self.lineage.is_some()
    }

    pub(crate) fn is_idle(&self) -> bool {
        matches!(self.state, TaskState::Idle)
    }

    pub(crate) fn has_tried(&self, server: &str) -> bool {
        self.tried.contains(server)
    }

    pub(crate) fn tried_count(&self) -> usize {
        self.tried.len()
    }

    /// Idle -> InFlight
    pub(crate) fn dispatch(&mut self, server: &str) {
        debug_assert!(self.is_idle(), "dispatching a busy task");
        debug_assert!(!self.has_tried(server), "mirror asked twice");
        self.tried.insert(server.to_string());
        self.state = TaskState::InFlight {
            server: server.to_string(),
        };
    }

    /// InFlight -> Idle after a failed attempt
    pub(crate) fn fail(&mut self) {
        debug_assert!(matches!(self.state, TaskState::InFlight { .. }));
        self.state = TaskState::Idle;
    }

    /// InFlight -> Resolved
    pub(crate) fn resolve(&mut self, doc: Document) {
        debug_assert!(matches!(self.state, TaskState::InFlight { .. }));
        self.state = TaskState::Resolved(doc);
    }

    /// Server of the running attempt
    pub(crate) fn in_flight_on(&self) -> Option<&str> {
        match &self.state {
            TaskState::InFlight { server } => Some(server),
            _ => None,
        }
    }

    pub(crate) fn is_resolved(&self) -> bool {
        matches!(self.state, TaskState::Resolved(_))
    }

    /// Consume a resolved task, keeping the lineage of an index
    pub(crate) fn into_document(self) -> Option<(Document, Option<Arc<Lineage>>)> {
        match self.state {
            TaskState::Resolved(doc) => Some((doc, self.lineage)),
            _ => None,
        }
    }
}
