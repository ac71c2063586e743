//! Per-mirror in-flight bookkeeping.

use super::task::TaskId;
use std::collections::{HashMap, HashSet};

/// Tasks currently in flight against each mirror
///
/// Never holds more than `cap` tasks for one mirror.
#[derive(Debug)]
pub(crate) struct ServerLoad {
    cap: usize,
    in_flight: HashMap<String, HashSet<TaskId>>,
}

impl ServerLoad {
    pub(crate) fn new(cap: usize) -> Self {
        Self {
            cap,
            in_flight: HashMap::new(),
        }
    }

    pub(crate) fn load(&self, server: &str) -> usize {
        self.in_flight.get(server).map_or(0, HashSet::len)
    }

    pub(crate) fn has_capacity(&self, server: &str) -> bool {
        self.load(server) < self.cap
    }

    /// Take a slot; refused when the mirror is at its cap
    pub(crate) fn acquire(&mut self, server: &str, task: TaskId) -> bool {
        if !self.has_capacity(server) {
            return false;
        }
        self.in_flight
            .entry(server.to_string())
            .or_default()
            .insert(task)
    }

    pub(crate) fn release(&mut self, server: &str, task: TaskId) {
        if let Some(tasks) = self.in_flight.get_mut(server) {
            tasks.remove(&task);
            if tasks.is_empty() {
                self.in_flight.remove(server);
            }
        }
    }

    /// Attempts in flight across all mirrors
    pub(crate) fn total(&self) -> usize {
        self.in_flight.values().map(HashSet::len).sum()
    }
}
