//! Index traversal: concurrent fetching with strictly ordered output.
//!
//! The scheduler keeps one queue of fetch tasks. New tasks
//! are only ever appended; only the head is ever removed, and only once it is
//! resolved. Attempts for any task in the queue run concurrently (up to a cap
//! per mirror), so children are prefetched while their earlier siblings are
//! still in flight, but documents reach the output in queue order.
//!
//! The run loop is the only owner of the queue, the task table and the
//! per-mirror load. Attempts run on a [`JoinSet`] and report back by
//! returning; the loop sleeps in `join_next` until one does.
//!
//! # Failure policy
//!
//! - An attempt failure (transport, status, parse, verification) returns the
//!   task to `Idle`; it is dispatched again to a mirror it has not tried.
//! - A task that has tried every mirror aborts the whole run with
//!   [`Error::ServersExhausted`]. Documents already written stay written.
//! - An index task that resolves to a non-index aborts with [`Error::NotAnIndex`].
//! - An index that includes or appends one of its own ancestors aborts with
//!   [`Error::IndexCycle`]. The same index reached through two parents is
//!   fetched once per parent.

mod expansion;
mod load;
mod task;

#[cfg(test)]
mod tests;

use crate::config::{Config, FetchConfig};
use crate::directory::{ServerDirectory, ServerInfo, directory_from_config};
use crate::document::Document;
use crate::error::{AttemptError, Error, Result};
use crate::fetcher::{fetch_from, mirror_order};
use crate::identifier::ArtifactCode;
use crate::output::OutputSink;
use crate::transport::{HttpTransport, Transport};
use crate::types::{AttemptFailure, Event, FetchReport};
use expansion::Lineage;
use load::ServerLoad;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use task::{FetchTask, TaskId};
use tokio::sync::broadcast;
use tokio::task::JoinSet;

/// Result of one attempt, sent back to the run loop
struct AttemptOutcome {
    task: TaskId,
    server: String,
    result: std::result::Result<Document, AttemptError>,
}

/// Breadth-first index fetcher over a fixed mirror snapshot
pub struct FetchScheduler {
    config: FetchConfig,
    servers: Vec<ServerInfo>,
    transport: Arc<dyn Transport>,
    document_count: Arc<AtomicU64>,
    event_tx: broadcast::Sender<Event>,
    report: Option<FetchReport>,
}

impl FetchScheduler {
    /// Create a scheduler, taking the mirror list from `directory` once
    ///
    /// Only the fetch settings of `config` are checked; its mirror sources
    /// are ignored in favor of `directory`.
    pub async fn new(
        config: &Config,
        directory: &dyn ServerDirectory,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.fetch.validate()?;
        let servers = directory.list_servers().await?;
        if servers.is_empty() {
            return Err(Error::NoServers);
        }
        tracing::info!(servers = servers.len(), "Mirror snapshot taken");

        let (event_tx, _rx) = broadcast::channel(1000);
        Ok(Self {
            config: config.fetch.clone(),
            servers,
            transport,
            document_count: Arc::new(AtomicU64::new(0)),
            event_tx,
            report: config.fetch.collect_report.then(FetchReport::new),
        })
    }

    /// Create a scheduler that talks HTTP to the mirrors named by `config`
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let directory = directory_from_config(config)?;
        let transport = Arc::new(HttpTransport::new(&config.fetch)?);
        Self::new(config, directory.as_ref(), transport).await
    }

    /// Record failures into `report` instead of a private one
    pub fn with_report(mut self, report: FetchReport) -> Self {
        self.report = Some(report);
        self
    }

    /// Mirrors this scheduler works with
    pub fn servers(&self) -> &[ServerInfo] {
        &self.servers
    }

    /// Documents written so far, across all runs
    pub fn document_count(&self) -> u64 {
        self.document_count.load(Ordering::Relaxed)
    }

    /// Shared handle on the document counter, readable from other tasks
    pub fn document_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.document_count)
    }

    /// Subscribe to scheduler events
    ///
    /// Progress is reported as [`Event::Progress`] every `progress_interval` documents.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Suppressed attempt failures, when report collection is on
    pub fn report(&self) -> Option<&FetchReport> {
        self.report.as_ref()
    }

    /// Traverse the index `root`
    ///
    /// Index documents are written when `write_index` is set; their elements
    /// are fetched and written when `expand_content` is set. Sub-indexes and
    /// appended indexes are always followed. Returns the number of documents
    /// written by this run.
    ///
    /// The sink is not finished, so several runs can share one output; on
    /// error the documents already emitted stay in the sink.
    pub async fn run(
        &self,
        root: &str,
        expand_content: bool,
        write_index: bool,
        sink: &mut dyn OutputSink,
    ) -> Result<u64> {
        let root = ArtifactCode::parse(root)?;
        tracing::info!(identifier = %root, expand_content, write_index, "Starting index traversal");

        let mut run = Run::new(self, expand_content, write_index);
        let outcome = run.drive(root, sink).await;
        let written = run.written;

        match &outcome {
            Ok(()) => {
                tracing::info!(documents = written, "Index traversal finished");
                self.emit(Event::RunFinished { count: written });
            }
            Err(e) => {
                tracing::error!(error = %e, documents = written, "Index traversal aborted");
            }
        }
        outcome.map(|()| written)
    }

    fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}

/// State of one traversal, owned by the run loop
struct Run<'a> {
    scheduler: &'a FetchScheduler,
    expand_content: bool,
    write_index: bool,
    queue: VecDeque<TaskId>,
    tasks: HashMap<TaskId, FetchTask>,
    load: ServerLoad,
    attempts: JoinSet<AttemptOutcome>,
    next_id: u64,
    written: u64,
}

impl<'a> Run<'a> {
    fn new(scheduler: &'a FetchScheduler, expand_content: bool, write_index: bool) -> Self {
        Self {
            scheduler,
            expand_content,
            write_index,
            queue: VecDeque::new(),
            tasks: HashMap::new(),
            load: ServerLoad::new(scheduler.config.max_parallel_requests_per_server),
            attempts: JoinSet::new(),
            next_id: 0,
            written: 0,
        }
    }

    async fn drive(&mut self, root: ArtifactCode, sink: &mut dyn OutputSink) -> Result<()> {
        let lineage = Lineage::root(root.clone());
        self.enqueue(root, Some(lineage));

        loop {
            self.consume_head(sink)?;
            if self.queue.is_empty() {
                return Ok(());
            }
            self.dispatch()?;

            match self.attempts.join_next().await {
                Some(Ok(outcome)) => self.complete(outcome).await,
                Some(Err(e)) => return Err(Error::TaskFailed(e.to_string())),
                None => {
                    // Idle tasks always find a mirror or exhaust; reaching this is a bug
                    return Err(Error::Other(format!(
                        "scheduler stalled with {} queued tasks and no attempts",
                        self.queue.len()
                    )));
                }
            }
        }
    }

    fn enqueue(&mut self, code: ArtifactCode, lineage: Option<Arc<Lineage>>) {
        let index = lineage.is_some();
        let id = TaskId(self.next_id);
        self.next_id += 1;

        tracing::trace!(task = %id, identifier = %code, index, "Queued");
        self.scheduler.emit(Event::TaskQueued {
            identifier: code.to_string(),
            index,
        });
        self.tasks.insert(id, FetchTask::new(code, lineage));
        self.queue.push_back(id);
    }

    /// Start an attempt for every idle task that has an eligible mirror
    fn dispatch(&mut self) -> Result<()> {
        let servers = &self.scheduler.servers;
        let cap = self.scheduler.config.max_parallel_requests_per_server;

        for &id in &self.queue {
            if self.load.total() >= servers.len() * cap {
                break;
            }
            let Some(task) = self.tasks.get_mut(&id) else {
                continue;
            };
            if !task.is_idle() {
                continue;
            }
            if task.tried_count() >= servers.len() {
                return Err(Error::ServersExhausted {
                    identifier: task.code.to_string(),
                    tried: task.tried_count(),
                });
            }

            let candidates = mirror_order(servers.clone(), self.scheduler.config.shuffle_servers);
            let Some(server) = candidates.into_iter().find(|s| {
                !task.has_tried(&s.public_url) && self.load.has_capacity(&s.public_url)
            }) else {
                continue;
            };

            if !self.load.acquire(&server.public_url, id) {
                continue;
            }
            task.dispatch(&server.public_url);

            tracing::debug!(task = %id, identifier = %task.code, index = task.is_index(), server = %server, "Dispatching attempt");
            self.scheduler.emit(Event::AttemptStarted {
                identifier: task.code.to_string(),
                server: server.public_url.clone(),
            });

            let transport = Arc::clone(&self.scheduler.transport);
            let code = task.code.clone();
            let format = self.scheduler.config.wire_format;
            self.attempts.spawn(async move {
                let result = fetch_from(transport.as_ref(), &server, &code, format).await;
                AttemptOutcome {
                    task: id,
                    server: server.public_url,
                    result,
                }
            });
        }
        Ok(())
    }

    /// Apply an attempt result; failures only make the task eligible again
    async fn complete(&mut self, outcome: AttemptOutcome) {
        let AttemptOutcome {
            task: id,
            server,
            result,
        } = outcome;
        self.load.release(&server, id);

        let Some(task) = self.tasks.get_mut(&id) else {
            return;
        };
        debug_assert_eq!(task.in_flight_on(), Some(server.as_str()));

        match result {
            Ok(doc) => {
                tracing::debug!(task = %id, identifier = %task.code, server = %server, "Resolved");
                task.resolve(doc);
            }
            Err(e) => {
                tracing::debug!(
                    task = %id,
                    identifier = %task.code,
                    server = %server,
                    error = %e,
                    "Attempt failed, will try another mirror"
                );
                task.fail();
                self.scheduler.emit(Event::AttemptFailed {
                    identifier: task.code.to_string(),
                    server: server.clone(),
                    error: e.to_string(),
                });
                if let Some(report) = &self.scheduler.report {
                    report
                        .record(AttemptFailure::new(task.code.as_str(), &server, &e))
                        .await;
                }
            }
        }
    }

    /// Consume resolved tasks at the head of the queue
    fn consume_head(&mut self, sink: &mut dyn OutputSink) -> Result<()> {
        while let Some(&head) = self.queue.front() {
            if !self.tasks.get(&head).is_some_and(FetchTask::is_resolved) {
                return Ok(());
            }
            self.queue.pop_front();
            let Some(task) = self.tasks.remove(&head) else {
                continue;
            };
            let Some((doc, lineage)) = task.into_document() else {
                continue;
            };

            if let Some(lineage) = lineage {
                // Children go behind everything already queued; a bad index is never written
                for child in expansion::children(&doc, self.expand_content)? {
                    let child_lineage = if child.index {
                        Some(lineage.descend(&child.code)?)
                    } else {
                        None
                    };
                    self.enqueue(child.code, child_lineage);
                }
                if self.write_index {
                    self.write(&doc, sink)?;
                }
            } else {
                self.write(&doc, sink)?;
            }
        }
        Ok(())
    }

    fn write(&mut self, doc: &Document, sink: &mut dyn OutputSink) -> Result<()> {
        // Stream sinks buffer; this only blocks the loop when a buffer fills
        sink.emit(doc)?;
        self.written += 1;
        let count = self.scheduler.document_count.fetch_add(1, Ordering::Relaxed) + 1;

        self.scheduler.emit(Event::DocumentEmitted {
            uri: doc.uri.clone(),
            count,
        });
        if count % self.scheduler.config.progress_interval == 0 {
            tracing::info!(documents = count, "Progress");
            self.scheduler.emit(Event::Progress { count });
        }
        Ok(())
    }
}
