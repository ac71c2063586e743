//! Scheduler tests against the in-memory mirror pool.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use crate::config::ServerConfig;
use crate::directory::StaticDirectory;
use crate::output::MemorySink;
use crate::test_helpers::{MockTransport, index, leaf, self_appending_index};
use std::collections::HashSet;
use std::time::Duration;

const TWO: &[&str] = &["http://m1/", "http://m2/"];

fn config(servers: &[&str]) -> Config {
    Config {
        servers: servers.iter().map(|s| ServerConfig::new(*s)).collect(),
        ..Config::default()
    }
}

async fn scheduler_with(config: &Config, transport: &Arc<MockTransport>) -> FetchScheduler {
    let directory = StaticDirectory::new(config.servers.iter().map(|s| s.public_url.clone()));
    FetchScheduler::new(config, &directory, transport.clone()).await.unwrap()
}

async fn scheduler(servers: &[&str], transport: &Arc<MockTransport>) -> FetchScheduler {
    scheduler_with(&config(servers), transport).await
}

/// Root R: elements [a, b], sub-index S, appended T; S: [c]; T: [d]
struct Tree {
    root: Document,
    sub: Document,
    appended: Document,
    a: Document,
    b: Document,
    c: Document,
    d: Document,
}

fn tree() -> Tree {
    let (a, b, c, d) = (leaf("a"), leaf("b"), leaf("c"), leaf("d"));
    let sub = index("S", &[&c], &[], None);
    let appended = index("T", &[&d], &[], None);
    let root = index("R", &[&a, &b], &[&sub], Some(&appended));
    Tree {
        root,
        sub,
        appended,
        a,
        b,
        c,
        d,
    }
}

fn serve_tree(transport: &MockTransport, tree: &Tree) {
    for doc in [&tree.root, &tree.sub, &tree.appended, &tree.a, &tree.b, &tree.c, &tree.d] {
        transport.serve_everywhere(doc);
    }
}

fn requested_codes(transport: &MockTransport) -> HashSet<String> {
    transport.calls().into_iter().map(|(_, code)| code).collect()
}

#[tokio::test]
async fn output_follows_breadth_first_order_not_completion_order() {
    let tree = tree();
    let transport = Arc::new(MockTransport::new());
    serve_tree(&transport, &tree);
    // Later documents complete first
    transport.delay(&tree.a, Duration::from_millis(80));
    transport.delay(&tree.b, Duration::from_millis(60));
    transport.delay(&tree.sub, Duration::from_millis(5));
    transport.delay(&tree.appended, Duration::from_millis(5));

    let scheduler = scheduler(TWO, &transport).await;
    let mut sink = MemorySink::new();
    let count = scheduler.run(&tree.root.uri, true, false, &mut sink).await.unwrap();

    assert_eq!(count, 4);
    assert_eq!(
        sink.uris(),
        vec![
            tree.a.uri.as_str(),
            tree.b.uri.as_str(),
            tree.c.uri.as_str(),
            tree.d.uri.as_str()
        ]
    );
}

#[tokio::test]
async fn index_documents_are_written_in_queue_position() {
    let tree = tree();
    let transport = Arc::new(MockTransport::new());
    serve_tree(&transport, &tree);

    let scheduler = scheduler(TWO, &transport).await;
    let mut sink = MemorySink::new();
    let count = scheduler.run(&tree.root.uri, true, true, &mut sink).await.unwrap();

    assert_eq!(count, 7);
    assert_eq!(
        sink.uris(),
        vec![
            tree.root.uri.as_str(),
            tree.a.uri.as_str(),
            tree.b.uri.as_str(),
            tree.sub.uri.as_str(),
            tree.appended.uri.as_str(),
            tree.c.uri.as_str(),
            tree.d.uri.as_str(),
        ]
    );
}

#[tokio::test]
async fn index_only_mode_never_fetches_elements() {
    let tree = tree();
    let transport = Arc::new(MockTransport::new());
    serve_tree(&transport, &tree);

    let scheduler = scheduler(TWO, &transport).await;
    let mut sink = MemorySink::new();
    scheduler.run(&tree.root.uri, false, true, &mut sink).await.unwrap();

    assert_eq!(
        sink.uris(),
        vec![
            tree.root.uri.as_str(),
            tree.sub.uri.as_str(),
            tree.appended.uri.as_str()
        ]
    );
    let requested = requested_codes(&transport);
    for element in [&tree.a, &tree.b, &tree.c, &tree.d] {
        assert!(!requested.contains(element.artifact_code().unwrap().as_str()));
    }
}

#[tokio::test]
async fn traversal_without_output_still_visits_every_index() {
    let tree = tree();
    let transport = Arc::new(MockTransport::new());
    serve_tree(&transport, &tree);

    let scheduler = scheduler(TWO, &transport).await;
    let mut sink = MemorySink::new();
    let count = scheduler.run(&tree.root.uri, false, false, &mut sink).await.unwrap();

    assert_eq!(count, 0);
    assert_eq!(requested_codes(&transport).len(), 3);
}

fn wide_index(label: &str, width: usize) -> (Document, Vec<Document>) {
    let elements: Vec<Document> = (0..width).map(|i| leaf(&format!("{label}-{i}"))).collect();
    let refs: Vec<&Document> = elements.iter().collect();
    (index(label, &refs, &[], None), elements)
}

#[tokio::test]
async fn no_mirror_exceeds_default_cap() {
    let (root, elements) = wide_index("wide", 40);
    let transport = Arc::new(MockTransport::new());
    transport.serve_everywhere(&root);
    for element in &elements {
        transport.serve_everywhere(element);
        transport.delay(element, Duration::from_millis(20));
    }

    let scheduler = scheduler(TWO, &transport).await;
    let mut sink = MemorySink::new();
    let count = scheduler.run(&root.uri, true, false, &mut sink).await.unwrap();

    assert_eq!(count, 40);
    let peak = transport.max_concurrency();
    assert!(peak <= DEFAULT_CAP, "peak {peak} exceeds cap");
    assert!(peak > 1, "elements should be prefetched concurrently");
    let expected: Vec<&str> = elements.iter().map(|d| d.uri.as_str()).collect();
    assert_eq!(sink.uris(), expected);
}

const DEFAULT_CAP: usize = crate::config::DEFAULT_MAX_PARALLEL_REQUESTS_PER_SERVER;

#[tokio::test]
async fn configured_cap_is_respected() {
    let (root, elements) = wide_index("narrow", 12);
    let transport = Arc::new(MockTransport::new());
    transport.serve_everywhere(&root);
    for element in &elements {
        transport.serve_everywhere(element);
        transport.delay(element, Duration::from_millis(10));
    }

    let mut config = config(TWO);
    config.fetch.max_parallel_requests_per_server = 2;
    let scheduler = scheduler_with(&config, &transport).await;
    scheduler
        .run(&root.uri, true, false, &mut MemorySink::new())
        .await
        .unwrap();

    assert!(transport.max_concurrency() <= 2);
}

#[tokio::test]
async fn each_mirror_is_asked_at_most_once_per_document() {
    let servers = ["http://m1/", "http://m2/", "http://m3/", "http://m4/"];
    let (root, elements) = wide_index("sparse", 8);
    let transport = Arc::new(MockTransport::new());
    transport.serve_everywhere(&root);
    // Only the last mirror has the content
    for element in &elements {
        transport.serve("http://m4/", element);
    }

    let scheduler = scheduler(&servers, &transport).await;
    let count = scheduler
        .run(&root.uri, true, false, &mut MemorySink::new())
        .await
        .unwrap();
    assert_eq!(count, 8);

    let mut seen = HashSet::new();
    for call in transport.calls() {
        assert!(seen.insert(call.clone()), "duplicate attempt {call:?}");
    }
    for element in &elements {
        let code = element.artifact_code().unwrap().to_string();
        let attempts = seen.iter().filter(|(_, c)| *c == code).count();
        assert!((1..=servers.len()).contains(&attempts));
    }
}

#[tokio::test]
async fn exhausted_child_aborts_but_keeps_earlier_output() {
    let a = leaf("kept");
    let missing = leaf("missing");
    let b = leaf("never-written");
    let root = index("holey", &[&a, &missing, &b], &[], None);

    let transport = Arc::new(MockTransport::new());
    transport.serve_everywhere(&root);
    transport.serve_everywhere(&a);
    transport.serve_everywhere(&b);
    transport.delay(&missing, Duration::from_millis(50));

    let scheduler = scheduler(TWO, &transport).await;
    let mut sink = MemorySink::new();
    let err = scheduler.run(&root.uri, true, false, &mut sink).await.unwrap_err();

    match err {
        Error::ServersExhausted { identifier, tried } => {
            assert_eq!(identifier, missing.artifact_code().unwrap().to_string());
            assert_eq!(tried, 2);
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert_eq!(sink.uris(), vec![a.uri.as_str()]);
    assert_eq!(scheduler.document_count(), 1);
}

#[tokio::test]
async fn leaf_requested_as_index_is_fatal() {
    let plain = leaf("plain");
    let transport = Arc::new(MockTransport::new());
    transport.serve_everywhere(&plain);

    let scheduler = scheduler(TWO, &transport).await;
    let err = scheduler
        .run(&plain.uri, true, false, &mut MemorySink::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotAnIndex(ref uri) if *uri == plain.uri));
}

#[tokio::test]
async fn index_cycle_is_rejected() {
    let looping = self_appending_index("loop");
    let transport = Arc::new(MockTransport::new());
    transport.serve_everywhere(&looping);

    let scheduler = scheduler(TWO, &transport).await;
    let mut sink = MemorySink::new();
    let err = scheduler.run(&looping.uri, false, true, &mut sink).await.unwrap_err();

    assert_eq!(err.code(), "index_cycle");
    assert!(sink.documents.is_empty(), "index is not written before its children are planned");
}

#[tokio::test]
async fn shared_sub_index_is_not_a_cycle() {
    // R -> [S1, S2]; both list X; S1 also holds a
    let (a, x) = (leaf("diamond-a"), leaf("diamond-x"));
    let shared = index("X", &[&x], &[], None);
    let left = index("S1", &[&a], &[&shared], None);
    let right = index("S2", &[], &[&shared], None);
    let root = index("R", &[], &[&left, &right], None);

    let transport = Arc::new(MockTransport::new());
    for doc in [&root, &left, &right, &shared, &a, &x] {
        transport.serve_everywhere(doc);
    }

    let scheduler = scheduler(TWO, &transport).await;
    let mut sink = MemorySink::new();
    let count = scheduler.run(&root.uri, true, false, &mut sink).await.unwrap();

    assert_eq!(count, 3);
    assert_eq!(
        sink.uris(),
        vec![a.uri.as_str(), x.uri.as_str(), x.uri.as_str()]
    );
}

#[tokio::test]
async fn nested_self_appending_index_is_a_cycle() {
    let looping = self_appending_index("deep-loop");
    let middle = index("middle", &[], &[&looping], None);
    let root = index("top", &[], &[&middle], None);

    let transport = Arc::new(MockTransport::new());
    for doc in [&root, &middle, &looping] {
        transport.serve_everywhere(doc);
    }

    let scheduler = scheduler(TWO, &transport).await;
    let mut sink = MemorySink::new();
    let err = scheduler.run(&root.uri, false, true, &mut sink).await.unwrap_err();

    assert_eq!(err.code(), "index_cycle");
    assert_eq!(sink.uris(), vec![root.uri.as_str(), middle.uri.as_str()]);
}

struct BrokenPipe;

impl OutputSink for BrokenPipe {
    fn emit(&mut self, _doc: &Document) -> Result<()> {
        Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "reader went away").into())
    }
}

#[tokio::test]
async fn output_failure_aborts_run_and_outstanding_attempts() {
    let (root, elements) = wide_index("sink-failure", 12);
    let transport = Arc::new(MockTransport::new());
    transport.serve_everywhere(&root);
    for element in &elements {
        transport.serve_everywhere(element);
    }
    // Everything after the first element is still in flight when it is written
    for element in &elements[1..] {
        transport.delay(element, Duration::from_millis(300));
    }

    let scheduler = scheduler(TWO, &transport).await;
    let err = scheduler
        .run(&root.uri, true, false, &mut BrokenPipe)
        .await
        .unwrap_err();

    assert_eq!(err.code(), "io_error");
    assert_eq!(scheduler.document_count(), 0);

    let completed = transport.completed();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.in_flight(), 0, "attempts outlived the run");
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(transport.completed(), completed);
}

#[tokio::test]
async fn tampered_copies_are_skipped() {
    let tree = tree();
    let transport = Arc::new(MockTransport::new());
    for doc in [&tree.root, &tree.sub, &tree.appended, &tree.a, &tree.b, &tree.c, &tree.d] {
        transport.serve_tampered("http://m1/", doc);
        transport.serve("http://m2/", doc);
    }

    let mut config = config(TWO);
    config.fetch.collect_report = true;
    let scheduler = scheduler_with(&config, &transport).await;
    let mut sink = MemorySink::new();
    scheduler.run(&tree.root.uri, true, false, &mut sink).await.unwrap();

    assert_eq!(sink.documents, vec![tree.a, tree.b, tree.c, tree.d]);
    let failures = scheduler.report().unwrap().failures().await;
    assert!(failures.iter().all(|f| f.server == "http://m1/"));
    assert!(failures.iter().all(|f| f.code == "verification_failed"));
}

#[tokio::test]
async fn progress_and_finish_events_are_broadcast() {
    let (root, elements) = wide_index("progress", 5);
    let transport = Arc::new(MockTransport::new());
    transport.serve_everywhere(&root);
    for element in &elements {
        transport.serve_everywhere(element);
    }

    let mut config = config(TWO);
    config.fetch.progress_interval = 2;
    let scheduler = scheduler_with(&config, &transport).await;
    let mut events = scheduler.subscribe();
    scheduler
        .run(&root.uri, true, false, &mut MemorySink::new())
        .await
        .unwrap();

    let mut progress = Vec::new();
    let mut finished = None;
    let mut queued = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            Event::Progress { count } => progress.push(count),
            Event::RunFinished { count } => finished = Some(count),
            Event::TaskQueued { .. } => queued += 1,
            _ => {}
        }
    }
    assert_eq!(progress, vec![2, 4]);
    assert_eq!(finished, Some(5));
    assert_eq!(queued, 6);
}

#[tokio::test]
async fn document_count_accumulates_across_runs() {
    let tree = tree();
    let transport = Arc::new(MockTransport::new());
    serve_tree(&transport, &tree);

    let scheduler = scheduler(TWO, &transport).await;
    let counter = scheduler.document_counter();
    let first = scheduler
        .run(&tree.sub.uri, true, false, &mut MemorySink::new())
        .await
        .unwrap();
    let second = scheduler
        .run(&tree.root.uri, true, false, &mut MemorySink::new())
        .await
        .unwrap();

    assert_eq!((first, second), (1, 4));
    assert_eq!(scheduler.document_count(), 5);
    assert_eq!(counter.load(Ordering::Relaxed), 5);
}

#[tokio::test]
async fn malformed_root_is_rejected_before_any_request() {
    let transport = Arc::new(MockTransport::new());
    let scheduler = scheduler(TWO, &transport).await;

    let err = scheduler
        .run("RAnot-long-enough", true, false, &mut MemorySink::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_identifier");
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn empty_directory_is_rejected() {
    let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
    let directory = StaticDirectory::new(Vec::<String>::new());
    let err = FetchScheduler::new(&config(TWO), &directory, transport)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::NoServers));
}

#[tokio::test]
async fn explicit_directory_needs_no_configured_sources() {
    let tree = tree();
    let transport = Arc::new(MockTransport::new());
    serve_tree(&transport, &tree);

    let directory = StaticDirectory::new(TWO.iter().copied());
    let scheduler = FetchScheduler::new(&Config::default(), &directory, transport.clone())
        .await
        .unwrap();
    assert_eq!(scheduler.servers().len(), 2);

    let count = scheduler
        .run(&tree.root.uri, true, false, &mut MemorySink::new())
        .await
        .unwrap();
    assert_eq!(count, 4);
}

#[tokio::test]
async fn explicit_directory_still_checks_fetch_settings() {
    let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
    let directory = StaticDirectory::new(TWO.iter().copied());
    let mut config = Config::default();
    config.fetch.max_parallel_requests_per_server = 0;

    let err = FetchScheduler::new(&config, &directory, transport)
        .await
        .err()
        .unwrap();
    assert_eq!(err.code(), "config_error");
}
