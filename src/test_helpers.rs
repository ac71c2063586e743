//! Shared fixtures for unit tests: sealed documents and an in-memory mirror pool.

use crate::document::{
    APPENDS_INDEX, Document, INCLUDES_ELEMENT, INCLUDES_SUBINDEX, NANOPUB_INDEX, NANOPUBLICATION,
    Quad, RDF_TYPE, Term,
};
use crate::error::AttemptError;
use crate::format::Format;
use crate::identifier::ARTIFACT_CODE_LEN;
use crate::transport::Transport;
use crate::trusty;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

const PLACEHOLDER: &str = "RAPLACEHOLDER";
const EVERYWHERE: &str = "*";

fn template(label: &str) -> (String, Vec<Quad>) {
    let np = format!("http://purl.org/np/{PLACEHOLDER}");
    let quads = vec![
        Quad::iris(&np, RDF_TYPE, NANOPUBLICATION, Some(&format!("{np}#Head"))),
        Quad {
            subject: Term::iri(format!("{np}#assertion")),
            predicate: Term::iri("http://www.w3.org/2000/01/rdf-schema#label"),
            object: Term::literal(label),
            graph: Some(Term::iri(format!("{np}#assertion"))),
        },
    ];
    (np, quads)
}

/// A sealed leaf document; distinct labels give distinct codes
pub(crate) fn leaf(label: &str) -> Document {
    let (_, quads) = template(label);
    trusty::seal(quads, PLACEHOLDER).expect("fixture seals").1
}

/// A sealed index document
pub(crate) fn index(
    label: &str,
    elements: &[&Document],
    sub_indexes: &[&Document],
    appended: Option<&Document>,
) -> Document {
    let (np, mut quads) = template(label);
    let pubinfo = format!("{np}#pubinfo");
    let assertion = format!("{np}#assertion");
    quads.push(Quad::iris(&np, RDF_TYPE, NANOPUB_INDEX, Some(&pubinfo)));
    for element in elements {
        quads.push(Quad::iris(&np, INCLUDES_ELEMENT, &element.uri, Some(&assertion)));
    }
    for sub in sub_indexes {
        quads.push(Quad::iris(&np, INCLUDES_SUBINDEX, &sub.uri, Some(&assertion)));
    }
    if let Some(appended) = appended {
        quads.push(Quad::iris(&np, APPENDS_INDEX, &appended.uri, Some(&pubinfo)));
    }
    trusty::seal(quads, PLACEHOLDER).expect("fixture seals").1
}

/// Index referring to members by URI only, for documents that need not exist
pub(crate) fn index_of_uris(label: &str, elements: &[&str], sub_indexes: &[&str]) -> Document {
    let (np, mut quads) = template(label);
    let assertion = format!("{np}#assertion");
    quads.push(Quad::iris(&np, RDF_TYPE, NANOPUB_INDEX, Some(&format!("{np}#pubinfo"))));
    for element in elements {
        quads.push(Quad::iris(&np, INCLUDES_ELEMENT, element, Some(&assertion)));
    }
    for sub in sub_indexes {
        quads.push(Quad::iris(&np, INCLUDES_SUBINDEX, sub, Some(&assertion)));
    }
    trusty::seal(quads, PLACEHOLDER).expect("fixture seals").1
}

/// Index whose appended index is itself
pub(crate) fn self_appending_index(label: &str) -> Document {
    let (np, mut quads) = template(label);
    let pubinfo = format!("{np}#pubinfo");
    quads.push(Quad::iris(&np, RDF_TYPE, NANOPUB_INDEX, Some(&pubinfo)));
    quads.push(Quad::iris(&np, APPENDS_INDEX, &np, Some(&pubinfo)));
    trusty::seal(quads, PLACEHOLDER).expect("fixture seals").1
}

fn code_of(doc: &Document) -> String {
    doc.artifact_code().expect("fixture has a code").to_string()
}

#[derive(Default)]
struct MockState {
    documents: HashMap<(String, String), Document>,
    delays: HashMap<String, Duration>,
    calls: Vec<(String, String)>,
    in_flight: HashMap<String, usize>,
    high_water: HashMap<String, usize>,
    completed: usize,
}

/// In-memory mirror pool
///
/// Documents are registered per server (or on every server). Unknown
/// documents answer 404. Per-document latency lets tests control the order in
/// which attempts complete; concurrent requests per server are tracked.
#[derive(Default)]
pub(crate) struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Serve `doc` from `server`
    pub(crate) fn serve(&self, server: &str, doc: &Document) {
        self.serve_as(server, doc, doc);
    }

    /// Serve `doc` from every server
    pub(crate) fn serve_everywhere(&self, doc: &Document) {
        self.serve(EVERYWHERE, doc);
    }

    /// Answer requests for `requested` with `actual`
    pub(crate) fn serve_as(&self, server: &str, requested: &Document, actual: &Document) {
        let mut state = self.state.lock().unwrap();
        state
            .documents
            .insert((server.to_string(), code_of(requested)), actual.clone());
    }

    /// Serve a copy of `doc` whose content no longer matches its code
    pub(crate) fn serve_tampered(&self, server: &str, doc: &Document) {
        let mut tampered = doc.clone();
        tampered.quads.push(Quad {
            subject: Term::iri(format!("{}#assertion", doc.uri)),
            predicate: Term::iri("http://www.w3.org/2000/01/rdf-schema#comment"),
            object: Term::literal("injected"),
            graph: Some(Term::iri(format!("{}#assertion", doc.uri))),
        });
        self.serve_as(server, doc, &tampered);
    }

    /// Delay every answer for `doc`
    pub(crate) fn delay(&self, doc: &Document, latency: Duration) {
        self.state.lock().unwrap().delays.insert(code_of(doc), latency);
    }

    /// Every request so far as `(server, code)`, in arrival order
    pub(crate) fn calls(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Most requests ever in flight at once against any server
    pub(crate) fn max_concurrency(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.high_water.values().copied().max().unwrap_or(0)
    }

    /// Requests running right now, across all servers
    pub(crate) fn in_flight(&self) -> usize {
        self.state.lock().unwrap().in_flight.values().sum()
    }

    /// Requests that ran to the end of their latency
    pub(crate) fn completed(&self) -> usize {
        self.state.lock().unwrap().completed
    }

    fn begin(&self, server: &str, code: &str) -> (Option<Document>, Duration) {
        let mut state = self.state.lock().unwrap();
        state.calls.push((server.to_string(), code.to_string()));
        let now = {
            let entry = state.in_flight.entry(server.to_string()).or_default();
            *entry += 1;
            *entry
        };
        let peak = state.high_water.entry(server.to_string()).or_default();
        *peak = (*peak).max(now);

        let doc = state
            .documents
            .get(&(server.to_string(), code.to_string()))
            .or_else(|| state.documents.get(&(EVERYWHERE.to_string(), code.to_string())))
            .cloned();
        let latency = state.delays.get(code).copied().unwrap_or(Duration::from_millis(1));
        (doc, latency)
    }

    fn end(&self, server: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(count) = state.in_flight.get_mut(server) {
            *count -= 1;
        }
    }
}

/// Leaves the in-flight count when a request ends, including by cancellation
struct InFlight<'a> {
    transport: &'a MockTransport,
    server: &'a str,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.transport.end(self.server);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, url: &str, accept: Format) -> Result<Vec<u8>, AttemptError> {
        let split = url.len().saturating_sub(ARTIFACT_CODE_LEN);
        let (server, code) = url.split_at(split);

        let (doc, latency) = self.begin(server, code);
        let guard = InFlight {
            transport: self,
            server,
        };
        tokio::time::sleep(latency).await;
        self.state.lock().unwrap().completed += 1;
        drop(guard);

        let doc = doc.ok_or(AttemptError::Status { code: 404 })?;
        let mut body = Vec::new();
        accept.write(&doc, &mut body).expect("write to vec");
        Ok(body)
    }
}
