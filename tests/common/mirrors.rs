//! Mock mirror servers backed by wiremock

use super::fixtures::code;
use nanopub_fetch::{Config, Document, Format, ServerConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Serialize a document the way a mirror would send it
pub fn body(doc: &Document, format: Format) -> Vec<u8> {
    let mut out = Vec::new();
    format.write(doc, &mut out).expect("write to vec");
    out
}

/// Serve `doc` as N-Quads at `/<code>`
pub async fn serve(server: &MockServer, doc: &Document) {
    Mock::given(method("GET"))
        .and(path(format!("/{}", code(doc))))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/n-quads")
                .set_body_bytes(body(doc, Format::NQuads)),
        )
        .mount(server)
        .await;
}

/// Serve a modified copy of `doc` that no longer matches its code
pub async fn serve_tampered(server: &MockServer, doc: &Document) {
    let mut text = String::from_utf8(body(doc, Format::NQuads)).expect("utf-8");
    text.push_str(&format!(
        "<{uri}#assertion> <http://www.w3.org/2000/01/rdf-schema#comment> \"forged\" <{uri}#assertion> .\n",
        uri = doc.uri
    ));
    Mock::given(method("GET"))
        .and(path(format!("/{}", code(doc))))
        .respond_with(ResponseTemplate::new(200).set_body_string(text))
        .mount(server)
        .await;
}

/// Start `n` empty mirrors
pub async fn start_mirrors(n: usize) -> Vec<MockServer> {
    let mut servers = Vec::with_capacity(n);
    for _ in 0..n {
        servers.push(MockServer::start().await);
    }
    servers
}

/// Configuration pointing at the given mirrors, tried in order
pub fn config_for(mirrors: &[MockServer]) -> Config {
    let mut config = Config {
        servers: mirrors
            .iter()
            .map(|m| ServerConfig::new(format!("{}/", m.uri())))
            .collect(),
        ..Config::default()
    };
    config.fetch.shuffle_servers = false;
    config
}
