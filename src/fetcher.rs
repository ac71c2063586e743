//! Single-document lookup: walk the mirrors one at a time until one answers
//! with a verified document.

use crate::config::{Config, FetchConfig};
use crate::directory::{ServerDirectory, ServerInfo, directory_from_config};
use crate::document::Document;
use crate::error::{AttemptError, Error, Result};
use crate::format::Format;
use crate::identifier::ArtifactCode;
use crate::transport::{HttpTransport, Transport};
use crate::trusty;
use crate::types::{AttemptFailure, FetchReport};
use rand::seq::SliceRandom;
use std::sync::Arc;

/// One attempt: fetch `code` from `server`, parse it and check its content address
///
/// A document that verifies but carries a different code than requested is
/// rejected like any other bad payload.
pub(crate) async fn fetch_from(
    transport: &dyn Transport,
    server: &ServerInfo,
    code: &ArtifactCode,
    format: Format,
) -> std::result::Result<Document, AttemptError> {
    let body = transport
        .fetch(&server.document_url(code.as_str()), format)
        .await?;
    let doc = format.parse(&body)?;

    if !trusty::is_valid_content_addressed(&doc) {
        return Err(AttemptError::Verification {
            reason: format!("content does not match {}", doc.uri),
        });
    }
    match doc.artifact_code() {
        Some(found) if found == *code => Ok(doc),
        Some(found) => Err(AttemptError::Verification {
            reason: format!("asked for {code}, got {found}"),
        }),
        None => Err(AttemptError::Verification {
            reason: format!("no artifact code in {}", doc.uri),
        }),
    }
}

/// Order mirrors for one lookup
pub(crate) fn mirror_order(mut servers: Vec<ServerInfo>, shuffle: bool) -> Vec<ServerInfo> {
    if shuffle {
        servers.shuffle(&mut rand::thread_rng());
    }
    servers
}

/// Resolves one identifier at a time against the mirror pool
///
/// The server list is read from the directory on every lookup, so a
/// long-lived fetcher follows changes in a bootstrap peer list.
pub struct SingleFetcher {
    directory: Arc<dyn ServerDirectory>,
    transport: Arc<dyn Transport>,
    config: FetchConfig,
    report: Option<FetchReport>,
}

impl SingleFetcher {
    /// Create a fetcher over explicit collaborators
    ///
    /// A report is kept when `config.fetch.collect_report` is set.
    pub fn new(
        config: &Config,
        directory: Arc<dyn ServerDirectory>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            directory,
            transport,
            config: config.fetch.clone(),
            report: config.fetch.collect_report.then(FetchReport::new),
        }
    }

    /// Create a fetcher that talks HTTP to the mirrors named by `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let directory = directory_from_config(config)?;
        let transport = Arc::new(HttpTransport::new(&config.fetch)?);
        Ok(Self::new(config, directory, transport))
    }

    /// Record failures into `report` instead of a private one
    pub fn with_report(mut self, report: FetchReport) -> Self {
        self.report = Some(report);
        self
    }

    /// Suppressed attempt failures, when report collection is on
    pub fn report(&self) -> Option<&FetchReport> {
        self.report.as_ref()
    }

    /// Fetch one document by URI or bare artifact code
    ///
    /// Returns `Ok(None)` when no mirror produced a verified copy. Errors are
    /// reserved for malformed input and an unusable directory; per-mirror
    /// failures are never returned.
    pub async fn resolve(&self, input: &str) -> Result<Option<Document>> {
        let code = ArtifactCode::parse(input)?;

        let servers = self.directory.list_servers().await?;
        if servers.is_empty() {
            return Err(Error::NoServers);
        }

        for server in mirror_order(servers, self.config.shuffle_servers) {
            tracing::debug!(identifier = %code, server = %server, "Trying mirror");
            match fetch_from(self.transport.as_ref(), &server, &code, self.config.wire_format).await
            {
                Ok(doc) => {
                    tracing::debug!(identifier = %code, server = %server, "Resolved");
                    return Ok(Some(doc));
                }
                Err(e) => {
                    tracing::debug!(identifier = %code, server = %server, error = %e, "Mirror attempt failed");
                    if let Some(report) = &self.report {
                        report
                            .record(AttemptFailure::new(code.as_str(), &server.public_url, &e))
                            .await;
                    }
                }
            }
        }

        tracing::info!(identifier = %code, "Not found on any mirror");
        Ok(None)
    }
}
