//! Mirror directory: where the list of servers comes from.
//!
//! A [`ServerDirectory`] is asked for its servers once per scheduler run and
//! once per single lookup. [`StaticDirectory`] serves a fixed list from the
//! configuration; [`BootstrapDirectory`] asks bootstrap servers for their
//! peer lists.

use crate::config::{Config, DirectoryConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::retry::with_retry;
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;

/// One mirror server
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerInfo {
    /// Base URL ending in `/`; artifact codes are appended to it directly.
    /// Also the stable key of the server within a run.
    pub public_url: String,
}

impl ServerInfo {
    /// Create a server entry, adding the trailing `/` when missing
    pub fn new(public_url: impl Into<String>) -> Self {
        let mut public_url = public_url.into();
        if !public_url.ends_with('/') {
            public_url.push('/');
        }
        Self { public_url }
    }

    /// URL of a document on this server
    pub fn document_url(&self, artifact_code: &str) -> String {
        format!("{}{}", self.public_url, artifact_code)
    }
}

impl std::fmt::Display for ServerInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.public_url)
    }
}

/// Source of mirror servers
#[async_trait]
pub trait ServerDirectory: Send + Sync {
    /// Current list of mirrors, without duplicates
    async fn list_servers(&self) -> Result<Vec<ServerInfo>>;
}

/// Fixed list of mirrors
#[derive(Clone, Debug)]
pub struct StaticDirectory {
    servers: Vec<ServerInfo>,
}

impl StaticDirectory {
    /// Create a directory from base URLs, dropping repeats
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut servers = Vec::new();
        push_unique(&mut servers, &mut HashSet::new(), urls.into_iter().map(ServerInfo::new));
        Self { servers }
    }
}

#[async_trait]
impl ServerDirectory for StaticDirectory {
    async fn list_servers(&self) -> Result<Vec<ServerInfo>> {
        Ok(self.servers.clone())
    }
}

/// Mirrors discovered through bootstrap servers
///
/// Each bootstrap server is asked for `<bootstrap><peers_path>`, a plain text
/// list with one URL per line. Bootstrap servers are queried concurrently and
/// transient failures are retried with backoff. A bootstrap server that stays
/// unreachable is skipped with a warning; the answers of the others are merged
/// in order of first appearance.
#[derive(Clone, Debug)]
pub struct BootstrapDirectory {
    client: reqwest::Client,
    directory: DirectoryConfig,
    retry: RetryConfig,
}

impl BootstrapDirectory {
    /// Create a bootstrap directory using the timeouts and user agent of `config`
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.fetch.connect_timeout)
            .timeout(config.fetch.read_timeout)
            .user_agent(config.fetch.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            directory: config.directory.clone(),
            retry: config.retry.clone(),
        })
    }

    async fn fetch_peers(&self, bootstrap: &ServerInfo) -> Result<Vec<ServerInfo>> {
        let url = format!("{}{}", bootstrap.public_url, self.directory.peers_path);
        let client = &self.client;
        let url = url.as_str();
        let body = with_retry(&self.retry, || async move {
            let response = client.get(url).send().await?.error_for_status()?;
            Ok::<_, Error>(response.text().await?)
        })
        .await?;
        Ok(parse_peer_list(&body))
    }
}

#[async_trait]
impl ServerDirectory for BootstrapDirectory {
    async fn list_servers(&self) -> Result<Vec<ServerInfo>> {
        let bootstraps: Vec<ServerInfo> = self
            .directory
            .bootstrap_urls
            .iter()
            .map(ServerInfo::new)
            .collect();

        let answers = join_all(bootstraps.iter().map(|b| self.fetch_peers(b))).await;

        let mut servers = Vec::new();
        let mut seen = HashSet::new();
        if self.directory.include_bootstrap {
            push_unique(&mut servers, &mut seen, bootstraps.iter().cloned());
        }
        for (bootstrap, answer) in bootstraps.iter().zip(answers) {
            match answer {
                Ok(peers) => {
                    tracing::debug!(bootstrap = %bootstrap, peers = peers.len(), "Received peer list");
                    push_unique(&mut servers, &mut seen, peers);
                }
                Err(e) => {
                    tracing::warn!(bootstrap = %bootstrap, error = %e, "Could not refresh peer list");
                }
            }
        }

        if servers.is_empty() {
            return Err(Error::NoServers);
        }
        Ok(servers)
    }
}

/// Pick the directory the configuration asks for
///
/// Static servers take precedence; bootstrap discovery is used only when none are given.
pub fn directory_from_config(config: &Config) -> Result<Arc<dyn ServerDirectory>> {
    if !config.servers.is_empty() {
        return Ok(Arc::new(StaticDirectory::new(
            config.servers.iter().map(|s| s.public_url.clone()),
        )));
    }
    if config.directory.bootstrap_urls.is_empty() {
        return Err(Error::NoServers);
    }
    Ok(Arc::new(BootstrapDirectory::new(config)?))
}

/// Parse a peer list: one URL per line, blank lines and `#` comments ignored
fn parse_peer_list(body: &str) -> Vec<ServerInfo> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| match url::Url::parse(line) {
            Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
            Err(_) => {
                tracing::debug!(line = %line, "Ignoring malformed peer entry");
                false
            }
        })
        .map(ServerInfo::new)
        .collect()
}

fn push_unique(
    servers: &mut Vec<ServerInfo>,
    seen: &mut HashSet<String>,
    candidates: impl IntoIterator<Item = ServerInfo>,
) {
    for server in candidates {
        if seen.insert(server.public_url.clone()) {
            servers.push(server);
        }
    }
}
