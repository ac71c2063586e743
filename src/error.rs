//! Error types for nanopub-fetch
//!
//! This module provides the error handling for the library:
//! - [`Error`] for fatal, caller-visible failures (bad input, exhausted mirrors, I/O)
//! - [`AttemptError`] for a single request against a single mirror, which the
//!   fetch paths recover from by moving on to the next mirror
//! - [`ParseError`] for payloads that cannot be read as a document
//! - Machine-readable error codes for reports and diagnostics

use thiserror::Error;

/// Result type alias for nanopub-fetch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for nanopub-fetch
///
/// Each variant carries the identifier, URI or setting involved so that a
/// diagnostic printed at the top level is enough to locate the problem.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "fetch.read_timeout")
        key: Option<String>,
    },

    /// Input is neither a well-formed content-addressed URI nor a bare artifact code
    #[error("invalid identifier {input:?}: {reason}")]
    InvalidIdentifier {
        /// The rejected input, verbatim
        input: String,
        /// Why it was rejected
        reason: String,
    },

    /// The mirror directory yielded no servers
    #[error("no mirror servers available")]
    NoServers,

    /// Every known mirror was tried for a queued document without success
    #[error("nanopub not found: {identifier} (tried {tried} servers)")]
    ServersExhausted {
        /// Artifact code of the unreachable document
        identifier: String,
        /// Number of mirrors that were asked
        tried: usize,
    },

    /// A document requested as an index has no index structure
    #[error("not an index: {0}")]
    NotAnIndex(String),

    /// An index declares its structure inconsistently
    #[error("malformed index {uri}: {reason}")]
    MalformedIndex {
        /// URI of the offending index
        uri: String,
        /// What is wrong with it
        reason: String,
    },

    /// An index includes or appends one of its own ancestors
    #[error("index cycle detected at {0}")]
    IndexCycle(String),

    /// Payload could not be parsed
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// I/O error (output stream, config file)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error outside a mirror attempt (e.g. bootstrap peer lists)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A fetch worker panicked or was cancelled
    #[error("fetch task failed: {0}")]
    TaskFailed(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Failure of one request against one mirror.
///
/// These are swallowed by the fetch paths, which simply try another mirror.
/// They only become visible through the attempt report and `AttemptFailed` events.
#[derive(Debug, Error)]
pub enum AttemptError {
    /// Connection or protocol failure
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Mirror answered with a non-2xx status
    #[error("unexpected status {code}")]
    Status {
        /// HTTP status code returned by the mirror
        code: u16,
    },

    /// Request exceeded its deadline
    #[error("request timed out")]
    Timeout,

    /// Response body is not a readable document
    #[error("unreadable response: {0}")]
    Parse(#[from] ParseError),

    /// Document does not match its content address
    #[error("verification failed: {reason}")]
    Verification {
        /// Why the document was rejected
        reason: String,
    },
}

/// Document payload parse errors
#[derive(Debug, Error)]
pub enum ParseError {
    /// Malformed N-Quads statement
    #[error("line {line}: {message}")]
    Syntax {
        /// 1-based line number
        line: usize,
        /// What was expected
        message: String,
    },

    /// No subject is typed as a nanopublication
    #[error("no nanopublication URI found")]
    MissingNanopubUri,

    /// Malformed JSON document
    #[error("invalid JSON document: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload is not UTF-8
    #[error("payload is not valid UTF-8")]
    Utf8,
}

impl Error {
    /// Machine-readable error code, stable across releases
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::InvalidIdentifier { .. } => "invalid_identifier",
            Error::NoServers => "no_servers",
            Error::ServersExhausted { .. } => "servers_exhausted",
            Error::NotAnIndex(_) => "not_an_index",
            Error::MalformedIndex { .. } => "malformed_index",
            Error::IndexCycle(_) => "index_cycle",
            Error::Parse(_) => "parse_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::TaskFailed(_) => "task_failed",
            Error::Other(_) => "internal_error",
        }
    }

    /// Shorthand for a configuration error on a specific key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

impl AttemptError {
    /// Machine-readable error code, stable across releases
    pub fn code(&self) -> &'static str {
        match self {
            AttemptError::Transport(_) => "transport_error",
            AttemptError::Status { .. } => "bad_status",
            AttemptError::Timeout => "timeout",
            AttemptError::Parse(_) => "parse_error",
            AttemptError::Verification { .. } => "verification_failed",
        }
    }
}
