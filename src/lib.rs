//! # nanopub-fetch
//!
//! Fetch content-addressed nanopublications from a pool of mirror servers.
//!
//! ## Design Philosophy
//!
//! nanopub-fetch is designed to be:
//! - **Verifying** - Every document is checked against the artifact code it was requested by
//! - **Order-preserving** - Index traversals emit documents in breadth-first order,
//!   however the network completes
//! - **Polite** - At most five requests are in flight against any one mirror
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use nanopub_fetch::{Config, FetchScheduler, ServerConfig, SingleFetcher, StreamSink, Format};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         servers: vec![
//!             ServerConfig::new("https://np.knowledgepixels.com/"),
//!             ServerConfig::new("https://server.np.trustyuri.net/"),
//!         ],
//!         ..Default::default()
//!     };
//!
//!     // One document
//!     let fetcher = SingleFetcher::from_config(&config)?;
//!     if let Some(doc) = fetcher.resolve("RAq2mGxm5lsQ6ACPpFgOuFDpq-2_LPsL-pwPbYuW3T1Lk").await? {
//!         println!("{} has {} statements", doc.uri, doc.quads.len());
//!     }
//!
//!     // A whole index, with its content
//!     let scheduler = FetchScheduler::from_config(&config).await?;
//!     let mut events = scheduler.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!     let mut sink = StreamSink::stdout(Format::NQuads);
//!     let count = scheduler
//!         .run("RAq2mGxm5lsQ6ACPpFgOuFDpq-2_LPsL-pwPbYuW3T1Lk", true, false, &mut sink)
//!         .await?;
//!     eprintln!("{count} nanopubs");
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Mirror server discovery
pub mod directory;
/// Nanopublication and index model
pub mod document;
/// Error types
pub mod error;
/// Single-document lookup
pub mod fetcher;
/// Serialization formats
pub mod format;
/// Artifact codes and identifier normalization
pub mod identifier;
/// Output sinks
pub mod output;
/// Retry logic with exponential backoff
pub mod retry;
/// Ordered, concurrent index traversal
pub mod scheduler;
/// Single requests against one mirror
pub mod transport;
/// Content-address computation and verification
pub mod trusty;
/// Core types and events
pub mod types;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use config::{Config, DirectoryConfig, FetchConfig, RetryConfig, ServerConfig};
pub use directory::{
    BootstrapDirectory, ServerDirectory, ServerInfo, StaticDirectory, directory_from_config,
};
pub use document::{Document, DocumentKind, IndexDocument, Quad, Term};
pub use error::{AttemptError, Error, ParseError, Result};
pub use fetcher::SingleFetcher;
pub use format::Format;
pub use identifier::ArtifactCode;
pub use output::{MemorySink, OutputSink, StreamSink, open_output};
pub use scheduler::FetchScheduler;
pub use transport::{HttpTransport, Transport};
pub use types::{AttemptFailure, Event, FetchReport};

/// Wait for a termination signal.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// Race it against a fetch with `tokio::select!` to stop cleanly; dropping
/// the fetch future cancels its outstanding requests.
#[cfg(unix)]
pub async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

/// Wait for a termination signal (Ctrl+C).
#[cfg(not(unix))]
pub async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
