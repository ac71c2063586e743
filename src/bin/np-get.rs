//! np-get - download nanopublications and nanopublication indexes

use clap::Parser;
use nanopub_fetch::{
    Config, FetchReport, FetchScheduler, Format, OutputSink, Result, ServerConfig, SingleFetcher,
    StreamSink, open_output,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "np-get", version)]
#[command(about = "Download nanopublications from mirror servers")]
#[command(after_help = "\
EXAMPLES:
  np-get RAq2mGxm5lsQ6ACPpFgOuFDpq-2_LPsL-pwPbYuW3T1Lk
  np-get -c -o content.nq.gz http://purl.org/np/RA...   # everything an index lists
  np-get -i -r http://purl.org/np/RA...                  # the index documents only")]
struct Cli {
    /// Nanopublication URIs or artifact codes
    #[arg(required = true, value_name = "ID")]
    ids: Vec<String>,

    /// Output format: nq or json (default: from the output file name, else nq)
    #[arg(short, long, value_name = "FORMAT", value_parser = parse_format)]
    format: Option<Format>,

    /// Output file (`.gz` is compressed); stdout when omitted
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Treat the ids as indexes and write the index documents
    #[arg(short = 'i', long = "index")]
    write_index: bool,

    /// Treat the ids as indexes and write their content
    #[arg(short = 'c', long = "content")]
    expand_content: bool,

    /// Print the suppressed mirror failures at the end
    #[arg(short, long)]
    report: bool,

    /// Mirror server URL (repeatable)
    #[arg(short = 's', long = "server", value_name = "URL")]
    servers: Vec<String>,

    /// Bootstrap server URL used to discover mirrors (repeatable)
    #[arg(short = 'b', long = "bootstrap", value_name = "URL")]
    bootstraps: Vec<String>,

    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn parse_format(name: &str) -> std::result::Result<Format, String> {
    Format::from_name(name).ok_or_else(|| format!("unknown format {name:?} (expected nq or json)"))
}

fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::WARN.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match execute(&cli, nanopub_fetch::wait_for_signal()).await {
        Ok(Outcome::Complete) => ExitCode::SUCCESS,
        Ok(Outcome::Missing) => ExitCode::FAILURE,
        Ok(Outcome::Interrupted) => {
            eprintln!("Interrupted");
            ExitCode::from(130)
        }
        Err(e) => {
            tracing::error!(error = %e, code = e.code(), "Fetch failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// How an invocation ended, short of an error
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Complete,
    /// Some single lookup found nothing
    Missing,
    Interrupted,
}

fn build_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };
    if !cli.servers.is_empty() {
        config.servers = cli.servers.iter().map(ServerConfig::new).collect();
    }
    if !cli.bootstraps.is_empty() {
        config.directory.bootstrap_urls = cli.bootstraps.clone();
    }
    config.fetch.collect_report |= cli.report;
    config.validate()?;
    Ok(config)
}

/// Fetch everything `cli` asks for until done or `shutdown` fires
///
/// The output is finished in every case, so an interrupted `.gz` file is
/// still a complete gzip stream.
async fn execute(cli: &Cli, shutdown: impl Future<Output = ()>) -> Result<Outcome> {
    let config = build_config(cli)?;
    let mut sink = open_output(cli.output.as_deref(), cli.format)?;

    if cli.write_index || cli.expand_content {
        let scheduler = FetchScheduler::from_config(&config).await?;
        let progress = tokio::spawn(print_progress(scheduler.subscribe()));

        let fetched = tokio::select! {
            result = traverse_each(&scheduler, cli, &mut sink) => Some(result),
            () = shutdown => None,
        };
        // Whatever was written before an abort stays written
        sink.finish()?;
        progress.abort();

        eprintln!("{} nanopubs retrieved and saved", scheduler.document_count());
        if cli.report {
            print_report(scheduler.report()).await;
        }
        match fetched {
            Some(result) => result.map(|()| Outcome::Complete),
            None => Ok(Outcome::Interrupted),
        }
    } else {
        let fetcher = SingleFetcher::from_config(&config)?;
        let fetched = tokio::select! {
            result = fetch_each(&fetcher, &cli.ids, &mut sink) => Some(result),
            () = shutdown => None,
        };
        sink.finish()?;
        if cli.report {
            print_report(fetcher.report()).await;
        }
        match fetched {
            Some(Ok(true)) => Ok(Outcome::Complete),
            Some(Ok(false)) => Ok(Outcome::Missing),
            Some(Err(e)) => Err(e),
            None => Ok(Outcome::Interrupted),
        }
    }
}

async fn traverse_each(scheduler: &FetchScheduler, cli: &Cli, sink: &mut StreamSink) -> Result<()> {
    for id in &cli.ids {
        scheduler
            .run(id, cli.expand_content, cli.write_index, sink)
            .await?;
    }
    Ok(())
}

async fn fetch_each(fetcher: &SingleFetcher, ids: &[String], sink: &mut StreamSink) -> Result<bool> {
    let mut all_found = true;
    for id in ids {
        match fetcher.resolve(id).await? {
            Some(doc) => sink.emit(&doc)?,
            None => {
                eprintln!("NOT FOUND: {id}");
                all_found = false;
            }
        }
    }
    Ok(all_found)
}

async fn print_progress(mut events: tokio::sync::broadcast::Receiver<nanopub_fetch::Event>) {
    loop {
        match events.recv().await {
            Ok(nanopub_fetch::Event::Progress { count }) => eprintln!("{count} nanopubs..."),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Progress printer lagging behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn print_report(report: Option<&FetchReport>) {
    let Some(report) = report else {
        return;
    };
    let failures = report.failures().await;
    eprintln!("{} suppressed mirror failures", failures.len());
    for failure in failures {
        eprintln!(
            "  {} [{}] {} @ {}: {}",
            failure.at.format("%H:%M:%S"),
            failure.code,
            failure.identifier,
            failure.server,
            failure.error
        );
    }
}

#[cfg(test)]
#[path = "../../tests/common/mod.rs"]
mod common;
