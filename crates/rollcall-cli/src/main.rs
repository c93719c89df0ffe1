use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::reconcile::{self as pipeline, Scored};
use rollcall_core::{
    ErrorBody, ErrorClass, MatchAlgorithm, MatchConfig, MatchRequest, PreparedRequest,
    ReconcileError, ReconciliationReport,
};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

/// Exit status when a request is rejected by validation or integrity checks.
const EXIT_REJECTED: i32 = 2;

#[derive(Parser)]
#[command(name = "rollcall", about = "Match detected face embeddings against a class roster")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile one request and print the report
    Match {
        /// Request JSON file ("-" or omitted reads stdin)
        #[arg(short, long)]
        request: Option<PathBuf>,
        /// Override the request's matching algorithm (greedy-v1, optimal-v1)
        #[arg(short, long)]
        algorithm: Option<MatchAlgorithm>,
        /// Override the request's similarity threshold
        #[arg(short, long)]
        threshold: Option<f32>,
        /// Pretty-print the report
        #[arg(long)]
        pretty: bool,
    },
    /// Reconcile independent requests concurrently, one JSON line per file
    Batch {
        /// Request JSON files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the attendance tier for a similarity score
    Classify {
        #[arg(allow_negative_numbers = true)]
        score: f32,
    },
    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    tracing::debug!(source = ?config.source, "configuration loaded");

    match cli.command {
        Commands::Match {
            request,
            algorithm,
            threshold,
            pretty,
        } => {
            let mut req = match read_request(request.as_deref()) {
                Ok(req) => req,
                Err(err) => {
                    eprintln!("{}", serde_json::to_string(&err)?);
                    std::process::exit(EXIT_REJECTED);
                }
            };
            if algorithm.is_some() {
                req.algorithm = algorithm;
            }
            if threshold.is_some() {
                req.threshold = threshold;
            }

            match run_one(req, &config) {
                Ok(report) => {
                    let out = if pretty {
                        serde_json::to_string_pretty(&report)?
                    } else {
                        serde_json::to_string(&report)?
                    };
                    println!("{out}");
                }
                Err(err) => {
                    eprintln!("{}", serde_json::to_string(&CliError::from(&err))?);
                    std::process::exit(EXIT_REJECTED);
                }
            }
        }
        Commands::Batch { files } => {
            let rejected = run_batch(files, &config, &mut std::io::stdout()).await?;
            if rejected > 0 {
                tracing::warn!(rejected, "some requests were not reconciled");
                std::process::exit(EXIT_REJECTED);
            }
        }
        Commands::Classify { score } => {
            println!("{}", config.matching.tiers.classify(score));
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

/// Read a request from a file, or stdin for `None` and `-`.
fn read_request(path: Option<&Path>) -> Result<MatchRequest, CliError> {
    let text = match path {
        None => read_stdin(),
        Some(p) if p == Path::new("-") => read_stdin(),
        Some(p) => std::fs::read_to_string(p)
            .map_err(|e| CliError::other("io", format!("reading request {}: {e}", p.display()))),
    }?;
    parse_request(&text)
}

fn read_stdin() -> Result<String, CliError> {
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .map_err(|e| CliError::other("io", format!("reading request from stdin: {e}")))?;
    Ok(text)
}

fn parse_request(text: &str) -> Result<MatchRequest, CliError> {
    MatchRequest::from_json(text).map_err(|e| CliError::other("malformed_request", e.to_string()))
}

fn run_one(req: MatchRequest, config: &Config) -> Result<ReconciliationReport, ReconcileError> {
    let prepared = req.prepare_with(config.default_threshold, config.default_algorithm)?;
    pipeline::reconcile_prepared(&prepared, &config.matching)
}

/// One line of `batch` output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchLine {
    file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<ReconciliationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<CliError>,
}

/// Error body printed on stderr by `match` and embedded in `batch` lines.
#[derive(Debug, Serialize)]
struct CliError {
    kind: &'static str,
    /// Absent for failures before the request reached the core (I/O, JSON, timeout).
    #[serde(skip_serializing_if = "Option::is_none")]
    class: Option<ErrorClass>,
    message: String,
}

impl CliError {
    fn other(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            class: None,
            message: message.into(),
        }
    }
}

impl From<&ReconcileError> for CliError {
    fn from(err: &ReconcileError) -> Self {
        let body = ErrorBody::from(err);
        Self {
            kind: body.kind,
            class: Some(body.class),
            message: body.message,
        }
    }
}

/// Reconcile every file concurrently and write one JSON line per file to
/// `out`, in argument order. Returns the number of files that produced an error.
async fn run_batch(files: Vec<PathBuf>, config: &Config, out: &mut impl Write) -> Result<usize> {
    let permits = Arc::new(Semaphore::new(config.batch_concurrency));
    let timeout = Duration::from_millis(config.score_timeout_ms);

    let handles: Vec<_> = files
        .into_iter()
        .map(|file| {
            let permits = Arc::clone(&permits);
            let defaults = (config.default_threshold, config.default_algorithm);
            let matching = config.matching;
            tokio::spawn(async move {
                let _permit = permits.acquire_owned().await;
                let outcome = process_file(&file, defaults, matching, timeout).await;
                (file, outcome)
            })
        })
        .collect();

    let mut rejected = 0;
    for handle in handles {
        let (file, outcome) = handle.await.context("batch task panicked")?;
        let file = file.display().to_string();
        let line = match outcome {
            Ok(report) => BatchLine {
                file,
                report: Some(report),
                error: None,
            },
            Err(error) => {
                rejected += 1;
                BatchLine {
                    file,
                    report: None,
                    error: Some(error),
                }
            }
        };
        writeln!(out, "{}", serde_json::to_string(&line)?)?;
    }

    Ok(rejected)
}

async fn process_file(
    file: &Path,
    (default_threshold, default_algorithm): (f32, MatchAlgorithm),
    matching: MatchConfig,
    timeout: Duration,
) -> Result<ReconciliationReport, CliError> {
    let text = tokio::fs::read_to_string(file)
        .await
        .map_err(|e| CliError::other("io", e.to_string()))?;
    let prepared = parse_request(&text)?
        .prepare_with(default_threshold, default_algorithm)
        .map_err(|e| CliError::from(&e))?;

    let (prepared, scored) = score_with_timeout(prepared, matching, timeout).await?;

    // Resolution is sequential and runs to completion once scores exist.
    Ok(pipeline::resolve(&prepared, &scored, &matching))
}

/// Run validation and scoring on the blocking pool, bounded by `timeout`.
async fn score_with_timeout(
    prepared: PreparedRequest,
    matching: MatchConfig,
    timeout: Duration,
) -> Result<(PreparedRequest, Scored), CliError> {
    let task = tokio::task::spawn_blocking(move || {
        let scored = pipeline::score(&prepared, &matching);
        (prepared, scored)
    });

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok((prepared, Ok(scored)))) => Ok((prepared, scored)),
        Ok(Ok((_, Err(e)))) => Err(CliError::from(&e)),
        Ok(Err(join)) => Err(CliError::other(
            "internal",
            format!("scoring task failed: {join}"),
        )),
        Err(_) => {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "scoring timed out");
            Err(CliError::other(
                "timeout",
                format!("scoring exceeded {} ms", timeout.as_millis()),
            ))
        }
    }
}
