//! # Demoscope Import
//!
//! Batch importer for event-log files. Every file becomes one task: the file
//! is read asynchronously, then decoded and parsed on the blocking pool under
//! a per-file timeout. A broken file yields a [`FailedImport`] and never
//! affects its siblings.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use demoscope_core::{parse_match, DemoError, EngineConfig, Match, MatchLabel, ParseDiagnostics};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a single file could not be imported.
#[derive(Error, Debug)]
pub enum ImportError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Offending path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The engine rejected the log.
    #[error(transparent)]
    Engine(#[from] DemoError),

    /// Parsing did not finish within the configured budget.
    #[error("timed out after {0} ms")]
    Timeout(u64),

    /// The worker task panicked or was cancelled.
    #[error("import task failed: {0}")]
    Join(String),

    /// The importer configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Importer configuration, loadable from TOML.
///
/// ```toml
/// timeout_ms = 10000
/// max_concurrency = 8
/// source = "scrim-server"
///
/// [engine.timing]
/// tick_rate = 128
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Per-file parse budget in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Files parsed at the same time.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Source tag stamped on every imported match.
    #[serde(default = "default_source")]
    pub source: String,
    /// Engine tuning.
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_timeout_ms() -> u64 {
    30_000
}
fn default_max_concurrency() -> usize {
    4
}
fn default_source() -> String {
    "demoscope".to_string()
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_concurrency: default_max_concurrency(),
            source: default_source(),
            engine: EngineConfig::default(),
        }
    }
}

impl ImportConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ImportError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> Result<Self, ImportError> {
        toml::from_str(toml_str).map_err(|e| ImportError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ImportError> {
        let content = std::fs::read_to_string(path).map_err(|source| ImportError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// A successfully parsed file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedImport {
    /// Input file name.
    pub filename: String,
    /// The reconciled match.
    #[serde(rename = "match")]
    pub record: Match,
    /// Parse bookkeeping.
    pub diagnostics: ParseDiagnostics,
}

/// A file that could not be imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedImport {
    /// Input file name.
    pub filename: String,
    /// Human-readable cause.
    pub error_message: String,
}

/// Result for one input file.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ImportOutcome {
    /// The file parsed.
    Parsed(Box<ParsedImport>),
    /// The file failed.
    Failed(FailedImport),
}

impl ImportOutcome {
    /// Input file name.
    #[must_use]
    pub fn filename(&self) -> &str {
        match self {
            Self::Parsed(parsed) => &parsed.filename,
            Self::Failed(failed) => &failed.filename,
        }
    }

    fn failed(filename: String, error: &ImportError) -> Self {
        Self::Failed(FailedImport {
            filename,
            error_message: error.to_string(),
        })
    }
}

/// Outcomes of a batch, in input order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// One entry per input file.
    pub outcomes: Vec<ImportOutcome>,
}

impl BatchReport {
    /// Number of files that parsed.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ImportOutcome::Parsed(_)))
            .count()
    }

    /// Number of files that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

/// Import a single file.
///
/// The timeout bounds how long the caller waits. A parse that overruns keeps
/// its blocking thread until it finishes, but its result is discarded.
///
/// # Errors
/// Returns the [`ImportError`] describing why the file was rejected.
pub async fn import_file(
    path: &Path,
    config: &ImportConfig,
) -> Result<(Match, ParseDiagnostics), ImportError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| ImportError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let engine = config.engine.clone();
    let label = MatchLabel::generate(config.source.clone());

    let work = tokio::task::spawn_blocking(move || -> Result<_, ImportError> {
        let raw: Value = serde_json::from_slice(&bytes)?;
        Ok(parse_match(&raw, &engine, label)?)
    });

    match tokio::time::timeout(Duration::from_millis(config.timeout_ms), work).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(ImportError::Join(join.to_string())),
        Err(_) => Err(ImportError::Timeout(config.timeout_ms)),
    }
}

/// Import every file concurrently, at most `max_concurrency` at a time.
pub async fn import_files(paths: Vec<PathBuf>, config: Arc<ImportConfig>) -> BatchReport {
    let names: Vec<String> = paths.iter().map(|p| display_name(p)).collect();
    let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
    let mut tasks = JoinSet::new();

    info!(files = paths.len(), max_concurrency = config.max_concurrency, "Starting import");

    for (index, path) in paths.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let config = Arc::clone(&config);
        tasks.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => import_file(&path, &config).await,
                Err(closed) => Err(ImportError::Join(closed.to_string())),
            };
            (index, result)
        });
    }

    let mut slots: Vec<Option<ImportOutcome>> = vec![None; names.len()];
    while let Some(joined) = tasks.join_next().await {
        let (index, result) = match joined {
            Ok(done) => done,
            Err(e) => {
                warn!(error = %e, "Import task lost");
                continue;
            }
        };
        let filename = names[index].clone();
        let outcome = match result {
            Ok((record, diagnostics)) => {
                info!(
                    file = %filename,
                    rounds = record.rounds.len(),
                    us = record.score.us,
                    them = record.score.them,
                    skipped = diagnostics.records_skipped,
                    "Imported"
                );
                ImportOutcome::Parsed(Box::new(ParsedImport {
                    filename,
                    record,
                    diagnostics,
                }))
            }
            Err(e) => {
                warn!(file = %filename, error = %e, "Import failed");
                ImportOutcome::failed(filename, &e)
            }
        };
        slots[index] = Some(outcome);
    }

    let outcomes: Vec<ImportOutcome> = slots
        .into_iter()
        .zip(names)
        .map(|(slot, filename)| {
            slot.unwrap_or_else(|| {
                debug!(file = %filename, "No outcome recorded");
                ImportOutcome::failed(filename, &ImportError::Join("task aborted".to_string()))
            })
        })
        .collect();

    let report = BatchReport { outcomes };
    info!(succeeded = report.succeeded(), failed = report.failed(), "Import finished");
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = ImportConfig::from_toml("").expect("empty TOML is valid");
        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.source, "demoscope");
        assert_eq!(config.engine.timing.tick_rate, EngineConfig::default().timing.tick_rate);
    }

    #[test]
    fn engine_section_is_nested() {
        let config = ImportConfig::from_toml(
            r"
            timeout_ms = 500

            [engine.timing]
            tick_rate = 128.0
            ",
        )
        .expect("valid TOML");
        assert_eq!(config.timeout_ms, 500);
        assert!((config.engine.timing.tick_rate - 128.0).abs() < f64::EPSILON);
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        assert!(matches!(
            ImportConfig::from_toml("timeout_ms = \"soon\""),
            Err(ImportError::Config(_))
        ));
    }

    #[test]
    fn failure_serializes_with_error_message() {
        let outcome = ImportOutcome::failed("a.json".into(), &ImportError::Timeout(5));
        let json = serde_json::to_value(&outcome).expect("serialize");
        assert_eq!(json["filename"], "a.json");
        assert_eq!(json["errorMessage"], "timed out after 5 ms");
    }

    #[test]
    fn display_name_strips_directories() {
        assert_eq!(display_name(Path::new("/tmp/demos/match.json")), "match.json");
    }
}
