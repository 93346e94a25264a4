//! Ingestion pipeline: statement file in, classified records merged into the ledger.
//!
//! Idle → Parsing → Staged → Classifying → Merging → Committed → CleanedUp,
//! with Failed reachable from Parsing. Everything else that goes wrong on a
//! single row or record degrades the data instead of the run.

use anyhow::{bail, Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use tally_core::{Category, Record};
use tally_ingest::{detect_profile, parse_statement};

use crate::classifier::{BatchReport, Classifier};
use crate::ledger::{self, CommitReport};
use crate::lock;
use crate::service::CategoryService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Parsing,
    Staged,
    Classifying,
    Merging,
    Committed,
    CleanedUp,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Idle => "idle",
            Stage::Parsing => "parsing",
            Stage::Staged => "staged",
            Stage::Classifying => "classifying",
            Stage::Merging => "merging",
            Stage::Committed => "committed",
            Stage::CleanedUp => "cleaned-up",
            Stage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Where the pipeline keeps its files.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub ledger_path: PathBuf,
    pub staging_path: PathBuf,
    /// How long to wait for another ingestion holding the ledger
    pub lock_timeout: Duration,
}

impl PipelineConfig {
    /// Ledger and staging file side by side in `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            ledger_path: dir.join("transactionData.json"),
            staging_path: dir.join("temp.json"),
            lock_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub source: PathBuf,
    pub profile: &'static str,
    pub parsed: usize,
    pub classification: BatchReport,
    pub commit: CommitReport,
    /// Records folded in from a staging file an earlier run left behind
    pub recovered: Option<CommitReport>,
    pub stage: Stage,
}

pub struct Pipeline<S> {
    config: PipelineConfig,
    classifier: Classifier<S>,
}

impl<S: CategoryService> Pipeline<S> {
    pub fn new(config: PipelineConfig, classifier: Classifier<S>) -> Self {
        Self { config, classifier }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Import one statement file into the ledger.
    pub async fn ingest(&self, source: impl AsRef<Path>) -> Result<IngestReport> {
        self.ingest_with(source, |_| {}, &CancellationToken::new()).await
    }

    /// Import one statement file, reporting classification progress.
    ///
    /// A cancelled run keeps its staging file; the next run classifies what is
    /// left and commits it.
    pub async fn ingest_with<F>(
        &self,
        source: impl AsRef<Path>,
        progress: F,
        cancel: &CancellationToken,
    ) -> Result<IngestReport>
    where
        F: FnMut(f64),
    {
        let source = source.as_ref();
        let _lock = lock::acquire(&self.config.ledger_path, self.config.lock_timeout).await?;
        let recovered = self.recover_staging(cancel).await?;

        let mut stage = Stage::Idle;
        advance(&mut stage, Stage::Parsing, source);
        let profile = detect_profile(source);
        let records = match parse_statement(source, &profile) {
            Ok(records) => records,
            Err(e) => {
                advance(&mut stage, Stage::Failed, source);
                return Err(e).with_context(|| format!("import {}", source.display()));
            }
        };
        tracing::info!(profile = profile.name, parsed = records.len(), "parsed statement");

        let mut report = self.stage_classify_commit(records, source, &mut stage, progress, cancel).await?;
        report.profile = profile.name;
        report.recovered = recovered;
        Ok(report)
    }

    /// Classify a single hand-entered record and merge it into the ledger.
    pub async fn add_manual(&self, record: Record) -> Result<IngestReport> {
        let _lock = lock::acquire(&self.config.ledger_path, self.config.lock_timeout).await?;
        let recovered = self.recover_staging(&CancellationToken::new()).await?;

        let mut stage = Stage::Idle;
        let source = Path::new("manual entry");
        advance(&mut stage, Stage::Parsing, source);
        let mut report = self
            .stage_classify_commit(vec![record], source, &mut stage, |_| {}, &CancellationToken::new())
            .await?;
        report.profile = "manual";
        report.recovered = recovered;
        Ok(report)
    }

    /// Commit a staging file left behind by an interrupted run, if any.
    pub async fn recover(&self) -> Result<Option<CommitReport>> {
        let _lock = lock::acquire(&self.config.ledger_path, self.config.lock_timeout).await?;
        self.recover_staging(&CancellationToken::new()).await
    }

    /// Classify whatever the interrupted run did not reach, then commit.
    ///
    /// Staged records still carrying the provider's own type go through the
    /// classifier first, so only category labels ever reach the ledger.
    async fn recover_staging(&self, cancel: &CancellationToken) -> Result<Option<CommitReport>> {
        let staging = &self.config.staging_path;
        if !staging.exists() {
            return Ok(None);
        }
        tracing::warn!(
            staging = %staging.display(),
            "found staging file from an interrupted import; committing it first"
        );

        let mut records = ledger::load(staging)?;
        let pending: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.kind.parse::<Category>().is_err())
            .map(|(i, _)| i)
            .collect();

        if !pending.is_empty() {
            let mut batch: Vec<Record> = pending.iter().map(|&i| records[i].clone()).collect();
            let report = self.classifier.classify_batch(&mut batch, |_| {}, cancel).await?;
            for (&i, record) in pending.iter().zip(batch) {
                records[i] = record;
            }
            ledger::save(&records, staging)?;
            if report.cancelled {
                bail!(
                    "recovery cancelled during classification; staged records are kept in {}",
                    staging.display()
                );
            }
            tracing::info!(
                classified = report.classified,
                unknown = report.unknown,
                "classified records an interrupted import left behind"
            );
        }

        let report = ledger::commit_merge(staging, &self.config.ledger_path)?;
        Ok(Some(report))
    }

    async fn stage_classify_commit<F>(
        &self,
        mut records: Vec<Record>,
        source: &Path,
        stage: &mut Stage,
        progress: F,
        cancel: &CancellationToken,
    ) -> Result<IngestReport>
    where
        F: FnMut(f64),
    {
        let parsed = records.len();

        ledger::save(&records, &self.config.staging_path)?;
        advance(stage, Stage::Staged, source);

        advance(stage, Stage::Classifying, source);
        let classification = self.classifier.classify_batch(&mut records, progress, cancel).await?;
        ledger::save(&records, &self.config.staging_path)?;
        if classification.cancelled {
            bail!(
                "import of {} cancelled during classification; staged records are kept in {}",
                source.display(),
                self.config.staging_path.display()
            );
        }

        advance(stage, Stage::Merging, source);
        let commit = ledger::commit_merge(&self.config.staging_path, &self.config.ledger_path)?;
        advance(stage, Stage::Committed, source);
        advance(stage, Stage::CleanedUp, source);

        Ok(IngestReport {
            source: source.to_path_buf(),
            profile: "",
            parsed,
            classification,
            commit,
            recovered: None,
            stage: *stage,
        })
    }
}

fn advance(stage: &mut Stage, next: Stage, source: &Path) {
    tracing::debug!(from = %stage, to = %next, source = %source.display(), "pipeline stage");
    *stage = next;
}
