//! Classifier orchestrator: assign every record a spending category.
//!
//! Records sharing a normalized id form one unit of work. Units go through the
//! cache first; the rest are pulled off a shared queue by a fixed pool of
//! workers that call the categorization service with bounded retries. Workers
//! only send `(unit, category)` back; this task alone mutates records, fills
//! the cache, and reports progress.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use tally_core::{Category, Record};

use crate::cache::{CategoryCache, NoCache};
use crate::service::CategoryService;

pub const CLASSIFY_INSTRUCTIONS: &str = "You are a helpful assistant that classifies bill items into categories \
(food and dining, transportation, housing, entertainment, shopping, healthcare, \
education and training, communication, finance and investment, transfer accounts). \
Respond ONLY with the category.";

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Size of the worker pool
    pub workers: usize,
    /// Service calls per unit before giving up with `unknown`
    pub max_attempts: u32,
    /// Base delay between attempts, multiplied by the attempt number
    pub backoff: Duration,
    /// Upper bound for a single service call
    pub request_timeout: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            max_attempts: 3,
            backoff: Duration::from_millis(500),
            request_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Distinct units of work (unique ids plus id-less records)
    pub units: usize,
    /// Units answered from the cache
    pub cached: usize,
    /// Units the service placed in a known category
    pub classified: usize,
    /// Units that ended as `unknown`
    pub unknown: usize,
    /// True when cancellation left some units unprocessed
    pub cancelled: bool,
}

struct Unit {
    key: Option<String>,
    members: Vec<usize>,
}

struct Job {
    unit: usize,
    payload: String,
}

struct Outcome {
    unit: usize,
    category: Category,
}

pub struct Classifier<S> {
    service: Arc<S>,
    cache: Arc<dyn CategoryCache>,
    config: ClassifierConfig,
}

impl<S: CategoryService> Classifier<S> {
    pub fn new(service: S, config: ClassifierConfig) -> Self {
        Self {
            service: Arc::new(service),
            cache: Arc::new(NoCache),
            config,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn CategoryCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Classify `records` in place, overwriting each record's type.
    ///
    /// `progress` receives `completed / total` after every unit; the last value
    /// is exactly 1.0 unless the batch was cancelled. Returns only after every
    /// worker has finished.
    pub async fn classify_batch<F>(
        &self,
        records: &mut [Record],
        mut progress: F,
        cancel: &CancellationToken,
    ) -> Result<BatchReport>
    where
        F: FnMut(f64),
    {
        let units = build_units(records);
        let total = units.len();
        let mut report = BatchReport {
            units: total,
            ..BatchReport::default()
        };

        if total == 0 {
            progress(1.0);
            return Ok(report);
        }

        let mut done = vec![false; total];
        let mut completed = 0usize;
        let mut jobs = Vec::new();

        for (idx, unit) in units.iter().enumerate() {
            let hit = unit.key.as_deref().and_then(|k| self.cache.get(k));
            match hit {
                Some(category) => {
                    apply(records, unit, category);
                    done[idx] = true;
                    report.cached += 1;
                    completed += 1;
                    progress(completed as f64 / total as f64);
                }
                None => {
                    let payload = serde_json::to_string(&records[unit.members[0]])
                        .context("serialize record for classification")?;
                    jobs.push(Job { unit: idx, payload });
                }
            }
        }

        tracing::info!(
            units = total,
            cached = report.cached,
            dispatched = jobs.len(),
            workers = self.config.workers,
            "classifying batch"
        );

        if !jobs.is_empty() {
            let worker_count = self.config.workers.max(1).min(jobs.len());
            let (job_tx, job_rx) = mpsc::channel::<Job>(jobs.len());
            for job in jobs {
                job_tx
                    .send(job)
                    .await
                    .map_err(|_| anyhow::anyhow!("classification queue closed early"))?;
            }
            drop(job_tx);

            let job_rx = Arc::new(Mutex::new(job_rx));
            let (result_tx, mut result_rx) = mpsc::unbounded_channel::<Outcome>();
            let mut workers = JoinSet::new();

            for worker in 0..worker_count {
                let service = Arc::clone(&self.service);
                let config = self.config.clone();
                let job_rx = Arc::clone(&job_rx);
                let result_tx = result_tx.clone();
                let cancel = cancel.clone();

                workers.spawn(async move {
                    loop {
                        if cancel.is_cancelled() {
                            tracing::debug!(worker, "worker stopping on cancellation");
                            break;
                        }
                        let job = job_rx.lock().await.recv().await;
                        let Some(job) = job else { break };

                        let category = classify_with_retry(service.as_ref(), &job.payload, &config).await;
                        if result_tx
                            .send(Outcome {
                                unit: job.unit,
                                category,
                            })
                            .is_err()
                        {
                            break;
                        }
                    }
                });
            }
            drop(result_tx);

            while let Some(outcome) = result_rx.recv().await {
                let unit = &units[outcome.unit];
                apply(records, unit, outcome.category);
                self.remember(unit, outcome.category, &mut report);
                done[outcome.unit] = true;
                completed += 1;
                progress(completed as f64 / total as f64);
            }

            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "classification worker failed");
                }
            }
        }

        if completed < total {
            if cancel.is_cancelled() {
                report.cancelled = true;
                tracing::warn!(completed, total, "classification cancelled");
            } else {
                // a worker died mid-unit; its units still count as finished
                for (_, unit) in units.iter().enumerate().filter(|(i, _)| !done[*i]) {
                    apply(records, unit, Category::Unknown);
                    report.unknown += 1;
                    completed += 1;
                    progress(completed as f64 / total as f64);
                }
            }
        }

        if let Err(e) = self.cache.flush() {
            tracing::warn!(error = %e, "could not persist classification cache");
        }

        tracing::info!(
            classified = report.classified,
            unknown = report.unknown,
            cached = report.cached,
            cancelled = report.cancelled,
            "classification finished"
        );
        Ok(report)
    }

    fn remember(&self, unit: &Unit, category: Category, report: &mut BatchReport) {
        if category.is_unknown() {
            report.unknown += 1;
            return;
        }
        report.classified += 1;
        if let Some(key) = unit.key.as_deref() {
            self.cache.put(key, category);
        }
    }
}

fn build_units(records: &[Record]) -> Vec<Unit> {
    let mut units: Vec<Unit> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for (idx, record) in records.iter().enumerate() {
        match record.merge_key() {
            Some(key) => match by_key.get(&key) {
                Some(&u) => units[u].members.push(idx),
                None => {
                    by_key.insert(key.clone(), units.len());
                    units.push(Unit {
                        key: Some(key),
                        members: vec![idx],
                    });
                }
            },
            None => units.push(Unit {
                key: None,
                members: vec![idx],
            }),
        }
    }
    units
}

fn apply(records: &mut [Record], unit: &Unit, category: Category) {
    for &m in &unit.members {
        records[m].kind = category.label().to_string();
    }
}

async fn classify_with_retry<S: CategoryService>(service: &S, payload: &str, config: &ClassifierConfig) -> Category {
    let attempts = config.max_attempts.max(1);
    for attempt in 1..=attempts {
        match tokio::time::timeout(config.request_timeout, service.complete(CLASSIFY_INSTRUCTIONS, payload)).await {
            Ok(Ok(answer)) => return Category::normalize(&answer),
            Ok(Err(e)) => tracing::warn!(attempt, error = %e, "classification attempt failed"),
            Err(_) => tracing::warn!(attempt, "classification attempt timed out"),
        }
        if attempt < attempts {
            tokio::time::sleep(config.backoff * attempt).await;
        }
    }
    Category::Unknown
}
