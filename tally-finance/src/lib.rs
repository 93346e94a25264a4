//! tally-finance: ledger storage, classification, and the ingestion pipeline

pub mod cache;
pub mod classifier;
pub mod ledger;
pub mod lock;
pub mod pipeline;
pub mod service;

pub use cache::{CategoryCache, JsonFileCache, MemoryCache, NoCache};
pub use classifier::{BatchReport, Classifier, ClassifierConfig, CLASSIFY_INSTRUCTIONS};
pub use ledger::CommitReport;
pub use lock::LedgerLock;
pub use pipeline::{IngestReport, Pipeline, PipelineConfig, Stage};
pub use service::{CategoryService, ChatCompletionsService, ServiceConfig};
