pub mod config;
pub mod constants;
pub mod dataset;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod metrics;
pub mod pipeline;
pub mod runner;
pub mod source;
pub mod storage;
pub mod types;

pub use error::{IngestError, Result};
pub use pipeline::TableProcessor;
pub use runner::{BatchRunner, BatchSummary};
pub use types::{FailurePolicy, FilterValue, OutputFormat, TableDescriptor, TableOutcome};
