//! Conversion orchestrator.
//!
//! Owns the adapter registry and the single conversion slot:
//! - **Single files**: `convert_async` starts a job and returns its id, `convert` waits for it
//! - **Batches**: inputs run one after another; a failing item does not stop the batch
//! - **Cancellation**: `cancel` stops the job and the batch, `skip` stops only the current item
//!
//! Progress and completion reach callers through [`ConversionOrchestrator::subscribe`].

mod config;
mod registry;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use registry::AdapterRegistry;
pub use runner::ConversionOrchestrator;
pub use types::{
    BatchFailure, BatchRequest, BatchSummary, ConversionEvent, ConversionResult, ConversionState,
    JobId, JobOutcome, JobStatus, OrchestratorError, OutputLocation,
};
