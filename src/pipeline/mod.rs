mod batch;
mod collaborators;
mod orchestrator;
mod retry;
mod unit;

pub use batch::{plan_batches, Batch, BatchKey, BatchPlan, PlannedItem};
pub use collaborators::{ArtifactHandle, CollaboratorError, Extracted, Extractor, Published, Publisher};
pub use orchestrator::{Orchestrator, OrchestratorOptions, StageTimeouts};
pub use retry::RetryPolicy;
pub use unit::{BatchTracker, ItemState};
