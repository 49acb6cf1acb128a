pub mod error;
pub mod catalog;
pub mod state;
pub mod changeset;
pub mod pipeline;
pub mod summary;
pub mod config;
pub mod local;
pub mod runner;

pub use error::{HashSyncError, Result, FailureCause, Stage};
pub use catalog::{TableId, Fingerprint, FingerprintRecord, FingerprintSource, CatalogSnapshot, StaticFingerprintSource, DirectoryFingerprintSource, Destination, DestinationLookup, PublishMode};
pub use state::{
    StateStore, StateDocument, StoredFingerprints, JsonFileStateStore, InMemoryStateStore, StaticStateStore,
    ItemRegistry, CreatedItems, open_store, open_registry,
};
pub use changeset::{ChangeSet, ChangeSetResolver, OverrideList, WorkItem, WorkReason, WorkSet};
pub use pipeline::{
    ArtifactHandle, CollaboratorError, Extracted, Extractor, Published, Publisher,
    Orchestrator, OrchestratorOptions, StageTimeouts, RetryPolicy, ItemState,
};
pub use summary::{Outcome, SummaryEntry, ResultAggregator, RunSummary, RunStatus, SummaryRow};
pub use config::{Config, Environment};
pub use local::{DirectoryExtractor, DirectoryPublisher};
pub use runner::{SyncRunner, SeedReport, clean_output_dir};
