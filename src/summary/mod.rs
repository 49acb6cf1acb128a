mod aggregator;
mod outcome;
mod report;

pub use aggregator::ResultAggregator;
pub use outcome::{Outcome, SummaryEntry};
pub use report::{RunStatus, RunSummary, SummaryRow};
