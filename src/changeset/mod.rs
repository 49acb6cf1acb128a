mod resolver;
mod work;

pub use resolver::{ChangeSet, ChangeSetResolver};
pub use work::{OverrideList, WorkItem, WorkReason, WorkSet};
