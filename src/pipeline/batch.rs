use crate::catalog::{Destination, DestinationLookup, PublishMode};
use crate::changeset::{WorkItem, WorkReason};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchKey {
    pub unit: String,
    pub reason: WorkReason,
    pub mode: PublishMode,
}

#[derive(Debug, Clone)]
pub struct PlannedItem {
    /// Place in the work set, used to order the summary.
    pub position: usize,
    pub item: WorkItem,
    pub destination: Destination,
}

/// Items that share one packaged artifact.
#[derive(Debug, Clone)]
pub struct Batch {
    pub key: BatchKey,
    pub items: Vec<PlannedItem>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn describe(&self) -> String {
        format!(
            "{} {} batch for {} ({} tables)",
            self.key.reason,
            self.key.mode.as_str(),
            self.key.unit,
            self.items.len()
        )
    }
}

#[derive(Debug, Default)]
pub struct BatchPlan {
    pub batches: Vec<Batch>,
    /// Items with no destination entry, with their work-set positions.
    pub unroutable: Vec<(usize, WorkItem)>,
}

/// Groups work items by publishing unit, reason and mode. Update-mode items
/// share a batch when `batch_updates` is set; create-mode items always get
/// their own. Batches come out in the order their first item appeared.
pub fn plan_batches(
    items: impl IntoIterator<Item = WorkItem>,
    destinations: &DestinationLookup,
    batch_updates: bool,
) -> BatchPlan {
    let mut plan = BatchPlan::default();

    for (position, item) in items.into_iter().enumerate() {
        let Some(destination) = destinations.get(&item.table).cloned() else {
            plan.unroutable.push((position, item));
            continue;
        };

        let key = BatchKey {
            unit: destination.unit.clone(),
            reason: item.reason,
            mode: destination.mode(),
        };
        let planned = PlannedItem { position, item, destination };

        let shareable = batch_updates && key.mode == PublishMode::Update;
        let existing = if shareable {
            plan.batches.iter_mut().find(|b| b.key == key)
        } else {
            None
        };

        match existing {
            Some(batch) => batch.items.push(planned),
            None => plan.batches.push(Batch { key, items: vec![planned] }),
        }
    }

    plan
}
