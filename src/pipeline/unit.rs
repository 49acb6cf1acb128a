use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::debug;
use crate::error::{FailureCause, Stage};
use crate::summary::{Outcome, SummaryEntry};
use super::batch::Batch;

/// Lifecycle of one work item. `Committed` and `HeldBack` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Pending,
    Extracting,
    Packaging,
    Publishing,
    Verifying,
    Committed,
    HeldBack,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Pending => "pending",
            ItemState::Extracting => "extracting",
            ItemState::Packaging => "packaging",
            ItemState::Publishing => "publishing",
            ItemState::Verifying => "verifying",
            ItemState::Committed => "committed",
            ItemState::HeldBack => "held_back",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemState::Committed | ItemState::HeldBack)
    }

    /// Stage charged with a failure that happens while in this state.
    pub fn stage(&self) -> Stage {
        match self {
            ItemState::Pending | ItemState::Extracting => Stage::Extract,
            ItemState::Packaging => Stage::Package,
            ItemState::Publishing => Stage::Publish,
            ItemState::Verifying => Stage::Verify,
            ItemState::Committed | ItemState::HeldBack => Stage::Commit,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            ItemState::Pending => 0,
            ItemState::Extracting => 1,
            ItemState::Packaging => 2,
            ItemState::Publishing => 3,
            ItemState::Verifying => 4,
            ItemState::Committed | ItemState::HeldBack => 5,
        }
    }

    /// Forward moves only; any live state may drop straight to `HeldBack`.
    pub fn can_advance_to(&self, next: ItemState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            ItemState::HeldBack => true,
            ItemState::Committed => *self == ItemState::Verifying,
            _ => next.rank() == self.rank() + 1,
        }
    }
}

struct Slot {
    state: ItemState,
    entry: SummaryEntry,
    position: usize,
    done: bool,
}

/// Per-item progress for one batch, shared between the task running the
/// batch and the task supervising it. If the batch task dies, whatever was
/// recorded here is still reported.
#[derive(Clone)]
pub struct BatchTracker {
    slots: Arc<Mutex<Vec<Slot>>>,
    started: Instant,
}

impl BatchTracker {
    pub fn new(batch: &Batch) -> Self {
        let slots = batch
            .items
            .iter()
            .map(|planned| Slot {
                state: ItemState::Pending,
                entry: SummaryEntry::for_item(
                    &planned.item,
                    Outcome::failure(
                        FailureCause::Internal { message: "not processed".into() },
                        Stage::Extract,
                    ),
                )
                .with_mode(planned.destination.mode()),
                position: planned.position,
                done: false,
            })
            .collect();

        Self {
            slots: Arc::new(Mutex::new(slots)),
            started: Instant::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn advance(&self, index: usize, next: ItemState) {
        let mut slots = self.lock();
        let slot = &mut slots[index];
        if !slot.state.can_advance_to(next) {
            debug!("{}: ignoring transition {} -> {}", slot.entry.table, slot.state.as_str(), next.as_str());
            return;
        }
        debug!("{}: {} -> {}", slot.entry.table, slot.state.as_str(), next.as_str());
        slot.state = next;
    }

    pub fn hold_back(&self, index: usize, cause: FailureCause, stage: Stage) {
        self.finish(index, ItemState::HeldBack, Outcome::failure(cause, stage), None);
    }

    pub fn commit(&self, index: usize, outcome: Outcome, item_id: Option<String>) {
        self.finish(index, ItemState::Committed, outcome, item_id);
    }

    fn finish(&self, index: usize, state: ItemState, outcome: Outcome, item_id: Option<String>) {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        let mut slots = self.lock();
        let slot = &mut slots[index];
        if slot.done {
            return;
        }
        debug!("{}: {} -> {}", slot.entry.table, slot.state.as_str(), state.as_str());
        slot.state = state;
        slot.done = true;

        let entry = slot.entry.clone();
        slot.entry = SummaryEntry { outcome, ..entry }
            .with_item_id(item_id)
            .with_elapsed_ms(elapsed_ms);
    }

    pub fn all_committed(&self) -> bool {
        self.lock().iter().all(|s| s.state == ItemState::Committed)
    }

    /// Drains the tracker. Items that never reached a terminal state are
    /// reported as internal failures at the stage they were in.
    pub fn into_entries(self, interrupted: Option<&str>) -> Vec<(usize, SummaryEntry)> {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        let message = interrupted.unwrap_or("batch ended before the item finished").to_string();

        let slots = self.lock();
        let entries = slots
            .iter()
            .map(|slot| {
                if slot.done {
                    return (slot.position, slot.entry.clone());
                }
                let outcome = Outcome::failure(
                    FailureCause::Internal { message: message.clone() },
                    slot.state.stage(),
                );
                let entry = SummaryEntry { outcome, ..slot.entry.clone() }.with_elapsed_ms(elapsed_ms);
                (slot.position, entry)
            })
            .collect();
        entries
    }
}
