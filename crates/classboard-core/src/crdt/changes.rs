//! Change batches delivered by the document's deep observer.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use loro::event::DiffEvent;
use loro::{ContainerID, EventTriggerKind};

/// Where a batch of changes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// An ordinary local transaction. Already reflected by the operation that issued it.
    Local,
    /// Imported from another replica.
    Remote,
    /// Produced locally by an undo or redo.
    UndoRedo,
}

impl Origin {
    /// Whether the board must reconcile its adapters for this batch.
    pub fn needs_reconcile(self) -> bool {
        !matches!(self, Origin::Local)
    }
}

/// A single observed change.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// The canonical sequence itself changed (records added or removed).
    Sequence,
    /// A container below the canonical sequence changed. `path` lists the
    /// container ids from the root down to the changed container.
    Nested { path: Vec<ContainerID> },
}

impl Change {
    pub fn path(&self) -> &[ContainerID] {
        match self {
            Change::Sequence => &[],
            Change::Nested { path } => path,
        }
    }
}

/// All changes produced by one commit or import.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeBatch {
    pub origin: Origin,
    pub changes: Vec<Change>,
}

/// Shared between the document and its subscription callback.
#[derive(Debug, Default)]
pub(crate) struct ChangeQueue {
    batches: Mutex<VecDeque<ChangeBatch>>,
    replaying: AtomicBool,
}

impl ChangeQueue {
    pub(crate) fn set_replaying(&self, replaying: bool) {
        self.replaying.store(replaying, Ordering::SeqCst);
    }

    pub(crate) fn record(&self, event: &DiffEvent<'_>, sequence: &ContainerID) {
        let origin = match event.triggered_by {
            EventTriggerKind::Local if self.replaying.load(Ordering::SeqCst) => Origin::UndoRedo,
            EventTriggerKind::Local => Origin::Local,
            _ => Origin::Remote,
        };
        let changes: Vec<Change> = event
            .events
            .iter()
            .map(|diff| {
                if diff.target == sequence {
                    Change::Sequence
                } else {
                    let mut path: Vec<ContainerID> =
                        diff.path.iter().map(|(id, _)| id.clone()).collect();
                    if path.last() != Some(diff.target) {
                        path.push(diff.target.clone());
                    }
                    Change::Nested { path }
                }
            })
            .collect();
        if changes.is_empty() {
            return;
        }
        log::trace!("Queued {} change(s) with origin {:?}", changes.len(), origin);
        if let Ok(mut batches) = self.batches.lock() {
            batches.push_back(ChangeBatch { origin, changes });
        }
    }

    pub(crate) fn drain(&self) -> Vec<ChangeBatch> {
        match self.batches.lock() {
            Ok(mut batches) => batches.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }
}
