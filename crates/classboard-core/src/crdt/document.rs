//! Loro document wrapper.

use std::sync::Arc;

use loro::event::DiffEvent;
use loro::{
    ContainerID, ContainerType, ExportMode, LoroDoc, LoroList, LoroResult, Subscription,
    UndoManager, VersionVector,
};

use super::changes::{ChangeBatch, ChangeQueue};
use crate::config::BoardConfig;

/// Name of the root list holding every shape record.
pub const ELEMENTS_KEY: &str = "elements";

/// A CRDT-backed document holding the canonical sequence of shape records.
///
/// Wraps a `LoroDoc` with an `UndoManager` for local undo/redo and a deep
/// subscription that queues every change as a [`ChangeBatch`].
pub struct CrdtDocument {
    doc: LoroDoc,
    undo_manager: UndoManager,
    queue: Arc<ChangeQueue>,
    elements_id: ContainerID,
    _subscription: Subscription,
}

impl std::fmt::Debug for CrdtDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrdtDocument")
            .field("peer_id", &self.doc.peer_id())
            .field("elements", &self.elements().len())
            .finish()
    }
}

impl Default for CrdtDocument {
    fn default() -> Self {
        Self::new(&BoardConfig::default())
    }
}

impl CrdtDocument {
    /// Create a new empty document.
    pub fn new(config: &BoardConfig) -> Self {
        Self::with_doc(LoroDoc::new(), config)
    }

    /// Create a document from a snapshot or update blob.
    pub fn from_snapshot(bytes: &[u8], config: &BoardConfig) -> LoroResult<Self> {
        let doc = LoroDoc::new();
        doc.import(bytes)?;
        Ok(Self::with_doc(doc, config))
    }

    fn with_doc(doc: LoroDoc, config: &BoardConfig) -> Self {
        let mut undo_manager = UndoManager::new(&doc);
        undo_manager.set_max_undo_steps(config.max_undo_steps);
        undo_manager.set_merge_interval(config.undo_merge_interval_ms);

        let queue = Arc::new(ChangeQueue::default());
        let elements_id = ContainerID::new_root(ELEMENTS_KEY, ContainerType::List);
        let subscription = {
            let queue = queue.clone();
            let elements_id = elements_id.clone();
            doc.subscribe_root(Arc::new(move |event: DiffEvent<'_>| {
                queue.record(&event, &elements_id)
            }))
        };

        Self {
            doc,
            undo_manager,
            queue,
            elements_id,
            _subscription: subscription,
        }
    }

    /// Get the underlying LoroDoc.
    pub fn loro_doc(&self) -> &LoroDoc {
        &self.doc
    }

    /// The canonical sequence of shape records.
    pub fn elements(&self) -> LoroList {
        self.doc.get_list(ELEMENTS_KEY)
    }

    /// Container id of the canonical sequence.
    pub fn elements_id(&self) -> &ContainerID {
        &self.elements_id
    }

    /// Run `f` and commit the result as one transaction.
    ///
    /// The commit happens even when `f` fails part way, so the changes it did
    /// make are still delivered as a single batch.
    pub fn transact<T>(&self, f: impl FnOnce(&LoroList) -> LoroResult<T>) -> LoroResult<T> {
        let result = f(&self.elements());
        self.doc.commit();
        result
    }

    /// Take every change batch observed since the last drain.
    pub fn drain_changes(&self) -> Vec<ChangeBatch> {
        self.queue.drain()
    }

    /// Undo the last local change. Returns whether anything was undone.
    pub fn undo(&mut self) -> LoroResult<bool> {
        self.doc.commit();
        self.queue.set_replaying(true);
        let result = self.undo_manager.undo();
        self.doc.commit();
        self.queue.set_replaying(false);
        result
    }

    /// Redo the last undone change. Returns whether anything was redone.
    pub fn redo(&mut self) -> LoroResult<bool> {
        self.doc.commit();
        self.queue.set_replaying(true);
        let result = self.undo_manager.redo();
        self.doc.commit();
        self.queue.set_replaying(false);
        result
    }

    pub fn can_undo(&self) -> bool {
        self.undo_manager.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo_manager.can_redo()
    }

    /// Export the document as a snapshot (full state).
    pub fn export_snapshot(&self) -> Vec<u8> {
        self.doc.export(ExportMode::Snapshot).unwrap_or_default()
    }

    /// Export incremental updates since a version.
    pub fn export_updates(&self, since: &VersionVector) -> Vec<u8> {
        self.doc.export(ExportMode::updates(since)).unwrap_or_default()
    }

    /// Import updates from another replica.
    pub fn import(&mut self, bytes: &[u8]) -> LoroResult<()> {
        self.doc.import(bytes)?;
        Ok(())
    }

    /// Get the current version vector.
    pub fn version(&self) -> VersionVector {
        self.doc.oplog_vv()
    }

    pub fn peer_id(&self) -> u64 {
        self.doc.peer_id()
    }
}
