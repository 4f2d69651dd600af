use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use log::{debug, trace, warn};

use super::{ObjectId, ObjectState, RawRef};
use crate::error::TaskError;

pub(crate) type AnyValue = Arc<dyn Any + Send + Sync>;
pub(crate) type Cell = Shared<oneshot::Receiver<Completion>>;

/// A stored result together with its position in completion order.
#[derive(Clone)]
pub(crate) struct Completion {
    pub(crate) seq: u64,
    pub(crate) result: Result<AnyValue, TaskError>,
}

impl Completion {
    pub(crate) fn state(&self) -> ObjectState {
        match self.result {
            Ok(_) => ObjectState::Resolved,
            Err(_) => ObjectState::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Pending,
    Running,
    Done,
}

struct Entry {
    stage: Stage,
    sender: Option<oneshot::Sender<Completion>>,
    cell: Cell,
    refs: Weak<RefGuard>,
}

/// Shared by every reference to one slot. Dropping the last one lets the
/// table forget the slot once it holds a result.
pub(crate) struct RefGuard {
    id: ObjectId,
    table: Weak<CompletionTable>,
}

impl Drop for RefGuard {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            table.release(&self.id);
        }
    }
}

/// Write-once result slots keyed by object id.
///
/// Writers go through the table lock and hand the value over a oneshot, so
/// each slot has exactly one writer. Readers hold a clone of the shared
/// receiver and never take the lock. A slot is dropped once it is done and
/// no reference to it is left.
///
/// Entries leave the map under the lock but are dropped after it is
/// released: a stored value may itself hold references into this table.
pub(crate) struct CompletionTable {
    entries: Mutex<HashMap<ObjectId, Entry>>,
    seq: AtomicU64,
    closed: AtomicBool,
}

impl CompletionTable {
    pub(crate) fn new() -> Arc<CompletionTable> {
        Arc::new(CompletionTable {
            entries: Default::default(),
            seq: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ObjectId, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a pending slot for a result produced by `producer`.
    ///
    /// Once the table is closed the returned reference is already failed.
    pub(crate) fn register(self: &Arc<Self>, producer: &str) -> RawRef {
        let id = ObjectId::new(producer);
        let (sender, receiver) = oneshot::channel();
        let cell = receiver.shared();
        let guard = Arc::new(RefGuard {
            id: id.clone(),
            table: Arc::downgrade(self),
        });
        let mut entries = self.lock();
        if self.closed.load(Ordering::Acquire) {
            drop(entries);
            let _ = sender.send(Completion {
                seq: self.seq.fetch_add(1, Ordering::AcqRel),
                result: Err(TaskError::RuntimeShutdown),
            });
        } else {
            trace!("Registered {}", id);
            entries.insert(id.clone(), Entry {
                stage: Stage::Pending,
                sender: Some(sender),
                cell: cell.clone(),
                refs: Arc::downgrade(&guard),
            });
        }
        RawRef { id, cell, guard }
    }

    /// Mark a pending slot as running. Returns false if it was cancelled or
    /// already completed, in which case the work must not run.
    pub(crate) fn start(&self, id: &ObjectId) -> bool {
        match self.lock().get_mut(id) {
            Some(entry) if entry.stage == Stage::Pending => {
                entry.stage = Stage::Running;
                true
            }
            _ => false,
        }
    }

    /// Store the result for `id`. Only the first completion is kept.
    pub(crate) fn complete(&self, id: &ObjectId, result: Result<AnyValue, TaskError>) -> bool {
        let (stored, orphan) = {
            let mut entries = self.lock();
            match entries.get_mut(id) {
                Some(entry) => match self.settle(entry, id, result) {
                    Ok(()) => (Ok(()), take_orphan(&mut entries, id)),
                    Err(unused) => (Err(unused), None),
                },
                None => {
                    debug!("Dropping result for released object {}", id);
                    (Err(result), None)
                }
            }
        };
        if orphan.is_some() {
            trace!("Object {} has no references left", id);
        }
        stored.is_ok()
    }

    /// Fail a slot whose work has not started yet.
    pub(crate) fn cancel(&self, id: &ObjectId) -> bool {
        match self.lock().get_mut(id) {
            Some(entry) if entry.stage == Stage::Pending => {
                self.settle(entry, id, Err(TaskError::Cancelled { object: id.clone() })).is_ok()
            }
            _ => false,
        }
    }

    /// Hands `result` back if the slot already had one.
    fn settle(
        &self,
        entry: &mut Entry,
        id: &ObjectId,
        result: Result<AnyValue, TaskError>,
    ) -> Result<(), Result<AnyValue, TaskError>> {
        let sender = match entry.sender.take() {
            Some(sender) => sender,
            None => {
                debug!("Object {} was already completed", id);
                return Err(result);
            }
        };
        entry.stage = Stage::Done;
        if let Err(err) = &result {
            warn!("Object {} failed: {}", id, err);
        } else {
            trace!("Object {} resolved", id);
        }
        let seq = self.seq.fetch_add(1, Ordering::AcqRel);
        // The receiving side lives in the entry itself.
        sender.send(Completion { seq, result }).map_err(|completion| completion.result)
    }

    /// Resolves once the slot holds a result, or immediately if the table
    /// no longer tracks it.
    pub(crate) fn settled(&self, id: &ObjectId) -> impl Future<Output = ()> + Send + 'static {
        let cell = self.lock().get(id).map(|entry| entry.cell.clone());
        async move {
            if let Some(cell) = cell {
                let _ = cell.await;
            }
        }
    }

    pub(crate) fn state(&self, id: &ObjectId) -> Option<ObjectState> {
        self.lock().get(id).map(|entry| match entry.cell.clone().now_or_never() {
            Some(Ok(completion)) => completion.state(),
            Some(Err(_)) => ObjectState::Failed,
            None => ObjectState::Pending,
        })
    }

    /// Release a completed slot. Outstanding references keep their value.
    pub(crate) fn free(&self, id: &ObjectId) -> bool {
        let removed = {
            let mut entries = self.lock();
            match entries.get(id) {
                Some(entry) if entry.stage == Stage::Done => entries.remove(id),
                _ => None,
            }
        };
        removed.is_some()
    }

    /// Called when the last reference to `id` is dropped.
    fn release(&self, id: &ObjectId) {
        let removed = {
            let mut entries = self.lock();
            match entries.get(id) {
                Some(entry) if entry.stage == Stage::Done => entries.remove(id),
                _ => None,
            }
        };
        if removed.is_some() {
            trace!("Released {}", id);
        }
    }

    /// Number of slots still tracked, done or not.
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn pending(&self) -> usize {
        self.lock().values().filter(|entry| entry.stage != Stage::Done).count()
    }

    /// Close the table. Every slot still waiting for a result is released,
    /// which its readers observe as a runtime shutdown.
    pub(crate) fn shutdown(&self) {
        let drained: Vec<_> = {
            let mut entries = self.lock();
            self.closed.store(true, Ordering::Release);
            entries.drain().collect()
        };
        let released = drained.iter().filter(|(_, entry)| entry.stage != Stage::Done).count();
        debug!("Completion table closed, released {} pending objects", released);
    }
}

fn take_orphan(entries: &mut HashMap<ObjectId, Entry>, id: &ObjectId) -> Option<Entry> {
    match entries.get(id) {
        Some(entry) if entry.refs.strong_count() == 0 => entries.remove(id),
        _ => None,
    }
}
