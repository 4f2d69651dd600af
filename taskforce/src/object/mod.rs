use std::fmt;
use std::hash;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::channel::oneshot::Canceled;
use futures::future::{try_join_all, FutureExt};

use crate::error::TaskError;

mod args;
mod id;
pub(crate) mod table;

pub use self::args::{Arg, Args};
pub use self::id::ObjectId;
pub(crate) use self::table::{AnyValue, Completion, CompletionTable};

use self::table::{Cell, RefGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    Pending,
    Resolved,
    Failed,
}

fn settle(result: Result<Completion, Canceled>) -> Completion {
    match result {
        Ok(completion) => completion,
        // The table dropped the writer without storing anything.
        Err(Canceled) => Completion {
            seq: u64::MAX,
            result: Err(TaskError::RuntimeShutdown),
        },
    }
}

/// Untyped handle on a result slot.
#[doc(hidden)]
#[derive(Clone)]
pub struct RawRef {
    pub(crate) id: ObjectId,
    pub(crate) cell: Cell,
    pub(crate) guard: Arc<RefGuard>,
}

impl RawRef {
    pub(crate) fn id(&self) -> &ObjectId {
        &self.id
    }

    pub(crate) fn peek(&self) -> Option<Completion> {
        self.cell.clone().now_or_never().map(settle)
    }

    pub(crate) async fn completion(&self) -> Completion {
        settle(self.cell.clone().await)
    }
}

impl fmt::Debug for RawRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.id, f)
    }
}

/// Wait until every dependency is terminal. Fails as soon as one of them
/// fails, chaining its error.
pub(crate) async fn resolve_dependencies(deps: Vec<RawRef>) -> Result<(), TaskError> {
    if deps.is_empty() {
        return Ok(());
    }
    try_join_all(deps.into_iter().map(|dep| async move {
        let completion = dep.completion().await;
        match completion.result {
            Ok(_) => Ok(()),
            Err(err) => Err(TaskError::Dependency {
                object: dep.id,
                source: Box::new(err),
            }),
        }
    }))
    .await
    .map(|_| ())
}

/// Handle on the eventual result of a task or actor call.
///
/// Cloning the handle does not copy the value; every fetch hands out its
/// own clone of the stored value.
pub struct ObjectRef<T> {
    raw: RawRef,
    phantom: PhantomData<fn() -> T>,
}

impl<T> Clone for ObjectRef<T> {
    fn clone(&self) -> Self {
        ObjectRef {
            raw: self.raw.clone(),
            phantom: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ObjectRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({})", self.raw.id)
    }
}

impl<T> PartialEq for ObjectRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw.id == other.raw.id
    }
}

impl<T> Eq for ObjectRef<T> {}

impl<T> hash::Hash for ObjectRef<T> {
    fn hash<H: hash::Hasher>(&self, state: &'_ mut H) {
        self.raw.id.hash(state)
    }
}

impl<T> ObjectRef<T> {
    pub(crate) fn new(raw: RawRef) -> ObjectRef<T> {
        ObjectRef {
            raw,
            phantom: PhantomData,
        }
    }

    pub(crate) fn raw(&self) -> &RawRef {
        &self.raw
    }

    pub fn id(&self) -> &ObjectId {
        &self.raw.id
    }

    pub fn state(&self) -> ObjectState {
        match self.raw.peek() {
            Some(completion) => completion.state(),
            None => ObjectState::Pending,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() != ObjectState::Pending
    }
}

impl<T> ObjectRef<T>
    where T: Clone + Send + Sync + 'static
{
    pub(crate) fn extract(&self, completion: Completion) -> Result<T, TaskError> {
        let value = completion.result?;
        value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| TaskError::ObjectLost { object: self.raw.id.clone() })
    }

    /// The value if the object is already terminal, without waiting.
    pub fn try_get(&self) -> Option<Result<T, TaskError>> {
        self.raw.peek().map(|completion| self.extract(completion))
    }
}
