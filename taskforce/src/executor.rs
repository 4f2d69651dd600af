use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt};
use log::{debug, trace};
use tokio::runtime::Handle;
use tokio::task::{self, JoinError, JoinHandle};

use crate::error::TaskError;
use crate::object::{resolve_dependencies, AnyValue, Args, ObjectId};
use crate::remote::RemoteFunction;
use crate::system::RuntimeData;

/// Render the payload of a panicked blocking task.
pub(crate) fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// One submitted invocation of a remote function.
pub(crate) struct Task<T, R, A> {
    pub(crate) object: ObjectId,
    pub(crate) function: RemoteFunction<T, R>,
    pub(crate) args: A,
}

/// Drive a task from submission to its stored result: wait for argument
/// dependencies, take pool permits, then run the body on a blocking thread.
pub(crate) async fn run_task<T, R, A>(data: Arc<RuntimeData>, task: Task<T, R, A>)
    where T: Send + 'static,
          R: Send + Sync + 'static,
          A: Args<Resolved = T>,
{
    let Task { object, function, args } = task;
    let table = data.table.clone();

    let mut deps = Vec::new();
    args.dependencies(&mut deps);
    if !deps.is_empty() {
        trace!("Task {} waiting on {} dependencies", object, deps.len());
    }
    if let Err(err) = resolve_dependencies(deps).await {
        debug!("Task {} not run: {}", object, err);
        table.complete(&object, Err(err));
        return;
    }

    let _permit = match data.reserve(function.demand()).await {
        Ok(permit) => permit,
        Err(err) => {
            debug!("Task {} not run: {}", object, err);
            return;
        }
    };
    if !table.start(&object) {
        trace!("Task {} was cancelled before it started", object);
        return;
    }
    let values = match args.take() {
        Ok(values) => values,
        Err(err) => {
            table.complete(&object, Err(err));
            return;
        }
    };

    let name = function.name.clone();
    let body = function.body.clone();
    trace!("Running {}", object);
    let result = match task::spawn_blocking(move || body(values)).await {
        Ok(Ok(value)) => Ok(Arc::new(value) as AnyValue),
        Ok(Err(err)) => Err(TaskError::user(&name, err)),
        Err(err) => Err(TaskError::Panicked {
            function: name,
            message: Arc::new(panic_message(err)),
        }),
    };
    table.complete(&object, result);
}

enum ExecutorState {
    Initializing(Vec<BoxFuture<'static, ()>>),
    Started {
        joins: Vec<JoinHandle<()>>,
        prune_at: usize,
    },
    Stopped,
}

const PRUNE_MIN: usize = 64;

impl ExecutorState {
    fn take(&mut self) -> Self {
        std::mem::replace(self, ExecutorState::Stopped)
    }

    fn start(&mut self, handle: &Handle) {
        match self.take() {
            ExecutorState::Initializing(queued) => {
                debug!("Starting executor with {} queued futures", queued.len());
                let joins: Vec<_> = queued.into_iter().map(|fut| handle.spawn(fut)).collect();
                let prune_at = PRUNE_MIN.max(joins.len() * 2);
                *self = ExecutorState::Started { joins, prune_at };
            }
            other => *self = other,
        }
    }

    fn spawn(&mut self, handle: &Handle, fut: BoxFuture<'static, ()>) -> bool {
        match self {
            ExecutorState::Initializing(queued) => {
                queued.push(fut);
                true
            }
            ExecutorState::Started { joins, prune_at } => {
                if joins.len() >= *prune_at {
                    joins.retain(|join| !join.is_finished());
                    *prune_at = PRUNE_MIN.max(joins.len() * 2);
                }
                joins.push(handle.spawn(fut));
                true
            }
            ExecutorState::Stopped => false,
        }
    }
}

impl Default for ExecutorState {
    fn default() -> Self {
        ExecutorState::Initializing(Vec::new())
    }
}

/// Spawns runtime futures onto the tokio runtime, holding them back until
/// the runtime is started.
#[derive(Clone)]
pub(crate) struct Executor {
    inner: Arc<Mutex<ExecutorState>>,
    handle: Handle,
}

impl Executor {
    pub(crate) fn new(handle: Handle) -> Executor {
        Executor {
            inner: Default::default(),
            handle,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ExecutorState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn handle(&self) -> &Handle {
        &self.handle
    }

    pub(crate) fn start(&self) {
        self.lock().start(&self.handle)
    }

    pub(crate) fn is_started(&self) -> bool {
        matches!(*self.lock(), ExecutorState::Started { .. })
    }

    /// Returns false once the executor has been stopped.
    pub(crate) fn spawn<F>(&self, fut: F) -> bool
        where F: Future<Output=()> + Send + 'static,
    {
        self.lock().spawn(&self.handle, fut.boxed())
    }

    /// Abort everything still running. The returned handles resolve once
    /// the aborted futures have been dropped.
    pub(crate) fn stop(&self) -> Vec<JoinHandle<()>> {
        match self.lock().take() {
            ExecutorState::Started { joins, .. } => {
                for join in joins.iter() {
                    join.abort();
                }
                joins
            }
            ExecutorState::Initializing(queued) => {
                debug!("Dropping {} futures that never started", queued.len());
                Vec::new()
            }
            ExecutorState::Stopped => Vec::new(),
        }
    }
}
