use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::channel::mpsc::UnboundedSender;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

use crate::actors::{ActorHandle, ActorId, Control};
use crate::error::{RuntimeError, TaskError};
use crate::executor::{run_task, Executor, Task};
use crate::object::{Args, CompletionTable, ObjectId, ObjectRef, ObjectState};
use crate::remote::RemoteFunction;
use crate::wait;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Size of the worker pool, the equivalent of a `num_cpus` setting.
    pub num_workers: u16,
    pub start_on_launch: bool,
}

impl RuntimeConfig {
    /// Return a new config with the changed `num_workers`.
    pub fn num_workers(mut self, value: u16) -> Self {
        self.num_workers = value;
        self
    }

    /// Return a new config with the changed `start_on_launch`.
    pub fn start_on_launch(mut self, value: bool) -> Self {
        self.start_on_launch = value;
        self
    }
}

impl Default for RuntimeConfig {
    /// Create the config with the default values.
    fn default() -> RuntimeConfig {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        RuntimeConfig {
            num_workers: parallelism.min(u16::MAX as usize) as u16,
            start_on_launch: true,
        }
    }
}

pub(crate) struct RegisteredActor {
    control: UnboundedSender<Control>,
    name: Option<String>,
    // Named actors keep a handle here so they can be looked up later.
    handle: Option<Box<dyn Any + Send + Sync>>,
}

#[derive(Default)]
pub(crate) struct ActorRegistry {
    actors: HashMap<ActorId, RegisteredActor>,
    names: HashMap<String, ActorId>,
}

pub(crate) struct RuntimeData {
    uuid: Uuid,
    config: RuntimeConfig,
    pub(crate) table: Arc<CompletionTable>,
    pool: Arc<Semaphore>,
    actors: Mutex<ActorRegistry>,
    stopped: AtomicBool,
}

impl RuntimeData {
    fn registry(&self) -> MutexGuard<'_, ActorRegistry> {
        self.actors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take `num_cpus` permits from the worker pool. A demand of zero
    /// bypasses the pool.
    pub(crate) async fn reserve(&self, num_cpus: u16) -> Result<Option<OwnedSemaphorePermit>, RuntimeError> {
        if num_cpus == 0 {
            return Ok(None);
        }
        let available = self.config.num_workers;
        let wanted = if num_cpus > available {
            warn!("Demand of {} cpus exceeds the pool of {}, clamping", num_cpus, available);
            available
        } else {
            num_cpus
        };
        self.pool
            .clone()
            .acquire_many_owned(u32::from(wanted))
            .await
            .map(Some)
            .map_err(|_| RuntimeError::Shutdown)
    }

    pub(crate) fn register_actor<A>(&self, handle: &ActorHandle<A>) -> Result<(), RuntimeError>
        where A: Send + 'static
    {
        let mut registry = self.registry();
        if self.stopped.load(Ordering::Acquire) {
            return Err(RuntimeError::Shutdown);
        }
        let id = handle.id().clone();
        let name = id.name().map(String::from);
        if let Some(name) = &name {
            if registry.names.contains_key(name) {
                return Err(RuntimeError::DuplicateActorName(name.clone()));
            }
            registry.names.insert(name.clone(), id.clone());
        }
        let stored: Option<Box<dyn Any + Send + Sync>> = match name {
            Some(_) => Some(Box::new(handle.clone())),
            None => None,
        };
        registry.actors.insert(id, RegisteredActor {
            control: handle.control(),
            name,
            handle: stored,
        });
        Ok(())
    }

    pub(crate) fn unregister_actor(&self, id: &ActorId) {
        let mut registry = self.registry();
        if let Some(actor) = registry.actors.remove(id) {
            if let Some(name) = actor.name {
                registry.names.remove(&name);
            }
            debug!("Actor {} unregistered", id);
        }
    }
}

/// The process-wide context every submission goes through.
///
/// Cloning is cheap; all clones share the same pool, completion table and
/// actor registry.
#[derive(Clone)]
pub struct Runtime {
    data: Arc<RuntimeData>,
    executor: Executor,
}

impl Runtime {
    /// Create a runtime on the tokio runtime the caller is running in.
    pub fn create(config: RuntimeConfig) -> Result<Runtime, RuntimeError> {
        let handle = Handle::try_current().map_err(|_| RuntimeError::NoReactor)?;
        if config.num_workers == 0 {
            return Err(RuntimeError::InvalidConfig("num_workers must be at least 1".into()));
        }
        let runtime = Runtime {
            data: Arc::new(RuntimeData {
                uuid: Uuid::new_v4(),
                pool: Arc::new(Semaphore::new(usize::from(config.num_workers))),
                table: CompletionTable::new(),
                actors: Default::default(),
                stopped: AtomicBool::new(false),
                config,
            }),
            executor: Executor::new(handle),
        };
        if runtime.config().start_on_launch {
            runtime.executor.start();
        }
        debug!("Created {:?}", runtime);
        Ok(runtime)
    }

    /// Start executing submitted work. Only needed when the runtime was
    /// created with `start_on_launch` disabled.
    pub fn start(&self) {
        self.executor.start()
    }

    pub fn is_started(&self) -> bool {
        self.executor.is_started()
    }

    /// Stop all actors, abort work that has not finished and release the
    /// completion table. Everything still pending fails with
    /// [`TaskError::RuntimeShutdown`].
    pub async fn shutdown(&self) {
        if self.data.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let actors: Vec<_> = self.data.registry().actors.drain().collect();
        debug!("Shutting down runtime {} with {} actors", self.data.uuid, actors.len());
        for (id, actor) in actors {
            if actor.control.unbounded_send(Control::kill("runtime shut down")).is_err() {
                debug!("Actor {} already stopped", id);
            }
        }
        self.data.registry().names.clear();
        self.data.pool.close();
        let joins = self.executor.stop();
        self.data.table.shutdown();
        for join in joins {
            let _ = join.await;
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.data.stopped.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.data.config
    }

    pub fn uuid(&self) -> Uuid {
        self.data.uuid
    }

    pub(crate) fn data(&self) -> &Arc<RuntimeData> {
        &self.data
    }

    pub(crate) fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Submit one invocation of `function`. Equivalent to
    /// [`RemoteFunction::remote`].
    pub fn submit<T, R, A>(&self, function: &RemoteFunction<T, R>, args: A) -> ObjectRef<R>
        where T: Send + 'static,
              R: Clone + Send + Sync + 'static,
              A: Args<Resolved = T>,
    {
        let raw = self.data.table.register(function.name());
        let task = Task {
            object: raw.id().clone(),
            function: function.clone(),
            args,
        };
        if !self.executor.spawn(run_task(self.data.clone(), task)) {
            self.data.table.complete(raw.id(), Err(TaskError::RuntimeShutdown));
        }
        ObjectRef::new(raw)
    }

    /// Wait for one object and return a copy of its value.
    pub async fn get<T>(&self, object: &ObjectRef<T>) -> Result<T, TaskError>
        where T: Clone + Send + Sync + 'static
    {
        wait::get(object).await
    }

    /// Wait for all objects and return their values in input order. The
    /// first failure in input order is returned instead, if any.
    pub async fn get_all<T>(&self, objects: &[ObjectRef<T>]) -> Result<Vec<T>, TaskError>
        where T: Clone + Send + Sync + 'static
    {
        wait::get_all(objects).await
    }

    /// Wait until `num_returns` objects are terminal or `timeout` passes.
    /// Returns `(ready, remaining)`, both in input order.
    pub async fn wait<T>(
        &self,
        objects: Vec<ObjectRef<T>>,
        num_returns: usize,
        timeout: Option<Duration>,
    ) -> (Vec<ObjectRef<T>>, Vec<ObjectRef<T>>) {
        wait::wait(objects, num_returns, timeout).await
    }

    /// Blocking form of [`Runtime::get`]. Must not be called from async
    /// code; meant for driver threads and function or method bodies.
    ///
    /// A body blocked here keeps its pool permits. If the object it waits
    /// for still needs a permit and none are left, neither will finish:
    /// with `num_workers(1)` a task must not block on a child task that
    /// uses the pool.
    pub fn get_blocking<T>(&self, object: &ObjectRef<T>) -> Result<T, TaskError>
        where T: Clone + Send + Sync + 'static
    {
        self.executor.handle().block_on(wait::get(object))
    }

    pub fn get_all_blocking<T>(&self, objects: &[ObjectRef<T>]) -> Result<Vec<T>, TaskError>
        where T: Clone + Send + Sync + 'static
    {
        self.executor.handle().block_on(wait::get_all(objects))
    }

    pub fn wait_blocking<T>(
        &self,
        objects: Vec<ObjectRef<T>>,
        num_returns: usize,
        timeout: Option<Duration>,
    ) -> (Vec<ObjectRef<T>>, Vec<ObjectRef<T>>) {
        self.executor.handle().block_on(wait::wait(objects, num_returns, timeout))
    }

    /// Cancel work that has not started yet. Returns false if the object
    /// is already running or terminal.
    pub fn cancel<T>(&self, object: &ObjectRef<T>) -> bool {
        let cancelled = self.data.table.cancel(object.id());
        debug!("Cancel {}: {}", object.id(), cancelled);
        cancelled
    }

    /// Drop completed objects from the completion table. Returns how many
    /// were released; pending objects are kept.
    pub fn free(&self, objects: &[ObjectId]) -> usize {
        objects.iter().filter(|id| self.data.table.free(id)).count()
    }

    /// State of an object still tracked by the completion table.
    pub fn object_state(&self, object: &ObjectId) -> Option<ObjectState> {
        self.data.table.state(object)
    }

    /// Number of objects whose result has not been stored yet.
    pub fn pending_objects(&self) -> usize {
        self.data.table.pending()
    }

    /// Number of objects the completion table still tracks. A finished
    /// object is dropped once no reference to it is left.
    pub fn tracked_objects(&self) -> usize {
        self.data.table.len()
    }

    pub fn actor_ids(&self) -> Vec<ActorId> {
        self.data.registry().actors.keys().cloned().collect()
    }

    /// Look up a live named actor.
    pub fn get_actor<A>(&self, name: &str) -> Option<ActorHandle<A>>
        where A: Send + 'static
    {
        let registry = self.data.registry();
        let id = registry.names.get(name)?;
        registry.actors.get(id)?
            .handle.as_ref()?
            .downcast_ref::<ActorHandle<A>>()
            .filter(|handle| handle.is_alive())
            .cloned()
    }

    pub fn kill<A>(&self, actor: &ActorHandle<A>)
        where A: Send + 'static
    {
        actor.kill()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, formatter: &'_ mut fmt::Formatter) -> fmt::Result {
        write!(
            formatter,
            "Runtime{{uuid: {}, config: {:?}}}",
            self.data.uuid,
            self.data.config,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder_and_defaults() {
        let config = RuntimeConfig::default().num_workers(3).start_on_launch(false);
        assert_eq!(config.num_workers, 3);
        assert!(!config.start_on_launch);
        assert!(RuntimeConfig::default().num_workers >= 1);
    }

    #[test]
    fn config_fills_missing_fields() {
        let config: RuntimeConfig = serde_json::from_str(r#"{"num_workers": 2}"#).expect("parse");
        assert_eq!(config.num_workers, 2);
        assert!(config.start_on_launch);
    }

    #[test]
    fn create_needs_a_tokio_runtime() {
        let err = Runtime::create(RuntimeConfig::default()).expect_err("no reactor");
        assert_eq!(err, RuntimeError::NoReactor);
    }

    #[tokio::test]
    async fn create_rejects_empty_pool() {
        let err = Runtime::create(RuntimeConfig::default().num_workers(0)).expect_err("invalid");
        assert!(matches!(err, RuntimeError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn zero_demand_bypasses_pool() {
        let runtime = Runtime::create(RuntimeConfig::default().num_workers(1)).expect("runtime");
        let held = runtime.data().reserve(1).await.expect("permit");
        assert!(held.is_some());
        assert!(runtime.data().reserve(0).await.expect("bypass").is_none());
        runtime.shutdown().await;
        assert_eq!(runtime.data().reserve(1).await.expect_err("closed"), RuntimeError::Shutdown);
    }
}
