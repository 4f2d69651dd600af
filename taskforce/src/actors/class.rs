use std::fmt;
use std::sync::Arc;

use log::debug;

use super::cell::{run_actor, ActorCell};
use super::handle::{ActorHandle, ActorShared};
use super::{mailbox, ActorId};
use crate::error::RuntimeError;
use crate::object::Args;
use crate::system::Runtime;
use crate::StdError;

pub(crate) type Constructor<A, I> = Arc<dyn Fn(I) -> Result<A, StdError> + Send + Sync>;

/// A stateful actor type: how to build its state from constructor
/// arguments, and how it is scheduled.
pub struct ActorClass<A, I> {
    pub(crate) class: Arc<str>,
    pub(crate) constructor: Constructor<A, I>,
    pub(crate) name: Option<String>,
    pub(crate) num_cpus: u16,
    pub(crate) max_restarts: u32,
}

impl<A, I> Clone for ActorClass<A, I> {
    fn clone(&self) -> Self {
        ActorClass {
            class: self.class.clone(),
            constructor: self.constructor.clone(),
            name: self.name.clone(),
            num_cpus: self.num_cpus,
            max_restarts: self.max_restarts,
        }
    }
}

impl<A, I> fmt::Debug for ActorClass<A, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorClass")
            .field("class", &self.class)
            .field("name", &self.name)
            .field("num_cpus", &self.num_cpus)
            .field("max_restarts", &self.max_restarts)
            .finish()
    }
}

impl<A, I> ActorClass<A, I>
    where A: Send + 'static,
          I: Clone + Send + 'static,
{
    pub fn new<S, F>(class: S, constructor: F) -> ActorClass<A, I>
        where S: Into<Arc<str>>,
              F: Fn(I) -> Result<A, StdError> + Send + Sync + 'static,
    {
        ActorClass {
            class: class.into(),
            constructor: Arc::new(constructor),
            name: None,
            num_cpus: 0,
            max_restarts: 0,
        }
    }

    /// Spawned actors are registered under `name` and can be found with
    /// [`Runtime::get_actor`].
    pub fn name<S: Into<String>>(self, name: S) -> ActorClass<A, I> {
        ActorClass {
            name: Some(name.into()),
            ..self
        }
    }

    /// Pool permits each actor of this class holds for its lifetime.
    pub fn num_cpus(self, num_cpus: u16) -> ActorClass<A, I> {
        ActorClass {
            num_cpus,
            ..self
        }
    }

    /// How often a panicking method may cost the actor its state before it
    /// is rebuilt from the constructor arguments.
    pub fn max_restarts(self, max_restarts: u32) -> ActorClass<A, I> {
        ActorClass {
            max_restarts,
            ..self
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    /// Start a new actor. Returns as soon as the actor is registered;
    /// construction happens on the actor's own context once `args` resolve.
    pub fn spawn<Ar>(&self, runtime: &Runtime, args: Ar) -> Result<ActorHandle<A>, RuntimeError>
        where Ar: Args<Resolved = I>,
    {
        let data = runtime.data();
        let id = ActorId::new(self.class.clone(), self.name.clone(), runtime.uuid());
        let (sender, receiver) = mailbox::channel(id.clone());
        let shared = Arc::new(ActorShared::default());
        let handle = ActorHandle::new(id.clone(), sender, shared.clone(), data.table.clone());
        data.register_actor(&handle)?;

        let cell = ActorCell::new(id.clone(), self.clone(), data.clone(), shared);
        if !runtime.executor().spawn(run_actor(cell, args, receiver)) {
            data.unregister_actor(&id);
            return Err(RuntimeError::Shutdown);
        }
        debug!("Spawned actor {}", id);
        Ok(handle)
    }
}
