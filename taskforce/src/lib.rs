//! An in-process task and actor runtime.
//!
//! Stateless functions are registered as [`RemoteFunction`]s and run on a
//! bounded worker pool; stateful [`ActorClass`]es run one method call at a
//! time. Every call returns an [`ObjectRef`] right away. References can be
//! passed as arguments to later calls, and are resolved with
//! [`Runtime::get`] or, in order of completion, with [`Runtime::wait`].

pub mod actors;
pub mod error;
mod executor;
pub mod object;
pub mod remote;
pub mod system;
mod wait;

pub use self::actors::{ActorClass, ActorHandle, ActorId, ActorMethod};
pub use self::error::{RuntimeError, TaskError};
pub use self::object::{Arg, Args, ObjectId, ObjectRef, ObjectState};
pub use self::remote::RemoteFunction;
pub use self::system::{Runtime, RuntimeConfig};

/// Error type returned by function, constructor and method bodies.
pub type StdError = Box<dyn std::error::Error + Send + Sync + 'static>;
