use std::error::Error;
use std::sync::Arc;

use thiserror::Error;

use crate::actors::ActorId;
use crate::object::ObjectId;
use crate::StdError;

/// Failure stored for an object. Cloned out to every caller that fetches it.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    #[error("{function} failed: {source}")]
    UserFunction {
        function: Arc<str>,
        source: Arc<dyn Error + Send + Sync + 'static>,
    },
    #[error("{function} panicked: {message}")]
    Panicked {
        function: Arc<str>,
        message: Arc<String>,
    },
    #[error("dependency {object} failed")]
    Dependency {
        object: ObjectId,
        source: Box<TaskError>,
    },
    #[error("actor {actor} is unavailable: {reason}")]
    ActorUnavailable {
        actor: ActorId,
        reason: Arc<String>,
    },
    #[error("actor {actor} was restarted after {method} panicked")]
    ActorRestarted {
        actor: ActorId,
        method: Arc<str>,
    },
    #[error("{object} was cancelled")]
    Cancelled { object: ObjectId },
    #[error("runtime was shut down")]
    RuntimeShutdown,
    #[error("{object} is no longer available")]
    ObjectLost { object: ObjectId },
}

impl TaskError {
    pub(crate) fn user(function: &Arc<str>, err: StdError) -> TaskError {
        TaskError::UserFunction {
            function: function.clone(),
            source: Arc::from(err),
        }
    }

    pub(crate) fn unavailable<S: Into<String>>(actor: &ActorId, reason: S) -> TaskError {
        TaskError::ActorUnavailable {
            actor: actor.clone(),
            reason: Arc::new(reason.into()),
        }
    }

    /// The error that started a chain of dependency failures.
    pub fn root_cause(&self) -> &TaskError {
        let mut current = self;
        while let TaskError::Dependency { source, .. } = current {
            current = &**source;
        }
        current
    }

    /// Downcast the error returned by a function or method body, if this
    /// failure (or the one it depends on) came from one.
    pub fn user_error<E: Error + 'static>(&self) -> Option<&E> {
        match self.root_cause() {
            TaskError::UserFunction { source, .. } => source.downcast_ref::<E>(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("no tokio runtime is running on this thread")]
    NoReactor,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("runtime was shut down")]
    Shutdown,
    #[error("an actor named {0:?} is already running")]
    DuplicateActorName(String),
}
