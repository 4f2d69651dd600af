use std::fmt;
use std::sync::Arc;

use crate::object::{Args, ObjectRef};
use crate::system::Runtime;
use crate::StdError;

pub(crate) type FunctionBody<T, R> = Arc<dyn Fn(T) -> Result<R, StdError> + Send + Sync>;

/// A stateless function registered for remote execution on the worker pool.
///
/// ```ignore
/// let square = RemoteFunction::new("square", |x: i64| Ok(x * x));
/// let object = square.remote(&runtime, Arg::from(4));
/// assert_eq!(runtime.get(&object).await?, 16);
/// ```
pub struct RemoteFunction<T, R> {
    pub(crate) name: Arc<str>,
    pub(crate) body: FunctionBody<T, R>,
    num_cpus: u16,
}

impl<T, R> Clone for RemoteFunction<T, R> {
    fn clone(&self) -> Self {
        RemoteFunction {
            name: self.name.clone(),
            body: self.body.clone(),
            num_cpus: self.num_cpus,
        }
    }
}

impl<T, R> fmt::Debug for RemoteFunction<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteFunction")
            .field("name", &self.name)
            .field("num_cpus", &self.num_cpus)
            .finish()
    }
}

impl<T, R> RemoteFunction<T, R> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn demand(&self) -> u16 {
        self.num_cpus
    }
}

impl<T, R> RemoteFunction<T, R>
    where T: Send + 'static,
          R: Clone + Send + Sync + 'static,
{
    pub fn new<S, F>(name: S, body: F) -> RemoteFunction<T, R>
        where S: Into<Arc<str>>,
              F: Fn(T) -> Result<R, StdError> + Send + Sync + 'static,
    {
        RemoteFunction {
            name: name.into(),
            body: Arc::new(body),
            num_cpus: 1,
        }
    }

    /// Return the function with a different pool demand. Zero means the
    /// task does not count against the pool at all.
    pub fn num_cpus(self, num_cpus: u16) -> RemoteFunction<T, R> {
        RemoteFunction {
            num_cpus,
            ..self
        }
    }

    /// Submit an invocation. Never blocks; the result arrives in the
    /// returned reference.
    ///
    /// The task keeps its `num_cpus` permits until its body returns. A body
    /// that submits more work and fetches it with
    /// [`Runtime::get_blocking`] waits while still holding them, so with
    /// too few workers the child can never start. Give such functions
    /// `num_cpus(0)` or leave spare workers.
    pub fn remote<A>(&self, runtime: &Runtime, args: A) -> ObjectRef<R>
        where A: Args<Resolved = T>,
    {
        runtime.submit(self, args)
    }
}
