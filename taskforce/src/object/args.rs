use crate::error::TaskError;

use super::{ObjectRef, RawRef};

/// A call argument: either a value supplied now, or the result of an
/// earlier call. Pending arguments become dependency edges.
#[derive(Debug, Clone)]
pub enum Arg<T> {
    Immediate(T),
    Pending(ObjectRef<T>),
}

impl<T> From<T> for Arg<T> {
    fn from(value: T) -> Self {
        Arg::Immediate(value)
    }
}

/// Argument lists accepted by remote functions, actor constructors and
/// actor methods.
///
/// Dependencies are reported first so the caller can wait on them; `take`
/// is only called once all of them are terminal and hands out owned copies.
pub trait Args: Send + 'static {
    type Resolved: Send + 'static;

    #[doc(hidden)]
    fn dependencies(&self, deps: &mut Vec<RawRef>);

    #[doc(hidden)]
    fn take(self) -> Result<Self::Resolved, TaskError>;
}

fn take_ready<T>(object: &ObjectRef<T>) -> Result<T, TaskError>
    where T: Clone + Send + Sync + 'static
{
    match object.raw().peek() {
        Some(completion) => object.extract(completion).map_err(|err| TaskError::Dependency {
            object: object.id().clone(),
            source: Box::new(err),
        }),
        None => Err(TaskError::ObjectLost { object: object.id().clone() }),
    }
}

impl<T> Args for ObjectRef<T>
    where T: Clone + Send + Sync + 'static
{
    type Resolved = T;

    fn dependencies(&self, deps: &mut Vec<RawRef>) {
        deps.push(self.raw().clone());
    }

    fn take(self) -> Result<T, TaskError> {
        take_ready(&self)
    }
}

impl<T> Args for Arg<T>
    where T: Clone + Send + Sync + 'static
{
    type Resolved = T;

    fn dependencies(&self, deps: &mut Vec<RawRef>) {
        if let Arg::Pending(object) = self {
            deps.push(object.raw().clone());
        }
    }

    fn take(self) -> Result<T, TaskError> {
        match self {
            Arg::Immediate(value) => Ok(value),
            Arg::Pending(object) => take_ready(&object),
        }
    }
}

impl Args for () {
    type Resolved = ();

    fn dependencies(&self, _deps: &mut Vec<RawRef>) {}

    fn take(self) -> Result<(), TaskError> {
        Ok(())
    }
}

impl<A: Args> Args for Vec<A> {
    type Resolved = Vec<A::Resolved>;

    fn dependencies(&self, deps: &mut Vec<RawRef>) {
        for arg in self {
            arg.dependencies(deps);
        }
    }

    fn take(self) -> Result<Self::Resolved, TaskError> {
        self.into_iter().map(Args::take).collect()
    }
}

macro_rules! tuple_args {
    ($($ty:ident $var:ident),+) => {
        impl<$($ty: Args),+> Args for ($($ty,)+) {
            type Resolved = ($($ty::Resolved,)+);

            fn dependencies(&self, deps: &mut Vec<RawRef>) {
                let ($($var,)+) = self;
                $($var.dependencies(deps);)+
            }

            fn take(self) -> Result<Self::Resolved, TaskError> {
                let ($($var,)+) = self;
                Ok(($($var.take()?,)+))
            }
        }
    };
}

tuple_args!(A a);
tuple_args!(A a, B b);
tuple_args!(A a, B b, C c);
tuple_args!(A a, B b, C c, D d);
tuple_args!(A a, B b, C c, D d, E e);
tuple_args!(A a, B b, C c, D d, E e, F f);
