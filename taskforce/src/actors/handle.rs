use std::fmt;
use std::hash;
use std::sync::{Arc, Mutex, PoisonError};

use futures::channel::mpsc::UnboundedSender;
use log::{debug, trace};

use super::mailbox::{Call, Control, MailboxSender, MethodBody};
use super::ActorId;
use crate::error::TaskError;
use crate::object::{Args, CompletionTable, ObjectRef};
use crate::StdError;

/// State shared between an actor's run loop and its handles.
#[derive(Default)]
pub(crate) struct ActorShared {
    death: Mutex<Option<TaskError>>,
}

impl ActorShared {
    pub(crate) fn set_death(&self, error: TaskError) {
        *self.death.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    fn death(&self) -> Option<TaskError> {
        self.death.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// A method of actor type `A`, registered once and callable on any actor
/// of that type.
pub struct ActorMethod<A, T, R> {
    name: Arc<str>,
    body: MethodBody<A, T, R>,
}

impl<A, T, R> Clone for ActorMethod<A, T, R> {
    fn clone(&self) -> Self {
        ActorMethod {
            name: self.name.clone(),
            body: self.body.clone(),
        }
    }
}

impl<A, T, R> fmt::Debug for ActorMethod<A, T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorMethod({})", self.name)
    }
}

impl<A, T, R> ActorMethod<A, T, R>
    where A: Send + 'static,
          T: Send + 'static,
          R: Clone + Send + Sync + 'static,
{
    pub fn new<S, F>(name: S, body: F) -> ActorMethod<A, T, R>
        where S: Into<Arc<str>>,
              F: Fn(&mut A, T) -> Result<R, StdError> + Send + Sync + 'static,
    {
        ActorMethod {
            name: name.into(),
            body: Arc::new(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a call on `actor`. Same as [`ActorHandle::call`].
    pub fn remote<Ar>(&self, actor: &ActorHandle<A>, args: Ar) -> ObjectRef<R>
        where Ar: Args<Resolved = T>,
    {
        actor.call(self, args)
    }
}

/// Routes calls to one actor's mailbox. Clones share the mailbox; the
/// actor state itself never leaves its run loop.
pub struct ActorHandle<A> {
    id: ActorId,
    mailbox: MailboxSender<A>,
    shared: Arc<ActorShared>,
    table: Arc<CompletionTable>,
}

impl<A> Clone for ActorHandle<A> {
    fn clone(&self) -> Self {
        ActorHandle {
            id: self.id.clone(),
            mailbox: self.mailbox.clone(),
            shared: self.shared.clone(),
            table: self.table.clone(),
        }
    }
}

impl<A> fmt::Debug for ActorHandle<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorHandle({})", self.id)
    }
}

impl<A> PartialEq for ActorHandle<A> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<A> Eq for ActorHandle<A> {}

impl<A> hash::Hash for ActorHandle<A> {
    fn hash<H: hash::Hasher>(&self, state: &'_ mut H) {
        self.id.hash(state)
    }
}

impl<A> ActorHandle<A>
    where A: Send + 'static
{
    pub(crate) fn new(
        id: ActorId,
        mailbox: MailboxSender<A>,
        shared: Arc<ActorShared>,
        table: Arc<CompletionTable>,
    ) -> ActorHandle<A> {
        ActorHandle { id, mailbox, shared, table }
    }

    pub fn id(&self) -> &ActorId {
        &self.id
    }

    /// False once the actor has stopped taking calls.
    pub fn is_alive(&self) -> bool {
        !self.mailbox.calls.is_closed()
    }

    pub(crate) fn control(&self) -> UnboundedSender<Control> {
        self.mailbox.control.clone()
    }

    /// Queue a call to `method`. Returns at once; calls from all handles
    /// run one at a time in the order they were queued.
    pub fn call<T, R, Ar>(&self, method: &ActorMethod<A, T, R>, args: Ar) -> ObjectRef<R>
        where T: Send + 'static,
              R: Clone + Send + Sync + 'static,
              Ar: Args<Resolved = T>,
    {
        let raw = self.table.register(&method.name);
        let call = Call {
            object: raw.id().clone(),
            method: method.name.clone(),
            body: method.body.clone(),
            args,
        };
        if self.mailbox.calls.unbounded_send(Box::new(call)).is_err() {
            trace!("{} rejected call to {}", self.id, method.name);
            let error = self.shared
                .death()
                .unwrap_or_else(|| TaskError::unavailable(&self.id, "actor has stopped"));
            self.table.complete(raw.id(), Err(error));
        }
        ObjectRef::new(raw)
    }

    /// Stop the actor ahead of any queued calls; those calls fail with
    /// [`TaskError::ActorUnavailable`].
    pub fn kill(&self) {
        if self.mailbox.control.unbounded_send(Control::kill("killed")).is_err() {
            debug!("{} already stopped", self.id);
        }
    }
}
