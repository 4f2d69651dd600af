use std::sync::Arc;

use async_trait::async_trait;
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::future;
use futures::stream::StreamExt;
use log::trace;

use super::ActorId;
use crate::error::TaskError;
use crate::object::{resolve_dependencies, AnyValue, Args, ObjectId};
use crate::StdError;

pub(crate) type MethodBody<A, T, R> = Arc<dyn Fn(&mut A, T) -> Result<R, StdError> + Send + Sync>;

/// A method call with its arguments already resolved, ready to run against
/// the actor state.
pub(crate) type Invocation<A> = Box<dyn FnOnce(&mut A) -> Result<AnyValue, TaskError> + Send>;

/// A queued method call, erased over its argument and return types.
#[async_trait]
pub(crate) trait Envelope<A>: Send {
    fn object_id(&self) -> &ObjectId;

    fn method(&self) -> &Arc<str>;

    /// Wait for the call's argument dependencies and bind the values.
    async fn resolve(self: Box<Self>) -> Result<Invocation<A>, TaskError>;
}

pub(crate) struct Call<A, Ar: Args, R> {
    pub(crate) object: ObjectId,
    pub(crate) method: Arc<str>,
    pub(crate) body: MethodBody<A, Ar::Resolved, R>,
    pub(crate) args: Ar,
}

#[async_trait]
impl<A, Ar, R> Envelope<A> for Call<A, Ar, R>
    where A: 'static,
          Ar: Args,
          R: Send + Sync + 'static,
{
    fn object_id(&self) -> &ObjectId {
        &self.object
    }

    fn method(&self) -> &Arc<str> {
        &self.method
    }

    async fn resolve(self: Box<Self>) -> Result<Invocation<A>, TaskError> {
        let Call { method, body, args, .. } = *self;
        let mut deps = Vec::new();
        args.dependencies(&mut deps);
        resolve_dependencies(deps).await?;
        let values = args.take()?;
        Ok(Box::new(move |state: &mut A| {
            body(state, values)
                .map(|value| Arc::new(value) as AnyValue)
                .map_err(|err| TaskError::user(&method, err))
        }))
    }
}

#[derive(Debug)]
pub(crate) enum Control {
    Kill { reason: String },
}

impl Control {
    pub(crate) fn kill<S: Into<String>>(reason: S) -> Control {
        Control::Kill { reason: reason.into() }
    }
}

pub(crate) enum Mail<A> {
    Call(Box<dyn Envelope<A>>),
    Kill(String),
    Closed,
}

pub(crate) struct MailboxSender<A> {
    pub(crate) calls: UnboundedSender<Box<dyn Envelope<A>>>,
    pub(crate) control: UnboundedSender<Control>,
}

impl<A> Clone for MailboxSender<A> {
    fn clone(&self) -> Self {
        MailboxSender {
            calls: self.calls.clone(),
            control: self.control.clone(),
        }
    }
}

pub(crate) struct MailboxReceiver<A> {
    actor: ActorId,
    calls: UnboundedReceiver<Box<dyn Envelope<A>>>,
    control: UnboundedReceiver<Control>,
}

pub(crate) fn channel<A>(actor: ActorId) -> (MailboxSender<A>, MailboxReceiver<A>) {
    let (calls, call_rx) = mpsc::unbounded();
    let (control, control_rx) = mpsc::unbounded();
    (MailboxSender { calls, control },
     MailboxReceiver { actor, calls: call_rx, control: control_rx })
}

impl<A> MailboxReceiver<A> {
    /// Next thing for the actor to do. Control messages overtake queued
    /// calls; calls come out in the order they were sent.
    pub(crate) async fn next(&mut self) -> Mail<A> {
        loop {
            futures::select_biased! {
                control = self.control.next() => match control {
                    Some(Control::Kill { reason }) => return Mail::Kill(reason),
                    None => trace!("{} control channel closed", self.actor),
                },
                call = self.calls.next() => return match call {
                    Some(envelope) => Mail::Call(envelope),
                    None => Mail::Closed,
                },
                complete => return Mail::Closed,
            }
        }
    }

    /// Resolves with the reason once the actor is told to stop. Never
    /// resolves if the control channel has closed.
    pub(crate) async fn killed(&mut self) -> String {
        match self.control.next().await {
            Some(Control::Kill { reason }) => reason,
            None => future::pending().await,
        }
    }

    /// Stop accepting calls and hand back the ones still queued.
    pub(crate) fn close(&mut self) -> Vec<Box<dyn Envelope<A>>> {
        self.calls.close();
        self.control.close();
        let mut queued = Vec::new();
        while let Ok(envelope) = self.calls.try_recv() {
            queued.push(envelope);
        }
        trace!("{} closed with {} queued calls", self.actor, queued.len());
        queued
    }
}
