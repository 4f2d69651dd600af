use std::sync::Arc;

use futures::future::FutureExt;
use futures::{pin_mut, select_biased};
use log::{debug, trace, warn};
use tokio::task;

use super::class::ActorClass;
use super::handle::ActorShared;
use super::mailbox::{Mail, MailboxReceiver};
use super::ActorId;
use crate::error::TaskError;
use crate::executor::panic_message;
use crate::object::{resolve_dependencies, Args, ObjectId};
use crate::system::RuntimeData;

/// The execution context owning one actor's state.
pub(crate) struct ActorCell<A, I> {
    id: ActorId,
    class: ActorClass<A, I>,
    data: Arc<RuntimeData>,
    shared: Arc<ActorShared>,
    restarts_left: u32,
    // Dequeued call still waiting on its arguments.
    in_flight: Option<ObjectId>,
}

impl<A, I> ActorCell<A, I>
    where A: Send + 'static,
          I: Clone + Send + 'static,
{
    pub(crate) fn new(
        id: ActorId,
        class: ActorClass<A, I>,
        data: Arc<RuntimeData>,
        shared: Arc<ActorShared>,
    ) -> ActorCell<A, I> {
        let restarts_left = class.max_restarts;
        ActorCell { id, class, data, shared, restarts_left, in_flight: None }
    }

    async fn construct(&self, init: I) -> Result<A, String> {
        let constructor = self.class.constructor.clone();
        match task::spawn_blocking(move || constructor(init)).await {
            Ok(Ok(state)) => Ok(state),
            Ok(Err(err)) => Err(format!("constructor failed: {}", err)),
            Err(err) => Err(format!("constructor panicked: {}", panic_message(err))),
        }
    }

    /// Serve the mailbox until the actor stops. Returns why it stopped.
    async fn run<Ar>(&mut self, args: Ar, mailbox: &mut MailboxReceiver<A>) -> String
        where Ar: Args<Resolved = I>,
    {
        let mut deps = Vec::new();
        args.dependencies(&mut deps);
        if let Err(err) = resolve_dependencies(deps).await {
            return format!("constructor arguments failed: {}", err);
        }
        let init = match args.take() {
            Ok(init) => init,
            Err(err) => return format!("constructor arguments failed: {}", err),
        };
        let _permit = match self.data.reserve(self.class.num_cpus).await {
            Ok(permit) => permit,
            Err(err) => return err.to_string(),
        };
        let mut state = match self.construct(init.clone()).await {
            Ok(state) => state,
            Err(reason) => return reason,
        };
        debug!("Actor {} started", self.id);

        let table = self.data.table.clone();
        loop {
            let envelope = match mailbox.next().await {
                Mail::Call(envelope) => envelope,
                Mail::Kill(reason) => return reason,
                Mail::Closed => return "all handles were dropped".to_string(),
            };
            let object = envelope.object_id().clone();
            let method = envelope.method().clone();

            // A kill or a cancel must not wait for the call's dependencies.
            self.in_flight = Some(object.clone());
            let resolved = {
                let killed = mailbox.killed().fuse();
                let settled = table.settled(&object).fuse();
                let resolve = envelope.resolve().fuse();
                pin_mut!(killed, settled, resolve);
                select_biased! {
                    reason = killed => return reason,
                    _ = settled => None,
                    resolved = resolve => Some(resolved),
                }
            };
            self.in_flight = None;
            let invocation = match resolved {
                Some(Ok(invocation)) => invocation,
                Some(Err(err)) => {
                    table.complete(&object, Err(err));
                    continue;
                }
                None => {
                    trace!("{} skipping settled call {}", self.id, object);
                    continue;
                }
            };
            if !table.start(&object) {
                trace!("{} skipping cancelled call {}", self.id, object);
                continue;
            }

            let outcome = task::spawn_blocking(move || {
                let result = invocation(&mut state);
                (state, result)
            }).await;
            match outcome {
                Ok((returned, result)) => {
                    state = returned;
                    table.complete(&object, result);
                }
                Err(err) => {
                    let message = panic_message(err);
                    if self.restarts_left == 0 {
                        table.complete(&object, Err(TaskError::Panicked {
                            function: method.clone(),
                            message: Arc::new(message.clone()),
                        }));
                        return format!("{} panicked: {}", method, message);
                    }
                    self.restarts_left -= 1;
                    warn!("Actor {} lost its state in {}: {}; restarting ({} restarts left)",
                        self.id, method, message, self.restarts_left);
                    table.complete(&object, Err(TaskError::ActorRestarted {
                        actor: self.id.clone(),
                        method,
                    }));
                    state = match self.construct(init.clone()).await {
                        Ok(state) => state,
                        Err(reason) => return reason,
                    };
                }
            }
        }
    }
}

/// Run an actor from construction to shutdown, then fail whatever is left
/// in its mailbox.
pub(crate) async fn run_actor<A, I, Ar>(mut cell: ActorCell<A, I>, args: Ar, mut mailbox: MailboxReceiver<A>)
    where A: Send + 'static,
          I: Clone + Send + 'static,
          Ar: Args<Resolved = I>,
{
    let reason = cell.run(args, &mut mailbox).await;
    debug!("Actor {} stopped: {}", cell.id, reason);
    cell.data.unregister_actor(&cell.id);

    let error = TaskError::unavailable(&cell.id, reason);
    cell.shared.set_death(error.clone());
    if let Some(object) = cell.in_flight.take() {
        cell.data.table.complete(&object, Err(error.clone()));
    }
    for envelope in mailbox.close() {
        cell.data.table.complete(envelope.object_id(), Err(error.clone()));
    }
}
