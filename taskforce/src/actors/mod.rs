//! Stateful actors: each owns its state exclusively and serves method calls
//! from a FIFO mailbox, one at a time.

mod cell;
mod class;
mod handle;
mod id;
mod mailbox;

pub use self::class::ActorClass;
pub use self::handle::{ActorHandle, ActorMethod};
pub use self::id::ActorId;

pub(crate) use self::mailbox::Control;
