#![allow(unused_variables)]
pub(crate) mod actor_cell;
pub(crate) mod actor_ref;
pub(crate) mod channel;
pub(crate) mod path;
pub(crate) mod props;
pub(crate) mod registry;
pub(crate) mod supervision;

use std::fmt;

// Public movie::actor API (plus the pub data types in this file)
pub use self::{
    actor_cell::{ActorCell, Context, ExtendedCell},
    actor_ref::{
        ActorRef, ActorRefFactory, ActorReference, BasicActorRef, BoxedTell, Sender, Tell,
        TmpActorRefFactory,
    },
    channel::{
        channel, dead_letter, All, Channel, ChannelMsg, ChannelRef, DLChannelMsg, DeadLetter,
        EventsChannel, Publish, Subscribe, SysTopic, Topic, Unsubscribe, UnsubscribeAll,
    },
    path::{ActorId, ActorPath, ActorUri, Address, InvalidPath},
    props::{ActorArgs, ActorFactory, ActorFactoryArgs, ActorProducer, BoxActorProd, Props},
    registry::PathRegistry,
    supervision::{Scope, Strategy, SupervisionConfig},
};

use crate::{system::SystemMsg, Message};

#[allow(unused)]
pub type MsgResult<T> = Result<(), MsgError<T>>;

/// Internal message error when a message can't be added to an actor's mailbox
#[doc(hidden)]
#[derive(Clone)]
pub struct MsgError<T> {
    pub msg: T,
}

impl<T> MsgError<T> {
    pub fn new(msg: T) -> Self {
        MsgError { msg }
    }
}

impl<T> fmt::Display for MsgError<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("The actor does not exist. It may have been terminated")
    }
}

impl<T> fmt::Debug for MsgError<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// Error type when a `try_tell` fails on `Option<ActorRef<Msg>>`
pub struct TryMsgError<T> {
    pub msg: T,
}

impl<T> TryMsgError<T> {
    pub fn new(msg: T) -> Self {
        TryMsgError { msg }
    }
}

impl<T> fmt::Display for TryMsgError<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Option<ActorRef> is None")
    }
}

impl<T> fmt::Debug for TryMsgError<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// Error type when an actor fails to start during `actor_of`.
#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    #[error("Failed to create actor. Cause: Actor panicked while starting")]
    Panicked,
    #[error("Failed to create actor. Cause: System failure")]
    System,
    #[error("Failed to create actor. Cause: Invalid actor name ({0})")]
    InvalidName(String),
    #[error("Failed to create actor. Cause: An actor at the same path already exists ({0})")]
    AlreadyExists(ActorPath),
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid name ({name}). Must contain only a-Z, 0-9, _, or -")]
pub struct InvalidName {
    pub name: String,
}

impl From<InvalidName> for CreateError {
    fn from(err: InvalidName) -> CreateError {
        CreateError::InvalidName(err.name)
    }
}

/// Error type when an actor fails to restart.
#[derive(Debug, thiserror::Error)]
#[error("Failed to restart actor. Cause: Actor panicked while starting")]
pub struct RestartError;

/// What an actor does next after handling a message.
#[allow(clippy::large_enum_variant)]
pub enum Next<Msg: Message> {
    /// Keep the current behavior.
    Same,

    /// Initiate the stop drain for this actor.
    Stopped,

    /// The message was not handled; it is routed to dead letters.
    Unhandled,

    /// Swap in a new behavior for subsequent messages.
    Become(BoxActor<Msg>),
}

impl<Msg: Message> fmt::Debug for Next<Msg> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Next::Same => f.write_str("Same"),
            Next::Stopped => f.write_str("Stopped"),
            Next::Unhandled => f.write_str("Unhandled"),
            Next::Become(_) => f.write_str("Become(..)"),
        }
    }
}

pub trait Actor: Send + 'static {
    type Msg: Message;

    /// Invoked when an actor is being started by the system.
    ///
    /// Any initialization inherent to the actor's role should be
    /// performed here.
    ///
    /// Panics in `pre_start` do not invoke the
    /// supervision strategy and the actor will be terminated.
    fn pre_start(&mut self, ctx: &Context<Self::Msg>) {}

    /// Invoked after an actor has started.
    ///
    /// Panics in `post_start` follow the supervision strategy.
    fn post_start(&mut self, ctx: &Context<Self::Msg>) {}

    /// Invoked when the stop drain for this actor begins, before any
    /// children are stopped.
    fn pre_stop(&mut self, ctx: &Context<Self::Msg>) {}

    /// Invoked after an actor has been stopped and all of its children
    /// have terminated.
    fn post_stop(&mut self) {}

    /// Invoked on the failed instance before it is discarded by a
    /// restart.
    fn pre_restart(&mut self, ctx: &Context<Self::Msg>) {}

    /// Invoked on the fresh instance produced by a restart.
    fn post_restart(&mut self, ctx: &Context<Self::Msg>) {}

    /// Supervision applied to this actor's failed children.
    fn supervision(&self) -> SupervisionConfig {
        SupervisionConfig::default()
    }

    /// Invoked when an actor receives a system signal.
    ///
    /// It is guaranteed that only one message in the actor's mailbox is
    /// processed at any one time, including `recv` and `sys_recv`.
    fn sys_recv(&mut self, ctx: &Context<Self::Msg>, msg: SystemMsg, sender: Sender) {}

    /// Invoked when an actor receives a message.
    ///
    /// It is guaranteed that only one message in the actor's mailbox is
    /// processed at any one time, including `recv` and `sys_recv`.
    fn recv(&mut self, ctx: &Context<Self::Msg>, msg: Self::Msg, sender: Sender) -> Next<Self::Msg>;
}

impl<A: Actor + ?Sized> Actor for Box<A> {
    type Msg = A::Msg;

    fn pre_start(&mut self, ctx: &Context<Self::Msg>) {
        (**self).pre_start(ctx);
    }

    fn post_start(&mut self, ctx: &Context<Self::Msg>) {
        (**self).post_start(ctx)
    }

    fn pre_stop(&mut self, ctx: &Context<Self::Msg>) {
        (**self).pre_stop(ctx)
    }

    fn post_stop(&mut self) {
        (**self).post_stop()
    }

    fn pre_restart(&mut self, ctx: &Context<Self::Msg>) {
        (**self).pre_restart(ctx)
    }

    fn post_restart(&mut self, ctx: &Context<Self::Msg>) {
        (**self).post_restart(ctx)
    }

    fn supervision(&self) -> SupervisionConfig {
        (**self).supervision()
    }

    fn sys_recv(&mut self, ctx: &Context<Self::Msg>, msg: SystemMsg, sender: Sender) {
        (**self).sys_recv(ctx, msg, sender)
    }

    fn recv(&mut self, ctx: &Context<Self::Msg>, msg: Self::Msg, sender: Sender) -> Next<Self::Msg> {
        (**self).recv(ctx, msg, sender)
    }
}

/// Receive and handle a specific message type
///
/// This trait is typically implemented for each message type an actor's
/// message enum wraps, with `recv` delegating to the respective
/// implementation.
pub trait Receive<Msg: Message> {
    type Msg: Message;

    fn receive(&mut self, ctx: &Context<Self::Msg>, msg: Msg, sender: Sender) -> Next<Self::Msg>;
}

/// The actor trait object
pub type BoxActor<Msg> = Box<dyn Actor<Msg = Msg> + Send>;
