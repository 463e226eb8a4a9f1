#![crate_name = "movie"]
#![deny(clippy::all)]
#![allow(clippy::new_ret_no_self)]
#![allow(clippy::large_enum_variant)]

mod validate;

pub mod actor;
pub mod config;
pub mod executor;
pub mod future;
pub mod kernel;
pub mod persist;
pub mod remote;
pub mod streams;
pub mod system;

use std::any::Any;
use std::fmt;
use std::fmt::Debug;

use crate::actor::BasicActorRef;

pub use crate::config::{load_config, Config, ConfigError};

/// Wraps message and sender
#[derive(Debug, Clone)]
pub struct Envelope<T: Message> {
    pub sender: Option<BasicActorRef>,
    pub msg: T,
}

pub trait Message: Debug + Clone + Send + 'static {}
impl<T: Debug + Clone + Send + 'static> Message for T {}

/// A type-erased message.
///
/// `AnyMessage` is the envelope the scheduler and the remoting inbound
/// path use to move a message across a typed mailbox boundary. The
/// mailbox recovers the concrete type at enqueue time; a mismatch is
/// routed to dead letters by the caller.
pub struct AnyMessage {
    pub one_time: bool,
    pub msg: Option<Box<dyn Any + Send>>,
}

pub struct DowncastAnyMessageError;

impl AnyMessage {
    pub fn new<T>(msg: T, one_time: bool) -> Self
    where
        T: Any + Message,
    {
        Self {
            one_time,
            msg: Some(Box::new(msg)),
        }
    }

    pub fn take<T>(&mut self) -> Result<T, DowncastAnyMessageError>
    where
        T: Any + Message,
    {
        if self.one_time {
            match self.msg.take() {
                Some(m) => {
                    if m.is::<T>() {
                        Ok(*m.downcast::<T>().map_err(|_| DowncastAnyMessageError)?)
                    } else {
                        Err(DowncastAnyMessageError)
                    }
                }
                None => Err(DowncastAnyMessageError),
            }
        } else {
            match self.msg.as_ref() {
                Some(m) if m.is::<T>() => m
                    .downcast_ref::<T>()
                    .cloned()
                    .ok_or(DowncastAnyMessageError),
                Some(_) => Err(DowncastAnyMessageError),
                None => Err(DowncastAnyMessageError),
            }
        }
    }

    pub(crate) fn inner_type_id(&self) -> Option<std::any::TypeId> {
        self.msg.as_ref().map(|m| (**m).type_id())
    }

    pub(crate) fn inner_ref(&self) -> Option<&(dyn Any + Send)> {
        self.msg.as_deref()
    }
}

impl Clone for AnyMessage {
    fn clone(&self) -> Self {
        panic!("Can't clone a message of type `AnyMessage`");
    }
}

impl Debug for AnyMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("AnyMessage")
    }
}

pub mod actors {
    pub use crate::actor::*;
    pub use crate::executor::Run;
    pub use crate::future::{ask, Fault, Promise, SubscriptionToken};
    pub use crate::system::{
        ActorSystem, ScheduleId, SystemBuilder, SystemCmd, SystemEvent, SystemMsg, Timer,
    };
    pub use crate::{AnyMessage, Envelope, Message};
}
