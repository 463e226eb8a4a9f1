use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::actor::Actor;

/// Provides instances of `ActorProducer` for use when creating Actors
/// (`actor_of_*`).
///
/// Actors are not created directly. Instead you provide an
/// `ActorProducer` that allows the `ActorSystem` to start an actor when
/// `actor_of` is used, or when an actor fails and a supervisor requests
/// an actor to be restarted.
///
/// `ActorProducer` can hold values required by the actor's factory
/// method parameters.
pub struct Props;

impl Props {
    /// Creates an `ActorProducer` from the actor's `ActorFactory`
    /// implementation.
    pub fn new<A>() -> BoxActorProd<A>
    where
        A: ActorFactory,
    {
        Arc::new(ActorProps {
            _marker: PhantomData,
        })
    }

    /// Creates an `ActorProducer` with one or more factory method
    /// parameters.
    pub fn new_args<A, Args>(args: Args) -> BoxActorProd<A>
    where
        A: ActorFactoryArgs<Args>,
        Args: ActorArgs,
    {
        Arc::new(ActorPropsWithArgs {
            args,
            _marker: PhantomData,
        })
    }

    /// Creates an `ActorProducer` from a factory closure. The closure is
    /// re-invoked on restart.
    pub fn new_from<A, F>(creator: F) -> BoxActorProd<A>
    where
        A: Actor,
        F: Fn() -> A + Send + Sync + 'static,
    {
        Arc::new(ActorPropsFrom { creator })
    }
}

pub type BoxActorProd<A> = Arc<dyn ActorProducer<Actor = A>>;

pub trait ActorProducer: Send + Sync + 'static {
    type Actor: Actor;

    /// Produces a fresh instance of the actor.
    ///
    /// Invoked on spawn and on every restart.
    fn produce(&self) -> Self::Actor;
}

pub trait ActorArgs: Clone + Send + Sync + 'static {}
impl<T: Clone + Send + Sync + 'static> ActorArgs for T {}

pub trait ActorFactory: Actor {
    fn create() -> Self;
}

pub trait ActorFactoryArgs<Args: ActorArgs>: Actor {
    fn create_args(args: Args) -> Self;
}

struct ActorProps<A: ActorFactory> {
    _marker: PhantomData<fn() -> A>,
}

impl<A: ActorFactory> ActorProducer for ActorProps<A> {
    type Actor = A;

    fn produce(&self) -> A {
        A::create()
    }
}

struct ActorPropsWithArgs<A, Args>
where
    A: ActorFactoryArgs<Args>,
    Args: ActorArgs,
{
    args: Args,
    _marker: PhantomData<fn() -> A>,
}

impl<A, Args> ActorProducer for ActorPropsWithArgs<A, Args>
where
    A: ActorFactoryArgs<Args>,
    Args: ActorArgs,
{
    type Actor = A;

    fn produce(&self) -> A {
        A::create_args(self.args.clone())
    }
}

struct ActorPropsFrom<A, F>
where
    A: Actor,
    F: Fn() -> A + Send + Sync + 'static,
{
    creator: F,
}

impl<A, F> ActorProducer for ActorPropsFrom<A, F>
where
    A: Actor,
    F: Fn() -> A + Send + Sync + 'static,
{
    type Actor = A;

    fn produce(&self) -> A {
        (self.creator)()
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Props")
    }
}
