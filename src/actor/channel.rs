#![allow(unused_variables)]

use std::collections::HashMap;

use crate::{
    actor::{
        Actor, ActorFactory, ActorRef, ActorRefFactory, ActorReference, BasicActorRef, BoxedTell,
        Context, CreateError, Next, Props, Receive, Sender, Tell,
    },
    system::{SystemEvent, SystemMsg},
    Message,
};

type Subs<Msg> = HashMap<Topic, Vec<BoxedTell<Msg>>>;

// Generic Channel
pub type ChannelCtx<Msg> = Context<ChannelMsg<Msg>>;
pub type ChannelRef<Msg> = ActorRef<ChannelMsg<Msg>>;
pub type DLChannelMsg = ChannelMsg<DeadLetter>;

/// A specialized actor providing Publish/Subscribe capabilities for
/// user level messages
pub struct Channel<Msg: Message> {
    subs: Subs<Msg>,
}

impl<Msg> ActorFactory for Channel<Msg>
where
    Msg: Message,
{
    fn create() -> Self {
        Channel {
            subs: HashMap::new(),
        }
    }
}

impl<Msg> Channel<Msg>
where
    Msg: Message,
{
    pub fn props() -> crate::actor::BoxActorProd<Channel<Msg>> {
        Props::new::<Channel<Msg>>()
    }
}

impl<Msg> Actor for Channel<Msg>
where
    Msg: Message,
{
    type Msg = ChannelMsg<Msg>;

    fn recv(
        &mut self,
        ctx: &ChannelCtx<Msg>,
        msg: ChannelMsg<Msg>,
        sender: Sender,
    ) -> Next<Self::Msg> {
        match msg {
            ChannelMsg::Publish(p) => self.receive(ctx, p, sender),
            ChannelMsg::Subscribe(sub) => self.receive(ctx, sub, sender),
            ChannelMsg::Unsubscribe(unsub) => self.receive(ctx, unsub, sender),
            ChannelMsg::UnsubscribeAll(unsub) => self.receive(ctx, unsub, sender),
        }
    }

    // Subscribers are watched so subscribers that terminate without
    // explicitly unsubscribing are pruned.
    fn sys_recv(&mut self, ctx: &ChannelCtx<Msg>, msg: SystemMsg, sender: Sender) {
        if let SystemMsg::Terminated(terminated) = msg {
            let topics: Vec<Topic> = self.subs.keys().cloned().collect();
            for topic in topics {
                unsubscribe(&mut self.subs, &topic, &terminated);
            }
        }
    }
}

impl<Msg> Receive<Subscribe<Msg>> for Channel<Msg>
where
    Msg: Message,
{
    type Msg = ChannelMsg<Msg>;

    fn receive(
        &mut self,
        ctx: &ChannelCtx<Msg>,
        msg: Subscribe<Msg>,
        sender: Sender,
    ) -> Next<Self::Msg> {
        if let Some(basic) = ctx.system.registry().resolve_ref(msg.actor.path()) {
            ctx.watch(&basic);
        }

        let subs = self.subs.entry(msg.topic).or_default();
        subs.push(msg.actor);
        Next::Same
    }
}

impl<Msg> Receive<Unsubscribe<Msg>> for Channel<Msg>
where
    Msg: Message,
{
    type Msg = ChannelMsg<Msg>;

    fn receive(
        &mut self,
        ctx: &ChannelCtx<Msg>,
        msg: Unsubscribe<Msg>,
        sender: Sender,
    ) -> Next<Self::Msg> {
        unsubscribe_tell(&mut self.subs, &msg.topic, &msg.actor);
        Next::Same
    }
}

impl<Msg> Receive<UnsubscribeAll<Msg>> for Channel<Msg>
where
    Msg: Message,
{
    type Msg = ChannelMsg<Msg>;

    fn receive(
        &mut self,
        ctx: &ChannelCtx<Msg>,
        msg: UnsubscribeAll<Msg>,
        sender: Sender,
    ) -> Next<Self::Msg> {
        let topics: Vec<Topic> = self.subs.keys().cloned().collect();
        for topic in topics {
            unsubscribe_tell(&mut self.subs, &topic, &msg.actor);
        }
        Next::Same
    }
}

impl<Msg> Receive<Publish<Msg>> for Channel<Msg>
where
    Msg: Message,
{
    type Msg = ChannelMsg<Msg>;

    fn receive(
        &mut self,
        ctx: &ChannelCtx<Msg>,
        msg: Publish<Msg>,
        sender: Sender,
    ) -> Next<Self::Msg> {
        // send to actors subscribed to all topics
        if let Some(subs) = self.subs.get(&All.into()) {
            for sub in subs.iter() {
                sub.tell(msg.msg.clone(), sender.clone());
            }
        }

        // send to actors subscribed to the topic
        if let Some(subs) = self.subs.get(&msg.topic) {
            for sub in subs.iter() {
                sub.tell(msg.msg.clone(), sender.clone());
            }
        }
        Next::Same
    }
}

fn unsubscribe<Msg>(subs: &mut Subs<Msg>, topic: &Topic, actor: &BasicActorRef)
where
    Msg: Message,
{
    if let Some(entry) = subs.get_mut(topic) {
        entry.retain(|sub| sub.path() != actor.path());
    }
}

fn unsubscribe_tell<Msg>(subs: &mut Subs<Msg>, topic: &Topic, actor: &BoxedTell<Msg>)
where
    Msg: Message,
{
    if let Some(entry) = subs.get_mut(topic) {
        entry.retain(|sub| sub.path() != actor.path());
    }
}

/// The channel used by the system to publish lifecycle events
/// (`ActorCreated`, `ActorRestarted`, `ActorTerminated`).
pub type EventsChannel = Channel<SystemEvent>;

/// Starts a new channel under the given factory.
pub fn channel<Msg>(
    name: &str,
    factory: &impl ActorRefFactory,
) -> Result<ChannelRef<Msg>, CreateError>
where
    Msg: Message,
{
    factory.actor_of_props(name, Channel::props())
}

#[derive(Clone, Debug)]
pub enum ChannelMsg<Msg: Message> {
    /// Publish message
    Publish(Publish<Msg>),

    /// Subscribe given `BoxedTell` to a topic on a channel
    Subscribe(Subscribe<Msg>),

    /// Unsubscribe the given `BoxedTell` from a topic on a channel
    Unsubscribe(Unsubscribe<Msg>),

    /// Unsubscribe the given `BoxedTell` from all topics on a channel
    UnsubscribeAll(UnsubscribeAll<Msg>),
}

#[derive(Clone, Debug)]
pub struct Publish<Msg: Message> {
    pub topic: Topic,
    pub msg: Msg,
}

impl<Msg: Message> From<Publish<Msg>> for ChannelMsg<Msg> {
    fn from(msg: Publish<Msg>) -> Self {
        ChannelMsg::Publish(msg)
    }
}

#[derive(Clone, Debug)]
pub struct Subscribe<Msg: Message> {
    pub topic: Topic,
    pub actor: BoxedTell<Msg>,
}

impl<Msg: Message> From<Subscribe<Msg>> for ChannelMsg<Msg> {
    fn from(msg: Subscribe<Msg>) -> Self {
        ChannelMsg::Subscribe(msg)
    }
}

#[derive(Clone, Debug)]
pub struct Unsubscribe<Msg: Message> {
    pub topic: Topic,
    pub actor: BoxedTell<Msg>,
}

impl<Msg: Message> From<Unsubscribe<Msg>> for ChannelMsg<Msg> {
    fn from(msg: Unsubscribe<Msg>) -> Self {
        ChannelMsg::Unsubscribe(msg)
    }
}

#[derive(Clone, Debug)]
pub struct UnsubscribeAll<Msg: Message> {
    pub actor: BoxedTell<Msg>,
}

impl<Msg: Message> From<UnsubscribeAll<Msg>> for ChannelMsg<Msg> {
    fn from(msg: UnsubscribeAll<Msg>) -> Self {
        ChannelMsg::UnsubscribeAll(msg)
    }
}

/// Topics allow channel subscribers to filter messages by interest
///
/// When publishing a message to a channel a Topic is provided.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Topic(String);

impl<'a> From<&'a str> for Topic {
    fn from(topic: &str) -> Self {
        Topic(topic.to_string())
    }
}

impl From<String> for Topic {
    fn from(topic: String) -> Self {
        Topic(topic)
    }
}

impl<'a> From<&'a SystemEvent> for Topic {
    fn from(evt: &SystemEvent) -> Self {
        match evt {
            SystemEvent::ActorCreated(_) => Topic::from("actor.created"),
            SystemEvent::ActorRestarted(_) => Topic::from("actor.restarted"),
            SystemEvent::ActorTerminated(_) => Topic::from("actor.terminated"),
        }
    }
}

/// A channel topic representing all topics `*`
#[derive(Clone, Debug)]
pub struct All;

impl From<All> for Topic {
    fn from(_all: All) -> Self {
        Topic::from("*")
    }
}

/// System topics used by the `event_stream` channel
#[derive(Clone, Debug)]
pub enum SysTopic {
    ActorCreated,
    ActorRestarted,
    ActorTerminated,
}

impl From<SysTopic> for Topic {
    fn from(evt: SysTopic) -> Self {
        match evt {
            SysTopic::ActorCreated => Topic::from("actor.created"),
            SysTopic::ActorRestarted => Topic::from("actor.restarted"),
            SysTopic::ActorTerminated => Topic::from("actor.terminated"),
        }
    }
}

/// Messages that couldn't be delivered to their recipient
#[derive(Clone, Debug)]
pub struct DeadLetter {
    pub msg: String,
    pub sender: Sender,
    /// Canonical path of the intended recipient, which may not resolve
    /// to a live actor.
    pub recipient: String,
}

pub fn dead_letter(dl: &ActorRef<DLChannelMsg>, sender: Sender, recipient: String, msg: String) {
    let dl_msg = DeadLetter {
        msg,
        sender,
        recipient,
    };

    dl.tell(
        Publish {
            topic: "dead_letter".into(),
            msg: dl_msg,
        },
        None,
    );
}
