use std::collections::VecDeque;

use crate::actor::{Actor, ActorFactoryArgs, ActorReference, Context, Next, Sender};
use crate::streams::{DemandMsg, DownstreamRef, ElementMsg, StageMsg, UpstreamRef};
use crate::Message;

fn me<Msg: Message>(ctx: &Context<Msg>) -> Sender {
    Some(ctx.myself().into())
}

struct HubSub<E: Message> {
    sink: DownstreamRef<E>,
    requested: u64,
    delivered: u64,
    // elements that arrived while this subscriber had no credit; the
    // hub forwards the minimum demand, so the backlog is bounded by
    // the gap between this subscriber and the fastest one
    pending: VecDeque<E>,
    cancelled: bool,
}

impl<E: Message> HubSub<E> {
    fn offer(&mut self, element: E) {
        if self.cancelled {
            return;
        }
        if self.delivered < self.requested {
            self.delivered += 1;
            self.sink.tell(ElementMsg::Produce(element), None);
        } else {
            self.pending.push_back(element);
        }
    }

    fn drain(&mut self) {
        while self.delivered < self.requested {
            match self.pending.pop_front() {
                Some(element) => {
                    self.delivered += 1;
                    self.sink.tell(ElementMsg::Produce(element), None);
                }
                None => break,
            }
        }
    }
}

/// One upstream, many downstreams.
///
/// Each subscriber's outstanding demand is tracked separately; the hub
/// forwards upstream demand equal to the minimum across active
/// subscribers, so no subscriber ever receives an element it did not
/// request. Cancellation of one subscriber does not affect the others.
/// A subscriber added after the terminal event immediately receives
/// that event.
pub struct BroadcastHub<E: Message> {
    upstream: UpstreamRef,
    subs: Vec<HubSub<E>>,
    forwarded: u64,
    terminal: Option<ElementMsg<E>>,
}

impl<E: Message> ActorFactoryArgs<UpstreamRef> for BroadcastHub<E> {
    fn create_args(upstream: UpstreamRef) -> Self {
        BroadcastHub {
            upstream,
            subs: Vec::new(),
            forwarded: 0,
            terminal: None,
        }
    }
}

impl<E: Message> BroadcastHub<E> {
    fn forward_demand(&mut self, ctx: &Context<StageMsg<E, E>>) {
        let min = self
            .subs
            .iter()
            .filter(|s| !s.cancelled)
            .map(|s| s.requested)
            .min();

        if let Some(min) = min {
            if min > self.forwarded {
                self.upstream
                    .tell(DemandMsg::Request(min - self.forwarded), me(ctx));
                self.forwarded = min;
            }
        }
    }

    fn sub_by_sender(&mut self, sender: &Sender) -> Option<&mut HubSub<E>> {
        let sender = sender.as_ref()?;
        self.subs
            .iter_mut()
            .find(|s| s.sink.path() == sender.path())
    }
}

impl<E: Message> Actor for BroadcastHub<E> {
    type Msg = StageMsg<E, E>;

    fn recv(&mut self, ctx: &Context<Self::Msg>, msg: Self::Msg, sender: Sender) -> Next<Self::Msg> {
        match msg {
            StageMsg::Subscribe(sub) => {
                if let Some(terminal) = &self.terminal {
                    sub.downstream.tell(terminal.clone(), None);
                } else {
                    self.subs.push(HubSub {
                        sink: sub.downstream,
                        requested: 0,
                        delivered: 0,
                        pending: VecDeque::new(),
                        cancelled: false,
                    });
                }
                Next::Same
            }
            StageMsg::Demand(DemandMsg::Request(n)) => {
                if let Some(sub) = self.sub_by_sender(&sender) {
                    sub.requested += n;
                    sub.drain();
                    self.forward_demand(ctx);
                }
                Next::Same
            }
            StageMsg::Demand(DemandMsg::Cancel) => {
                if let Some(sub) = self.sub_by_sender(&sender) {
                    sub.cancelled = true;
                }

                if self.subs.iter().all(|s| s.cancelled) && !self.subs.is_empty() {
                    self.upstream.tell(DemandMsg::Cancel, me(ctx));
                    return Next::Stopped;
                }

                // the remaining subscribers' minimum may have risen
                self.forward_demand(ctx);
                Next::Same
            }
            StageMsg::Element(ElementMsg::Produce(e)) => {
                for sub in self.subs.iter_mut() {
                    sub.offer(e.clone());
                }
                Next::Same
            }
            StageMsg::Element(terminal) => {
                for sub in self.subs.iter().filter(|s| !s.cancelled) {
                    sub.sink.tell(terminal.clone(), None);
                }
                self.terminal = Some(terminal);
                // stay alive so late subscribers observe the terminal
                Next::Same
            }
        }
    }
}
