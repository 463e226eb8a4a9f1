use std::sync::Arc;

use crate::actor::{Actor, ActorFactoryArgs, Context, Next, Sender};
use crate::streams::{DemandMsg, DownstreamRef, ElementMsg, StageMsg, UpstreamRef};
use crate::Message;

pub type MapFn<In, Out> = Arc<dyn Fn(In) -> Out + Send + Sync>;
pub type FilterFn<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;
pub type TapFn<E> = Arc<dyn Fn(&E) + Send + Sync>;

fn me<Msg: Message>(ctx: &Context<Msg>) -> Sender {
    Some(ctx.myself().into())
}

/// Applies a function to each element; demand forwards 1:1.
pub struct MapFlow<In: Message, Out: Message> {
    f: MapFn<In, Out>,
    upstream: UpstreamRef,
    downstream: Option<DownstreamRef<Out>>,
}

impl<In: Message, Out: Message> ActorFactoryArgs<(MapFn<In, Out>, UpstreamRef)>
    for MapFlow<In, Out>
{
    fn create_args((f, upstream): (MapFn<In, Out>, UpstreamRef)) -> Self {
        MapFlow {
            f,
            upstream,
            downstream: None,
        }
    }
}

impl<In: Message, Out: Message> Actor for MapFlow<In, Out> {
    type Msg = StageMsg<In, Out>;

    fn recv(&mut self, ctx: &Context<Self::Msg>, msg: Self::Msg, _: Sender) -> Next<Self::Msg> {
        match msg {
            StageMsg::Subscribe(sub) => {
                self.downstream = Some(sub.downstream);
                Next::Same
            }
            StageMsg::Demand(DemandMsg::Request(n)) => {
                self.upstream.tell(DemandMsg::Request(n), me(ctx));
                Next::Same
            }
            StageMsg::Demand(DemandMsg::Cancel) => {
                self.upstream.tell(DemandMsg::Cancel, me(ctx));
                Next::Stopped
            }
            StageMsg::Element(ElementMsg::Produce(e)) => {
                if let Some(downstream) = &self.downstream {
                    downstream.tell(ElementMsg::Produce((self.f)(e)), None);
                }
                Next::Same
            }
            StageMsg::Element(ElementMsg::Complete) => {
                if let Some(downstream) = &self.downstream {
                    downstream.tell(ElementMsg::Complete, None);
                }
                Next::Stopped
            }
            StageMsg::Element(ElementMsg::Error(err)) => {
                if let Some(downstream) = &self.downstream {
                    downstream.tell(ElementMsg::Error(err), None);
                }
                Next::Stopped
            }
        }
    }
}

/// Forwards elements that pass the predicate. A dropped element
/// immediately requests one more upstream to keep demand balanced.
pub struct FilterFlow<E: Message> {
    predicate: FilterFn<E>,
    upstream: UpstreamRef,
    downstream: Option<DownstreamRef<E>>,
}

impl<E: Message> ActorFactoryArgs<(FilterFn<E>, UpstreamRef)> for FilterFlow<E> {
    fn create_args((predicate, upstream): (FilterFn<E>, UpstreamRef)) -> Self {
        FilterFlow {
            predicate,
            upstream,
            downstream: None,
        }
    }
}

impl<E: Message> Actor for FilterFlow<E> {
    type Msg = StageMsg<E, E>;

    fn recv(&mut self, ctx: &Context<Self::Msg>, msg: Self::Msg, _: Sender) -> Next<Self::Msg> {
        match msg {
            StageMsg::Subscribe(sub) => {
                self.downstream = Some(sub.downstream);
                Next::Same
            }
            StageMsg::Demand(d) => {
                let stop = d == DemandMsg::Cancel;
                self.upstream.tell(d, me(ctx));
                if stop {
                    Next::Stopped
                } else {
                    Next::Same
                }
            }
            StageMsg::Element(ElementMsg::Produce(e)) => {
                if (self.predicate)(&e) {
                    if let Some(downstream) = &self.downstream {
                        downstream.tell(ElementMsg::Produce(e), None);
                    }
                } else {
                    self.upstream.tell(DemandMsg::Request(1), me(ctx));
                }
                Next::Same
            }
            StageMsg::Element(terminal) => {
                if let Some(downstream) = &self.downstream {
                    downstream.tell(terminal, None);
                }
                Next::Stopped
            }
        }
    }
}

/// Passes the first `n` elements, then cancels upstream and completes
/// downstream. Upstream demand is capped at the remaining count so the
/// producer is never asked for elements that would be discarded.
pub struct TakeFlow<E: Message> {
    left: u64,
    outstanding: u64,
    upstream: UpstreamRef,
    downstream: Option<DownstreamRef<E>>,
}

impl<E: Message> ActorFactoryArgs<(u64, UpstreamRef)> for TakeFlow<E> {
    fn create_args((n, upstream): (u64, UpstreamRef)) -> Self {
        TakeFlow {
            left: n,
            outstanding: 0,
            upstream,
            downstream: None,
        }
    }
}

impl<E: Message> TakeFlow<E> {
    fn finish(&self, ctx: &Context<StageMsg<E, E>>) -> Next<StageMsg<E, E>> {
        self.upstream.tell(DemandMsg::Cancel, me(ctx));
        if let Some(downstream) = &self.downstream {
            downstream.tell(ElementMsg::Complete, None);
        }
        Next::Stopped
    }
}

impl<E: Message> Actor for TakeFlow<E> {
    type Msg = StageMsg<E, E>;

    fn recv(&mut self, ctx: &Context<Self::Msg>, msg: Self::Msg, _: Sender) -> Next<Self::Msg> {
        match msg {
            StageMsg::Subscribe(sub) => {
                self.downstream = Some(sub.downstream);
                Next::Same
            }
            StageMsg::Demand(DemandMsg::Request(n)) => {
                if self.left == 0 {
                    return self.finish(ctx);
                }
                let want = n.min(self.left.saturating_sub(self.outstanding));
                if want > 0 {
                    self.outstanding += want;
                    self.upstream.tell(DemandMsg::Request(want), me(ctx));
                }
                Next::Same
            }
            StageMsg::Demand(DemandMsg::Cancel) => {
                self.upstream.tell(DemandMsg::Cancel, me(ctx));
                Next::Stopped
            }
            StageMsg::Element(ElementMsg::Produce(e)) => {
                if self.left == 0 {
                    return Next::Same;
                }
                self.left -= 1;
                self.outstanding = self.outstanding.saturating_sub(1);
                if let Some(downstream) = &self.downstream {
                    downstream.tell(ElementMsg::Produce(e), None);
                }
                if self.left == 0 {
                    return self.finish(ctx);
                }
                Next::Same
            }
            StageMsg::Element(terminal) => {
                if let Some(downstream) = &self.downstream {
                    downstream.tell(terminal, None);
                }
                Next::Stopped
            }
        }
    }
}

/// Silently discards the first `n` elements, requesting them from
/// upstream independently of downstream demand.
pub struct DropFlow<E: Message> {
    to_drop: u64,
    upstream: UpstreamRef,
    downstream: Option<DownstreamRef<E>>,
}

impl<E: Message> ActorFactoryArgs<(u64, UpstreamRef)> for DropFlow<E> {
    fn create_args((n, upstream): (u64, UpstreamRef)) -> Self {
        DropFlow {
            to_drop: n,
            upstream,
            downstream: None,
        }
    }
}

impl<E: Message> Actor for DropFlow<E> {
    type Msg = StageMsg<E, E>;

    fn pre_start(&mut self, ctx: &Context<Self::Msg>) {
        if self.to_drop > 0 {
            self.upstream
                .tell(DemandMsg::Request(self.to_drop), me(ctx));
        }
    }

    fn recv(&mut self, ctx: &Context<Self::Msg>, msg: Self::Msg, _: Sender) -> Next<Self::Msg> {
        match msg {
            StageMsg::Subscribe(sub) => {
                self.downstream = Some(sub.downstream);
                Next::Same
            }
            StageMsg::Demand(d) => {
                let stop = d == DemandMsg::Cancel;
                self.upstream.tell(d, me(ctx));
                if stop {
                    Next::Stopped
                } else {
                    Next::Same
                }
            }
            StageMsg::Element(ElementMsg::Produce(e)) => {
                if self.to_drop > 0 {
                    self.to_drop -= 1;
                } else if let Some(downstream) = &self.downstream {
                    downstream.tell(ElementMsg::Produce(e), None);
                }
                Next::Same
            }
            StageMsg::Element(terminal) => {
                if let Some(downstream) = &self.downstream {
                    downstream.tell(terminal, None);
                }
                Next::Stopped
            }
        }
    }
}

/// Runs a side effect on each element without altering the stream.
pub struct TapFlow<E: Message> {
    f: TapFn<E>,
    upstream: UpstreamRef,
    downstream: Option<DownstreamRef<E>>,
}

impl<E: Message> ActorFactoryArgs<(TapFn<E>, UpstreamRef)> for TapFlow<E> {
    fn create_args((f, upstream): (TapFn<E>, UpstreamRef)) -> Self {
        TapFlow {
            f,
            upstream,
            downstream: None,
        }
    }
}

impl<E: Message> Actor for TapFlow<E> {
    type Msg = StageMsg<E, E>;

    fn recv(&mut self, ctx: &Context<Self::Msg>, msg: Self::Msg, _: Sender) -> Next<Self::Msg> {
        match msg {
            StageMsg::Subscribe(sub) => {
                self.downstream = Some(sub.downstream);
                Next::Same
            }
            StageMsg::Demand(d) => {
                let stop = d == DemandMsg::Cancel;
                self.upstream.tell(d, me(ctx));
                if stop {
                    Next::Stopped
                } else {
                    Next::Same
                }
            }
            StageMsg::Element(ElementMsg::Produce(e)) => {
                (self.f)(&e);
                if let Some(downstream) = &self.downstream {
                    downstream.tell(ElementMsg::Produce(e), None);
                }
                Next::Same
            }
            StageMsg::Element(terminal) => {
                if let Some(downstream) = &self.downstream {
                    downstream.tell(terminal, None);
                }
                Next::Stopped
            }
        }
    }
}

/// Identity stage.
pub struct PassThroughFlow<E: Message> {
    upstream: UpstreamRef,
    downstream: Option<DownstreamRef<E>>,
}

impl<E: Message> ActorFactoryArgs<UpstreamRef> for PassThroughFlow<E> {
    fn create_args(upstream: UpstreamRef) -> Self {
        PassThroughFlow {
            upstream,
            downstream: None,
        }
    }
}

impl<E: Message> Actor for PassThroughFlow<E> {
    type Msg = StageMsg<E, E>;

    fn recv(&mut self, ctx: &Context<Self::Msg>, msg: Self::Msg, _: Sender) -> Next<Self::Msg> {
        match msg {
            StageMsg::Subscribe(sub) => {
                self.downstream = Some(sub.downstream);
                Next::Same
            }
            StageMsg::Demand(d) => {
                let stop = d == DemandMsg::Cancel;
                self.upstream.tell(d, me(ctx));
                if stop {
                    Next::Stopped
                } else {
                    Next::Same
                }
            }
            StageMsg::Element(ElementMsg::Produce(e)) => {
                if let Some(downstream) = &self.downstream {
                    downstream.tell(ElementMsg::Produce(e), None);
                }
                Next::Same
            }
            StageMsg::Element(terminal) => {
                if let Some(downstream) = &self.downstream {
                    downstream.tell(terminal, None);
                }
                Next::Stopped
            }
        }
    }
}
