use std::sync::Arc;

use tokio::sync::mpsc;

use crate::actor::{Actor, ActorFactoryArgs, Context, Next, Sender};
use crate::future::{Fault, Promise};
use crate::streams::{DemandMsg, ElementMsg, Never, StageMsg, StreamSignal, UpstreamRef};
use crate::Message;

fn me<Msg: Message>(ctx: &Context<Msg>) -> Sender {
    Some(ctx.myself().into())
}

/// Pushes elements into a bounded channel.
///
/// Demand never exceeds the channel's free capacity, so `try_send`
/// cannot overflow: the sink requests exactly the headroom and tops it
/// up as elements arrive. Terminal events complete the pipeline future
/// and are optionally published on a signal channel.
pub struct CollectSink<E: Message> {
    tx: mpsc::Sender<E>,
    signals: Option<mpsc::Sender<StreamSignal>>,
    upstream: UpstreamRef,
    outstanding: u64,
    completion: Promise<()>,
}

type CollectArgs<E> = (
    mpsc::Sender<E>,
    Option<mpsc::Sender<StreamSignal>>,
    UpstreamRef,
    Promise<()>,
);

impl<E: Message> ActorFactoryArgs<CollectArgs<E>> for CollectSink<E> {
    fn create_args((tx, signals, upstream, completion): CollectArgs<E>) -> Self {
        CollectSink {
            tx,
            signals,
            upstream,
            outstanding: 0,
            completion,
        }
    }
}

impl<E: Message> CollectSink<E> {
    fn signal(&self, signal: StreamSignal) {
        if let Some(signals) = &self.signals {
            let _ = signals.try_send(signal);
        }
    }
}

impl<E: Message> Actor for CollectSink<E> {
    type Msg = StageMsg<E, Never>;

    fn pre_start(&mut self, ctx: &Context<Self::Msg>) {
        let headroom = self.tx.capacity() as u64;
        if headroom > 0 {
            self.outstanding = headroom;
            self.upstream.tell(DemandMsg::Request(headroom), me(ctx));
        }
    }

    fn recv(&mut self, ctx: &Context<Self::Msg>, msg: Self::Msg, _: Sender) -> Next<Self::Msg> {
        match msg {
            StageMsg::Element(ElementMsg::Produce(e)) => {
                self.outstanding = self.outstanding.saturating_sub(1);
                let _ = self.tx.try_send(e);

                let headroom = self.tx.capacity() as u64;
                if headroom > self.outstanding {
                    self.upstream
                        .tell(DemandMsg::Request(headroom - self.outstanding), me(ctx));
                    self.outstanding = headroom;
                }
                Next::Same
            }
            StageMsg::Element(ElementMsg::Complete) => {
                self.completion.try_success(());
                self.signal(StreamSignal::Complete);
                Next::Stopped
            }
            StageMsg::Element(ElementMsg::Error(err)) => {
                self.completion.try_failure(Fault::App(err.0.clone()));
                self.signal(StreamSignal::Error(err.0));
                Next::Stopped
            }
            // an external abort arrives as Cancel on the sink itself
            StageMsg::Demand(DemandMsg::Cancel) => {
                self.upstream.tell(DemandMsg::Cancel, me(ctx));
                self.completion.try_cancel();
                self.signal(StreamSignal::Cancelled);
                Next::Stopped
            }
            StageMsg::Demand(DemandMsg::Request(_)) | StageMsg::Subscribe(_) => Next::Same,
        }
    }
}

pub type FoldFn<Acc, E> = Arc<dyn Fn(Acc, E) -> Acc + Send + Sync>;

const FOLD_BATCH: u64 = 64;

/// Folds every element into an accumulator; the pipeline future yields
/// the final value on completion.
pub struct FoldSink<E: Message, Acc: Message> {
    f: FoldFn<Acc, E>,
    acc: Option<Acc>,
    upstream: UpstreamRef,
    outstanding: u64,
    completion: Promise<Acc>,
}

type FoldArgs<E, Acc> = (FoldFn<Acc, E>, Acc, UpstreamRef, Promise<Acc>);

impl<E: Message, Acc: Message + Sync> ActorFactoryArgs<FoldArgs<E, Acc>> for FoldSink<E, Acc> {
    fn create_args((f, seed, upstream, completion): FoldArgs<E, Acc>) -> Self {
        FoldSink {
            f,
            acc: Some(seed),
            upstream,
            outstanding: 0,
            completion,
        }
    }
}

impl<E: Message, Acc: Message> Actor for FoldSink<E, Acc> {
    type Msg = StageMsg<E, Never>;

    fn pre_start(&mut self, ctx: &Context<Self::Msg>) {
        self.outstanding = FOLD_BATCH;
        self.upstream.tell(DemandMsg::Request(FOLD_BATCH), me(ctx));
    }

    fn recv(&mut self, ctx: &Context<Self::Msg>, msg: Self::Msg, _: Sender) -> Next<Self::Msg> {
        match msg {
            StageMsg::Element(ElementMsg::Produce(e)) => {
                if let Some(acc) = self.acc.take() {
                    self.acc = Some((self.f)(acc, e));
                }

                self.outstanding = self.outstanding.saturating_sub(1);
                if self.outstanding == 0 {
                    self.outstanding = FOLD_BATCH;
                    self.upstream.tell(DemandMsg::Request(FOLD_BATCH), me(ctx));
                }
                Next::Same
            }
            StageMsg::Element(ElementMsg::Complete) => {
                if let Some(acc) = self.acc.take() {
                    self.completion.try_success(acc);
                }
                Next::Stopped
            }
            StageMsg::Element(ElementMsg::Error(err)) => {
                self.completion.try_failure(Fault::App(err.0));
                Next::Stopped
            }
            StageMsg::Demand(DemandMsg::Cancel) => {
                self.upstream.tell(DemandMsg::Cancel, me(ctx));
                self.completion.try_cancel();
                Next::Stopped
            }
            StageMsg::Demand(DemandMsg::Request(_)) | StageMsg::Subscribe(_) => Next::Same,
        }
    }
}
