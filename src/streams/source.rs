use std::collections::VecDeque;

use crate::actor::{Actor, ActorFactory, ActorRef, Context, Next, Sender, Tell};
use crate::streams::{DemandMsg, DownstreamRef, ElementMsg, StageMsg, StreamError};
use crate::Message;

/// A source driven from outside the stream: the owner pushes
/// `Produce`, `Complete` and `Error` through a [`SourceHandle`].
///
/// Elements are buffered until the downstream has both subscribed and
/// signalled demand, so the source never emits beyond the cumulative
/// requested count. Completion is held back until the buffer drains.
pub struct ManualSource<E: Message> {
    downstream: Option<DownstreamRef<E>>,
    demand: u64,
    buffer: VecDeque<E>,
    pending_complete: bool,
}

impl<E: Message> ActorFactory for ManualSource<E> {
    fn create() -> Self {
        ManualSource {
            downstream: None,
            demand: 0,
            buffer: VecDeque::new(),
            pending_complete: false,
        }
    }
}

impl<E: Message> ManualSource<E> {
    /// Emits buffered elements up to the current demand. Returns true
    /// when the stream completed.
    fn drain(&mut self) -> bool {
        if let Some(downstream) = &self.downstream {
            while self.demand > 0 {
                match self.buffer.pop_front() {
                    Some(e) => {
                        downstream.tell(ElementMsg::Produce(e), None);
                        self.demand -= 1;
                    }
                    None => break,
                }
            }

            if self.buffer.is_empty() && self.pending_complete {
                downstream.tell(ElementMsg::Complete, None);
                return true;
            }
        }
        false
    }
}

impl<E: Message> Actor for ManualSource<E> {
    type Msg = StageMsg<E, E>;

    fn recv(&mut self, _: &Context<Self::Msg>, msg: Self::Msg, _: Sender) -> Next<Self::Msg> {
        match msg {
            StageMsg::Subscribe(sub) => {
                self.downstream = Some(sub.downstream);
            }
            StageMsg::Demand(DemandMsg::Request(n)) => {
                self.demand += n;
            }
            StageMsg::Demand(DemandMsg::Cancel) => {
                self.buffer.clear();
                return Next::Stopped;
            }
            StageMsg::Element(ElementMsg::Produce(e)) => {
                if self.pending_complete {
                    return Next::Same;
                }
                self.buffer.push_back(e);
            }
            StageMsg::Element(ElementMsg::Complete) => {
                self.pending_complete = true;
            }
            StageMsg::Element(ElementMsg::Error(err)) => {
                if let Some(downstream) = &self.downstream {
                    downstream.tell(ElementMsg::Error(err), None);
                }
                return Next::Stopped;
            }
        }

        if self.drain() {
            Next::Stopped
        } else {
            Next::Same
        }
    }
}

/// Push side of a [`ManualSource`].
#[derive(Clone, Debug)]
pub struct SourceHandle<E: Message> {
    stage: ActorRef<StageMsg<E, E>>,
}

impl<E: Message> SourceHandle<E> {
    pub(crate) fn new(stage: ActorRef<StageMsg<E, E>>) -> SourceHandle<E> {
        SourceHandle { stage }
    }

    pub fn produce(&self, element: E) {
        self.stage.tell(ElementMsg::Produce(element), None);
    }

    pub fn complete(&self) {
        self.stage.tell(ElementMsg::Complete, None);
    }

    pub fn error(&self, reason: impl Into<String>) {
        self.stage
            .tell(ElementMsg::Error(StreamError(reason.into())), None);
    }

    pub fn stage(&self) -> &ActorRef<StageMsg<E, E>> {
        &self.stage
    }
}
