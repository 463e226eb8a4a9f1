pub(crate) mod builder;
pub(crate) mod flow;
pub(crate) mod hub;
pub(crate) mod sink;
pub(crate) mod source;

use crate::actor::BoxedTell;
use crate::Message;

pub use self::builder::{BroadcastPipeline, FoldPipeline, PipelineBuilder, RunningPipeline};
pub use self::flow::{
    DropFlow, FilterFlow, MapFlow, PassThroughFlow, TakeFlow, TapFlow,
};
pub use self::hub::BroadcastHub;
pub use self::sink::{CollectSink, FoldSink};
pub use self::source::{ManualSource, SourceHandle};

/// Failure propagated downstream by `OnError`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamError(pub String);

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "stream error: {}", self.0)
    }
}

/// Demand flowing upstream: `Request(n)` grants permission for `n`
/// elements; `Cancel` tears the edge down. A well-behaved producer
/// never emits more than the cumulative requested count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DemandMsg {
    Request(u64),
    Cancel,
}

/// Elements and terminal events flowing downstream.
#[derive(Clone, Debug)]
pub enum ElementMsg<E: Message> {
    Produce(E),
    Complete,
    Error(StreamError),
}

/// Attaches a downstream consumer to a stage.
#[derive(Clone, Debug)]
pub struct Subscribe<E: Message> {
    pub downstream: DownstreamRef<E>,
}

/// Handle a stage uses to signal demand to its upstream.
pub type UpstreamRef = BoxedTell<DemandMsg>;

/// Handle a stage uses to emit elements to its downstream.
pub type DownstreamRef<E> = BoxedTell<ElementMsg<E>>;

/// Mailbox protocol of a stage consuming `In` and producing `Out`.
///
/// Demand arrives from the downstream side, elements from the upstream
/// side; `Subscribe` wires the downstream edge at build time.
#[derive(Clone, Debug)]
pub enum StageMsg<In: Message, Out: Message> {
    Demand(DemandMsg),
    Element(ElementMsg<In>),
    Subscribe(Subscribe<Out>),
}

impl<In: Message, Out: Message> From<DemandMsg> for StageMsg<In, Out> {
    fn from(msg: DemandMsg) -> Self {
        StageMsg::Demand(msg)
    }
}

impl<In: Message, Out: Message> From<ElementMsg<In>> for StageMsg<In, Out> {
    fn from(msg: ElementMsg<In>) -> Self {
        StageMsg::Element(msg)
    }
}

impl<In: Message, Out: Message> From<Subscribe<Out>> for StageMsg<In, Out> {
    fn from(msg: Subscribe<Out>) -> Self {
        StageMsg::Subscribe(msg)
    }
}

/// Terminal outcome published on a sink's signal channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamSignal {
    Complete,
    Cancelled,
    Error(String),
}

/// Uninhabited element type for stages with no downstream output.
#[derive(Clone, Debug)]
pub enum Never {}
