use std::sync::Arc;

use tokio::sync::mpsc;

use crate::actor::{
    ActorRef, BasicActorRef, CreateError, Tell, TmpActorRefFactory,
};
use crate::future::{promise, Future, Promise};
use crate::streams::flow::{
    DropFlow, FilterFlow, FilterFn, MapFlow, MapFn, PassThroughFlow, TakeFlow, TapFlow, TapFn,
};
use crate::streams::hub::BroadcastHub;
use crate::streams::sink::{CollectSink, FoldFn, FoldSink};
use crate::streams::source::{ManualSource, SourceHandle};
use crate::streams::{DemandMsg, DownstreamRef, StageMsg, StreamSignal, Subscribe, UpstreamRef};
use crate::system::ActorSystem;
use crate::Message;

/// A materialized pipeline: the source side handle, the output
/// channel, the completion future and the optional terminal-signal
/// channel.
pub struct RunningPipeline<E: Message> {
    /// The source stage, untyped.
    pub source: BasicActorRef,
    pub output: mpsc::Receiver<E>,
    pub completion: Future<()>,
    pub signals: Option<mpsc::Receiver<StreamSignal>>,
    canceller: UpstreamRef,
}

impl<E: Message> RunningPipeline<E> {
    /// Aborts the pipeline: cancellation propagates upstream and the
    /// completion future is cancelled.
    pub fn cancel(&self) {
        self.canceller.tell(DemandMsg::Cancel, None);
    }
}

/// A materialized fold: the completion future yields the final
/// accumulator.
pub struct FoldPipeline<Acc: Message> {
    /// The source stage, untyped.
    pub source: BasicActorRef,
    pub completion: Future<Acc>,
}

/// Assembles `source → flows* → sink` pipelines, spawning one actor
/// per stage. Stages are wired as they are added: each new stage holds
/// its upstream's demand handle, and the upstream is subscribed to the
/// new stage's element handle.
pub struct PipelineBuilder<E: Message> {
    system: ActorSystem,
    source: BasicActorRef,
    prev_demand: UpstreamRef,
    subscribe_prev: Box<dyn FnOnce(DownstreamRef<E>) + Send>,
}

impl<E: Message> PipelineBuilder<E> {
    /// Starts a pipeline from a [`ManualSource`] driven through the
    /// returned handle.
    pub fn manual(system: &ActorSystem) -> Result<(SourceHandle<E>, PipelineBuilder<E>), CreateError> {
        let source: ActorRef<StageMsg<E, E>> = system.tmp_actor_of::<ManualSource<E>>()?;

        let handle = SourceHandle::new(source.clone());
        let subscriber = source.clone();
        let builder = PipelineBuilder {
            system: system.clone(),
            source: source.clone().into(),
            prev_demand: Box::new(source),
            subscribe_prev: Box::new(move |downstream| {
                subscriber.tell(Subscribe { downstream }, None);
            }),
        };

        Ok((handle, builder))
    }

    /// The source stage's untyped ref.
    pub fn source(&self) -> &BasicActorRef {
        &self.source
    }

    fn stage<Out: Message>(
        self,
        stage: ActorRef<StageMsg<E, Out>>,
    ) -> PipelineBuilder<Out> {
        (self.subscribe_prev)(Box::new(stage.clone()));

        let subscriber = stage.clone();
        PipelineBuilder {
            system: self.system,
            source: self.source,
            prev_demand: Box::new(stage),
            subscribe_prev: Box::new(move |downstream| {
                subscriber.tell(Subscribe { downstream }, None);
            }),
        }
    }

    pub fn map<Out, F>(self, f: F) -> Result<PipelineBuilder<Out>, CreateError>
    where
        Out: Message,
        F: Fn(E) -> Out + Send + Sync + 'static,
    {
        let f: MapFn<E, Out> = Arc::new(f);
        let stage = self
            .system
            .tmp_actor_of_args::<MapFlow<E, Out>, _>((f, self.prev_demand.clone()))?;
        Ok(self.stage(stage))
    }

    pub fn filter<F>(self, predicate: F) -> Result<PipelineBuilder<E>, CreateError>
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        let predicate: FilterFn<E> = Arc::new(predicate);
        let stage = self
            .system
            .tmp_actor_of_args::<FilterFlow<E>, _>((predicate, self.prev_demand.clone()))?;
        Ok(self.stage(stage))
    }

    pub fn take(self, n: u64) -> Result<PipelineBuilder<E>, CreateError> {
        let stage = self
            .system
            .tmp_actor_of_args::<TakeFlow<E>, _>((n, self.prev_demand.clone()))?;
        Ok(self.stage(stage))
    }

    pub fn drop_first(self, n: u64) -> Result<PipelineBuilder<E>, CreateError> {
        let stage = self
            .system
            .tmp_actor_of_args::<DropFlow<E>, _>((n, self.prev_demand.clone()))?;
        Ok(self.stage(stage))
    }

    pub fn tap<F>(self, f: F) -> Result<PipelineBuilder<E>, CreateError>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let f: TapFn<E> = Arc::new(f);
        let stage = self
            .system
            .tmp_actor_of_args::<TapFlow<E>, _>((f, self.prev_demand.clone()))?;
        Ok(self.stage(stage))
    }

    pub fn pass_through(self) -> Result<PipelineBuilder<E>, CreateError> {
        let stage = self
            .system
            .tmp_actor_of_args::<PassThroughFlow<E>, _>(self.prev_demand.clone())?;
        Ok(self.stage(stage))
    }

    /// Terminates the pipeline in a bounded-channel sink.
    pub fn collect(self, capacity: usize) -> Result<RunningPipeline<E>, CreateError> {
        self.collect_inner(capacity, None)
    }

    /// Like `collect`, with terminal events also published on a signal
    /// channel.
    pub fn collect_with_signals(
        self,
        capacity: usize,
        signal_capacity: usize,
    ) -> Result<RunningPipeline<E>, CreateError> {
        self.collect_inner(capacity, Some(signal_capacity))
    }

    fn collect_inner(
        self,
        capacity: usize,
        signal_capacity: Option<usize>,
    ) -> Result<RunningPipeline<E>, CreateError> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (sig_tx, sig_rx) = match signal_capacity {
            Some(cap) => {
                let (t, r) = mpsc::channel(cap.max(1));
                (Some(t), Some(r))
            }
            None => (None, None),
        };
        let (completion_tx, completion): (Promise<()>, Future<()>) = promise();

        let sink = self.system.tmp_actor_of_args::<CollectSink<E>, _>((
            tx,
            sig_tx,
            self.prev_demand.clone(),
            completion_tx,
        ))?;

        (self.subscribe_prev)(Box::new(sink.clone()));

        Ok(RunningPipeline {
            source: self.source,
            output: rx,
            completion,
            signals: sig_rx,
            canceller: Box::new(sink),
        })
    }

    /// Terminates the pipeline in a fold over every element.
    pub fn run_fold<Acc, F>(self, seed: Acc, f: F) -> Result<FoldPipeline<Acc>, CreateError>
    where
        Acc: Message + Sync,
        F: Fn(Acc, E) -> Acc + Send + Sync + 'static,
    {
        let f: FoldFn<Acc, E> = Arc::new(f);
        let (completion_tx, completion) = promise();

        let sink = self.system.tmp_actor_of_args::<FoldSink<E, Acc>, _>((
            f,
            seed,
            self.prev_demand.clone(),
            completion_tx,
        ))?;

        (self.subscribe_prev)(Box::new(sink));

        Ok(FoldPipeline {
            source: self.source,
            completion,
        })
    }

    /// Terminates the chain in a [`BroadcastHub`]; sinks attach to the
    /// returned pipeline.
    pub fn broadcast(self) -> Result<BroadcastPipeline<E>, CreateError> {
        let hub = self
            .system
            .tmp_actor_of_args::<BroadcastHub<E>, _>(self.prev_demand.clone())?;

        (self.subscribe_prev)(Box::new(hub.clone()));

        Ok(BroadcastPipeline {
            system: self.system,
            source: self.source,
            hub,
        })
    }
}

/// A pipeline fanned out through a [`BroadcastHub`].
pub struct BroadcastPipeline<E: Message> {
    system: ActorSystem,
    source: BasicActorRef,
    hub: ActorRef<StageMsg<E, E>>,
}

impl<E: Message> BroadcastPipeline<E> {
    /// Attaches a new collecting subscriber to the hub.
    pub fn collect(&self, capacity: usize) -> Result<RunningPipeline<E>, CreateError> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (completion_tx, completion) = promise();

        let hub_demand: UpstreamRef = Box::new(self.hub.clone());
        let sink = self.system.tmp_actor_of_args::<CollectSink<E>, _>((
            tx,
            None,
            hub_demand,
            completion_tx,
        ))?;

        self.hub.tell(
            Subscribe {
                downstream: Box::new(sink.clone()) as DownstreamRef<E>,
            },
            None,
        );

        Ok(RunningPipeline {
            source: self.source.clone(),
            output: rx,
            completion,
            signals: None,
            canceller: Box::new(sink),
        })
    }

    pub fn hub(&self) -> &ActorRef<StageMsg<E, E>> {
        &self.hub
    }
}
