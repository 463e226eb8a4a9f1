use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use movie::actors::*;
use movie::streams::{PipelineBuilder, StreamSignal};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn map_filter_take_completes_after_three() {
    let sys = ActorSystem::new().unwrap();

    let reached_take = Arc::new(AtomicU64::new(0));
    let counter = reached_take.clone();

    let (source, builder) = PipelineBuilder::<i64>::manual(&sys).unwrap();
    let pipeline = builder
        .map(|x| x * 2)
        .unwrap()
        .filter(|x| x % 2 == 0)
        .unwrap()
        .tap(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap()
        .take(3)
        .unwrap()
        .collect(16)
        .unwrap();

    for i in 1..=5 {
        source.produce(i);
    }
    source.complete();

    let mut output = pipeline.output;
    let mut got = Vec::new();
    while let Some(v) = output.recv().await {
        got.push(v);
    }
    assert_eq!(got, vec![2, 4, 6]);

    pipeline
        .completion
        .await
        .expect("pipeline completes successfully");

    // take caps upstream demand: nothing flows past the third element
    assert_eq!(reached_take.load(Ordering::SeqCst), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn drop_discards_prefix() {
    let sys = ActorSystem::new().unwrap();

    let (source, builder) = PipelineBuilder::<i64>::manual(&sys).unwrap();
    let pipeline = builder.drop_first(3).unwrap().collect(16).unwrap();

    for i in 1..=5 {
        source.produce(i);
    }
    source.complete();

    let mut output = pipeline.output;
    let mut got = Vec::new();
    while let Some(v) = output.recv().await {
        got.push(v);
    }
    assert_eq!(got, vec![4, 5]);
    pipeline.completion.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn error_propagates_and_fails_completion() {
    let sys = ActorSystem::new().unwrap();

    let (source, builder) = PipelineBuilder::<i64>::manual(&sys).unwrap();
    let pipeline = builder
        .pass_through()
        .unwrap()
        .collect_with_signals(16, 4)
        .unwrap();

    source.produce(1);
    source.error("upstream exploded");

    assert!(pipeline.completion.await.is_err());

    let mut signals = pipeline.signals.unwrap();
    // the element may or may not arrive ahead of the error; the
    // terminal signal must be the error
    let sig = signals.recv().await.unwrap();
    assert_eq!(sig, StreamSignal::Error("upstream exploded".to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_tears_the_pipeline_down() {
    let sys = ActorSystem::new().unwrap();

    let (source, builder) = PipelineBuilder::<i64>::manual(&sys).unwrap();
    let pipeline = builder.pass_through().unwrap().collect(4).unwrap();

    source.produce(1);
    pipeline.cancel();

    let result = pipeline.completion.await;
    assert_eq!(result, Err(Fault::Cancelled));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fold_accumulates_all_elements() {
    let sys = ActorSystem::new().unwrap();

    let (source, builder) = PipelineBuilder::<i64>::manual(&sys).unwrap();
    let fold = builder
        .map(|x| x + 1)
        .unwrap()
        .run_fold(0i64, |acc, x| acc + x)
        .unwrap();

    for i in 1..=10 {
        source.produce(i);
    }
    source.complete();

    // (2 + 3 + ... + 11)
    assert_eq!(fold.completion.await.unwrap(), 65);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn demand_gates_production() {
    let sys = ActorSystem::new().unwrap();

    let (source, builder) = PipelineBuilder::<i64>::manual(&sys).unwrap();
    // capacity 2: the sink only ever grants two elements of headroom
    let pipeline = builder.collect(2).unwrap();

    for i in 1..=100 {
        source.produce(i);
    }

    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut output = pipeline.output;
    // exactly the requested two elements crossed the edge
    assert_eq!(output.try_recv().unwrap(), 1);
    assert_eq!(output.try_recv().unwrap(), 2);
    assert!(output.try_recv().is_err());

    // consuming re-opens headroom only after further produces reach
    // the sink, which requires fresh demand
    drop(output);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn broadcast_delivers_to_each_subscriber() {
    let sys = ActorSystem::new().unwrap();

    let (source, builder) = PipelineBuilder::<i64>::manual(&sys).unwrap();
    let hub = builder.broadcast().unwrap();

    let sub_a = hub.collect(16).unwrap();
    let sub_b = hub.collect(16).unwrap();

    // let both subscriptions register their demand
    tokio::time::sleep(Duration::from_millis(100)).await;

    for i in 1..=3 {
        source.produce(i);
    }
    source.complete();

    let mut out_a = sub_a.output;
    let mut got_a = Vec::new();
    while let Some(v) = out_a.recv().await {
        got_a.push(v);
    }

    let mut out_b = sub_b.output;
    let mut got_b = Vec::new();
    while let Some(v) = out_b.recv().await {
        got_b.push(v);
    }

    assert_eq!(got_a, vec![1, 2, 3]);
    assert_eq!(got_b, vec![1, 2, 3]);

    sub_a.completion.await.unwrap();
    sub_b.completion.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_subscriber_does_not_affect_others() {
    let sys = ActorSystem::new().unwrap();

    let (source, builder) = PipelineBuilder::<i64>::manual(&sys).unwrap();
    let hub = builder.broadcast().unwrap();

    let sub_a = hub.collect(16).unwrap();
    let sub_b = hub.collect(16).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    sub_a.cancel();
    tokio::time::sleep(Duration::from_millis(100)).await;

    for i in 1..=3 {
        source.produce(i);
    }
    source.complete();

    let mut out_b = sub_b.output;
    let mut got_b = Vec::new();
    while let Some(v) = out_b.recv().await {
        got_b.push(v);
    }
    assert_eq!(got_b, vec![1, 2, 3]);
    sub_b.completion.await.unwrap();
}
