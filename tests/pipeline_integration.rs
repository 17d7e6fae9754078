//! Integration tests for the Tributary pipeline handle.

use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tributary::channel::{ClosePropagation, Input, MergePolicy, MergedInput, MultiInput, Producer};
use tributary::{Context, Error, Event, Pipeline, Refusal, Stream, StreamEnd};

fn recorder<T: Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl FnMut(T) + Send + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |v| sink.lock().unwrap().push(v))
}

/// The producer taken out at the end is the one the channel opened with.
#[test]
fn test_channel_identity_survives_long_chain() {
    let pipeline: Pipeline<Input<u64>, _> = Pipeline::channel();
    let opened = pipeline.channel_id();

    let mut pipeline = pipeline.map(|x| x + 1);
    for _ in 0..64 {
        pipeline = pipeline.next(|s| s.map(|x| x + 1));
        assert_eq!(pipeline.channel_id(), opened);
    }
    let pipeline = pipeline.map(|x| x.to_string()).filter(|s| s.len() < 10);

    let (seen, sink) = recorder();
    let (input, _sub) = pipeline.subscribe_values(&Context::Direct, sink);
    assert_eq!(input.channel_id(), opened);

    input.push(0).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec!["65".to_string()]);
}

#[test]
fn test_identity_across_capabilities() {
    let multi: Pipeline<MultiInput<i32>, _> = Pipeline::multi_channel();
    let id = multi.channel_id();
    let (producer, _capture) = multi.map(|x| x * 2).take(3).capture();
    assert_eq!(producer.channel_id(), id);
    assert_eq!(producer.clone().channel_id(), id);

    let merged: Pipeline<MergedInput<i32>, _> = Pipeline::merged_channel(MergePolicy::default());
    let id = merged.channel_id();
    let (producer, _capture) = merged.skip(1).capture();
    assert_eq!(producer.channel_id(), id);
}

/// Dropping the pipeline before any terminal leaves the producer working.
#[test]
fn test_dropped_pipeline_leaves_producer_closable() {
    let pipeline: Pipeline<Input<i32>, _> = Pipeline::channel();
    let (input, tail) = pipeline.map(|x| x + 1).filter(|x| x % 2 == 0).into_parts();
    drop(tail);

    assert!(matches!(input.push(1), Err(Error::Inactive)));
    assert!(!input.is_closed());
    input.close().unwrap();
    assert!(input.is_closed());
    assert!(matches!(input.push(2), Err(Error::ClosedProducer)));
}

#[test]
fn test_dropped_subscription_stops_delivery() {
    let (seen, sink) = recorder();
    let pipeline: Pipeline<Input<i32>, _> = Pipeline::channel();
    let (input, sub) = pipeline.map(|x| x * 3).subscribe_values(&Context::Direct, sink);

    input.push(1).unwrap();
    drop(sub);
    assert!(matches!(input.push(2), Err(Error::Inactive)));
    assert_eq!(*seen.lock().unwrap(), vec![3]);
}

/// A refused step hands back a pipeline that still composes and pushes.
#[test]
fn test_try_next_rejection_is_all_or_nothing() {
    fn refuse_odd_chunks(
        chunk: usize,
    ) -> impl FnOnce(Stream<i32>) -> Result<Stream<Vec<i32>>, Refusal<Stream<i32>>> {
        move |stream| {
            if chunk % 2 == 1 {
                Err(Refusal::transform(stream, format!("chunk {chunk} is odd")))
            } else {
                Ok(stream.buffer_count(chunk))
            }
        }
    }

    let pipeline: Pipeline<Input<i32>, _> = Pipeline::channel();
    let id = pipeline.channel_id();

    let rejected = pipeline.try_next(refuse_odd_chunks(3)).unwrap_err();
    assert!(matches!(rejected.error(), Error::UserTransform(_)));
    assert!(std::error::Error::source(&rejected).is_some());

    let pipeline = rejected.into_pipeline();
    assert_eq!(pipeline.channel_id(), id);
    let pipeline = pipeline.try_next(refuse_odd_chunks(2)).unwrap();

    let (seen, sink) = recorder();
    let (input, _sub) = pipeline.subscribe_values(&Context::Direct, sink);
    for x in 1..=5 {
        input.push(x).unwrap();
    }
    assert_eq!(*seen.lock().unwrap(), vec![vec![1, 2], vec![3, 4]]);
}

/// Two branches of one source meet again in a merged channel.
#[test]
fn test_consume_builds_diamond() {
    let joined: Pipeline<MergedInput<i32>, _> =
        Pipeline::merged_channel(MergePolicy::default().with_close_propagation(ClosePropagation::Failures));
    let (seen, sink) = recorder();
    let (merged, _out) = joined.subscribe_values(&Context::Direct, sink);

    let source: Pipeline<Input<i32>, _> = Pipeline::channel();
    let shared = source.multicast();
    let tens = shared.stage().stream().map(|x| x * 10).bind_to(&merged);
    let ones = shared.stage().stream().map(|x| x + 1).bind_to(&merged);
    let input = shared.consume(drop);

    input.push(1).unwrap();
    input.push(2).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![10, 2, 20, 3]);
    assert_eq!(merged.attachment_count(), 2);

    input.close().unwrap();
    assert_eq!(merged.attachment_count(), 0);
    assert!(!merged.is_closed());
    merged.push(99).unwrap();
    assert_eq!(seen.lock().unwrap().last(), Some(&99));

    drop((tens, ones));
}

#[test]
fn test_finish_with_custom_artifact() {
    let pipeline: Pipeline<Input<i32>, _> = Pipeline::channel();
    let (input, mut junction) = pipeline.finish(|s| s.map(|x| x - 1).junction());
    assert!(!junction.is_bound());
    assert!(!input.is_active());

    let (target, out) = tributary::channel::<i32>();
    let (seen, sink) = recorder();
    let _sub = out.subscribe_values(&Context::Direct, sink);
    junction.bind(&target).unwrap();
    assert!(junction.bind(&target).is_err());

    input.push(5).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![4]);
}

#[test]
fn test_merged_policy_propagates_failures() {
    let pipeline: Pipeline<MergedInput<i32>, _> = Pipeline::merged_channel(MergePolicy::default());
    let (events, sink) = recorder();
    let (merged, _sub) = pipeline.subscribe(&Context::Direct, sink);

    merged.attach(Stream::just(1));
    assert_eq!(events.lock().unwrap().len(), 1);

    merged.attach(Stream::failed(Error::failure("child")));
    let events = events.lock().unwrap();
    assert!(matches!(events.as_slice(), [Event::Value(1), Event::End(StreamEnd::Failed(_))]));
    assert!(merged.is_closed());
}

#[test]
fn test_serial_context_delivers_in_order() {
    let ctx = Context::serial("pipeline-test").unwrap();
    let (tx, rx) = std::sync::mpsc::channel();
    let pipeline: Pipeline<Input<i32>, _> = Pipeline::channel();
    let (input, _sub) = pipeline.map(|x| x * 2).subscribe(&ctx, move |event| {
        let _ = tx.send(event);
    });

    for x in 0..100 {
        input.push(x).unwrap();
    }
    input.close().unwrap();

    let mut values = Vec::new();
    loop {
        match rx.recv().unwrap() {
            Event::Value(v) => values.push(v),
            Event::End(end) => {
                assert!(end.is_complete());
                break;
            }
        }
    }
    assert_eq!(values, (0..100).map(|x| x * 2).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_events_bridge_to_async() {
    let pipeline: Pipeline<Input<i32>, _> = Pipeline::channel();
    let (input, mut events) = pipeline.map(|x| x + 1).into_events();

    let task = tokio::spawn(async move {
        let mut values = Vec::new();
        while let Some(event) = events.next().await {
            match event {
                Event::Value(v) => values.push(v),
                Event::End(_) => break,
            }
        }
        values
    });

    input.push(1).unwrap();
    input.push(2).unwrap();
    input.close().unwrap();
    assert_eq!(task.await.unwrap(), vec![2, 3]);
}

/// Read events until the end, then check nothing follows it.
async fn drain_until_end<T>(events: &mut tokio::sync::mpsc::UnboundedReceiver<Event<T>>) -> Vec<T> {
    let mut values = Vec::new();
    loop {
        let event = tokio::time::timeout(std::time::Duration::from_secs(5), events.recv())
            .await
            .expect("end not delivered in time")
            .expect("handler dropped before the end");
        match event {
            Event::Value(v) => values.push(v),
            Event::End(end) => {
                assert!(end.is_complete());
                break;
            }
        }
    }
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert!(events.try_recv().is_err(), "event delivered after the end");
    values
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_runtime_context_keeps_push_order() {
    let ctx = Context::current_runtime().unwrap();
    let expected: Vec<u32> = (0..300).collect();

    // Terminal handler on the runtime.
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let pipeline: Pipeline<Input<u32>, _> = Pipeline::channel();
    let (input, _sub) = pipeline.subscribe(&ctx, move |event| {
        let _ = tx.send(event);
    });
    for x in 0..300 {
        input.push(x).unwrap();
    }
    input.close().unwrap();
    assert_eq!(drain_until_end(&mut rx).await, expected);

    // Downstream moved onto the runtime.
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let pipeline: Pipeline<Input<u32>, _> = Pipeline::channel();
    let (input, _sub) = pipeline.deliver_on(&ctx).subscribe(&Context::Direct, move |event| {
        let _ = tx.send(event);
    });
    for x in 0..300 {
        input.push(x).unwrap();
    }
    input.close().unwrap();
    assert_eq!(drain_until_end(&mut rx).await, expected);

    // Stateful transform running on the runtime.
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let pipeline: Pipeline<Input<u32>, _> = Pipeline::channel();
    let (input, _sub) = pipeline
        .transform_with_state(&ctx, 0u32, |seen, event, out| match event {
            Event::Value(v) => {
                assert_eq!(v, *seen);
                *seen += 1;
                out.send(v);
            }
            Event::End(end) => {
                out.end(end);
            }
        })
        .subscribe(&Context::Direct, move |event| {
            let _ = tx.send(event);
        });
    for x in 0..300 {
        input.push(x).unwrap();
    }
    input.close().unwrap();
    assert_eq!(drain_until_end(&mut rx).await, expected);
}
