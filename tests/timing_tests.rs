//! Timed operators on tokio's paused clock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{Instant, sleep, sleep_until};
use tributary::channel::{Input, Producer};
use tributary::{Backoff, Context, Error, Event, Pipeline, RetryPolicy, Stream};

type Timeline<T> = Arc<Mutex<Vec<(Duration, Event<T>)>>>;

/// Subscribe, stamping every event with the time since `start`.
fn stamped<T: Send + 'static>(start: Instant) -> (Timeline<T>, impl FnMut(Event<T>) + Send + 'static) {
    let timeline: Timeline<T> = Arc::new(Mutex::new(Vec::new()));
    let sink = timeline.clone();
    (timeline, move |event| {
        sink.lock().unwrap().push((start.elapsed(), event));
    })
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Values at 0, 30, 40 and 200 ms with a 100 ms window; close at 250 ms.
#[tokio::test(start_paused = true)]
async fn test_debounce_settles_and_flushes_on_close() {
    let start = Instant::now();
    let (timeline, sink) = stamped(start);
    let pipeline: Pipeline<Input<u32>, _> = Pipeline::channel();
    let (input, _sub) = pipeline
        .debounce(ms(100), true, &Context::Direct)
        .subscribe(&Context::Direct, sink);

    input.push(0).unwrap();
    sleep_until(start + ms(30)).await;
    input.push(30).unwrap();
    sleep_until(start + ms(40)).await;
    input.push(40).unwrap();
    sleep_until(start + ms(200)).await;
    input.push(200).unwrap();
    sleep_until(start + ms(250)).await;
    input.close().unwrap();

    let timeline = timeline.lock().unwrap();
    assert_eq!(timeline.len(), 3);

    let (at, event) = &timeline[0];
    assert!(matches!(event, Event::Value(40)));
    assert!(*at >= ms(140) && *at < ms(145), "emitted at {at:?}");

    let (at, event) = &timeline[1];
    assert!(matches!(event, Event::Value(200)));
    assert_eq!(*at, ms(250));

    assert!(timeline[2].1.end().unwrap().is_complete());
}

#[tokio::test(start_paused = true)]
async fn test_debounce_without_flush_drops_pending() {
    let start = Instant::now();
    let (timeline, sink) = stamped(start);
    let pipeline: Pipeline<Input<u32>, _> = Pipeline::channel();
    let (input, _sub) = pipeline
        .debounce(ms(100), false, &Context::Direct)
        .subscribe(&Context::Direct, sink);

    input.push(1).unwrap();
    sleep(ms(50)).await;
    input.close().unwrap();

    let timeline = timeline.lock().unwrap();
    assert_eq!(timeline.len(), 1);
    assert!(timeline[0].1.is_end());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_resets_on_value() {
    let start = Instant::now();
    let (timeline, sink) = stamped(start);
    let pipeline: Pipeline<Input<u32>, _> = Pipeline::channel();
    let (input, _sub) = pipeline
        .timeout(ms(100), true, &Context::Direct)
        .subscribe(&Context::Direct, sink);

    for _ in 0..3 {
        sleep(ms(80)).await;
        input.push(1).unwrap();
    }
    sleep(ms(150)).await;

    let timeline = timeline.lock().unwrap();
    assert_eq!(timeline.len(), 4);
    let (at, event) = &timeline[3];
    assert_eq!(*at, ms(340));
    assert!(event.end().unwrap().error().is_some_and(Error::is_timeout));
    drop(timeline);

    // The upstream was released when the timeout fired.
    assert!(!input.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_fixed_deadline() {
    let start = Instant::now();
    let (timeline, sink) = stamped(start);
    let pipeline: Pipeline<Input<u32>, _> = Pipeline::channel();
    let (input, _sub) = pipeline
        .timeout(ms(100), false, &Context::Direct)
        .subscribe(&Context::Direct, sink);

    sleep(ms(60)).await;
    input.push(1).unwrap();
    sleep(ms(60)).await;

    let timeline = timeline.lock().unwrap();
    assert_eq!(timeline.len(), 2);
    assert_eq!(timeline[1].0, ms(100));
    assert!(timeline[1].1.end().unwrap().is_failure());
}

#[tokio::test(start_paused = true)]
async fn test_delay_shifts_values_and_end() {
    let start = Instant::now();
    let (timeline, sink) = stamped(start);
    let pipeline: Pipeline<Input<u32>, _> = Pipeline::channel();
    let (input, _sub) = pipeline
        .delay(ms(50), &Context::Direct)
        .subscribe(&Context::Direct, sink);

    input.push(1).unwrap();
    sleep(ms(10)).await;
    input.push(2).unwrap();
    input.close().unwrap();
    sleep(ms(100)).await;

    let timeline = timeline.lock().unwrap();
    let stamps: Vec<Duration> = timeline.iter().map(|(at, _)| *at).collect();
    assert_eq!(stamps, vec![ms(50), ms(60), ms(60)]);
    assert!(timeline[2].1.end().unwrap().is_complete());
}

#[tokio::test(start_paused = true)]
async fn test_buffer_interval_ticks() {
    let start = Instant::now();
    let (timeline, sink) = stamped(start);
    let pipeline: Pipeline<Input<u32>, _> = Pipeline::channel();
    let (input, _sub) = pipeline
        .buffer_interval(ms(100), &Context::Direct)
        .subscribe(&Context::Direct, sink);

    input.push(1).unwrap();
    input.push(2).unwrap();
    sleep(ms(150)).await;
    sleep(ms(100)).await;
    input.push(3).unwrap();
    input.close().unwrap();

    let batches: Vec<Vec<u32>> = timeline
        .lock()
        .unwrap()
        .iter()
        .filter_map(|(_, e)| e.value().cloned())
        .collect();
    assert_eq!(batches, vec![vec![1, 2], vec![], vec![3]]);
}

#[tokio::test(start_paused = true)]
async fn test_interval_and_take() {
    let start = Instant::now();
    let (timeline, sink) = stamped(start);
    let _sub = Stream::<u64>::interval(ms(25), &Context::Direct)
        .take(3)
        .subscribe(&Context::Direct, sink);

    sleep(ms(200)).await;
    let timeline = timeline.lock().unwrap();
    let values: Vec<(Duration, u64)> = timeline
        .iter()
        .filter_map(|(at, e)| e.value().map(|v| (*at, *v)))
        .collect();
    assert_eq!(values, vec![(ms(25), 0), (ms(50), 1), (ms(75), 2)]);
    assert!(timeline.last().unwrap().1.end().unwrap().is_complete());
}

#[tokio::test(start_paused = true)]
async fn test_retry_with_backoff() {
    let start = Instant::now();
    let (timeline, sink) = stamped(start);
    let attempts = Arc::new(Mutex::new(Vec::new()));
    let record = attempts.clone();

    let policy = RetryPolicy::default()
        .with_max_retries(2)
        .with_backoff(Backoff::Fixed(ms(40)));
    let _sub = Stream::retry(policy, &Context::Direct, move || {
        record.lock().unwrap().push(start.elapsed());
        Stream::<u32>::failed(Error::failure("down"))
    })
    .subscribe(&Context::Direct, sink);

    sleep(ms(200)).await;
    assert_eq!(*attempts.lock().unwrap(), vec![ms(0), ms(40), ms(80)]);

    let timeline = timeline.lock().unwrap();
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline[0].0, ms(80));
    assert!(timeline[0].1.end().unwrap().is_failure());
}

#[tokio::test(start_paused = true)]
async fn test_timer_source() {
    let start = Instant::now();
    let (timeline, sink) = stamped(start);
    let _sub = Stream::timer(ms(30), "ready", &Context::Direct).subscribe(&Context::Direct, sink);

    sleep(ms(50)).await;
    let timeline = timeline.lock().unwrap();
    assert_eq!(timeline.len(), 2);
    assert_eq!(timeline[0].0, ms(30));
    assert!(matches!(timeline[0].1, Event::Value("ready")));
}
