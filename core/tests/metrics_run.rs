//! A whole test run feeding one aggregator, drained at the end.

mod common;

use std::thread;

use end2end::{AggregatorState, Client, ClientConfig, Error, MetricsAggregator, TestContext};
use mock_server::Delayed;

use common::{base_url, start_mock_server};

#[test]
fn concurrent_requests_are_each_counted_once() {
    let base = base_url(start_mock_server());
    let mut aggregator = MetricsAggregator::new();
    let client = Client::new(&base).with_metrics(aggregator.start().unwrap());

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let client = client.clone();
            thread::spawn(move || {
                let ctx = TestContext::new(format!("worker-{i}"));
                client.get("/status/202").expect_status(202).call(&ctx);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let metrics = aggregator.stop_and_wait().unwrap();
    assert_eq!(metrics.total_requests, 20);
    assert_eq!(metrics.slowest_endpoint(), Some("/status/202"));
    assert!(metrics.min_duration_ms <= metrics.max_duration_ms());
    assert_eq!(aggregator.state(), AggregatorState::Done);
}

#[test]
fn slowest_endpoint_and_extremes_are_tracked() {
    let base = base_url(start_mock_server());
    let mut aggregator = MetricsAggregator::new();
    let client = Client::new(&base).with_metrics(aggregator.start().unwrap());

    let handles: Vec<_> = [50u64, 150]
        .into_iter()
        .map(|ms| {
            let client = client.clone();
            thread::spawn(move || {
                let ctx = TestContext::new(format!("delay-{ms}"));
                let mut got = Delayed { delayed_ms: 0 };
                client
                    .get(&format!("/delay/{ms}"))
                    .expect_json(&mut got, 200)
                    .call(&ctx);
                assert_eq!(got.delayed_ms, ms);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let metrics = aggregator.stop_and_wait().unwrap();
    println!("{metrics}");

    assert_eq!(metrics.total_requests, 2);
    assert_eq!(metrics.slowest_endpoint(), Some("/delay/150"));
    let max = metrics.max_duration_ms().unwrap();
    let min = metrics.min_duration_ms.unwrap();
    assert!(max >= 150, "max {max}");
    assert!((50..150).contains(&min), "min {min}");
    assert_eq!(metrics.total_duration_ms, min + max);
    assert!((metrics.average_ms() - (min + max) as f64 / 2.0).abs() < 1e-9);
}

#[test]
fn requests_without_a_sink_record_nothing() {
    let base = base_url(start_mock_server());
    let mut aggregator = MetricsAggregator::new();
    let sink = aggregator.start().unwrap();

    let ctx = TestContext::new("requests_without_a_sink_record_nothing");
    Client::new(&base).get("/status/200").call(&ctx);
    Client::new(&base).with_metrics(sink).get("/status/200").call(&ctx);

    assert_eq!(aggregator.stop_and_wait().unwrap().total_requests, 1);
}

#[test]
fn response_over_the_body_limit_is_still_recorded() {
    let base = base_url(start_mock_server());
    let mut aggregator = MetricsAggregator::new();
    let client = Client::with_config(&base, &ClientConfig::default().with_max_body_bytes(8))
        .with_metrics(aggregator.start().unwrap());

    let err = client.get("/images/png").send().unwrap_err();
    assert!(matches!(err, Error::Transport { .. }), "{err}");

    let metrics = aggregator.stop_and_wait().unwrap();
    assert_eq!(metrics.total_requests, 1);
    assert_eq!(metrics.slowest_endpoint(), Some("/images/png"));
}
