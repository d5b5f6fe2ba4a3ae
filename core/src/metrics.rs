//! Run-wide request metrics.
//!
//! # Design
//! Every executed request pushes one `MetricsRecord` into a bounded
//! channel. A single consumer thread owns the `AggregateMetrics`
//! accumulator and drains the channel in arrival order. When the run ends
//! the sink is closed, the consumer finishes draining and hands the final
//! aggregate back over a oneshot channel, so the aggregate can only be read
//! once nothing can write to it any more.
//!
//! Lifecycle: `Idle` -> `Collecting` (`start`) -> `Draining`
//! (`stop_and_wait` closed the sink) -> `Done`.
//!
//! The sink and the completion wait use tokio's blocking channel API. On a
//! thread driving an async runtime the sink never blocks: a push into a full
//! buffer is dropped with a warning. `stop_and_wait` refuses to run there at
//! all; call it from a plain thread.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::RwLock;
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::Error;

/// Buffered records before a push blocks on a lagging consumer.
pub const SINK_CAPACITY: usize = 1000;

/// One completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsRecord {
    pub status: u16,
    /// URL path only, no host or query.
    pub endpoint: String,
    pub duration_ms: u64,
}

/// Producer handle onto the metrics channel. Clones share one channel;
/// closing it through the aggregator closes it for every clone.
#[derive(Debug, Clone)]
pub struct MetricsSink {
    sender: Arc<RwLock<Option<mpsc::Sender<MetricsRecord>>>>,
}

impl MetricsSink {
    /// Push a record, blocking while the buffer is full. Records pushed
    /// after the sink was closed are dropped.
    ///
    /// On an async runtime thread this never blocks. If the buffer is full
    /// there, the record is dropped with a warning.
    pub fn record(&self, record: MetricsRecord) {
        // Clone out of the lock so a blocked push never holds it.
        let sender = self.sender.read().clone();
        let Some(sender) = sender else {
            warn!(endpoint = %record.endpoint, "metrics sink closed, record dropped");
            return;
        };
        let record = match sender.try_send(record) {
            Ok(()) => return,
            Err(TrySendError::Closed(record)) => {
                warn!(endpoint = %record.endpoint, "metrics consumer gone, record dropped");
                return;
            }
            Err(TrySendError::Full(record)) => record,
        };
        if on_runtime_thread() {
            warn!(endpoint = %record.endpoint, "metrics buffer full on a runtime thread, record dropped");
            return;
        }
        if let Err(mpsc::error::SendError(record)) = sender.blocking_send(record) {
            warn!(endpoint = %record.endpoint, "metrics consumer gone, record dropped");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    fn close(&self) {
        self.sender.write().take();
    }
}

/// The request that took longest during the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlowestRequest {
    pub endpoint: String,
    pub duration_ms: u64,
}

/// Running statistics over every record the consumer has seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateMetrics {
    pub total_requests: u64,
    pub total_duration_ms: u64,
    pub slowest: Option<SlowestRequest>,
    pub min_duration_ms: Option<u64>,
}

impl AggregateMetrics {
    fn observe(&mut self, record: &MetricsRecord) {
        self.total_requests += 1;
        self.total_duration_ms += record.duration_ms;

        // Ties keep the first endpoint seen.
        let is_slower = self
            .slowest
            .as_ref()
            .map_or(true, |slowest| record.duration_ms > slowest.duration_ms);
        if is_slower {
            self.slowest = Some(SlowestRequest {
                endpoint: record.endpoint.clone(),
                duration_ms: record.duration_ms,
            });
        }

        self.min_duration_ms = Some(match self.min_duration_ms {
            Some(min) => min.min(record.duration_ms),
            None => record.duration_ms,
        });
    }

    pub fn max_duration_ms(&self) -> Option<u64> {
        self.slowest.as_ref().map(|s| s.duration_ms)
    }

    pub fn slowest_endpoint(&self) -> Option<&str> {
        self.slowest.as_ref().map(|s| s.endpoint.as_str())
    }

    /// Mean duration in milliseconds, 0.0 when nothing was recorded.
    pub fn average_ms(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.total_duration_ms as f64 / self.total_requests as f64
    }
}

impl fmt::Display for AggregateMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total number of sending requests: {}", self.total_requests)?;
        writeln!(f, "Total time for waiting response : {} ms", self.total_duration_ms)?;
        match &self.slowest {
            Some(slowest) => writeln!(
                f,
                "Max time for response           : {} ms in request to {}",
                slowest.duration_ms, slowest.endpoint
            )?,
            None => writeln!(f, "Max time for response           : -")?,
        }
        match self.min_duration_ms {
            Some(min) => writeln!(f, "Min time for response           : {min} ms")?,
            None => writeln!(f, "Min time for response           : -")?,
        }
        write!(f, "Average time for response       : {:.3} ms", self.average_ms())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    Idle,
    Collecting,
    Draining,
    Done,
}

/// Owns the single consumer for one test run.
#[derive(Debug)]
pub struct MetricsAggregator {
    state: AggregatorState,
    capacity: usize,
    sink: Option<MetricsSink>,
    done: Option<oneshot::Receiver<AggregateMetrics>>,
    worker: Option<JoinHandle<()>>,
    result: Option<AggregateMetrics>,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::with_capacity(SINK_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: AggregatorState::Idle,
            capacity: capacity.max(1),
            sink: None,
            done: None,
            worker: None,
            result: None,
        }
    }

    pub fn state(&self) -> AggregatorState {
        self.state
    }

    /// Spawn the consumer and return a sink for producers.
    pub fn start(&mut self) -> Result<MetricsSink, Error> {
        if self.state != AggregatorState::Idle {
            return Err(Error::Aggregator(format!(
                "start called in state {:?}, expected Idle",
                self.state
            )));
        }

        let (tx, rx) = mpsc::channel(self.capacity);
        let (done_tx, done_rx) = oneshot::channel();
        let worker = thread::Builder::new()
            .name("metrics-aggregator".to_string())
            .spawn(move || consume(rx, done_tx))
            .map_err(|e| Error::Aggregator(format!("spawning consumer: {e}")))?;

        let sink = MetricsSink {
            sender: Arc::new(RwLock::new(Some(tx))),
        };
        self.sink = Some(sink.clone());
        self.done = Some(done_rx);
        self.worker = Some(worker);
        self.state = AggregatorState::Collecting;
        debug!(capacity = self.capacity, "metrics aggregator started");
        Ok(sink)
    }

    /// Another handle onto the running sink, if collecting.
    pub fn sink(&self) -> Option<MetricsSink> {
        self.sink.clone()
    }

    /// Close the sink, wait for the consumer to drain it and return the
    /// final aggregate.
    ///
    /// Blocks, so it fails with `Error::Aggregator` on a thread that drives
    /// an async runtime. The aggregator is left collecting in that case.
    pub fn stop_and_wait(&mut self) -> Result<AggregateMetrics, Error> {
        if self.state != AggregatorState::Collecting {
            return Err(Error::Aggregator(format!(
                "stop_and_wait called in state {:?}, expected Collecting",
                self.state
            )));
        }
        if on_runtime_thread() {
            return Err(Error::Aggregator(
                "stop_and_wait blocks and cannot run on an async runtime thread".to_string(),
            ));
        }

        self.state = AggregatorState::Draining;
        if let Some(sink) = self.sink.take() {
            sink.close();
        }
        let done = self
            .done
            .take()
            .ok_or_else(|| Error::Aggregator("completion channel missing".to_string()))?;
        let metrics = done
            .blocking_recv()
            .map_err(|_| Error::Aggregator("consumer exited without signalling".to_string()))?;
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| Error::Aggregator("consumer thread panicked".to_string()))?;
        }

        self.state = AggregatorState::Done;
        self.result = Some(metrics.clone());
        Ok(metrics)
    }

    /// The final aggregate, once `stop_and_wait` has returned.
    pub fn metrics(&self) -> Option<&AggregateMetrics> {
        self.result.as_ref()
    }
}

impl Drop for MetricsAggregator {
    fn drop(&mut self) {
        // Lets the consumer thread exit if the run never called stop_and_wait.
        if let Some(sink) = self.sink.take() {
            sink.close();
        }
    }
}

fn on_runtime_thread() -> bool {
    Handle::try_current().is_ok()
}

fn consume(mut rx: mpsc::Receiver<MetricsRecord>, done: oneshot::Sender<AggregateMetrics>) {
    let mut metrics = AggregateMetrics::default();
    while let Some(record) = rx.blocking_recv() {
        metrics.observe(&record);
    }
    debug!(total_requests = metrics.total_requests, "metrics drained");
    let _ = done.send(metrics);
}
