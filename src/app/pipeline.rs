use crate::{
    buffer::{Accumulator, BatchConfig, FlushTrigger},
    domain::LogRecord,
    sender::{BatchSerializer, BatchUploader, Payload},
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Counters shared between the shipper loop and its send tasks.
#[derive(Debug, Default)]
pub struct ShipperStats {
    batches_dispatched: AtomicU64,
    batches_sent: AtomicU64,
    batches_failed: AtomicU64,
    records_sent: AtomicU64,
    records_dropped: AtomicU64,
    serialization_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShipperStatsSnapshot {
    pub batches_dispatched: u64,
    pub batches_sent: u64,
    pub batches_failed: u64,
    pub records_sent: u64,
    pub records_dropped: u64,
    pub serialization_failures: u64,
}

impl ShipperStats {
    fn record_sent(&self, records: usize) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.records_sent.fetch_add(records as u64, Ordering::Relaxed);
    }

    fn record_failed(&self, records: usize) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
        self.records_dropped.fetch_add(records as u64, Ordering::Relaxed);
    }

    fn record_serialization_failure(&self, records: usize) {
        self.serialization_failures.fetch_add(1, Ordering::Relaxed);
        self.records_dropped.fetch_add(records as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ShipperStatsSnapshot {
        ShipperStatsSnapshot {
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            records_sent: self.records_sent.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            serialization_failures: self.serialization_failures.load(Ordering::Relaxed),
        }
    }
}

/// Batching engine: owns the accumulator and dispatches full batches.
///
/// The loop is the only mutator of the accumulator. Every flush hands the
/// batch to its own task, so a slow upload never holds up ingestion. Sends are
/// at-most-once; failures are logged and counted, never retried.
pub struct Shipper<S, U> {
    accumulator: Accumulator,
    config: BatchConfig,
    serializer: S,
    uploader: Arc<U>,
    stats: Arc<ShipperStats>,
    in_flight: TaskTracker,
    shutdown_grace: Duration,
}

impl<S, U> Shipper<S, U>
where
    S: BatchSerializer,
    U: BatchUploader,
{
    pub fn new(config: BatchConfig, serializer: S, uploader: Arc<U>) -> Self {
        Self {
            accumulator: Accumulator::new(),
            config,
            serializer,
            uploader,
            stats: Arc::new(ShipperStats::default()),
            in_flight: TaskTracker::new(),
            shutdown_grace: Duration::from_secs(4),
        }
    }

    /// How long shutdown waits for sends still in flight.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn stats(&self) -> Arc<ShipperStats> {
        self.stats.clone()
    }

    pub fn pending_count(&self) -> usize {
        self.accumulator.count()
    }

    pub fn pending_bytes(&self) -> usize {
        self.accumulator.byte_size()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Appends a record and flushes if a threshold is crossed.
    pub fn handle_record(&mut self, record: LogRecord) -> Option<FlushTrigger> {
        self.accumulator.append(record);
        let trigger = self.accumulator.flush_trigger(&self.config)?;
        self.flush(trigger);
        Some(trigger)
    }

    /// Timer-driven flush, regardless of thresholds.
    pub fn handle_tick(&mut self) -> bool {
        self.flush(FlushTrigger::TimeTick)
    }

    /// Takes the current batch and dispatches it. Returns whether a send was
    /// started; an empty batch is never sent.
    pub fn flush(&mut self, trigger: FlushTrigger) -> bool {
        if self.accumulator.is_empty() {
            return false;
        }

        let batch = self.accumulator.reset();
        debug!(
            "Flushing batch {} ({} records, {} bytes, trigger={:?})",
            batch.id(),
            batch.count(),
            batch.byte_size(),
            trigger
        );

        match self.serializer.serialize(&batch) {
            Ok(payload) => {
                self.dispatch(payload);
                true
            }
            Err(e) => {
                error!(
                    "Failed to serialize batch {}, dropping {} records: {}",
                    batch.id(),
                    batch.count(),
                    e
                );
                self.stats.record_serialization_failure(batch.count());
                false
            }
        }
    }

    fn dispatch(&self, payload: Payload) {
        self.stats.batches_dispatched.fetch_add(1, Ordering::Relaxed);

        let uploader = self.uploader.clone();
        let stats = self.stats.clone();
        self.in_flight.spawn(async move {
            let batch_id = payload.batch_id.clone();
            let records = payload.record_count;
            let bytes = payload.len();
            match uploader.upload(payload).await {
                Ok(()) => {
                    debug!("Sent batch {} ({} records, {} bytes)", batch_id, records, bytes);
                    stats.record_sent(records);
                }
                Err(e) => {
                    error!("Failed to send batch {} ({} records): {}", batch_id, records, e);
                    stats.record_failed(records);
                }
            }
        });
    }

    /// Runs until the inbound channel closes or `shutdown` fires, then drains.
    pub async fn run(
        mut self,
        mut records: mpsc::Receiver<LogRecord>,
        shutdown: CancellationToken,
    ) -> ShipperStatsSnapshot {
        // interval panics on a zero period
        let period = self.config.flush_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Starting shipper loop (max_count={}, max_bytes={}, flush_interval={:?})",
            self.config.max_count, self.config.max_bytes, period
        );

        loop {
            tokio::select! {
                maybe_record = records.recv() => match maybe_record {
                    Some(record) => {
                        self.handle_record(record);
                    }
                    None => {
                        info!("Inbound channel closed, stopping shipper loop");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    self.handle_tick();
                }
                _ = shutdown.cancelled() => {
                    info!("Received shutdown signal, stopping shipper loop");
                    break;
                }
            }
        }

        // Records the producer already handed over still get a chance to ship.
        records.close();
        while let Ok(record) = records.try_recv() {
            self.handle_record(record);
        }

        self.drain().await
    }

    async fn drain(mut self) -> ShipperStatsSnapshot {
        self.flush(FlushTrigger::Shutdown);
        self.in_flight.close();

        if tokio::time::timeout(self.shutdown_grace, self.in_flight.wait())
            .await
            .is_err()
        {
            warn!(
                "Shutdown grace period of {:?} exceeded, abandoning {} in-flight sends",
                self.shutdown_grace,
                self.in_flight.len()
            );
        }

        let snapshot = self.stats.snapshot();
        info!(
            "Shipper stopped: {} batches sent, {} failed, {} records dropped",
            snapshot.batches_sent, snapshot.batches_failed, snapshot.records_dropped
        );
        snapshot
    }
}
