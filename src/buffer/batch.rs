use crate::domain::LogRecord;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Why a batch left the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    CountThreshold,
    ByteThreshold,
    TimeTick,
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub max_count: usize,
    pub max_bytes: usize,
    pub flush_interval: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_count: 1024,
            max_bytes: 1024 * 1024, // 1MiB
            flush_interval: Duration::from_secs(4),
        }
    }
}

/// Records collected during one accumulation cycle, in arrival order.
#[derive(Debug, Clone)]
pub struct Batch {
    id: String,
    records: Vec<LogRecord>,
    byte_size: usize,
    created_at: Instant,
}

impl Batch {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            records: Vec::new(),
            byte_size: 0,
            created_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    /// Sum of the encoded lengths of all records.
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<LogRecord> {
        self.records
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn push(&mut self, record: LogRecord) {
        self.byte_size += record.encoded_size();
        self.records.push(record);
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutable buffer the shipper loop fills between flushes.
///
/// Bounds are not enforced here; the caller asks [`Accumulator::should_flush`]
/// after every mutation and calls [`Accumulator::reset`] to take the batch.
#[derive(Debug, Default)]
pub struct Accumulator {
    current: Batch,
}

impl Accumulator {
    pub fn new() -> Self {
        Self {
            current: Batch::new(),
        }
    }

    pub fn append(&mut self, record: LogRecord) {
        self.current.push(record);
    }

    pub fn count(&self) -> usize {
        self.current.count()
    }

    pub fn byte_size(&self) -> usize {
        self.current.byte_size()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn should_flush(&self, count_limit: usize, byte_limit: usize) -> bool {
        self.trigger_for(count_limit, byte_limit).is_some()
    }

    /// Which threshold, if any, the current batch has crossed.
    pub fn flush_trigger(&self, config: &BatchConfig) -> Option<FlushTrigger> {
        self.trigger_for(config.max_count, config.max_bytes)
    }

    fn trigger_for(&self, count_limit: usize, byte_limit: usize) -> Option<FlushTrigger> {
        if self.count() >= count_limit {
            Some(FlushTrigger::CountThreshold)
        } else if self.byte_size() >= byte_limit {
            Some(FlushTrigger::ByteThreshold)
        } else {
            None
        }
    }

    /// Hands the current batch to the caller and starts a fresh one.
    pub fn reset(&mut self) -> Batch {
        std::mem::take(&mut self.current)
    }
}
