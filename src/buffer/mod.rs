pub mod batch;

pub use batch::{Accumulator, Batch, BatchConfig, FlushTrigger};
