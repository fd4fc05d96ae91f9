//! The single-writer event processor.
//!
//! - [`EventProcessor`]: one consumer per command-topic partition
//! - [`SingleWriter`] and [`Applier`]: the only path that mutates the
//!   authoritative store, with exactly-once effect per envelope id
//! - [`Pipeline`]: parsing, bounded conflict retries and dead-lettering
//! - [`DeadLetterReplayer`]: inspection and replay of dead letters

pub mod consumer;
pub mod dead_letter;
pub mod error;
pub mod pipeline;
pub mod retry;
pub mod writer;

pub use consumer::EventProcessor;
pub use dead_letter::{
    DeadLetter, DeadLetterReason, DeadLetterReplayer, ReplayFilter, ReplayReport,
    publish_dead_letter,
};
pub use error::{ProcessorError, Result};
pub use pipeline::{ApplyOutcome, Pipeline, ProcessingStage};
pub use retry::{RetryPolicy, RetryPolicyBuilder};
pub use writer::{Applier, DEFAULT_QUEUE_CAPACITY, SingleWriter, WriteOutcome, WriterHandle};
