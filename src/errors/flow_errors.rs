//! Errors signalled by producers, backpressure strategies, schedulers and the
//! subscription registry.

use std::{error::Error, sync::Arc};

use thiserror::Error;

/// Shared error type delivered to a `Subscriber`'s error callback.
pub type SharedError = Arc<dyn Error + Send + Sync>;

/// Errors produced by `rxflow` itself.
///
/// Custom producer errors reach subscribers untouched; errors raised by the
/// crate arrive as a `FlowError` and can be recovered with
/// `err.downcast_ref::<FlowError>()`.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// Value generation failed inside a producer.
    #[error("producer failed: {reason}")]
    ProducerFailure {
        /// Rendered message of the underlying failure.
        reason: String,
    },

    /// A `Buffer` strategy held `capacity` values and another one arrived.
    #[error("backpressure buffer overflow (capacity {capacity})")]
    BufferOverflow {
        /// The configured bound that was exceeded.
        capacity: usize,
    },

    /// An `Error` strategy received a value while the consumer had no demand.
    #[error("could not emit value due to lack of requests")]
    MissingBackpressure,

    /// A subscription was added to an already disposed registry.
    #[error("subscription registry is already disposed")]
    UseAfterDispose,

    /// Work was scheduled onto an execution context that no longer runs.
    #[error("{context} scheduler is closed")]
    SchedulerClosed {
        /// Name of the closed context.
        context: &'static str,
    },

    /// A background worker could not be started.
    #[error("failed to spawn background worker: {reason}")]
    Spawn {
        /// Rendered OS error.
        reason: String,
    },

    /// Awaiting background work failed.
    #[error("failed to join background work: {reason}")]
    Join {
        /// What went wrong while joining.
        reason: String,
    },
}

impl FlowError {
    /// Wraps any producer-side error into [`FlowError::ProducerFailure`].
    pub fn producer(err: impl std::fmt::Display) -> Self {
        FlowError::ProducerFailure {
            reason: err.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use rxflow::FlowError;
    ///
    /// let err = FlowError::BufferOverflow { capacity: 16 };
    /// assert_eq!(err.as_label(), "buffer_overflow");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            FlowError::ProducerFailure { .. } => "producer_failure",
            FlowError::BufferOverflow { .. } => "buffer_overflow",
            FlowError::MissingBackpressure => "missing_backpressure",
            FlowError::UseAfterDispose => "use_after_dispose",
            FlowError::SchedulerClosed { .. } => "scheduler_closed",
            FlowError::Spawn { .. } => "spawn_failed",
            FlowError::Join { .. } => "join_failed",
        }
    }

    pub(crate) fn shared(self) -> SharedError {
        Arc::new(self)
    }
}
