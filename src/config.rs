//! # Stream configuration.
//!
//! [`FlowConfig`] holds the defaults used when building flowables and
//! background workers: buffer bound, lag warning threshold and worker thread
//! name.
//!
//! # Example
//! ```
//! use rxflow::{flowable::BackpressureStrategy, FlowConfig};
//!
//! let mut cfg = FlowConfig::default();
//! cfg.buffer_size = 16;
//!
//! assert_eq!(
//!     cfg.buffer_strategy(),
//!     BackpressureStrategy::Buffer { capacity: 16 }
//! );
//! ```

use crate::flowable::BackpressureStrategy;

/// Defaults for flowables and schedulers.
#[derive(Clone, Debug)]
pub struct FlowConfig {
    /// Bound used by [`FlowConfig::buffer_strategy`], and the number of
    /// requested values a flowable queues for delivery ahead of its consumer.
    pub buffer_size: usize,
    /// Number of held (undelivered, unrequested) values that triggers a lag warning.
    pub lag_warning_threshold: usize,
    /// Thread name given to background workers spawned outside Tokio.
    pub worker_name: String,
}

impl Default for FlowConfig {
    /// Provides a default configuration:
    /// - `buffer_size = 128`
    /// - `lag_warning_threshold = 1000`
    /// - `worker_name = "rxflow-io"`
    fn default() -> Self {
        Self {
            buffer_size: 128,
            lag_warning_threshold: 1000,
            worker_name: "rxflow-io".to_string(),
        }
    }
}

impl FlowConfig {
    /// A `Buffer` strategy bounded by `buffer_size`.
    pub fn buffer_strategy(&self) -> BackpressureStrategy {
        BackpressureStrategy::Buffer {
            capacity: self.buffer_size,
        }
    }
}
