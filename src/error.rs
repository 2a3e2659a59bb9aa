use std::time::Duration;

use thiserror::Error;

use crate::order::OrderStatus;
use crate::pipeline::PipelineState;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while operating the pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Configuration error
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Operation is illegal in the current lifecycle state
    #[error("operation is not allowed while the pipeline is {state:?}")]
    Lifecycle {
        /// State the pipeline was in when the operation was rejected
        state: PipelineState,
    },

    /// Submit could not enqueue within the configured push timeout
    #[error("submit timed out after {timeout:?} waiting for input queue space")]
    BackpressureTimeout {
        /// The push timeout that elapsed
        timeout: Duration,
    },

    /// Submit hit an input queue that was already closed
    #[error("input queue is closed")]
    InputClosed,

    /// An order was asked to advance out of its legal status chain
    #[error("invalid order status transition {from:?} -> {to:?}")]
    InvalidTransition {
        /// Status the order currently holds
        from: OrderStatus,
        /// Status the caller tried to move to
        to: OrderStatus,
    },

    /// A stage worker failed while processing an order
    #[error("{stage} worker failed: {message}")]
    WorkerFault {
        /// Name of the stage whose worker failed
        stage: &'static str,
        /// Description of the failure
        message: String,
    },
}
