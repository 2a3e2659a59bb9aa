//! A bounded, backpressure-aware worker-pool pipeline for order processing.
//!
//! This crate moves orders through a fixed prepare -> pack -> deliver
//! sequence. Each stage runs a pool of OS threads connected by bounded
//! blocking queues, so memory stays bounded and slow stages push back on
//! producers. Termination is deterministic under both graceful drain and
//! forced cancel.
//!
//! # Features
//!
//! - Bounded blocking FIFO with close semantics on every edge
//! - Per-stage worker pools, scaled independently
//! - Backpressure with a configurable submit timeout
//! - Graceful drain that delivers every accepted order
//! - Forced cancel that returns promptly and abandons queued work
//! - Consistent metrics snapshots: stage counters, queue traffic, lead time
//!
//! # Example
//!
//! ```ignore
//! use order_pipeline::{Config, Order, Pipeline};
//!
//! let pipeline = Pipeline::new(Config::default())?;
//! pipeline.start()?;
//!
//! for id in 1..=1000 {
//!     pipeline.submit(Order::new(id))?;
//! }
//!
//! pipeline.shutdown();
//! assert_eq!(pipeline.metrics().delivered, 1000);
//! ```

pub mod error;
pub mod metrics;
pub mod order;
pub mod pipeline;
pub mod queue;

mod stage;

// Re-exports for convenience
pub use error::{PipelineError, Result};
pub use metrics::{Edge, MetricsSnapshot, QueueCounters};
pub use order::{Order, OrderId, OrderStatus};
pub use pipeline::{Config, Pipeline, PipelineState};
pub use queue::{BoundedQueue, PopError, PushError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
