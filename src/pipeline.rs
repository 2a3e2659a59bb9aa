use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{PipelineError, Result};
use crate::metrics::{Edge, MetricsSnapshot, PipelineMetrics};
use crate::order::{Order, OrderStatus};
use crate::queue::{BoundedQueue, PushError};
use crate::stage::{identity_stage, StageFn, StageRunner};

/// Capacities, worker counts and blocking timeouts for a pipeline
#[derive(Debug, Clone)]
pub struct Config {
    /// Capacity of the input edge
    pub q_in_capacity: usize,
    /// Capacity of the prepare-to-pack edge
    pub q_prepare_capacity: usize,
    /// Capacity of the pack-to-deliver edge
    pub q_pack_capacity: usize,
    /// Workers in the prepare pool
    pub prepare_workers: usize,
    /// Workers in the pack pool
    pub pack_workers: usize,
    /// Workers in the deliver pool
    pub deliver_workers: usize,
    /// How long `submit` may wait for input queue space
    pub push_timeout: Duration,
    /// How long a worker pop waits before re-checking the cancel flag
    pub pop_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            q_in_capacity: 256,
            q_prepare_capacity: 256,
            q_pack_capacity: 256,
            prepare_workers: 2,
            pack_workers: 2,
            deliver_workers: 2,
            push_timeout: Duration::from_millis(100),
            pop_timeout: Duration::from_millis(20),
        }
    }
}

impl Config {
    fn validate(&self) -> Result<()> {
        if self.q_in_capacity == 0 || self.q_prepare_capacity == 0 || self.q_pack_capacity == 0 {
            return Err(PipelineError::Config("queue capacities must be at least 1".into()));
        }
        if self.prepare_workers == 0 || self.pack_workers == 0 || self.deliver_workers == 0 {
            return Err(PipelineError::Config("worker counts must be at least 1".into()));
        }
        Ok(())
    }
}

/// Lifecycle state of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Constructed, nothing spawned yet
    Created,
    /// Workers running, submit accepted
    Running,
    /// Graceful shutdown in progress, closure propagating stage by stage
    Draining,
    /// All workers joined
    Stopped,
    /// A worker fault forced the pipeline down
    Failed,
}

/// State shared between the controller and its workers. Workers hold an
/// `Arc` to it; the controller joins them before it goes away.
pub(crate) struct PipelineCore {
    pub(crate) q_in: BoundedQueue<Order>,
    pub(crate) q_prepare: BoundedQueue<Order>,
    pub(crate) q_pack: BoundedQueue<Order>,
    pub(crate) metrics: PipelineMetrics,
    pub(crate) delivered: Mutex<Vec<Order>>,
    state: Mutex<PipelineState>,
    cancel: AtomicBool,
    fault: Mutex<Option<PipelineError>>,
}

impl PipelineCore {
    fn new(config: &Config) -> Self {
        Self {
            q_in: BoundedQueue::new(config.q_in_capacity),
            q_prepare: BoundedQueue::new(config.q_prepare_capacity),
            q_pack: BoundedQueue::new(config.q_pack_capacity),
            metrics: PipelineMetrics::new(),
            delivered: Mutex::new(Vec::new()),
            state: Mutex::new(PipelineState::Created),
            cancel: AtomicBool::new(false),
            fault: Mutex::new(None),
        }
    }

    pub(crate) fn queue(&self, edge: Edge) -> &BoundedQueue<Order> {
        match edge {
            Edge::In => &self.q_in,
            Edge::Prepare => &self.q_prepare,
            Edge::Pack => &self.q_pack,
        }
    }

    pub(crate) fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn state(&self) -> PipelineState {
        *self.state.lock()
    }

    /// Forced-cancel path: raise the cancel flag and close every edge so
    /// every blocked producer and consumer wakes up
    fn force_close(&self) {
        self.cancel.store(true, Ordering::Relaxed);
        self.q_in.close();
        self.q_prepare.close();
        self.q_pack.close();
    }

    /// Latch the first worker fault, mark the pipeline Failed and tear it
    /// down. Called from worker threads; never unwinds.
    pub(crate) fn fail(&self, error: PipelineError) {
        log::error!("pipeline worker fault, forcing shutdown: {error}");
        {
            let mut fault = self.fault.lock();
            if fault.is_none() {
                *fault = Some(error);
            }
        }
        *self.state.lock() = PipelineState::Failed;
        self.force_close();
    }
}

struct StageSet {
    prepare: StageFn,
    pack: StageFn,
    deliver: StageFn,
}

/// A three-stage worker-pool pipeline moving orders from submission to a
/// delivered sink.
///
/// Orders are submitted into a bounded input queue, prepared, packed and
/// delivered by independent worker pools connected by bounded queues.
/// `shutdown` drains everything that was accepted; `shutdown_now` abandons
/// queued work and returns promptly. Dropping a live pipeline performs a
/// forced shutdown.
pub struct Pipeline {
    core: Arc<PipelineCore>,
    config: Config,
    stages: StageSet,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Pipeline {
    /// Create a pipeline whose stages only advance order status
    pub fn new(config: Config) -> Result<Self> {
        Self::build(config, identity_stage(), identity_stage(), identity_stage())
    }

    /// Create a pipeline with custom per-stage work.
    ///
    /// Each closure runs after the order has advanced to the stage's
    /// status. An error or panic from a closure is contained in the worker
    /// and fails the pipeline.
    pub fn with_stages<P, K, D>(config: Config, prepare: P, pack: K, deliver: D) -> Result<Self>
    where
        P: Fn(&mut Order) -> Result<()> + Send + Sync + 'static,
        K: Fn(&mut Order) -> Result<()> + Send + Sync + 'static,
        D: Fn(&mut Order) -> Result<()> + Send + Sync + 'static,
    {
        Self::build(config, Arc::new(prepare), Arc::new(pack), Arc::new(deliver))
    }

    fn build(config: Config, prepare: StageFn, pack: StageFn, deliver: StageFn) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            core: Arc::new(PipelineCore::new(&config)),
            config,
            stages: StageSet { prepare, pack, deliver },
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Spawn the three worker pools and transition to Running.
    ///
    /// Idempotent while Running; fails with `Lifecycle` once the pipeline
    /// is draining or stopped. A stopped pipeline cannot be restarted.
    pub fn start(&self) -> Result<()> {
        // the handle lock is taken first so a concurrent shutdown cannot
        // join between the state transition and the spawns
        let mut workers = self.workers.lock();
        {
            let mut state = self.core.state.lock();
            match *state {
                PipelineState::Created => *state = PipelineState::Running,
                PipelineState::Running => return Ok(()),
                other => return Err(PipelineError::Lifecycle { state: other }),
            }
        }

        // worker counts are recorded before any order is processed
        self.core.metrics.record_workers(
            self.config.prepare_workers,
            self.config.pack_workers,
            self.config.deliver_workers,
        );
        self.spawn_stage(
            &mut workers,
            "prepare",
            OrderStatus::Prepared,
            Edge::In,
            Some(Edge::Prepare),
            self.config.prepare_workers,
            &self.stages.prepare,
        );
        self.spawn_stage(
            &mut workers,
            "pack",
            OrderStatus::Packed,
            Edge::Prepare,
            Some(Edge::Pack),
            self.config.pack_workers,
            &self.stages.pack,
        );
        self.spawn_stage(
            &mut workers,
            "deliver",
            OrderStatus::Delivered,
            Edge::Pack,
            None,
            self.config.deliver_workers,
            &self.stages.deliver,
        );

        log::debug!(
            "pipeline running with {}+{}+{} workers",
            self.config.prepare_workers,
            self.config.pack_workers,
            self.config.deliver_workers
        );
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_stage(
        &self,
        workers: &mut Vec<JoinHandle<()>>,
        name: &'static str,
        target: OrderStatus,
        input: Edge,
        output: Option<Edge>,
        count: usize,
        transform: &StageFn,
    ) {
        let live = Arc::new(AtomicUsize::new(count));
        for _ in 0..count {
            let runner = StageRunner::new(
                Arc::clone(&self.core),
                name,
                target,
                input,
                output,
                self.config.pop_timeout,
                Arc::clone(&live),
                Arc::clone(transform),
            );
            workers.push(std::thread::spawn(move || runner.run()));
        }
    }

    /// Submit an order into the input queue, waiting up to the configured
    /// push timeout for space.
    ///
    /// Legal while the pipeline is Created (orders buffer until `start`)
    /// or Running. Safe to call from many producer threads. Timeout and
    /// closure both count toward `submit_timeouts`; a lifecycle rejection
    /// touches no counter.
    pub fn submit(&self, order: Order) -> Result<()> {
        match self.core.state() {
            PipelineState::Created | PipelineState::Running => {}
            other => return Err(PipelineError::Lifecycle { state: other }),
        }

        match self.core.q_in.push_timeout(order, self.config.push_timeout) {
            Ok(()) => {
                self.core.metrics.record_push(Edge::In, self.core.q_in.len());
                Ok(())
            }
            Err(PushError::Timeout(_)) => {
                self.core.metrics.record_submit_timeout();
                Err(PipelineError::BackpressureTimeout { timeout: self.config.push_timeout })
            }
            Err(PushError::Closed(_)) => {
                self.core.metrics.record_submit_timeout();
                Err(PipelineError::InputClosed)
            }
        }
    }

    /// Graceful shutdown: stop accepting work, let closure propagate along
    /// the dataflow and join every worker. Every accepted order is still
    /// delivered. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut state = self.core.state.lock();
            match *state {
                PipelineState::Created => {
                    self.core.q_in.close();
                    *state = PipelineState::Stopped;
                    return;
                }
                PipelineState::Running => *state = PipelineState::Draining,
                // a concurrent shutdown is already draining; wait for it below
                PipelineState::Draining => {}
                PipelineState::Stopped | PipelineState::Failed => return,
            }
        }

        self.core.q_in.close();
        self.join_workers();
        self.finish();
    }

    /// Forced shutdown: close every queue up front, abandon queued orders
    /// and join every worker. Legal in any state, idempotent.
    pub fn shutdown_now(&self) {
        self.core.force_close();
        self.join_workers();
        self.finish();
    }

    fn join_workers(&self) {
        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            if handle.join().is_err() {
                // runners contain panics themselves, this is a last resort
                self.core.fail(PipelineError::WorkerFault {
                    stage: "pipeline",
                    message: "worker thread panicked".to_string(),
                });
            }
        }
    }

    fn finish(&self) {
        let mut state = self.core.state.lock();
        if *state != PipelineState::Failed {
            *state = PipelineState::Stopped;
        }
    }

    pub fn state(&self) -> PipelineState {
        self.core.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == PipelineState::Running
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.state(), PipelineState::Stopped | PipelineState::Failed)
    }

    /// Consistent snapshot of every counter
    pub fn metrics(&self) -> MetricsSnapshot {
        self.core.metrics.snapshot()
    }

    /// Orders delivered so far, in completion order
    pub fn delivered_orders(&self) -> Vec<Order> {
        self.core.delivered.lock().clone()
    }

    /// The first worker fault, if any
    pub fn fault(&self) -> Option<PipelineError> {
        self.core.fault.lock().clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_rejects_zero_capacity() {
        let config = Config { q_prepare_capacity: 0, ..Config::default() };
        assert!(matches!(Pipeline::new(config), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_config_rejects_zero_workers() {
        let config = Config { deliver_workers: 0, ..Config::default() };
        assert!(matches!(Pipeline::new(config), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_initial_state_is_created_with_zero_metrics() {
        let pipeline = Pipeline::new(Config::default()).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Created);
        assert!(!pipeline.is_running());
        assert!(!pipeline.is_stopped());

        let metrics = pipeline.metrics();
        assert_eq!(metrics, MetricsSnapshot::default());
        assert!(pipeline.delivered_orders().is_empty());
    }

    #[test]
    fn test_start_is_idempotent_while_running() {
        let pipeline = Pipeline::new(Config::default()).unwrap();
        pipeline.start().unwrap();
        assert!(pipeline.is_running());
        pipeline.start().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Running);

        let metrics = pipeline.metrics();
        assert_eq!(metrics.prepare_workers, 2);
        assert_eq!(metrics.pack_workers, 2);
        assert_eq!(metrics.deliver_workers, 2);

        pipeline.shutdown_now();
    }

    #[test]
    fn test_start_after_stop_is_a_lifecycle_violation() {
        let pipeline = Pipeline::new(Config::default()).unwrap();
        pipeline.start().unwrap();
        pipeline.shutdown_now();
        assert!(pipeline.is_stopped());

        assert_eq!(
            pipeline.start(),
            Err(PipelineError::Lifecycle { state: PipelineState::Stopped })
        );
    }

    #[test]
    fn test_shutdown_before_start_stops_the_pipeline() {
        let pipeline = Pipeline::new(Config::default()).unwrap();
        pipeline.shutdown();
        assert_eq!(pipeline.state(), PipelineState::Stopped);

        assert_eq!(
            pipeline.submit(Order::new(1)),
            Err(PipelineError::Lifecycle { state: PipelineState::Stopped })
        );
    }

    #[test]
    fn test_submit_before_start_buffers_into_the_input_queue() {
        let pipeline = Pipeline::new(Config::default()).unwrap();
        pipeline.submit(Order::new(1)).unwrap();
        pipeline.submit(Order::new(2)).unwrap();

        let metrics = pipeline.metrics();
        assert_eq!(metrics.accepted, 2);
        assert_eq!(metrics.q_in.pushes, 2);
        assert_eq!(metrics.q_in.pops, 0);
    }
}
