use std::time::Duration;

use parking_lot::Mutex;

/// Identifies one of the three edge queues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// The input edge feeding the prepare stage
    In,
    /// The edge between prepare and pack
    Prepare,
    /// The edge between pack and deliver
    Pack,
}

/// Push/pop traffic observed on one edge queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounters {
    /// Successful pushes onto the edge
    pub pushes: u64,
    /// Successful pops off the edge
    pub pops: u64,
    /// Largest queue length observed right after a push
    pub max_len: usize,
}

/// A consistent point-in-time view of every pipeline counter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Orders accepted into the input queue
    pub accepted: u64,
    /// Orders pushed onward by the prepare stage
    pub prepared: u64,
    /// Orders pushed onward by the pack stage
    pub packed: u64,
    /// Orders appended to the delivered sink
    pub delivered: u64,
    /// Submits that failed on a full or closed input queue
    pub submit_timeouts: u64,
    /// Prepare workers spawned at start
    pub prepare_workers: usize,
    /// Pack workers spawned at start
    pub pack_workers: usize,
    /// Deliver workers spawned at start
    pub deliver_workers: usize,
    /// Traffic on the input edge
    pub q_in: QueueCounters,
    /// Traffic on the prepare edge
    pub q_prepare: QueueCounters,
    /// Traffic on the pack edge
    pub q_pack: QueueCounters,
    /// Sum of per-order time from acceptance to delivery
    pub total_lead_time: Duration,
}

impl MetricsSnapshot {
    /// Counters for one edge queue
    pub fn edge(&self, edge: Edge) -> &QueueCounters {
        match edge {
            Edge::In => &self.q_in,
            Edge::Prepare => &self.q_prepare,
            Edge::Pack => &self.q_pack,
        }
    }
}

/// Shared counter store for the whole pipeline.
///
/// Every mutation and the snapshot take the same mutex, so a snapshot is
/// internally consistent and counters never regress between two reads.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    inner: Mutex<MetricsSnapshot>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn edge_mut(snapshot: &mut MetricsSnapshot, edge: Edge) -> &mut QueueCounters {
        match edge {
            Edge::In => &mut snapshot.q_in,
            Edge::Prepare => &mut snapshot.q_prepare,
            Edge::Pack => &mut snapshot.q_pack,
        }
    }

    /// Record a successful push onto an edge together with the stage
    /// counter it advances: In -> accepted, Prepare -> prepared,
    /// Pack -> packed. `observed_len` is the queue length right after the
    /// push and feeds the running maximum.
    pub(crate) fn record_push(&self, edge: Edge, observed_len: usize) {
        let mut snapshot = self.inner.lock();
        match edge {
            Edge::In => snapshot.accepted += 1,
            Edge::Prepare => snapshot.prepared += 1,
            Edge::Pack => snapshot.packed += 1,
        }
        let counters = Self::edge_mut(&mut snapshot, edge);
        counters.pushes += 1;
        counters.max_len = counters.max_len.max(observed_len);
    }

    /// Record a successful pop off an edge
    pub(crate) fn record_pop(&self, edge: Edge) {
        let mut snapshot = self.inner.lock();
        Self::edge_mut(&mut snapshot, edge).pops += 1;
    }

    /// Record a delivery and fold its lead time into the accumulator
    pub(crate) fn record_delivered(&self, lead_time: Duration) {
        let mut snapshot = self.inner.lock();
        snapshot.delivered += 1;
        snapshot.total_lead_time += lead_time;
    }

    /// Record a submit that was turned away by backpressure or closure
    pub(crate) fn record_submit_timeout(&self) {
        self.inner.lock().submit_timeouts += 1;
    }

    /// Record the worker counts actually spawned at start
    pub(crate) fn record_workers(&self, prepare: usize, pack: usize, deliver: usize) {
        let mut snapshot = self.inner.lock();
        snapshot.prepare_workers = prepare;
        snapshot.pack_workers = pack;
        snapshot.deliver_workers = deliver;
    }

    /// Take a consistent snapshot of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().clone()
    }
}
