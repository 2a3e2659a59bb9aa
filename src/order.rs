use std::time::{Duration, Instant};

use crate::error::{PipelineError, Result};

/// Unique identifier of an order
pub type OrderId = u64;

/// Lifecycle status of an order as it moves through the stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    /// Accepted into the pipeline, not yet processed
    Accepted,
    /// Prepared by the first stage
    Prepared,
    /// Packed by the second stage
    Packed,
    /// Delivered by the terminal stage
    Delivered,
    /// Rejected before delivery; terminal
    Canceled,
}

/// An order flowing through the pipeline.
///
/// Status only advances along Accepted -> Prepared -> Packed -> Delivered,
/// stamping one timestamp per step. Canceled is reachable from any
/// non-delivered status and stamps nothing.
#[derive(Debug, Clone)]
pub struct Order {
    id: OrderId,
    status: OrderStatus,
    accepted_at: Instant,
    prepared_at: Option<Instant>,
    packed_at: Option<Instant>,
    delivered_at: Option<Instant>,
}

impl Order {
    /// Create a new order in the Accepted state, stamping the acceptance time
    pub fn new(id: OrderId) -> Self {
        Self {
            id,
            status: OrderStatus::Accepted,
            accepted_at: Instant::now(),
            prepared_at: None,
            packed_at: None,
            delivered_at: None,
        }
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn accepted_at(&self) -> Instant {
        self.accepted_at
    }

    pub fn prepared_at(&self) -> Option<Instant> {
        self.prepared_at
    }

    pub fn packed_at(&self) -> Option<Instant> {
        self.packed_at
    }

    pub fn delivered_at(&self) -> Option<Instant> {
        self.delivered_at
    }

    /// Advance to the next status, stamping its timestamp.
    ///
    /// Returns `InvalidTransition` and leaves the order unchanged for any
    /// step that is not the immediate successor, or Canceled from a state
    /// that still admits it.
    pub fn advance_to(&mut self, next: OrderStatus) -> Result<()> {
        use OrderStatus::*;

        let legal = matches!(
            (self.status, next),
            (Accepted, Prepared) | (Prepared, Packed) | (Packed, Delivered)
        ) || (next == Canceled && !matches!(self.status, Delivered | Canceled));

        if !legal {
            return Err(PipelineError::InvalidTransition { from: self.status, to: next });
        }

        let now = Instant::now();
        match next {
            Prepared => self.prepared_at = Some(now),
            Packed => self.packed_at = Some(now),
            Delivered => self.delivered_at = Some(now),
            Accepted | Canceled => {}
        }
        self.status = next;
        Ok(())
    }

    /// Time between acceptance and delivery, if the order was delivered
    pub fn lead_time(&self) -> Option<Duration> {
        self.delivered_at.map(|at| at.duration_since(self.accepted_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_chain_stamps_monotonic_timestamps() {
        let mut order = Order::new(7);
        assert_eq!(order.status(), OrderStatus::Accepted);

        order.advance_to(OrderStatus::Prepared).unwrap();
        order.advance_to(OrderStatus::Packed).unwrap();
        order.advance_to(OrderStatus::Delivered).unwrap();

        assert_eq!(order.status(), OrderStatus::Delivered);
        let prepared = order.prepared_at().unwrap();
        let packed = order.packed_at().unwrap();
        let delivered = order.delivered_at().unwrap();
        assert!(order.accepted_at() <= prepared);
        assert!(prepared <= packed);
        assert!(packed <= delivered);
    }

    #[test]
    fn test_skipping_a_step_fails_and_leaves_order_unchanged() {
        let mut order = Order::new(1);

        let err = order.advance_to(OrderStatus::Delivered).unwrap_err();
        assert_eq!(
            err,
            PipelineError::InvalidTransition {
                from: OrderStatus::Accepted,
                to: OrderStatus::Delivered,
            }
        );
        assert_eq!(order.status(), OrderStatus::Accepted);
        assert!(order.prepared_at().is_none());
        assert!(order.delivered_at().is_none());
    }

    #[test]
    fn test_going_backwards_fails() {
        let mut order = Order::new(1);
        order.advance_to(OrderStatus::Prepared).unwrap();
        assert!(order.advance_to(OrderStatus::Accepted).is_err());
        assert_eq!(order.status(), OrderStatus::Prepared);
    }

    #[test]
    fn test_cancel_is_legal_until_delivered() {
        let mut order = Order::new(2);
        order.advance_to(OrderStatus::Prepared).unwrap();
        order.advance_to(OrderStatus::Packed).unwrap();
        order.advance_to(OrderStatus::Canceled).unwrap();
        assert_eq!(order.status(), OrderStatus::Canceled);

        let mut delivered = Order::new(3);
        delivered.advance_to(OrderStatus::Prepared).unwrap();
        delivered.advance_to(OrderStatus::Packed).unwrap();
        delivered.advance_to(OrderStatus::Delivered).unwrap();
        assert!(delivered.advance_to(OrderStatus::Canceled).is_err());
    }

    #[test]
    fn test_lead_time_requires_delivery() {
        let mut order = Order::new(4);
        assert!(order.lead_time().is_none());

        order.advance_to(OrderStatus::Prepared).unwrap();
        order.advance_to(OrderStatus::Packed).unwrap();
        order.advance_to(OrderStatus::Delivered).unwrap();

        let lead = order.lead_time().unwrap();
        assert_eq!(
            lead,
            order.delivered_at().unwrap().duration_since(order.accepted_at())
        );
    }
}
