use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{PipelineError, Result};
use crate::metrics::Edge;
use crate::order::{Order, OrderStatus};
use crate::pipeline::PipelineCore;
use crate::queue::PopError;

/// Per-order work applied by a stage after the status transition
pub(crate) type StageFn = Arc<dyn Fn(&mut Order) -> Result<()> + Send + Sync>;

pub(crate) fn identity_stage() -> StageFn {
    Arc::new(|_| Ok(()))
}

/// The loop executed by one worker thread of one stage.
///
/// Workers pop from the stage input with a timeout so the cancel flag is
/// re-checked periodically, advance the order to the stage target status,
/// run the stage transform and hand the order downstream. The last worker
/// of a stage to exit closes the downstream edge exactly once.
pub(crate) struct StageRunner {
    core: Arc<PipelineCore>,
    name: &'static str,
    target: OrderStatus,
    input: Edge,
    output: Option<Edge>,
    pop_timeout: Duration,
    live: Arc<AtomicUsize>,
    transform: StageFn,
}

impl StageRunner {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        core: Arc<PipelineCore>,
        name: &'static str,
        target: OrderStatus,
        input: Edge,
        output: Option<Edge>,
        pop_timeout: Duration,
        live: Arc<AtomicUsize>,
        transform: StageFn,
    ) -> Self {
        Self { core, name, target, input, output, pop_timeout, live, transform }
    }

    pub(crate) fn run(self) {
        loop {
            if self.core.cancel_requested() {
                break;
            }
            let mut order = match self.core.queue(self.input).pop_timeout(self.pop_timeout) {
                Ok(order) => order,
                Err(PopError::Timeout) => continue,
                Err(PopError::Closed) => break,
            };
            self.core.metrics.record_pop(self.input);

            if let Err(error) = self.process(&mut order) {
                self.core.fail(error);
                continue;
            }

            match self.output {
                Some(edge) => {
                    let queue = self.core.queue(edge);
                    // a failed push means forced cancel closed the edge;
                    // the order is dropped and not counted as produced
                    if queue.push(order).is_ok() {
                        self.core.metrics.record_push(edge, queue.len());
                    }
                }
                None => {
                    let lead_time = order.lead_time().unwrap_or_default();
                    self.core.delivered.lock().push(order);
                    self.core.metrics.record_delivered(lead_time);
                }
            }
        }

        // last worker out closes the downstream edge, exactly once
        if self.live.fetch_sub(1, Ordering::AcqRel) == 1 {
            if let Some(edge) = self.output {
                log::debug!("{} stage finished, closing downstream queue", self.name);
                self.core.queue(edge).close();
            }
        }
    }

    /// Advance the order and apply the transform. Any failure, including a
    /// panic in the transform, is contained here and reported as a fault.
    fn process(&self, order: &mut Order) -> Result<()> {
        order.advance_to(self.target)?;
        match catch_unwind(AssertUnwindSafe(|| (self.transform)(order))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => Err(PipelineError::WorkerFault {
                stage: self.name,
                message: error.to_string(),
            }),
            Err(_) => Err(PipelineError::WorkerFault {
                stage: self.name,
                message: "stage transform panicked".to_string(),
            }),
        }
    }
}
