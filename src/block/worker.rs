//! Worker thread of a sequential group.
//!
//! The thread belongs to the group master. Each loop pass parks while the
//! master is paused, then steps every live member in group order. A
//! stopped group keeps pumping linked inputs and outputs without calling
//! `iterate`, so its peers never stall on it.

use super::unit::ExecutionUnit;
use super::{
    Block, BlockEvent, BlockStatus, IterationContext, ITERATION_TIME_PROPERTY,
    MAX_ITERATIONS_PROPERTY, STATS_ENABLED_PROPERTY, STATS_PRINTING_PROPERTY, STATS_PROPERTY,
};
use crate::error::BlockError;
use crate::property::id::ContainerId;
use crate::property::{PropertyContainer, Propagation};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Extract a human-readable message from a panic payload.
fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        return (*msg).to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}

/// Run block code, turning a panic into a [`BlockError::Panicked`]
fn guarded<T>(f: impl FnOnce() -> Result<T, BlockError>) -> Result<T, BlockError> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(BlockError::Panicked(panic_message(payload))),
    }
}

enum StepOutcome {
    Done,
    Cancelled,
    Failed(BlockError),
}

/// A block running on a group thread
pub(crate) struct Member {
    pub(crate) unit: Arc<ExecutionUnit>,
    container: PropertyContainer,
    block: Box<dyn Block>,
    retired: bool,
}

impl Member {
    pub(crate) fn new(unit: Arc<ExecutionUnit>, container: PropertyContainer, block: Box<dyn Block>) -> Self {
        Self {
            unit,
            container,
            block,
            retired: false,
        }
    }

    /// Give the block body back to its unit
    pub(crate) fn restore(self) {
        self.unit.return_block(self.block);
    }

    fn id(&self) -> ContainerId {
        self.unit.id()
    }

    fn iteration_limit_reached(&self, iterations: u64) -> bool {
        let limit = self
            .container
            .property_value::<i32>(MAX_ITERATIONS_PROPERTY)
            .unwrap_or(-1);
        limit >= 0 && iterations >= limit as u64
    }

    fn stats_enabled(&self) -> bool {
        self.container
            .property_value::<bool>(STATS_ENABLED_PROPERTY)
            .unwrap_or(false)
    }

    fn publish_stats(&self, total: Duration, marks: &[(String, Duration)], completed: u64) {
        let stats = self.unit.record_timing(total, marks);
        let every = self
            .container
            .property_value::<i32>(STATS_PRINTING_PROPERTY)
            .unwrap_or(0);
        if every > 0 && completed % every as u64 == 0 {
            tracing::info!(
                "Block '{}' after {} iterations: last {:.3} ms, mean {:.3} ms, max {:.3} ms",
                self.container.name(),
                stats.iterations,
                stats.last_ms,
                stats.mean_ms,
                stats.max_ms
            );
        }
        if let Err(e) = self.container.set_property_value(STATS_PROPERTY, stats) {
            tracing::trace!("Statistics of block {} not published: {}", self.id(), e);
        }
    }

    fn step(&mut self, master: &ExecutionUnit, iterate: bool) -> StepOutcome {
        let unit = Arc::clone(&self.unit);
        let cancel = || unit.is_finish_requested() || master.is_finish_requested();

        for trigger in self.unit.pending_triggers() {
            let delivered = guarded(|| {
                self.block.process_trigger(&trigger, &self.container);
                Ok(())
            });
            if let Err(e) = delivered {
                return StepOutcome::Failed(e);
            }
        }

        if self.container.read_input_properties(&cancel) == Propagation::Cancelled {
            return StepOutcome::Cancelled;
        }

        let mut iteration = None;
        if iterate {
            let current = self.unit.iteration();
            if self.iteration_limit_reached(current) {
                self.unit.finish();
                return StepOutcome::Done;
            }

            self.unit.publish(BlockEvent::IterationStarted {
                block: self.id(),
                iteration: current,
            });
            let mut ctx = IterationContext::new(&self.container, current);
            if let Err(e) = guarded(|| self.block.iterate(&mut ctx)) {
                return StepOutcome::Failed(e);
            }

            let (total, marks) = ctx.into_timing();
            if let Err(e) = self
                .container
                .set_property_value(ITERATION_TIME_PROPERTY, total.as_secs_f64() * 1000.0)
            {
                tracing::trace!("Iteration time of block {} not recorded: {}", self.id(), e);
            }
            if self.stats_enabled() {
                self.publish_stats(total, &marks, current + 1);
            }
            iteration = Some(current);
        }

        if self.container.write_output_properties(&cancel) == Propagation::Cancelled {
            return StepOutcome::Cancelled;
        }

        if let Some(current) = iteration {
            self.unit.publish(BlockEvent::IterationEnded {
                block: self.id(),
                iteration: current,
            });
            let completed = self.unit.advance_iteration();
            if self.iteration_limit_reached(completed) {
                tracing::debug!("Block {} reached its iteration limit", self.id());
                self.unit.finish();
            }
        }
        StepOutcome::Done
    }

    /// Take the member out of the group: hook, unlink, terminal events
    fn retire(&mut self, error: Option<BlockError>) {
        if self.retired {
            return;
        }
        self.retired = true;
        let finished = guarded(|| {
            self.block.on_finish(&self.container);
            Ok(())
        });
        if let Err(e) = finished {
            tracing::warn!("on_finish of block {} failed: {}", self.id(), e);
        }
        self.container.unlink_all();
        self.unit.mark_finished(error);
    }
}

fn master_retired(members: &[Member], master: &Arc<ExecutionUnit>) -> bool {
    members
        .iter()
        .any(|m| m.retired && Arc::ptr_eq(&m.unit, master))
}

/// Thread body of a group master
pub(crate) fn run(master: Arc<ExecutionUnit>, mut members: Vec<Member>) {
    let Some(first) = members.first() else {
        master.thread_exited(Vec::new());
        return;
    };
    let name = first.container.name();
    let idle = first.container.context().config().idle_sleep();
    tracing::info!("Block thread '{}' started", name);

    let mut failures: Vec<(ContainerId, BlockError)> = Vec::new();

    for member in members.iter_mut() {
        let started = guarded(|| member.block.on_start(&member.container));
        if let Err(e) = started {
            tracing::error!("Block '{}' failed to start: {}", member.container.name(), e);
            failures.push((member.id(), e.clone()));
            member.retire(Some(e));
        }
    }

    loop {
        let status = master.wait_runnable();
        if status == BlockStatus::Finished || master.is_finish_requested() {
            break;
        }

        for member in members
            .iter_mut()
            .filter(|m| !m.retired && m.unit.is_finish_requested())
        {
            member.retire(None);
        }
        if master_retired(&members, &master) {
            break;
        }

        let iterate = matches!(status, BlockStatus::Running | BlockStatus::RunningOneStep);
        let pass_started = Instant::now();

        for member in members.iter_mut().filter(|m| !m.retired) {
            match member.step(&master, iterate) {
                StepOutcome::Done => {}
                StepOutcome::Cancelled => break,
                StepOutcome::Failed(error) => {
                    tracing::error!("Block '{}' failed: {}", member.container.name(), error);
                    failures.push((member.id(), error.clone()));
                    member.retire(Some(error));
                    if Arc::ptr_eq(&member.unit, &master) {
                        break;
                    }
                }
            }
        }
        if master_retired(&members, &master) {
            break;
        }

        if status == BlockStatus::RunningOneStep {
            master.complete_step();
        }

        let remaining = master.minimum_delay().saturating_sub(pass_started.elapsed());
        if !iterate {
            master.sleep_unless_finished(remaining.max(idle));
        } else if !remaining.is_zero() {
            master.sleep_unless_finished(remaining);
        }
    }

    for member in members.iter_mut() {
        member.retire(None);
    }
    tracing::info!("Block thread '{}' stopped", name);
    master.thread_exited(failures);
}
