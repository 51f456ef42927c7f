//! Execution unit: the lifecycle state machine of one block.
//!
//! State lives behind a `Mutex` with a `Condvar` that wakes both the worker
//! (paused loop, paced sleeps) and joiners. Control calls go to the group
//! master, which mirrors every status change onto its slaves.

use super::worker::{self, Member};
use super::{
    Block, BlockEvent, BlockStatus, IterationStats, ITERATION_TIME_PROPERTY,
    MAX_ITERATIONS_PROPERTY, STATS_ENABLED_PROPERTY, STATS_PRINTING_PROPERTY, STATS_PROPERTY,
};
use crate::error::{BlockError, BlockFlowError, Result};
use crate::link::groups;
use crate::notify::{Notifier, Subscription};
use crate::property::id::ContainerId;
use crate::property::{ContainerInner, Direction, PropertyContainer, PropertyFlags};
use crate::sync::{lock, wait, wait_timeout};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// What a worker thread reports when it returns
#[derive(Debug)]
pub(crate) struct ThreadExit {
    pub(crate) master: ContainerId,
    pub(crate) failures: Vec<(ContainerId, BlockError)>,
}

pub(crate) type ExitHook = Box<dyn FnOnce(ThreadExit) + Send>;

struct UnitState {
    status: BlockStatus,
    iteration: u64,
    /// Set once the unit joined a running group, as master or slave
    started: bool,
    owns_thread: bool,
    thread_exited: bool,
    thread: Option<JoinHandle<()>>,
    /// Set on slaves while their group runs
    master: Option<Weak<ExecutionUnit>>,
    slaves: Vec<Arc<ExecutionUnit>>,
    last_error: Option<BlockError>,
    minimum_delay: Duration,
    triggers: Vec<String>,
    stats: IterationStats,
}

/// Execution bookkeeping attached to a block's container
pub struct ExecutionUnit {
    id: ContainerId,
    container: Weak<ContainerInner>,
    state: Mutex<UnitState>,
    cond: Condvar,
    finish_requested: AtomicBool,
    /// The block body while no thread runs it
    block: Mutex<Option<Box<dyn Block>>>,
    events: Notifier<BlockEvent>,
    trigger_tx: Sender<String>,
    trigger_rx: Receiver<String>,
    exit_hook: Mutex<Option<ExitHook>>,
}

impl std::fmt::Debug for ExecutionUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionUnit")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish()
    }
}

impl ExecutionUnit {
    /// Declare the runtime and block properties on `container` and attach a
    /// new unit to it.
    pub(crate) fn attach(container: &PropertyContainer, mut block: Box<dyn Block>) -> Result<Arc<Self>> {
        container.add_property_with_flags(
            MAX_ITERATIONS_PROPERTY,
            Direction::Input,
            -1i32,
            "Iterations before the block finishes, -1 runs forever",
            PropertyFlags::HIDDEN_INTERNAL,
        )?;
        container.add_property_with_flags(
            ITERATION_TIME_PROPERTY,
            Direction::Output,
            0.0f64,
            "Duration of the last iteration in ms",
            PropertyFlags {
                gui_invisible: false,
                internal: true,
            },
        )?;
        container.add_property_with_flags(
            STATS_ENABLED_PROPERTY,
            Direction::Input,
            true,
            "Iteration statistics are enabled/disabled",
            PropertyFlags::HIDDEN_INTERNAL,
        )?;
        container.add_property_with_flags(
            STATS_PRINTING_PROPERTY,
            Direction::Input,
            0i32,
            "Log the iteration statistics every N iterations, 0 never",
            PropertyFlags::HIDDEN_INTERNAL,
        )?;
        container.add_property_with_flags(
            STATS_PROPERTY,
            Direction::Output,
            IterationStats::default(),
            "Iteration time statistics",
            PropertyFlags {
                gui_invisible: false,
                internal: true,
            },
        )?;
        block.declare(container)?;

        let (trigger_tx, trigger_rx) = unbounded();
        let unit = Arc::new(Self {
            id: container.id(),
            container: Arc::downgrade(&container.inner),
            state: Mutex::new(UnitState {
                status: BlockStatus::Stopped,
                iteration: 0,
                started: false,
                owns_thread: false,
                thread_exited: false,
                thread: None,
                master: None,
                slaves: Vec::new(),
                last_error: None,
                minimum_delay: Duration::ZERO,
                triggers: Vec::new(),
                stats: IterationStats::default(),
            }),
            cond: Condvar::new(),
            finish_requested: AtomicBool::new(false),
            block: Mutex::new(Some(block)),
            events: Notifier::new(),
            trigger_tx,
            trigger_rx,
            exit_hook: Mutex::new(None),
        });
        container.attach_execution_unit(Arc::clone(&unit))?;
        Ok(unit)
    }

    pub fn id(&self) -> ContainerId {
        self.id
    }

    pub fn container(&self) -> Option<PropertyContainer> {
        self.container.upgrade().map(PropertyContainer::from_inner)
    }

    fn display_name(&self) -> String {
        self.container()
            .map(|c| c.name())
            .unwrap_or_else(|| self.id.to_string())
    }

    pub fn status(&self) -> BlockStatus {
        lock(&self.state).status
    }

    /// Number of completed iterations
    pub fn iteration(&self) -> u64 {
        lock(&self.state).iteration
    }

    pub fn last_error(&self) -> Option<BlockError> {
        lock(&self.state).last_error.clone()
    }

    pub fn stats(&self) -> IterationStats {
        lock(&self.state).stats.clone()
    }

    pub fn subscribe(&self) -> Subscription<BlockEvent> {
        self.events.subscribe()
    }

    pub(crate) fn is_started(&self) -> bool {
        lock(&self.state).started
    }

    pub(crate) fn is_finish_requested(&self) -> bool {
        self.finish_requested.load(Ordering::Acquire)
    }

    pub(crate) fn set_exit_hook(&self, hook: ExitHook) {
        *lock(&self.exit_hook) = Some(hook);
    }

    /// Whether this unit owns the thread of its sequential group
    pub fn is_sequential_group_master(&self) -> bool {
        let (started, has_master) = {
            let state = lock(&self.state);
            (state.started, state.master.is_some())
        };
        if started {
            return !has_master;
        }
        match self.container() {
            Some(container) => groups::group_master(&container) == self.id,
            None => true,
        }
    }

    /// Pace the loop to at least one pass per `delay`
    pub fn set_minimum_delay(&self, delay: Duration) {
        lock(&self.state).minimum_delay = delay;
    }

    pub fn minimum_delay(&self) -> Duration {
        lock(&self.state).minimum_delay
    }

    // ── Triggers ──

    /// Register a trigger name the GUI may send
    pub fn add_trigger(&self, name: impl Into<String>) {
        let name = name.into();
        let mut state = lock(&self.state);
        if !state.triggers.contains(&name) {
            state.triggers.push(name);
        }
    }

    pub fn triggers(&self) -> Vec<String> {
        lock(&self.state).triggers.clone()
    }

    /// Queue a trigger for delivery on the block's thread
    pub fn send_trigger(&self, name: &str) -> Result<()> {
        if !lock(&self.state).triggers.iter().any(|t| t == name) {
            return Err(BlockFlowError::NotFound(format!(
                "trigger '{}' of block {}",
                name, self.id
            )));
        }
        self.trigger_tx
            .send(name.to_string())
            .map_err(|_| BlockFlowError::InvalidOperation("trigger queue closed".to_string()))
    }

    pub(crate) fn pending_triggers(&self) -> Vec<String> {
        self.trigger_rx.try_iter().collect()
    }

    // ── Control ──

    /// Start the group this unit masters on a new thread.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let container = self.container().ok_or_else(|| {
            BlockFlowError::InvalidOperation(format!("container of block {} was dropped", self.id))
        })?;
        {
            let state = lock(&self.state);
            if state.started || state.status == BlockStatus::Finished {
                return Err(BlockFlowError::InvalidOperation(format!(
                    "block '{}' was already started",
                    container.name()
                )));
            }
        }

        let group = groups::sequential_component(&container);
        let master_id = group.first().map(|c| c.id()).unwrap_or(self.id);
        if master_id != self.id {
            return Err(BlockFlowError::InvalidOperation(format!(
                "block '{}' runs on the thread of its sequential group master {}",
                container.name(),
                master_id
            )));
        }

        let ordered = groups::execution_order(&group);
        let mut units = Vec::with_capacity(ordered.len());
        for member in &ordered {
            let unit = member.execution_unit().ok_or_else(|| {
                BlockFlowError::Discipline(format!(
                    "'{}' is in a sequential group but is not a block",
                    member.name()
                ))
            })?;
            if unit.is_started() || unit.status() == BlockStatus::Finished {
                return Err(BlockFlowError::InvalidOperation(format!(
                    "group member '{}' was already started",
                    member.name()
                )));
            }
            units.push(unit);
        }

        let mut members: Vec<Member> = Vec::with_capacity(units.len());
        for (member, unit) in ordered.into_iter().zip(units) {
            let taken = lock(&unit.block).take();
            match taken {
                Some(block) => members.push(Member::new(unit, member, block)),
                None => {
                    for m in members {
                        m.restore();
                    }
                    return Err(BlockFlowError::InvalidOperation(format!(
                        "block body of '{}' is missing",
                        member.name()
                    )));
                }
            }
        }

        for member in &members {
            let is_master = Arc::ptr_eq(&member.unit, self);
            {
                let mut state = lock(&member.unit.state);
                state.started = true;
                state.status = BlockStatus::Running;
                if !is_master {
                    state.master = Some(Arc::downgrade(self));
                }
            }
            member.unit.publish_status(BlockStatus::Running);
        }
        {
            let mut state = lock(&self.state);
            state.slaves = members
                .iter()
                .filter(|m| !Arc::ptr_eq(&m.unit, self))
                .map(|m| Arc::clone(&m.unit))
                .collect();
            state.owns_thread = true;
        }

        let count = members.len();
        let master = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("block-{}", container.name()))
            .spawn(move || worker::run(master, members));
        match spawned {
            Ok(handle) => {
                lock(&self.state).thread = Some(handle);
                tracing::info!(
                    "Started block '{}' with {} group member(s)",
                    container.name(),
                    count
                );
                Ok(())
            }
            Err(e) => {
                {
                    let mut state = lock(&self.state);
                    state.thread_exited = true;
                    state.status = BlockStatus::Finished;
                }
                self.finish_requested.store(true, Ordering::Release);
                Err(BlockFlowError::Io(e))
            }
        }
    }

    pub fn pause(&self) -> Result<()> {
        self.transition(
            "pause",
            &[BlockStatus::Running, BlockStatus::RunningOneStep],
            BlockStatus::Paused,
        )
    }

    pub fn unpause(&self) -> Result<()> {
        self.transition("unpause", &[BlockStatus::Paused], BlockStatus::Running)
    }

    /// Run exactly one more iteration, then pause again
    pub fn step(&self) -> Result<()> {
        self.transition("step", &[BlockStatus::Paused], BlockStatus::RunningOneStep)
    }

    /// Stop iterating. Linked inputs and outputs keep flowing.
    pub fn stop(&self) -> Result<()> {
        self.transition(
            "stop",
            &[
                BlockStatus::Running,
                BlockStatus::Paused,
                BlockStatus::RunningOneStep,
            ],
            BlockStatus::Stopped,
        )
    }

    /// Request termination. Observed at the next safe point of the loop.
    ///
    /// On a master this finishes the whole group; on a slave it retires the
    /// slave only. Idempotent.
    pub fn finish(&self) {
        self.finish_requested.store(true, Ordering::Release);
        let (changed, never_ran, slaves) = {
            let mut state = lock(&self.state);
            let changed = state.status != BlockStatus::Finished;
            state.status = BlockStatus::Finished;
            (changed, !state.started, state.slaves.clone())
        };
        self.cond.notify_all();
        if changed {
            self.publish_status(BlockStatus::Finished);
            if never_ran {
                self.events.publish(BlockEvent::Finished {
                    block: self.id,
                    error: None,
                });
            }
        }
        for slave in slaves {
            slave.finish();
        }
    }

    /// Block until the unit's thread returned. Returns at once for units that
    /// never owned a thread.
    pub fn wait(&self) {
        self.join(None);
    }

    /// Like [`wait`](Self::wait) with a bound; `false` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.join(Some(Instant::now() + timeout))
    }

    fn join(&self, deadline: Option<Instant>) -> bool {
        let handle = {
            let mut state = lock(&self.state);
            if !state.owns_thread {
                return true;
            }
            while !state.thread_exited {
                match deadline {
                    Some(deadline) => {
                        let now = Instant::now();
                        if now >= deadline {
                            return false;
                        }
                        state = wait_timeout(&self.cond, state, deadline - now);
                    }
                    None => state = wait(&self.cond, state),
                }
            }
            state.thread.take()
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::warn!("Worker thread of block {} panicked", self.id);
            }
        }
        true
    }

    fn ensure_master(&self, op: &str) -> Result<()> {
        let (started, has_master) = {
            let state = lock(&self.state);
            (state.started, state.master.is_some())
        };
        let slave = if started {
            has_master
        } else {
            self.container()
                .is_some_and(|c| groups::group_master(&c) != self.id)
        };
        if slave {
            return Err(BlockFlowError::InvalidOperation(format!(
                "cannot {} '{}': it is controlled by its sequential group master",
                op,
                self.display_name()
            )));
        }
        Ok(())
    }

    fn transition(&self, op: &str, from: &[BlockStatus], to: BlockStatus) -> Result<()> {
        self.ensure_master(op)?;
        let slaves = {
            let mut state = lock(&self.state);
            if !state.started || !from.contains(&state.status) {
                return Err(BlockFlowError::InvalidOperation(format!(
                    "cannot {} block {} while {:?}{}",
                    op,
                    self.id,
                    state.status,
                    if state.started { "" } else { " (not started)" }
                )));
            }
            state.status = to;
            state.slaves.clone()
        };
        self.cond.notify_all();
        self.publish_status(to);
        for slave in slaves {
            slave.mirror_status(to);
        }
        tracing::debug!("Block {} -> {:?}", self.id, to);
        Ok(())
    }

    fn mirror_status(&self, status: BlockStatus) {
        {
            let mut state = lock(&self.state);
            if state.status == BlockStatus::Finished {
                return;
            }
            state.status = status;
        }
        self.publish_status(status);
    }

    fn publish_status(&self, status: BlockStatus) {
        self.events.publish(BlockEvent::StatusChanged {
            block: self.id,
            status,
        });
    }

    // ── Worker side ──

    pub(crate) fn publish(&self, event: BlockEvent) {
        self.events.publish(event);
    }

    /// Park while paused; returns the status that ended the wait
    pub(crate) fn wait_runnable(&self) -> BlockStatus {
        let mut state = lock(&self.state);
        while state.status == BlockStatus::Paused && !self.is_finish_requested() {
            state = wait(&self.cond, state);
        }
        state.status
    }

    /// Sleep up to `duration`, waking early on finish
    pub(crate) fn sleep_unless_finished(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        let mut state = lock(&self.state);
        while !self.is_finish_requested() && state.status != BlockStatus::Finished {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            state = wait_timeout(&self.cond, state, deadline - now);
        }
    }

    /// RunningOneStep -> Paused after the stepped pass
    pub(crate) fn complete_step(&self) {
        let slaves = {
            let mut state = lock(&self.state);
            if state.status != BlockStatus::RunningOneStep {
                return;
            }
            state.status = BlockStatus::Paused;
            state.slaves.clone()
        };
        self.publish_status(BlockStatus::Paused);
        for slave in slaves {
            slave.mirror_status(BlockStatus::Paused);
        }
    }

    /// Bump the iteration counter, returning the new count
    pub(crate) fn advance_iteration(&self) -> u64 {
        let mut state = lock(&self.state);
        state.iteration += 1;
        state.iteration
    }

    /// Fold one iteration into the statistics and return the result
    pub(crate) fn record_timing(&self, total: Duration, marks: &[(String, Duration)]) -> IterationStats {
        let mut state = lock(&self.state);
        state.stats.record(total, marks);
        state.stats.clone()
    }

    /// Terminal transition of a group member on the worker thread
    pub(crate) fn mark_finished(&self, error: Option<BlockError>) {
        self.finish_requested.store(true, Ordering::Release);
        let changed = {
            let mut state = lock(&self.state);
            if let Some(error) = &error {
                state.last_error = Some(error.clone());
            }
            let changed = state.status != BlockStatus::Finished;
            state.status = BlockStatus::Finished;
            changed
        };
        self.cond.notify_all();
        if changed {
            self.publish_status(BlockStatus::Finished);
        }
        self.events.publish(BlockEvent::Finished {
            block: self.id,
            error: error.map(|e| e.to_string()),
        });
    }

    /// Hand a block body back when a start is rolled back
    pub(crate) fn return_block(&self, block: Box<dyn Block>) {
        *lock(&self.block) = Some(block);
    }

    /// Called last on the worker thread
    pub(crate) fn thread_exited(&self, failures: Vec<(ContainerId, BlockError)>) {
        let hook = lock(&self.exit_hook).take();
        if let Some(hook) = hook {
            hook(ThreadExit {
                master: self.id,
                failures,
            });
        }
        lock(&self.state).thread_exited = true;
        self.cond.notify_all();
    }
}
