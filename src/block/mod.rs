//! Processing blocks.
//!
//! A block is user code implementing [`Block`], attached to a
//! [`PropertyContainer`] through an [`ExecutionUnit`]. The unit owns the
//! lifecycle state machine; the worker thread drives the iterate loop:
//!
//! 1. Deliver queued triggers.
//! 2. Read linked inputs (synchronous receives).
//! 3. Run [`Block::iterate`].
//! 4. Write outputs (asynchronous pushes, synchronous sends).
//! 5. Publish [`BlockEvent::IterationEnded`] and bump the counter.
//!
//! Blocks joined by sequential links share the thread of their group
//! master and advance in lock-step with it.

pub mod stats;
pub mod unit;
pub(crate) mod worker;

pub use stats::{FlagTiming, IterationStats};
pub use unit::ExecutionUnit;

use crate::error::{BlockError, Result};
use crate::notify::Subscription;
use crate::property::id::ContainerId;
use crate::property::PropertyContainer;
use crate::types::PropertyData;
use serde::{Deserialize, Serialize};
use stats::FlagRecorder;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

/// Hidden input limiting how many iterations a block runs; -1 is unlimited
pub const MAX_ITERATIONS_PROPERTY: &str = "max block iterations";

/// Output carrying the duration of the last iteration in ms
pub const ITERATION_TIME_PROPERTY: &str = "iteration time";

/// Hidden input switching iteration statistics on or off
pub const STATS_ENABLED_PROPERTY: &str = "stats enabled";

/// Hidden input: log the statistics every N iterations, 0 never
pub const STATS_PRINTING_PROPERTY: &str = "stats printing frequency";

/// Output carrying the block's [`IterationStats`]
pub const STATS_PROPERTY: &str = "iteration stats";

/// Lifecycle state of an execution unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockStatus {
    Stopped,
    Running,
    RunningOneStep,
    Paused,
    Finished,
}

/// Events published by an execution unit
#[derive(Debug, Clone, PartialEq)]
pub enum BlockEvent {
    StatusChanged {
        block: ContainerId,
        status: BlockStatus,
    },
    IterationStarted {
        block: ContainerId,
        iteration: u64,
    },
    IterationEnded {
        block: ContainerId,
        iteration: u64,
    },
    /// The block will not iterate again. `error` is set when it failed.
    Finished {
        block: ContainerId,
        error: Option<String>,
    },
}

/// Per-iteration view handed to [`Block::iterate`]
pub struct IterationContext<'a> {
    container: &'a PropertyContainer,
    iteration: u64,
    flags: FlagRecorder,
}

impl<'a> IterationContext<'a> {
    pub(crate) fn new(container: &'a PropertyContainer, iteration: u64) -> Self {
        Self {
            container,
            iteration,
            flags: FlagRecorder::start(),
        }
    }

    pub fn container(&self) -> &PropertyContainer {
        self.container
    }

    /// Zero-based index of this iteration
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Read a property of the running block
    pub fn get<T: PropertyData>(&self, name: &str) -> std::result::Result<T, BlockError> {
        Ok(self.container.property_value(name)?)
    }

    /// Write a property of the running block
    pub fn set<T: PropertyData>(&self, name: &str, value: T) -> std::result::Result<(), BlockError> {
        Ok(self.container.set_property_value(name, value)?)
    }

    /// Mark the end of a named section of this iteration
    pub fn time_flag(&mut self, name: &str) {
        self.flags.mark(name);
    }

    pub(crate) fn into_timing(self) -> (Duration, Vec<(String, Duration)>) {
        self.flags.finish()
    }
}

/// Behaviour of a processing block.
///
/// Only `iterate` is required. Hooks run on the block's worker thread.
pub trait Block: Send + 'static {
    /// Add the block's properties to its container
    fn declare(&mut self, container: &PropertyContainer) -> Result<()>;

    /// One unit of work: read inputs, compute, set outputs
    fn iterate(&mut self, ctx: &mut IterationContext<'_>) -> std::result::Result<(), BlockError>;

    /// Called once on the worker thread before the first iteration
    fn on_start(&mut self, _container: &PropertyContainer) -> std::result::Result<(), BlockError> {
        Ok(())
    }

    /// Called once on the worker thread after the last iteration
    fn on_finish(&mut self, _container: &PropertyContainer) {}

    /// A trigger sent with [`ExecutionUnit::send_trigger`]
    fn process_trigger(&mut self, _name: &str, _container: &PropertyContainer) {}
}

/// A container with an attached execution unit
#[derive(Clone)]
pub struct BlockHandle {
    container: PropertyContainer,
    unit: Arc<ExecutionUnit>,
}

impl std::fmt::Debug for BlockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockHandle")
            .field("id", &self.container.id())
            .field("status", &self.unit.status())
            .finish()
    }
}

impl Deref for BlockHandle {
    type Target = PropertyContainer;

    fn deref(&self) -> &PropertyContainer {
        &self.container
    }
}

impl BlockHandle {
    /// Attach `block` to `container`, letting it declare its properties.
    pub fn attach(container: PropertyContainer, block: impl Block) -> Result<Self> {
        let unit = ExecutionUnit::attach(&container, Box::new(block))?;
        Ok(Self { container, unit })
    }

    pub fn container(&self) -> &PropertyContainer {
        &self.container
    }

    pub fn unit(&self) -> &Arc<ExecutionUnit> {
        &self.unit
    }

    pub fn start(&self) -> Result<()> {
        self.unit.start()
    }

    pub fn pause(&self) -> Result<()> {
        self.unit.pause()
    }

    pub fn unpause(&self) -> Result<()> {
        self.unit.unpause()
    }

    pub fn step(&self) -> Result<()> {
        self.unit.step()
    }

    pub fn stop(&self) -> Result<()> {
        self.unit.stop()
    }

    pub fn finish(&self) {
        self.unit.finish()
    }

    pub fn wait(&self) {
        self.unit.wait()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.unit.wait_timeout(timeout)
    }

    pub fn status(&self) -> BlockStatus {
        self.unit.status()
    }

    pub fn iteration(&self) -> u64 {
        self.unit.iteration()
    }

    pub fn last_error(&self) -> Option<BlockError> {
        self.unit.last_error()
    }

    pub fn is_sequential_group_master(&self) -> bool {
        self.unit.is_sequential_group_master()
    }

    pub fn subscribe_events(&self) -> Subscription<BlockEvent> {
        self.unit.subscribe()
    }
}
