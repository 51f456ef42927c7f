//! Test blocks and builders for wiring small programs

use blockflow::block::MAX_ITERATIONS_PROPERTY;
use blockflow::blocks::{Collected, CollectorBlock, CounterBlock};
use blockflow::{
    Block, BlockError, BlockHandle, Direction, ExecutionUnit, IterationContext, PropertyContainer,
    RuntimeContext,
};
use std::sync::{Arc, Mutex};

/// Attach a counter that stops after `limit` iterations (-1 runs forever)
pub fn counter(ctx: &Arc<RuntimeContext>, name: &str, limit: i32) -> BlockHandle {
    let block = BlockHandle::attach(PropertyContainer::new(ctx, name), CounterBlock::new()).unwrap();
    block
        .set_property_value(MAX_ITERATIONS_PROPERTY, limit)
        .unwrap();
    block
}

/// Attach an Int collector that stops after `limit` iterations
pub fn collector(ctx: &Arc<RuntimeContext>, name: &str, limit: i32) -> (BlockHandle, Collected) {
    let (block, collected) = CollectorBlock::new(0i32);
    let block = BlockHandle::attach(PropertyContainer::new(ctx, name), block).unwrap();
    block
        .set_property_value(MAX_ITERATIONS_PROPERTY, limit)
        .unwrap();
    (block, collected)
}

/// Records the name of the thread each iteration runs on
#[derive(Default)]
pub struct ThreadRecorder {
    pub threads: Arc<Mutex<Vec<String>>>,
}

impl Block for ThreadRecorder {
    fn declare(&mut self, container: &PropertyContainer) -> blockflow::Result<()> {
        container.add_property("in", Direction::Input, 0i32, "")
    }

    fn iterate(&mut self, _ctx: &mut IterationContext<'_>) -> Result<(), BlockError> {
        let name = std::thread::current()
            .name()
            .unwrap_or("unnamed")
            .to_string();
        self.threads.lock().unwrap().push(name);
        Ok(())
    }
}

/// Fails on iteration `fail_at`, by panic or by error
pub struct Faulty {
    pub fail_at: u64,
    pub panic: bool,
}

impl Block for Faulty {
    fn declare(&mut self, container: &PropertyContainer) -> blockflow::Result<()> {
        container.add_property("out", Direction::Output, 0i32, "")
    }

    fn iterate(&mut self, ctx: &mut IterationContext<'_>) -> Result<(), BlockError> {
        if ctx.iteration() == self.fail_at {
            if self.panic {
                panic!("sensor disconnected");
            }
            return Err(BlockError::failed("sensor disconnected"));
        }
        ctx.set("out", ctx.iteration() as i32)
    }
}

/// One observation of a group member: its own iteration, the iteration
/// counter of `upstream` at that moment and the value read from `in`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pace {
    pub own: u64,
    pub upstream: u64,
    pub input: i32,
}

/// Records how far an upstream unit has advanced at every iteration
pub struct PaceRecorder {
    pub upstream: Arc<ExecutionUnit>,
    pub seen: Arc<Mutex<Vec<Pace>>>,
}

impl PaceRecorder {
    pub fn new(upstream: &BlockHandle) -> Self {
        Self {
            upstream: Arc::clone(upstream.unit()),
            seen: Arc::default(),
        }
    }
}

impl Block for PaceRecorder {
    fn declare(&mut self, container: &PropertyContainer) -> blockflow::Result<()> {
        container.add_property("in", Direction::Input, 0i32, "")
    }

    fn iterate(&mut self, ctx: &mut IterationContext<'_>) -> Result<(), BlockError> {
        let pace = Pace {
            own: ctx.iteration(),
            upstream: self.upstream.iteration(),
            input: ctx.get("in")?,
        };
        self.seen.lock().unwrap().push(pace);
        Ok(())
    }
}
