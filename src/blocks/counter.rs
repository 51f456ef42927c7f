//! CounterBlock: emits a running count.

use crate::block::{Block, IterationContext};
use crate::error::{BlockError, Result};
use crate::property::{Direction, PropertyContainer};

/// Increments its `x` output by `step` every iteration, starting from 0.
#[derive(Debug, Default)]
pub struct CounterBlock {
    count: i32,
}

impl CounterBlock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Block for CounterBlock {
    fn declare(&mut self, container: &PropertyContainer) -> Result<()> {
        container.add_property("step", Direction::Input, 1i32, "Increment per iteration")?;
        container.add_property("x", Direction::Output, 0i32, "Current count")
    }

    fn iterate(&mut self, ctx: &mut IterationContext<'_>) -> std::result::Result<(), BlockError> {
        let step: i32 = ctx.get("step")?;
        self.count = self.count.wrapping_add(step);
        ctx.set("x", self.count)
    }

    fn process_trigger(&mut self, name: &str, container: &PropertyContainer) {
        if name == "reset" {
            self.count = 0;
            if let Err(e) = container.set_property_value("x", 0i32) {
                tracing::warn!("Counter reset of '{}' failed: {}", container.name(), e);
            }
        }
    }
}
