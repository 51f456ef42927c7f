//! ScaleBlock: multiplies a double by a constant factor.

use crate::block::{Block, IterationContext};
use crate::error::{BlockError, Result};
use crate::property::{Direction, PropertyContainer};

pub struct ScaleBlock {
    factor: f64,
}

impl ScaleBlock {
    /// `factor` is the default of the `factor` input; `--factor=` overrides it.
    pub fn new(factor: f64) -> Self {
        Self { factor }
    }
}

impl Block for ScaleBlock {
    fn declare(&mut self, container: &PropertyContainer) -> Result<()> {
        container.add_property("in", Direction::Input, 0.0f64, "Value to scale")?;
        container.add_ranged_property(
            "factor",
            Direction::Input,
            self.factor,
            -1.0e6,
            1.0e6,
            "Multiplier",
        )?;
        container.add_property("out", Direction::Output, 0.0f64, "Scaled value")
    }

    fn iterate(&mut self, ctx: &mut IterationContext<'_>) -> std::result::Result<(), BlockError> {
        let input: f64 = ctx.get("in")?;
        let factor: f64 = ctx.get("factor")?;
        if !input.is_finite() {
            return Err(BlockError::failed(format!("non-finite input {}", input)));
        }
        ctx.time_flag("read");
        ctx.set("out", input * factor)
    }
}
