//! CollectorBlock: records what arrives on its input.

use crate::block::{Block, IterationContext};
use crate::error::{BlockError, Result};
use crate::property::{Direction, PropertyContainer, PropertyFlags};
use crate::sync::lock;
use crate::types::{PropertyData, Value};
use std::sync::{Arc, Mutex};

/// Values observed by a [`CollectorBlock`], readable from any thread
#[derive(Debug, Clone, Default)]
pub struct Collected {
    values: Arc<Mutex<Vec<Value>>>,
}

impl Collected {
    pub fn values(&self) -> Vec<Value> {
        lock(&self.values).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.values).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.values).is_empty()
    }

    pub fn last(&self) -> Option<Value> {
        lock(&self.values).last().cloned()
    }

    fn push(&self, value: Value) {
        lock(&self.values).push(value);
    }
}

/// Appends the value of its `in` input to a [`Collected`] list every
/// iteration.
pub struct CollectorBlock {
    initial: Option<Value>,
    collected: Collected,
}

impl CollectorBlock {
    /// The `in` input takes the type and default of `initial`.
    pub fn new<T: PropertyData>(initial: T) -> (Self, Collected) {
        let collected = Collected::default();
        (
            Self {
                initial: Some(initial.into_value()),
                collected: collected.clone(),
            },
            collected,
        )
    }
}

impl Block for CollectorBlock {
    fn declare(&mut self, container: &PropertyContainer) -> Result<()> {
        let initial = self.initial.take().unwrap_or(Value::Int(0));
        container.insert_property(
            "in",
            Direction::Input,
            PropertyFlags::NONE,
            initial,
            None,
            "Value to record",
            true,
        )
    }

    fn iterate(&mut self, ctx: &mut IterationContext<'_>) -> std::result::Result<(), BlockError> {
        let value = ctx.container().property_value_raw("in")?;
        tracing::trace!("Collector '{}' observed {}", ctx.container().name(), value);
        self.collected.push(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RuntimeContext;

    #[test]
    fn test_collector_records_each_iteration() {
        let ctx = RuntimeContext::standalone();
        let container = PropertyContainer::new(&ctx, "sink");
        let (mut block, collected) = CollectorBlock::new(0.0f64);
        block.declare(&container).unwrap();

        for (i, v) in [1.5f64, 2.5].into_iter().enumerate() {
            container.set_property_value("in", v).unwrap();
            let mut it = IterationContext::new(&container, i as u64);
            block.iterate(&mut it).unwrap();
        }
        assert_eq!(collected.values(), vec![Value::Double(1.5), Value::Double(2.5)]);
    }
}
