//! Built-in blocks used by the demo binary and the test suites.

mod collector;
mod counter;
mod scale;

pub use collector::{Collected, CollectorBlock};
pub use counter::CounterBlock;
pub use scale::ScaleBlock;
