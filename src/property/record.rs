//! Property records held by a container.
//!
//! A record is the per-name slot of a container: its kind and direction are
//! fixed at creation, the value and link flags change over its lifetime.

use crate::types::{Value, ValueKind};
use serde::{Deserialize, Serialize};

/// Whether a property is read by its container or produced by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Input,
    Output,
}

/// Presentation and linking flags of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PropertyFlags {
    /// Hidden from parameter inspectors.
    pub gui_invisible: bool,
    /// Runtime bookkeeping; never auto-linked by name.
    pub internal: bool,
}

impl PropertyFlags {
    pub const NONE: PropertyFlags = PropertyFlags {
        gui_invisible: false,
        internal: false,
    };

    pub const HIDDEN_INTERNAL: PropertyFlags = PropertyFlags {
        gui_invisible: true,
        internal: true,
    };
}

/// Inclusive numeric range of a property.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Property {
    pub(crate) kind: ValueKind,
    pub(crate) direction: Direction,
    pub(crate) flags: PropertyFlags,
    pub(crate) value: Value,
    pub(crate) range: Option<Range>,
    pub(crate) info: String,
    pub(crate) linked_input: bool,
    pub(crate) linked_output: bool,
}

impl Property {
    pub(crate) fn new(direction: Direction, flags: PropertyFlags, value: Value, info: String) -> Self {
        Self {
            kind: value.kind(),
            direction,
            flags,
            value,
            range: None,
            info,
            linked_input: false,
            linked_output: false,
        }
    }

    pub(crate) fn is_input(&self) -> bool {
        self.direction == Direction::Input
    }

    pub(crate) fn is_output(&self) -> bool {
        self.direction == Direction::Output
    }

    /// Usage line for `--help`, or `None` when the kind cannot be given on
    /// the command line.
    pub(crate) fn usage(&self, name: &str) -> Option<String> {
        let head = format!("  --{}=", name);
        let shape = match (&self.value, self.range) {
            (Value::Text(v), _) => format!("[text] (def. '{}') ", v),
            (Value::Bool(v), _) => format!("[true,false] (def. {}) ", v),
            (Value::Int(v), Some(r)) => format!("[{}...{}] (def. {}) ", r.min, r.max, v),
            (Value::Int(v), None) => format!("[int] (def. {}) ", v),
            (Value::Double(v), Some(r)) => format!("[{}...{}] (def. {}) ", r.min, r.max, v),
            (Value::Double(v), None) => format!("[double] (def. {}) ", v),
            _ => return None,
        };
        let line = format!("{}{}", head, shape);
        let pad = 100usize.saturating_sub(line.len());
        Some(format!("{}{:.>width$}.", line, self.info, width = pad))
    }
}
