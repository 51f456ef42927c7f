//! Identity types for containers and links.
//!
//! Ids are newtypes over `u32` handed out by a monotonic allocator owned by
//! the runtime context. An id is never handed out twice by the same
//! allocator, so a stale id held by a dialog or a link snapshot can never
//! alias a newer container.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Process-unique id of a property container.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContainerId(pub u32);

impl ContainerId {
    pub const INVALID: ContainerId = ContainerId(0);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Debug for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "ContainerId(INVALID)")
        } else {
            write!(f, "ContainerId({})", self.0)
        }
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Id of a link, unique within a runtime context.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkId(pub u32);

impl fmt::Debug for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LinkId({})", self.0)
    }
}

/// Monotonic id source. Starts at 1 so that `0` stays the invalid id.
#[derive(Debug)]
pub(crate) struct IdAllocator {
    next: AtomicU32,
}

impl IdAllocator {
    pub(crate) fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    pub(crate) fn next(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_id() {
        let id = ContainerId(42);
        assert!(id.is_valid());
        assert!(!ContainerId::INVALID.is_valid());
        assert!(ContainerId(3) < ContainerId(4));
    }

    #[test]
    fn test_allocator_never_repeats() {
        let ids = IdAllocator::new();
        let first = ids.next();
        let second = ids.next();
        assert_eq!(first, 1);
        assert!(second > first);
    }

    #[test]
    fn test_debug_format() {
        assert_eq!(format!("{:?}", ContainerId(7)), "ContainerId(7)");
        assert_eq!(format!("{:?}", ContainerId::INVALID), "ContainerId(INVALID)");
        assert_eq!(format!("{:?}", LinkId(2)), "LinkId(2)");
    }
}
