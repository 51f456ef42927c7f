//! One-slot blocking hand-off behind synchronous links.
//!
//! The slot is a `bounded(1)` channel: a send into a full slot waits until
//! the reader took the previous value, a receive from an empty slot waits
//! until the writer produced one. Waits run in short timeouts so the caller
//! can observe finish requests and link removal between them.

use crate::types::Value;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendOutcome {
    Sent,
    Cancelled,
    Unlinked,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ReceiveOutcome {
    Received(Value),
    Cancelled,
    Unlinked,
}

pub(crate) struct Handoff {
    tx: Sender<Value>,
    rx: Receiver<Value>,
}

impl Handoff {
    pub(crate) fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    pub(crate) fn send(
        &self,
        value: Value,
        poll: Duration,
        cancel: &dyn Fn() -> bool,
        removed: &AtomicBool,
    ) -> SendOutcome {
        let mut value = value;
        loop {
            if removed.load(Ordering::Acquire) {
                return SendOutcome::Unlinked;
            }
            match self.tx.send_timeout(value, poll) {
                Ok(()) => return SendOutcome::Sent,
                Err(SendTimeoutError::Timeout(back)) => {
                    if cancel() {
                        return SendOutcome::Cancelled;
                    }
                    value = back;
                }
                Err(SendTimeoutError::Disconnected(_)) => return SendOutcome::Unlinked,
            }
        }
    }

    /// Take a value nobody received yet
    pub(crate) fn take_pending(&self) -> Option<Value> {
        self.rx.try_recv().ok()
    }

    pub(crate) fn receive(
        &self,
        poll: Duration,
        cancel: &dyn Fn() -> bool,
        removed: &AtomicBool,
    ) -> ReceiveOutcome {
        loop {
            match self.rx.recv_timeout(poll) {
                Ok(value) => return ReceiveOutcome::Received(value),
                Err(RecvTimeoutError::Timeout) => {
                    if removed.load(Ordering::Acquire) {
                        // the last value sent before removal still counts
                        return match self.rx.try_recv() {
                            Ok(value) => ReceiveOutcome::Received(value),
                            Err(_) => ReceiveOutcome::Unlinked,
                        };
                    }
                    if cancel() {
                        return ReceiveOutcome::Cancelled;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return ReceiveOutcome::Unlinked,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const POLL: Duration = Duration::from_millis(5);

    fn never() -> bool {
        false
    }

    #[test]
    fn test_send_then_receive() {
        let handoff = Handoff::new();
        let removed = AtomicBool::new(false);
        assert_eq!(handoff.send(Value::Int(1), POLL, &never, &removed), SendOutcome::Sent);
        assert_eq!(
            handoff.receive(POLL, &never, &removed),
            ReceiveOutcome::Received(Value::Int(1))
        );
    }

    #[test]
    fn test_full_slot_blocks_until_cancelled() {
        let handoff = Handoff::new();
        let removed = AtomicBool::new(false);
        handoff.send(Value::Int(1), POLL, &never, &removed);
        let cancel = || true;
        assert_eq!(
            handoff.send(Value::Int(2), POLL, &cancel, &removed),
            SendOutcome::Cancelled
        );
    }

    #[test]
    fn test_removed_link_keeps_last_value() {
        let handoff = Handoff::new();
        let removed = AtomicBool::new(false);
        handoff.send(Value::Int(9), POLL, &never, &removed);
        removed.store(true, Ordering::Release);
        // the slot is drained before reporting the removal
        let outcome = handoff.receive(POLL, &never, &removed);
        assert_eq!(outcome, ReceiveOutcome::Received(Value::Int(9)));
        assert_eq!(handoff.receive(POLL, &never, &removed), ReceiveOutcome::Unlinked);
    }

    #[test]
    fn test_values_cross_threads_in_order() {
        let handoff = Arc::new(Handoff::new());
        let removed = Arc::new(AtomicBool::new(false));
        let writer = {
            let handoff = Arc::clone(&handoff);
            let removed = Arc::clone(&removed);
            thread::spawn(move || {
                for i in 0..50 {
                    handoff.send(Value::Int(i), POLL, &never, &removed);
                }
            })
        };
        let mut seen = Vec::new();
        while seen.len() < 50 {
            if let ReceiveOutcome::Received(Value::Int(v)) = handoff.receive(POLL, &never, &removed) {
                seen.push(v);
            }
        }
        writer.join().unwrap();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }
}
