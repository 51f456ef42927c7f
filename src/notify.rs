//! Change notification channels.
//!
//! A [`Notifier`] fans events out to any number of [`Subscription`]s. Every
//! subscriber owns an unbounded crossbeam queue, so publishing never waits on
//! a slow observer: the mutating operation only pays for the enqueue. The
//! observer drains its queue from its own context (a GUI frame, a test, a
//! logging thread) in publish order.

use crate::link::LinkDescriptor;
use crate::property::id::ContainerId;
use crate::sync::lock;
use crate::types::Value;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Structured description of a mutation to a property container.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// The container's display name changed.
    NameChanged { container: ContainerId, name: String },

    /// Terminal event: nothing more is published for this container.
    ContainerDestroyed { container: ContainerId, name: String },

    PropertyAdded {
        container: ContainerId,
        name: String,
        property: String,
    },

    PropertyRemoved {
        container: ContainerId,
        name: String,
        property: String,
    },

    /// A property value changed, either by a direct set or by link propagation.
    PropertyValueChanged {
        container: ContainerId,
        name: String,
        property: String,
        value: Value,
    },

    /// Published by both endpoints of the link; `container` is the publisher.
    LinkAdded {
        container: ContainerId,
        link: LinkDescriptor,
    },

    LinkRemoved {
        container: ContainerId,
        link: LinkDescriptor,
    },
}

impl ChangeEvent {
    /// The container that published this event
    pub fn container(&self) -> ContainerId {
        match self {
            ChangeEvent::NameChanged { container, .. }
            | ChangeEvent::ContainerDestroyed { container, .. }
            | ChangeEvent::PropertyAdded { container, .. }
            | ChangeEvent::PropertyRemoved { container, .. }
            | ChangeEvent::PropertyValueChanged { container, .. }
            | ChangeEvent::LinkAdded { container, .. }
            | ChangeEvent::LinkRemoved { container, .. } => *container,
        }
    }
}

struct NotifierState<E> {
    subscribers: Vec<Sender<E>>,
    closed: bool,
}

/// Publish/subscribe hub for one event source.
pub struct Notifier<E> {
    state: Arc<Mutex<NotifierState<E>>>,
}

impl<E> Clone for Notifier<E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<E: Clone + Send + 'static> Default for Notifier<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone + Send + 'static> Notifier<E> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(NotifierState {
                subscribers: Vec::new(),
                closed: false,
            })),
        }
    }

    /// Register a new subscriber. Subscribing to a closed notifier yields a
    /// subscription that is already disconnected.
    pub fn subscribe(&self) -> Subscription<E> {
        let (tx, rx) = unbounded();
        let mut state = lock(&self.state);
        if !state.closed {
            state.subscribers.push(tx);
        }
        Subscription { rx }
    }

    /// Enqueue `event` for every live subscriber.
    pub fn publish(&self, event: E) {
        let mut state = lock(&self.state);
        if state.closed {
            return;
        }
        state
            .subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of registered subscribers. Dropped subscriptions are pruned on
    /// the next publish.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.state).subscribers.len()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// Stop publishing and disconnect every subscriber once it drained.
    pub(crate) fn close(&self) {
        let mut state = lock(&self.state);
        state.closed = true;
        state.subscribers.clear();
    }
}

/// Receiving end of a [`Notifier`].
pub struct Subscription<E> {
    rx: Receiver<E>,
}

impl<E> Subscription<E> {
    /// Drain all pending events.
    pub fn drain(&self) -> Vec<E> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Try to receive a single event without blocking.
    pub fn try_recv(&self) -> Option<E> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<E> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Number of queued events.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}
