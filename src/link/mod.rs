//! Links between container properties.
//!
//! A link connects an output property of a source container to an input
//! property of a destination container under one of three disciplines:
//!
//! - **Asynchronous**: the source pushes its latest value into the
//!   destination at the end of each iteration. No backpressure.
//! - **Synchronous**: a one-slot blocking hand-off. Every produced value is
//!   consumed exactly once, in order.
//! - **Sequential**: both blocks join one group that runs on a single
//!   thread in dependency order; values are pushed like asynchronous links.
//!
//! A link is owned by the destination's input record (at most one source per
//! input) and listed in the source's output record. Links only hold weak
//! references to their ends, so dropping a container never leaks its peers.
//! Operations touching two containers lock them in ascending id order.

pub(crate) mod groups;
pub(crate) mod handoff;

pub use groups::are_synchronized;

use crate::error::{BlockFlowError, Result};
use crate::notify::ChangeEvent;
use crate::property::id::{ContainerId, LinkId};
use crate::property::{not_found, ContainerInner, ContainerState, Direction, PropertyContainer};
use crate::sync::lock;
use crate::types::{Value, ValueKind};
use handoff::{Handoff, ReceiveOutcome, SendOutcome};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard, Weak};
use std::time::Duration;

/// How values travel along a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkDiscipline {
    Asynchronous,
    Synchronous,
    Sequential,
}

impl fmt::Display for LinkDiscipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkDiscipline::Asynchronous => "asynchronous",
            LinkDiscipline::Synchronous => "synchronous",
            LinkDiscipline::Sequential => "sequential",
        };
        f.write_str(name)
    }
}

/// Plain description of a link, as carried by events and snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDescriptor {
    pub id: LinkId,
    pub source: ContainerId,
    pub source_property: String,
    pub destination: ContainerId,
    pub destination_property: String,
    pub discipline: LinkDiscipline,
}

pub(crate) struct Link {
    pub(crate) descriptor: LinkDescriptor,
    source: Weak<ContainerInner>,
    destination: Weak<ContainerInner>,
    removed: AtomicBool,
    handoff: Option<Handoff>,
}

impl Link {
    pub(crate) fn destination(&self) -> Option<PropertyContainer> {
        self.destination.upgrade().map(PropertyContainer::from_inner)
    }

    pub(crate) fn source_weak(&self) -> Weak<ContainerInner> {
        Weak::clone(&self.source)
    }

    pub(crate) fn destination_weak(&self) -> Weak<ContainerInner> {
        Weak::clone(&self.destination)
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    pub(crate) fn send(&self, value: Value, poll: Duration, cancel: &dyn Fn() -> bool) -> SendOutcome {
        match &self.handoff {
            Some(handoff) => handoff.send(value, poll, cancel, &self.removed),
            None => SendOutcome::Unlinked,
        }
    }

    pub(crate) fn receive(&self, poll: Duration, cancel: &dyn Fn() -> bool) -> ReceiveOutcome {
        match &self.handoff {
            Some(handoff) => handoff.receive(poll, cancel, &self.removed),
            None => ReceiveOutcome::Unlinked,
        }
    }
}

/// Lock two distinct containers in ascending id order, returning the guards
/// in argument order.
fn lock_pair<'a>(
    a: &'a ContainerInner,
    b: &'a ContainerInner,
) -> (MutexGuard<'a, ContainerState>, MutexGuard<'a, ContainerState>) {
    if a.id < b.id {
        let first = lock(&a.state);
        let second = lock(&b.state);
        (first, second)
    } else {
        let second = lock(&b.state);
        let first = lock(&a.state);
        (first, second)
    }
}

/// Structural checks shared by the first validation and the final insert
fn check_endpoints(
    source: &ContainerState,
    source_property: &str,
    destination: &ContainerState,
    destination_property: &str,
) -> Result<ValueKind> {
    for state in [source, destination] {
        if state.destroyed {
            return Err(BlockFlowError::InvalidOperation(format!(
                "container '{}' was destroyed",
                state.name
            )));
        }
    }
    let from = source
        .properties
        .get(source_property)
        .ok_or_else(|| not_found(&source.name, source_property))?;
    let to = destination
        .properties
        .get(destination_property)
        .ok_or_else(|| not_found(&destination.name, destination_property))?;

    if from.direction != Direction::Output {
        return Err(BlockFlowError::InvalidOperation(format!(
            "'{}' of '{}' is not an output",
            source_property, source.name
        )));
    }
    if to.direction != Direction::Input {
        return Err(BlockFlowError::InvalidOperation(format!(
            "'{}' of '{}' is not an input",
            destination_property, destination.name
        )));
    }
    if from.kind != to.kind {
        return Err(BlockFlowError::TypeMismatch {
            property: destination_property.to_string(),
            stored: to.kind.to_string(),
            requested: from.kind.to_string(),
        });
    }
    if destination.inputs.contains_key(destination_property) {
        return Err(BlockFlowError::LinkExists {
            container: destination.name.clone(),
            property: destination_property.to_string(),
        });
    }
    Ok(from.kind)
}

/// Detach `link` from every end still alive and mark it removed.
///
/// Publishes `LinkRemoved` on each end the link was still attached to.
pub(crate) fn remove_link(link: &Arc<Link>) {
    // A synchronous value already produced still reaches a live destination.
    // Taken before the removal flag is raised, so a waiting receiver never
    // gives up while the value is in flight.
    let pending = link.handoff.as_ref().and_then(Handoff::take_pending);
    if let (Some(value), Some(destination)) = (pending, link.destination()) {
        destination.deliver(link, value);
    }

    link.removed.store(true, Ordering::Release);
    let source = link.source.upgrade();
    let destination = link.destination.upgrade();
    match (source, destination) {
        (Some(source), Some(destination)) => {
            let (mut s, mut d) = lock_pair(&source, &destination);
            detach_source(&source, &mut s, link);
            detach_destination(&destination, &mut d, link);
        }
        (Some(source), None) => {
            let mut s = lock(&source.state);
            detach_source(&source, &mut s, link);
        }
        (None, Some(destination)) => {
            let mut d = lock(&destination.state);
            detach_destination(&destination, &mut d, link);
        }
        (None, None) => {}
    }
}

fn detach_source(inner: &ContainerInner, state: &mut ContainerState, link: &Arc<Link>) {
    let property = &link.descriptor.source_property;
    let Some(links) = state.outputs.get_mut(property) else {
        return;
    };
    let before = links.len();
    links.retain(|l| !Arc::ptr_eq(l, link));
    if links.len() == before {
        return;
    }
    if links.is_empty() {
        state.outputs.remove(property);
        if let Some(p) = state.properties.get_mut(property) {
            p.linked_output = false;
        }
    }
    inner.publish(ChangeEvent::LinkRemoved {
        container: inner.id,
        link: link.descriptor.clone(),
    });
}

fn detach_destination(inner: &ContainerInner, state: &mut ContainerState, link: &Arc<Link>) {
    let property = &link.descriptor.destination_property;
    match state.inputs.get(property) {
        Some(current) if Arc::ptr_eq(current, link) => {}
        _ => return,
    }
    state.inputs.remove(property);
    if let Some(p) = state.properties.get_mut(property) {
        p.linked_input = false;
    }
    inner.publish(ChangeEvent::LinkRemoved {
        container: inner.id,
        link: link.descriptor.clone(),
    });
}

impl PropertyContainer {
    /// Link `source_property` of this container to `destination_property` of
    /// `destination`.
    pub fn link_property(
        &self,
        source_property: &str,
        destination: &PropertyContainer,
        destination_property: &str,
        discipline: LinkDiscipline,
    ) -> Result<LinkDescriptor> {
        if self.id() == destination.id() {
            return Err(BlockFlowError::InvalidOperation(format!(
                "cannot link container {} to itself",
                self.id()
            )));
        }

        // Group checks and insertion of a synchronizing link are atomic with
        // respect to every other synchronizing link of the context.
        let _linking = (discipline != LinkDiscipline::Asynchronous)
            .then(|| self.context().lock_linking());

        {
            let (s, d) = lock_pair(&self.inner, &destination.inner);
            check_endpoints(&s, source_property, &d, destination_property)?;
        }

        // Graph walks lock one container at a time, so no pair lock here.
        groups::check_discipline(self, destination, discipline)?;

        let (mut s, mut d) = lock_pair(&self.inner, &destination.inner);
        check_endpoints(&s, source_property, &d, destination_property)?;

        let descriptor = LinkDescriptor {
            id: self.context().next_link_id(),
            source: self.id(),
            source_property: source_property.to_string(),
            destination: destination.id(),
            destination_property: destination_property.to_string(),
            discipline,
        };
        let link = Arc::new(Link {
            descriptor: descriptor.clone(),
            source: Arc::downgrade(&self.inner),
            destination: Arc::downgrade(&destination.inner),
            removed: AtomicBool::new(false),
            handoff: (discipline == LinkDiscipline::Synchronous).then(Handoff::new),
        });

        s.outputs
            .entry(source_property.to_string())
            .or_default()
            .push(Arc::clone(&link));
        if let Some(p) = s.properties.get_mut(source_property) {
            p.linked_output = true;
        }
        d.inputs.insert(destination_property.to_string(), link);
        if let Some(p) = d.properties.get_mut(destination_property) {
            p.linked_input = true;
        }

        self.inner.publish(ChangeEvent::LinkAdded {
            container: self.id(),
            link: descriptor.clone(),
        });
        destination.inner.publish(ChangeEvent::LinkAdded {
            container: destination.id(),
            link: descriptor.clone(),
        });

        tracing::debug!(
            "Linked {}.{} -> {}.{} ({})",
            s.name,
            source_property,
            d.name,
            destination_property,
            discipline
        );
        Ok(descriptor)
    }

    /// Link `source_property` into a same-named input of `destination`,
    /// creating that input when the destination accepts unspecified inputs.
    pub fn link_unspecified_input(
        &self,
        source_property: &str,
        destination: &PropertyContainer,
        discipline: LinkDiscipline,
    ) -> Result<LinkDescriptor> {
        let value = self.property_value_raw(source_property)?;

        let mut created = false;
        if !destination.contains_property(source_property) {
            if !destination.accepts_unspecified_inputs() {
                return Err(not_found(&destination.name(), source_property));
            }
            destination.insert_property(
                source_property,
                Direction::Input,
                crate::property::PropertyFlags::NONE,
                value,
                None,
                "",
                false,
            )?;
            created = true;
        }

        let linked = self.link_property(source_property, destination, source_property, discipline);
        if linked.is_err() && created {
            if let Err(e) = destination.remove_property(source_property) {
                tracing::warn!("Failed to drop shadow input '{}': {}", source_property, e);
            }
        }
        linked
    }

    /// Link a same-named output of this container into `destination_property`.
    pub fn link_unspecified_output(
        &self,
        destination: &PropertyContainer,
        destination_property: &str,
        discipline: LinkDiscipline,
    ) -> Result<LinkDescriptor> {
        if !self.contains_property(destination_property) {
            return Err(not_found(&self.name(), destination_property));
        }
        self.link_property(destination_property, destination, destination_property, discipline)
    }

    /// Link every same-named, same-kind output → unlinked input pair.
    ///
    /// Internal properties are skipped. Returns the number of links made.
    pub fn link_matching(
        &self,
        destination: &PropertyContainer,
        discipline: LinkDiscipline,
    ) -> Result<usize> {
        let candidates: Vec<String> = {
            let (s, d) = lock_pair(&self.inner, &destination.inner);
            s.order
                .iter()
                .filter(|name| {
                    let (Some(from), Some(to)) = (s.properties.get(*name), d.properties.get(*name))
                    else {
                        return false;
                    };
                    from.is_output()
                        && to.is_input()
                        && !from.flags.internal
                        && !to.flags.internal
                        && from.kind == to.kind
                        && !to.linked_input
                })
                .cloned()
                .collect()
        };

        for name in &candidates {
            self.link_property(name, destination, name, discipline)?;
        }
        Ok(candidates.len())
    }

    /// Remove the link from `source_property` to `destination_property`.
    pub fn unlink_property(
        &self,
        source_property: &str,
        destination: &PropertyContainer,
        destination_property: &str,
    ) -> Result<()> {
        let link = {
            let d = destination.state();
            d.inputs
                .get(destination_property)
                .filter(|l| {
                    l.descriptor.source == self.id() && l.descriptor.source_property == source_property
                })
                .cloned()
        };
        let link = link.ok_or_else(|| {
            BlockFlowError::NotFound(format!(
                "link {}.{} -> {}.{}",
                self.name(),
                source_property,
                destination.name(),
                destination_property
            ))
        })?;
        remove_link(&link);
        Ok(())
    }

    /// Remove every link touching this container
    pub fn unlink_all(&self) {
        let links = self.state().links();
        for link in &links {
            remove_link(link);
        }
    }

    // ── Queries ──

    /// The link driving `destination_property`, if any
    pub fn source_of(&self, destination_property: &str) -> Result<Option<LinkDescriptor>> {
        let state = self.state();
        if !state.properties.contains_key(destination_property) {
            return Err(not_found(&state.name, destination_property));
        }
        Ok(state
            .inputs
            .get(destination_property)
            .map(|l| l.descriptor.clone()))
    }

    /// `(container, property)` pairs fed by `source_property`
    pub fn destinations_of(&self, source_property: &str) -> Result<Vec<(ContainerId, String)>> {
        Ok(self
            .outgoing_links(source_property)?
            .into_iter()
            .map(|l| (l.destination, l.destination_property))
            .collect())
    }

    pub fn outgoing_links(&self, source_property: &str) -> Result<Vec<LinkDescriptor>> {
        let state = self.state();
        if !state.properties.contains_key(source_property) {
            return Err(not_found(&state.name, source_property));
        }
        Ok(state
            .outputs
            .get(source_property)
            .map(|links| links.iter().map(|l| l.descriptor.clone()).collect())
            .unwrap_or_default())
    }

    /// Every link driving one of this container's inputs, in property order
    pub fn incoming_links(&self) -> Vec<LinkDescriptor> {
        let state = self.state();
        state
            .order
            .iter()
            .filter_map(|name| state.inputs.get(name))
            .map(|l| l.descriptor.clone())
            .collect()
    }

    /// Every link fed by one of this container's outputs, in property order
    pub fn all_outgoing_links(&self) -> Vec<LinkDescriptor> {
        let state = self.state();
        state
            .order
            .iter()
            .filter_map(|name| state.outputs.get(name))
            .flatten()
            .map(|l| l.descriptor.clone())
            .collect()
    }

    pub fn input_discipline(&self, destination_property: &str) -> Result<Option<LinkDiscipline>> {
        Ok(self
            .source_of(destination_property)?
            .map(|descriptor| descriptor.discipline))
    }
}
