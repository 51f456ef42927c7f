//! Graph walks over the link graph.
//!
//! Sequential links merge blocks into groups that run on one thread. The
//! group master is the member with the lowest container id; members run in
//! dependency order, level by level. Walks lock one container at a time and
//! only upgrade the weak link ends after the lock is released.

use super::LinkDiscipline;
use crate::error::{BlockFlowError, Result};
use crate::property::id::ContainerId;
use crate::property::{ContainerInner, PropertyContainer};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Weak;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Walk {
    /// Follow links both ways
    Undirected,
    /// Follow links from source to destination only
    Downstream,
}

fn neighbours(
    container: &PropertyContainer,
    walk: Walk,
    accept: impl Fn(LinkDiscipline) -> bool,
) -> Vec<PropertyContainer> {
    let ends: Vec<Weak<ContainerInner>> = {
        let state = container.state();
        let mut ends = Vec::new();
        for link in state.outputs.values().flatten() {
            if !link.is_removed() && accept(link.descriptor.discipline) {
                ends.push(link.destination_weak());
            }
        }
        if walk == Walk::Undirected {
            for link in state.inputs.values() {
                if !link.is_removed() && accept(link.descriptor.discipline) {
                    ends.push(link.source_weak());
                }
            }
        }
        ends
    };
    ends.into_iter()
        .filter_map(|weak| weak.upgrade())
        .map(PropertyContainer::from_inner)
        .collect()
}

fn component(
    start: &PropertyContainer,
    accept: impl Fn(LinkDiscipline) -> bool + Copy,
) -> Vec<PropertyContainer> {
    let mut seen: HashSet<ContainerId> = HashSet::new();
    let mut members = Vec::new();
    let mut stack = vec![start.clone()];
    while let Some(current) = stack.pop() {
        if !seen.insert(current.id()) {
            continue;
        }
        stack.extend(neighbours(&current, Walk::Undirected, accept));
        members.push(current);
    }
    members.sort_by_key(|c| c.id());
    members
}

fn is_sequential(discipline: LinkDiscipline) -> bool {
    discipline == LinkDiscipline::Sequential
}

fn is_synchronizing(discipline: LinkDiscipline) -> bool {
    discipline != LinkDiscipline::Asynchronous
}

/// Members of `start`'s sequential group, sorted by id
pub(crate) fn sequential_component(start: &PropertyContainer) -> Vec<PropertyContainer> {
    component(start, is_sequential)
}

/// Id of the master of `container`'s sequential group
pub(crate) fn group_master(container: &PropertyContainer) -> ContainerId {
    sequential_component(container)
        .first()
        .map(|c| c.id())
        .unwrap_or_else(|| container.id())
}

/// Whether `to` is reachable from `from` along sequential links
fn reaches_sequentially(from: &PropertyContainer, to: &PropertyContainer) -> bool {
    let mut seen: HashSet<ContainerId> = HashSet::new();
    let mut stack = vec![from.clone()];
    while let Some(current) = stack.pop() {
        if current.id() == to.id() {
            return true;
        }
        if !seen.insert(current.id()) {
            continue;
        }
        stack.extend(neighbours(&current, Walk::Downstream, is_sequential));
    }
    false
}

/// Whether any synchronous link joins a member of `a` with a member of `b`
fn synchronously_joined(a: &[PropertyContainer], b: &[PropertyContainer]) -> bool {
    let targets: HashSet<ContainerId> = b.iter().map(|c| c.id()).collect();
    let is_sync = |d: LinkDiscipline| d == LinkDiscipline::Synchronous;
    a.iter().any(|member| {
        neighbours(member, Walk::Undirected, is_sync)
            .iter()
            .any(|n| targets.contains(&n.id()))
    })
}

/// Order group members for execution: dependency levels, ties by id.
///
/// Members left over by a cycle are appended in id order.
pub(crate) fn execution_order(members: &[PropertyContainer]) -> Vec<PropertyContainer> {
    let by_id: BTreeMap<ContainerId, &PropertyContainer> =
        members.iter().map(|c| (c.id(), c)).collect();
    let mut in_degree: BTreeMap<ContainerId, usize> = by_id.keys().map(|id| (*id, 0)).collect();
    let mut adj: BTreeMap<ContainerId, Vec<ContainerId>> = BTreeMap::new();

    for member in members {
        for next in neighbours(member, Walk::Downstream, is_sequential) {
            if let Some(degree) = in_degree.get_mut(&next.id()) {
                *degree += 1;
                adj.entry(member.id()).or_default().push(next.id());
            }
        }
    }

    // Kahn's algorithm, one level at a time
    let mut order = Vec::with_capacity(members.len());
    let mut level: BTreeSet<ContainerId> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    while !level.is_empty() {
        let mut next_level = BTreeSet::new();
        for id in &level {
            order.push(*id);
            for next in adj.get(id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(next) {
                    *degree -= 1;
                    if *degree == 0 {
                        next_level.insert(*next);
                    }
                }
            }
        }
        level = next_level;
    }

    if order.len() != members.len() {
        tracing::warn!(
            "Sequential group has a cycle! Only {} of {} blocks ordered.",
            order.len(),
            members.len()
        );
        let placed: HashSet<ContainerId> = order.iter().copied().collect();
        order.extend(by_id.keys().filter(|id| !placed.contains(id)).copied());
    }

    order
        .into_iter()
        .filter_map(|id| by_id.get(&id).map(|c| (*c).clone()))
        .collect()
}

/// Discipline-specific checks for a new link from `source` to `destination`
pub(crate) fn check_discipline(
    source: &PropertyContainer,
    destination: &PropertyContainer,
    discipline: LinkDiscipline,
) -> Result<()> {
    if discipline == LinkDiscipline::Asynchronous {
        return Ok(());
    }

    for end in [source, destination] {
        let Some(unit) = end.execution_unit() else {
            return Err(BlockFlowError::Discipline(format!(
                "{} links join two processing blocks; '{}' is not one",
                discipline,
                end.name()
            )));
        };
        if unit.is_started() {
            return Err(BlockFlowError::Discipline(format!(
                "cannot add a {} link to '{}' while it runs",
                discipline,
                end.name()
            )));
        }
    }

    let source_group = sequential_component(source);
    match discipline {
        LinkDiscipline::Synchronous => {
            if source_group.iter().any(|c| c.id() == destination.id()) {
                return Err(BlockFlowError::Discipline(format!(
                    "'{}' and '{}' already run in one sequential group",
                    source.name(),
                    destination.name()
                )));
            }
        }
        LinkDiscipline::Sequential => {
            if reaches_sequentially(destination, source) {
                return Err(BlockFlowError::Discipline(format!(
                    "sequential link '{}' -> '{}' would close a cycle",
                    source.name(),
                    destination.name()
                )));
            }
            let destination_group = sequential_component(destination);
            if synchronously_joined(&source_group, &destination_group) {
                return Err(BlockFlowError::Discipline(format!(
                    "groups of '{}' and '{}' are already joined by a synchronous link",
                    source.name(),
                    destination.name()
                )));
            }
        }
        LinkDiscipline::Asynchronous => {}
    }
    Ok(())
}

/// Whether every container is connected to the others through synchronous
/// or sequential links.
pub fn are_synchronized(containers: &[PropertyContainer]) -> bool {
    let Some(first) = containers.first() else {
        return true;
    };
    let reached: HashSet<ContainerId> = component(first, is_synchronizing)
        .iter()
        .map(|c| c.id())
        .collect();
    containers.iter().all(|c| reached.contains(&c.id()))
}
