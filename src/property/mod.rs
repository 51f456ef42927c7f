//! Property containers.
//!
//! A [`PropertyContainer`] is a named, typed key/value store shared between
//! the thread that owns it (a block's worker) and everyone else (links, the
//! orchestrator, observers). Handles are cheap clones of one `Arc`; the
//! container lives until the last handle is dropped or [`destroy`] is called.
//!
//! Every accessor takes the container lock for the duration of the
//! operation only. Change events are published while the lock is held so
//! subscribers see them in mutation order.
//!
//! [`destroy`]: PropertyContainer::destroy

pub mod id;
mod record;

pub use record::{Direction, PropertyFlags, Range};
pub(crate) use record::Property;

use crate::block::unit::ExecutionUnit;
use crate::context::RuntimeContext;
use crate::error::{BlockFlowError, Result};
use crate::link::handoff::{ReceiveOutcome, SendOutcome};
use crate::link::{Link, LinkDiscipline};
use crate::notify::{ChangeEvent, Notifier, Subscription};
use crate::sync::lock;
use crate::types::{NumericProperty, PropertyData, Value, ValueKind};
use id::ContainerId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

/// Capabilities a container exposes to the orchestrator and the GUI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Runs an iterate loop
    ExecutionUnit,
    /// Draws its inputs (image canvases)
    Renderable,
    /// Produces frames from a camera or file
    VideoSource,
    /// Plots numeric inputs over time
    Plot,
}

/// Result of pumping a container's linked properties
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Completed,
    /// A blocking hand-off gave up because finish was requested
    Cancelled,
}

pub(crate) struct ContainerState {
    pub(crate) name: String,
    pub(crate) properties: HashMap<String, Property>,
    pub(crate) order: Vec<String>,
    /// Destination property -> the link driving it
    pub(crate) inputs: HashMap<String, Arc<Link>>,
    /// Source property -> links fed by it
    pub(crate) outputs: HashMap<String, Vec<Arc<Link>>>,
    pub(crate) roles: Vec<Role>,
    pub(crate) init_error: Option<String>,
    pub(crate) accepts_unspecified_inputs: bool,
    pub(crate) destroyed: bool,
}

impl ContainerState {
    fn property(&self, name: &str) -> Result<&Property> {
        self.properties
            .get(name)
            .ok_or_else(|| not_found(&self.name, name))
    }

    fn property_mut(&mut self, name: &str) -> Result<&mut Property> {
        let container = &self.name;
        self.properties
            .get_mut(name)
            .ok_or_else(|| not_found(container, name))
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.destroyed {
            return Err(BlockFlowError::InvalidOperation(format!(
                "container '{}' was destroyed",
                self.name
            )));
        }
        Ok(())
    }

    pub(crate) fn links(&self) -> Vec<Arc<Link>> {
        let mut links: Vec<Arc<Link>> = self.inputs.values().cloned().collect();
        links.extend(self.outputs.values().flatten().cloned());
        links
    }
}

pub(crate) fn not_found(container: &str, property: &str) -> BlockFlowError {
    BlockFlowError::NotFound(format!("property '{}' in container '{}'", property, container))
}

fn type_mismatch(property: &str, stored: ValueKind, requested: ValueKind) -> BlockFlowError {
    BlockFlowError::TypeMismatch {
        property: property.to_string(),
        stored: stored.to_string(),
        requested: requested.to_string(),
    }
}

pub(crate) struct ContainerInner {
    pub(crate) id: ContainerId,
    pub(crate) ctx: Arc<RuntimeContext>,
    pub(crate) state: Mutex<ContainerState>,
    pub(crate) notifier: Notifier<ChangeEvent>,
    pub(crate) unit: OnceLock<Arc<ExecutionUnit>>,
}

impl ContainerInner {
    /// Publish to the container's subscribers and to the process-wide ones
    pub(crate) fn publish(&self, event: ChangeEvent) {
        self.ctx.notifier().publish(event.clone());
        self.notifier.publish(event);
    }
}

impl Drop for ContainerInner {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if state.destroyed {
            return;
        }
        state.destroyed = true;
        let name = state.name.clone();
        let links = state.links();
        state.inputs.clear();
        state.outputs.clear();

        // Our own weak refs no longer upgrade, so this only detaches the far ends.
        for link in links {
            crate::link::remove_link(&link);
        }

        let event = ChangeEvent::ContainerDestroyed {
            container: self.id,
            name,
        };
        self.ctx.notifier().publish(event.clone());
        self.notifier.publish(event);
        self.notifier.close();
    }
}

/// Handle to a property container
#[derive(Clone)]
pub struct PropertyContainer {
    pub(crate) inner: Arc<ContainerInner>,
}

impl fmt::Debug for PropertyContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyContainer")
            .field("id", &self.inner.id)
            .field("name", &self.name())
            .finish()
    }
}

impl PartialEq for PropertyContainer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for PropertyContainer {}

impl PropertyContainer {
    pub fn new(ctx: &Arc<RuntimeContext>, name: impl Into<String>) -> Self {
        let id = ctx.next_container_id();
        Self {
            inner: Arc::new(ContainerInner {
                id,
                ctx: Arc::clone(ctx),
                state: Mutex::new(ContainerState {
                    name: name.into(),
                    properties: HashMap::new(),
                    order: Vec::new(),
                    inputs: HashMap::new(),
                    outputs: HashMap::new(),
                    roles: Vec::new(),
                    init_error: None,
                    accepts_unspecified_inputs: false,
                    destroyed: false,
                }),
                notifier: Notifier::new(),
                unit: OnceLock::new(),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ContainerInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, ContainerState> {
        lock(&self.inner.state)
    }

    pub fn id(&self) -> ContainerId {
        self.inner.id
    }

    pub fn name(&self) -> String {
        self.state().name.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        let mut state = self.state();
        state.ensure_alive()?;
        state.name = name.clone();
        self.inner.publish(ChangeEvent::NameChanged {
            container: self.id(),
            name,
        });
        Ok(())
    }

    pub fn context(&self) -> &Arc<RuntimeContext> {
        &self.inner.ctx
    }

    /// Subscribe to this container's change events
    pub fn subscribe(&self) -> Subscription<ChangeEvent> {
        self.inner.notifier.subscribe()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state().destroyed
    }

    /// Unlink everything and emit the terminal `ContainerDestroyed` event.
    ///
    /// Later mutations fail with `InvalidOperation`. Idempotent.
    pub fn destroy(&self) {
        if self.is_destroyed() {
            return;
        }
        self.unlink_all();

        let mut state = self.state();
        if state.destroyed {
            return;
        }
        state.destroyed = true;
        self.inner.publish(ChangeEvent::ContainerDestroyed {
            container: self.id(),
            name: state.name.clone(),
        });
        self.inner.notifier.close();
        tracing::debug!("Container '{}' ({}) destroyed", state.name, self.id());
    }

    // ── Roles ──

    pub fn roles(&self) -> Vec<Role> {
        self.state().roles.clone()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.state().roles.contains(&role)
    }

    pub fn add_role(&self, role: Role) {
        let mut state = self.state();
        if !state.roles.contains(&role) {
            state.roles.push(role);
        }
    }

    /// The execution facet, when this container is a processing block
    pub fn execution_unit(&self) -> Option<Arc<ExecutionUnit>> {
        self.inner.unit.get().cloned()
    }

    pub(crate) fn attach_execution_unit(&self, unit: Arc<ExecutionUnit>) -> Result<()> {
        self.inner.unit.set(unit).map_err(|_| {
            BlockFlowError::InvalidOperation(format!(
                "container {} already has an execution unit",
                self.id()
            ))
        })?;
        self.add_role(Role::ExecutionUnit);
        Ok(())
    }

    /// Error recorded while applying command line values, if any
    pub fn init_error(&self) -> Option<String> {
        self.state().init_error.clone()
    }

    pub fn set_accepts_unspecified_inputs(&self, accepts: bool) {
        self.state().accepts_unspecified_inputs = accepts;
    }

    pub fn accepts_unspecified_inputs(&self) -> bool {
        self.state().accepts_unspecified_inputs
    }

    // ── Adding and removing properties ──

    pub fn add_property<T: PropertyData>(
        &self,
        name: &str,
        direction: Direction,
        initial: T,
        info: &str,
    ) -> Result<()> {
        self.insert_property(name, direction, PropertyFlags::NONE, initial.into_value(), None, info, true)
    }

    pub fn add_property_with_flags<T: PropertyData>(
        &self,
        name: &str,
        direction: Direction,
        initial: T,
        info: &str,
        flags: PropertyFlags,
    ) -> Result<()> {
        self.insert_property(name, direction, flags, initial.into_value(), None, info, true)
    }

    /// Add a numeric property constrained to `[min, max]`
    pub fn add_ranged_property<T: NumericProperty>(
        &self,
        name: &str,
        direction: Direction,
        initial: T,
        min: T,
        max: T,
        info: &str,
    ) -> Result<()> {
        let range = Range {
            min: min.to_f64(),
            max: max.to_f64(),
        };
        if !range.contains(initial.to_f64()) {
            return Err(BlockFlowError::OutOfRange {
                property: name.to_string(),
                value: initial.to_f64(),
                min: range.min,
                max: range.max,
            });
        }
        self.insert_property(
            name,
            direction,
            PropertyFlags::NONE,
            initial.into_value(),
            Some(range),
            info,
            true,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn insert_property(
        &self,
        name: &str,
        direction: Direction,
        flags: PropertyFlags,
        value: Value,
        range: Option<Range>,
        info: &str,
        consult_arguments: bool,
    ) -> Result<()> {
        let mut state = self.state();
        state.ensure_alive()?;
        if state.properties.contains_key(name) {
            return Err(BlockFlowError::DuplicateName {
                container: state.name.clone(),
                property: name.to_string(),
            });
        }

        let mut property = Property::new(direction, flags, value, info.to_string());
        property.range = range;

        if consult_arguments && property.kind.is_parseable() {
            // The argument set has its own leaf lock.
            if let Some(text) = self.inner.ctx.take_argument(&state.name, name) {
                if let Err(message) = apply_argument(&mut property, name, &text) {
                    tracing::warn!("Container '{}': {}", state.name, message);
                    state.init_error.get_or_insert(message);
                }
            }
        }

        state.properties.insert(name.to_string(), property);
        state.order.push(name.to_string());
        self.inner.publish(ChangeEvent::PropertyAdded {
            container: self.id(),
            name: state.name.clone(),
            property: name.to_string(),
        });
        Ok(())
    }

    /// Remove a property, unlinking it first
    pub fn remove_property(&self, name: &str) -> Result<()> {
        let links: Vec<Arc<Link>> = {
            let state = self.state();
            state.ensure_alive()?;
            state.property(name)?;
            let mut links: Vec<Arc<Link>> = state.inputs.get(name).cloned().into_iter().collect();
            if let Some(outgoing) = state.outputs.get(name) {
                links.extend(outgoing.iter().cloned());
            }
            links
        };
        for link in &links {
            crate::link::remove_link(link);
        }

        let mut state = self.state();
        if state.properties.remove(name).is_none() {
            return Err(not_found(&state.name, name));
        }
        state.order.retain(|n| n != name);
        self.inner.publish(ChangeEvent::PropertyRemoved {
            container: self.id(),
            name: state.name.clone(),
            property: name.to_string(),
        });
        Ok(())
    }

    // ── Values ──

    pub fn property_value<T: PropertyData>(&self, name: &str) -> Result<T> {
        let state = self.state();
        let property = state.property(name)?;
        T::from_value(&property.value).ok_or_else(|| type_mismatch(name, property.kind, T::kind()))
    }

    pub fn property_value_raw(&self, name: &str) -> Result<Value> {
        Ok(self.state().property(name)?.value.clone())
    }

    pub fn set_property_value<T: PropertyData>(&self, name: &str, value: T) -> Result<()> {
        self.set_property_value_raw(name, value.into_value())
    }

    /// Set a property. Linked inputs are owned by their link and refuse writes.
    pub fn set_property_value_raw(&self, name: &str, value: Value) -> Result<()> {
        let mut state = self.state();
        state.ensure_alive()?;
        let property = state.property_mut(name)?;
        if property.kind != value.kind() {
            return Err(type_mismatch(name, property.kind, value.kind()));
        }
        if property.linked_input {
            return Err(BlockFlowError::InvalidOperation(format!(
                "input '{}' is linked and can only be written by its link",
                name
            )));
        }
        if let (Some(range), Some(v)) = (property.range, value.as_f64()) {
            if !range.contains(v) {
                return Err(BlockFlowError::OutOfRange {
                    property: name.to_string(),
                    value: v,
                    min: range.min,
                    max: range.max,
                });
            }
        }
        property.value = value.clone();
        self.inner.publish(ChangeEvent::PropertyValueChanged {
            container: self.id(),
            name: state.name.clone(),
            property: name.to_string(),
            value,
        });
        Ok(())
    }

    /// Store a value arriving through `link`
    pub(crate) fn deliver(&self, link: &Arc<Link>, value: Value) {
        let property = &link.descriptor.destination_property;
        let mut state = self.state();
        if state.destroyed {
            return;
        }
        // A value from a removed link is still applied unless another link took over.
        if let Some(current) = state.inputs.get(property) {
            if !Arc::ptr_eq(current, link) {
                return;
            }
        }
        let Some(slot) = state.properties.get_mut(property) else {
            return;
        };
        if slot.kind != value.kind() {
            tracing::warn!(
                "Dropping {} value for '{}': property holds {}",
                value.kind(),
                property,
                slot.kind
            );
            return;
        }
        slot.value = value.clone();
        self.inner.publish(ChangeEvent::PropertyValueChanged {
            container: self.id(),
            name: state.name.clone(),
            property: property.clone(),
            value,
        });
    }

    // ── Ranges ──

    pub fn has_range(&self, name: &str) -> Result<bool> {
        let state = self.state();
        let property = state.property(name)?;
        if !property.kind.is_numeric() {
            return Err(BlockFlowError::UnsupportedOperation(format!(
                "'{}' holds {} values, ranges need int or double",
                name, property.kind
            )));
        }
        Ok(property.range.is_some())
    }

    pub fn minimum<T: NumericProperty>(&self, name: &str) -> Result<T> {
        self.range_of::<T>(name).map(|r| T::from_f64(r.min))
    }

    pub fn maximum<T: NumericProperty>(&self, name: &str) -> Result<T> {
        self.range_of::<T>(name).map(|r| T::from_f64(r.max))
    }

    fn range_of<T: NumericProperty>(&self, name: &str) -> Result<Range> {
        let state = self.state();
        let property = state.property(name)?;
        if !property.kind.is_numeric() {
            return Err(BlockFlowError::UnsupportedOperation(format!(
                "'{}' holds {} values, ranges need int or double",
                name, property.kind
            )));
        }
        if property.kind != T::kind() {
            return Err(type_mismatch(name, property.kind, T::kind()));
        }
        property.range.ok_or_else(|| {
            BlockFlowError::UnsupportedOperation(format!("'{}' has no range", name))
        })
    }

    // ── Queries ──

    /// Property names in insertion order
    pub fn property_names(&self) -> Vec<String> {
        self.state().order.clone()
    }

    pub fn contains_property(&self, name: &str) -> bool {
        self.state().properties.contains_key(name)
    }

    pub fn property_kind(&self, name: &str) -> Result<ValueKind> {
        Ok(self.state().property(name)?.kind)
    }

    pub fn property_direction(&self, name: &str) -> Result<Direction> {
        Ok(self.state().property(name)?.direction)
    }

    pub fn property_info(&self, name: &str) -> Result<String> {
        Ok(self.state().property(name)?.info.clone())
    }

    pub fn property_flags(&self, name: &str) -> Result<PropertyFlags> {
        Ok(self.state().property(name)?.flags)
    }

    pub fn property_range(&self, name: &str) -> Result<Option<Range>> {
        Ok(self.state().property(name)?.range)
    }

    pub fn is_input(&self, name: &str) -> Result<bool> {
        Ok(self.state().property(name)?.is_input())
    }

    pub fn is_output(&self, name: &str) -> Result<bool> {
        Ok(self.state().property(name)?.is_output())
    }

    pub fn is_gui_visible(&self, name: &str) -> Result<bool> {
        Ok(!self.state().property(name)?.flags.gui_invisible)
    }

    pub fn is_internal(&self, name: &str) -> Result<bool> {
        Ok(self.state().property(name)?.flags.internal)
    }

    pub fn is_linked_input(&self, name: &str) -> Result<bool> {
        Ok(self.state().property(name)?.linked_input)
    }

    pub fn is_linked_output(&self, name: &str) -> Result<bool> {
        Ok(self.state().property(name)?.linked_output)
    }

    /// Names of the properties holding `kind`, in insertion order
    pub fn properties_by_kind(&self, kind: ValueKind) -> Vec<String> {
        let state = self.state();
        state
            .order
            .iter()
            .filter(|name| state.properties.get(*name).is_some_and(|p| p.kind == kind))
            .cloned()
            .collect()
    }

    /// Usage lines of the inputs that can be set from the command line
    pub fn help_text(&self) -> String {
        let state = self.state();
        state
            .order
            .iter()
            .filter_map(|name| {
                let property = state.properties.get(name)?;
                if !property.is_input() || property.flags.internal {
                    return None;
                }
                property.usage(name)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    // ── Link propagation ──

    /// Receive pending synchronous values into the linked inputs.
    ///
    /// Blocks on every synchronous input until its source produced a value.
    /// Waits poll `cancel` and the link's removal flag. Asynchronous and
    /// sequential inputs need no work here: their sources push on write.
    pub fn read_input_properties(&self, cancel: &dyn Fn() -> bool) -> Propagation {
        let links: Vec<Arc<Link>> = {
            let state = self.state();
            state
                .order
                .iter()
                .filter_map(|name| state.inputs.get(name))
                .filter(|link| link.descriptor.discipline == LinkDiscipline::Synchronous)
                .cloned()
                .collect()
        };
        if links.is_empty() {
            return Propagation::Completed;
        }

        let poll = self.inner.ctx.config().handoff_poll();
        for link in links {
            match link.receive(poll, cancel) {
                ReceiveOutcome::Received(value) => self.deliver(&link, value),
                ReceiveOutcome::Unlinked => {}
                ReceiveOutcome::Cancelled => return Propagation::Cancelled,
            }
        }
        Propagation::Completed
    }

    /// Push output values along every outgoing link.
    ///
    /// Asynchronous and sequential destinations get the value stored
    /// directly. Synchronous sends block until the destination consumed the
    /// previous value. No lock is held while blocked.
    pub fn write_output_properties(&self, cancel: &dyn Fn() -> bool) -> Propagation {
        let pending: Vec<(Arc<Link>, Value)> = {
            let state = self.state();
            let mut pending = Vec::new();
            for name in &state.order {
                let (Some(links), Some(property)) =
                    (state.outputs.get(name), state.properties.get(name))
                else {
                    continue;
                };
                for link in links {
                    pending.push((Arc::clone(link), property.value.clone()));
                }
            }
            pending
        };

        let poll = self.inner.ctx.config().handoff_poll();
        for (link, value) in pending {
            if link.is_removed() {
                continue;
            }
            match link.descriptor.discipline {
                LinkDiscipline::Asynchronous | LinkDiscipline::Sequential => {
                    if let Some(destination) = link.destination() {
                        destination.deliver(&link, value);
                    }
                }
                LinkDiscipline::Synchronous => match link.send(value, poll, cancel) {
                    SendOutcome::Sent | SendOutcome::Unlinked => {}
                    SendOutcome::Cancelled => return Propagation::Cancelled,
                },
            }
        }
        Propagation::Completed
    }
}

/// Apply a command line value to a freshly declared property
fn apply_argument(property: &mut Property, name: &str, text: &str) -> std::result::Result<(), String> {
    if property.is_output() {
        return Err(format!(
            "cannot set output property '{}' from the command line",
            name
        ));
    }
    let value = Value::parse(property.kind, text).ok_or_else(|| {
        format!(
            "cannot convert '{}' to {} for property '{}'",
            text, property.kind, name
        )
    })?;
    if let (Some(range), Some(v)) = (property.range, value.as_f64()) {
        if !range.contains(v) {
            return Err(format!(
                "value {} for property '{}' is outside [{}, {}]",
                v, name, range.min, range.max
            ));
        }
    }
    property.value = value;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ArgumentSet;
    use crate::config::RuntimeConfig;

    fn container(name: &str) -> PropertyContainer {
        PropertyContainer::new(&RuntimeContext::standalone(), name)
    }

    #[test]
    fn test_add_and_read() {
        let c = container("camera");
        c.add_property("fps", Direction::Input, 25i32, "Frames per second")
            .unwrap();
        assert_eq!(c.property_value::<i32>("fps").unwrap(), 25);
        assert_eq!(c.property_kind("fps").unwrap(), ValueKind::Int);
        assert!(c.is_input("fps").unwrap());
        assert_eq!(c.property_info("fps").unwrap(), "Frames per second");
    }

    #[test]
    fn test_duplicate_name() {
        let c = container("camera");
        c.add_property("fps", Direction::Input, 25i32, "").unwrap();
        let err = c.add_property("fps", Direction::Output, 1.0f64, "").unwrap_err();
        assert!(matches!(err, BlockFlowError::DuplicateName { .. }));
    }

    #[test]
    fn test_type_mismatch() {
        let c = container("camera");
        c.add_property("fps", Direction::Input, 25i32, "").unwrap();
        assert!(matches!(
            c.property_value::<f64>("fps"),
            Err(BlockFlowError::TypeMismatch { .. })
        ));
        assert!(matches!(
            c.set_property_value("fps", "fast".to_string()),
            Err(BlockFlowError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_range_enforced() {
        let c = container("filter");
        c.add_ranged_property("sigma", Direction::Input, 1.0f64, 0.0, 5.0, "")
            .unwrap();
        assert!(c.has_range("sigma").unwrap());
        assert_eq!(c.maximum::<f64>("sigma").unwrap(), 5.0);
        assert!(matches!(
            c.set_property_value("sigma", 9.0f64),
            Err(BlockFlowError::OutOfRange { .. })
        ));
        assert_eq!(c.property_value::<f64>("sigma").unwrap(), 1.0);
    }

    #[test]
    fn test_range_on_text_unsupported() {
        let c = container("label");
        c.add_property("text", Direction::Input, String::from("hi"), "")
            .unwrap();
        assert!(matches!(
            c.has_range("text"),
            Err(BlockFlowError::UnsupportedOperation(_))
        ));
        c.add_property("count", Direction::Input, 1i32, "").unwrap();
        assert!(matches!(
            c.minimum::<i32>("count"),
            Err(BlockFlowError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_insertion_order_and_remove() {
        let c = container("block");
        for name in ["b", "a", "c"] {
            c.add_property(name, Direction::Input, 0i32, "").unwrap();
        }
        assert_eq!(c.property_names(), vec!["b", "a", "c"]);
        c.remove_property("a").unwrap();
        assert_eq!(c.property_names(), vec!["b", "c"]);
        assert!(matches!(
            c.remove_property("a"),
            Err(BlockFlowError::NotFound(_))
        ));
    }

    #[test]
    fn test_events_in_mutation_order() {
        let c = container("block");
        let sub = c.subscribe();
        c.add_property("x", Direction::Input, 0i32, "").unwrap();
        c.set_property_value("x", 3i32).unwrap();
        c.set_name("renamed").unwrap();
        let events = sub.drain();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], ChangeEvent::PropertyAdded { .. }));
        assert!(matches!(
            &events[1],
            ChangeEvent::PropertyValueChanged { value: Value::Int(3), .. }
        ));
        assert!(matches!(&events[2], ChangeEvent::NameChanged { name, .. } if name == "renamed"));
    }

    #[test]
    fn test_destroy_is_terminal() {
        let c = container("block");
        let sub = c.subscribe();
        c.add_property("x", Direction::Input, 0i32, "").unwrap();
        c.destroy();
        assert!(matches!(
            c.set_property_value("x", 1i32),
            Err(BlockFlowError::InvalidOperation(_))
        ));
        let events = sub.drain();
        assert!(matches!(
            events.last(),
            Some(ChangeEvent::ContainerDestroyed { .. })
        ));
    }

    #[test]
    fn test_drop_publishes_destroyed() {
        let ctx = RuntimeContext::standalone();
        let global = ctx.notifier().subscribe();
        let id = {
            let c = PropertyContainer::new(&ctx, "temp");
            c.id()
        };
        let events = global.drain();
        assert!(matches!(
            events.last(),
            Some(ChangeEvent::ContainerDestroyed { container, .. }) if *container == id
        ));
    }

    #[test]
    fn test_arguments_applied_to_inputs() {
        let ctx = RuntimeContext::new(
            ArgumentSet::new(["--levels=4", "--blur:sigma=2.5"]),
            RuntimeConfig::default(),
        );
        let c = PropertyContainer::new(&ctx, "blur");
        c.add_property("levels", Direction::Input, 1i32, "").unwrap();
        c.add_ranged_property("sigma", Direction::Input, 1.0f64, 0.0, 10.0, "")
            .unwrap();
        assert_eq!(c.property_value::<i32>("levels").unwrap(), 4);
        assert_eq!(c.property_value::<f64>("sigma").unwrap(), 2.5);
        assert!(c.init_error().is_none());
        assert!(ctx.unused_arguments().is_empty());
    }

    #[test]
    fn test_bad_argument_recorded_as_init_error() {
        let ctx = RuntimeContext::new(
            ArgumentSet::new(["--levels=many", "--out=1"]),
            RuntimeConfig::default(),
        );
        let c = PropertyContainer::new(&ctx, "pyramid");
        c.add_property("levels", Direction::Input, 1i32, "").unwrap();
        c.add_property("out", Direction::Output, 0i32, "").unwrap();
        assert_eq!(c.property_value::<i32>("levels").unwrap(), 1);
        assert!(c.init_error().unwrap().contains("levels"));
        assert!(ctx.unused_arguments().is_empty());
    }

    #[test]
    fn test_help_text_lists_printable_inputs() {
        let c = container("blur");
        c.add_ranged_property("sigma", Direction::Input, 1.0f64, 0.0, 10.0, "Blur radius")
            .unwrap();
        c.add_property("out", Direction::Output, 0i32, "").unwrap();
        c.add_property_with_flags(
            "hidden",
            Direction::Input,
            0i32,
            "",
            PropertyFlags::HIDDEN_INTERNAL,
        )
        .unwrap();
        let help = c.help_text();
        assert!(help.contains("--sigma=[0...10] (def. 1)"));
        assert!(!help.contains("out"));
        assert!(!help.contains("hidden"));
    }

    #[test]
    fn test_properties_by_kind() {
        let c = container("mixed");
        c.add_property("a", Direction::Input, 1i32, "").unwrap();
        c.add_property("b", Direction::Input, 1.0f64, "").unwrap();
        c.add_property("c", Direction::Output, 2i32, "").unwrap();
        assert_eq!(c.properties_by_kind(ValueKind::Int), vec!["a", "c"]);
    }
}
