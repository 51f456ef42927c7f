//! Serializable topology snapshots for designers and inspectors.

use crate::block::BlockStatus;
use crate::error::{BlockFlowError, Result};
use crate::link::LinkDescriptor;
use crate::property::id::ContainerId;
use crate::property::{Direction, PropertyContainer, Range, Role};
use serde::{Deserialize, Serialize};

/// Snapshot of a single property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySnapshot {
    pub name: String,
    pub kind: String,
    pub direction: Direction,
    pub value: String,
    pub range: Option<Range>,
    pub info: String,
    pub gui_visible: bool,
    pub internal: bool,
}

/// Snapshot of a single container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSnapshot {
    pub id: ContainerId,
    pub name: String,
    pub roles: Vec<Role>,
    pub properties: Vec<PropertySnapshot>,
    /// Present for processing blocks
    pub status: Option<BlockStatus>,
    pub sequential_group_master: Option<bool>,
    pub iteration: Option<u64>,
}

/// Complete topology snapshot of the registered containers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    pub containers: Vec<ContainerSnapshot>,
    pub links: Vec<LinkDescriptor>,
}

impl ContainerSnapshot {
    pub(crate) fn capture(container: &PropertyContainer) -> Self {
        let properties = container
            .property_names()
            .into_iter()
            .filter_map(|name| {
                // Skip properties removed between listing and reading.
                let flags = container.property_flags(&name).ok()?;
                Some(PropertySnapshot {
                    kind: container.property_kind(&name).ok()?.to_string(),
                    direction: container.property_direction(&name).ok()?,
                    value: container.property_value_raw(&name).ok()?.to_string(),
                    range: container.property_range(&name).ok()?,
                    info: container.property_info(&name).ok()?,
                    gui_visible: !flags.gui_invisible,
                    internal: flags.internal,
                    name,
                })
            })
            .collect();
        let unit = container.execution_unit();
        Self {
            id: container.id(),
            name: container.name(),
            roles: container.roles(),
            properties,
            status: unit.as_ref().map(|u| u.status()),
            sequential_group_master: unit.as_ref().map(|u| u.is_sequential_group_master()),
            iteration: unit.as_ref().map(|u| u.iteration()),
        }
    }
}

impl TopologySnapshot {
    pub(crate) fn capture(containers: &[PropertyContainer]) -> Self {
        let mut links: Vec<LinkDescriptor> = containers
            .iter()
            .flat_map(|c| c.incoming_links())
            .collect();
        links.sort_by_key(|l| l.id);
        Self {
            containers: containers.iter().map(ContainerSnapshot::capture).collect(),
            links,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| BlockFlowError::Config(format!("Failed to serialize topology: {}", e)))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| BlockFlowError::Config(format!("Failed to parse topology: {}", e)))
    }
}
