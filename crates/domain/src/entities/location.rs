//! Locations and the regions that group them

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ids::{LocationId, RegionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    Settlement,
    #[default]
    Wilderness,
    Dungeon,
}

/// A place the player can stand in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    pub region: RegionId,
    #[serde(default)]
    pub kind: LocationKind,
    #[serde(default)]
    pub description: String,
    /// Exit label ("north", "gate") to destination
    #[serde(default)]
    pub exits: BTreeMap<String, LocationId>,
}

impl Location {
    pub fn new(
        id: impl Into<LocationId>,
        name: impl Into<String>,
        region: impl Into<RegionId>,
        kind: LocationKind,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            region: region.into(),
            kind,
            description: String::new(),
            exits: BTreeMap::new(),
        }
    }

    pub fn with_exit(mut self, label: impl Into<String>, to: impl Into<LocationId>) -> Self {
        self.exits.insert(label.into().to_lowercase(), to.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn is_settlement(&self) -> bool {
        self.kind == LocationKind::Settlement
    }

    pub fn exit(&self, label: &str) -> Option<&LocationId> {
        self.exits.get(&label.trim().to_lowercase())
    }
}
