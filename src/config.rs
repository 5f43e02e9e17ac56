use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_MAX_ELEMENTS_PER_NODE: usize = 128;
pub const DEFAULT_RESERVE_CAPACITY_PER_NODE: usize = 4;

/// Decides whether a node keeps an element itself or hands it further down.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Copy, Clone, Default)]
pub enum PlacementRule {
    /// Keep elements while the node is under capacity and the radius fits inside it.
    #[default]
    Capacity,
    /// Sink each element to the level whose half size is just below its radius.
    SizeBand,
}

/// Tunables of one octree, fixed when the tree is built.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Copy, Clone)]
#[serde(default)]
pub struct OctreeConfig {
    /// Element count at which a node stops accepting elements and starts subdividing.
    pub max_elements_per_node: usize,
    /// Initial element list capacity of every new node.
    pub reserve_capacity_per_node: usize,
    pub placement: PlacementRule,
}

impl OctreeConfig {
    pub fn with_max_elements(max_elements_per_node: usize) -> Self {
        Self {
            max_elements_per_node,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_elements_per_node == 0 {
            return Err(Error::Config(
                "max_elements_per_node must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            max_elements_per_node: DEFAULT_MAX_ELEMENTS_PER_NODE,
            reserve_capacity_per_node: DEFAULT_RESERVE_CAPACITY_PER_NODE,
            placement: PlacementRule::default(),
        }
    }
}
