//! World configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Capacity hints applied when a [`World`](crate::World) is created.
///
/// Every field is optional in serialized form; missing ones take their
/// default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Entity slots reserved up front.
    pub entity_capacity: usize,
    /// Archetype slots reserved up front.
    pub archetype_capacity: usize,
    /// Rows reserved in every column of a newly created archetype.
    pub column_capacity: usize,
}

impl WorldConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entity_capacity(mut self, capacity: usize) -> Self {
        self.entity_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_archetype_capacity(mut self, capacity: usize) -> Self {
        self.archetype_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_column_capacity(mut self, capacity: usize) -> Self {
        self.column_capacity = capacity;
        self
    }

    /// Parse a configuration from JSON.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidConfig`](crate::StoreError::InvalidConfig) if the
    /// document is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            entity_capacity: 0,
            archetype_capacity: 8,
            column_capacity: 0,
        }
    }
}
