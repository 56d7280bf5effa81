//! API inventory: one schema entry per method + path
//!
//! Entries are never overwritten; the first exchange observed for a key
//! defines its templates for the rest of the run.

use serde::Serialize;
use std::collections::HashMap;

/// Joins method and path in inventory keys (`GET_/users/42`)
pub const KEY_SEPARATOR: &str = "_";

/// Structural description of one observed endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiSchema {
    pub method: String,
    pub path: String,
    /// Request body template: top-level keys with values erased (JSON text)
    pub request_schema: String,
    /// Response body template: top-level keys with values erased (JSON text)
    pub response_schema: String,
    pub contains_pii: bool,
}

impl ApiSchema {
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}{KEY_SEPARATOR}{}", self.method, self.path)
    }
}

#[derive(Debug, Default)]
pub struct ApiInventory {
    entries: HashMap<String, ApiSchema>,
}

impl ApiInventory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `schema` unless its key is already present.
    ///
    /// Returns true if the entry was added.
    pub fn insert_if_absent(&mut self, schema: ApiSchema) -> bool {
        match self.entries.entry(schema.key()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(schema);
                true
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, ordered by key
    #[must_use]
    pub fn entries(&self) -> Vec<ApiSchema> {
        let mut entries: Vec<ApiSchema> = self.entries.values().cloned().collect();
        entries.sort_by_key(ApiSchema::key);
        entries
    }
}
