//! Registry for Action instances
//!
//! An explicit map from action name to instance, populated at declaration
//! time. Duplicate names within one registry are rejected.

use dashmap::DashMap;
use std::sync::Arc;

use crate::core::errors::{FlowError, Result};
use crate::flow::action::Action;

/// Registry of named actions
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: Arc<DashMap<String, Arc<dyn Action>>>,
}

impl ActionRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            actions: Arc::new(DashMap::new()),
        }
    }

    /// Register an action, rejecting duplicate names
    pub fn register(&self, action: Arc<dyn Action>) -> Result<()> {
        let name = action.name().to_string();
        match self.actions.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(FlowError::duplicate_action(name))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(action);
                Ok(())
            }
        }
    }

    /// Get an action by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).map(|entry| entry.value().clone())
    }

    /// Check if an action is registered
    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// List all registered action names
    pub fn list(&self) -> Vec<String> {
        self.actions.iter().map(|entry| entry.key().clone()).collect()
    }
}
