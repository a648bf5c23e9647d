use crate::core::{DbError, Result};
use crate::storage::DeleteRule;
use serde::{Deserialize, Serialize};

/// Persistence context configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextOptions {
    /// Include row values in log events (off by default)
    pub sensitive_data_logging: bool,

    /// Delete rows referencing a removed row instead of failing the save
    pub cascade_delete: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            sensitive_data_logging: false,
            cascade_delete: true,
        }
    }
}

impl ContextOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable logging of row values
    pub fn sensitive_data_logging(mut self, enabled: bool) -> Self {
        self.sensitive_data_logging = enabled;
        self
    }

    /// Choose between cascading and restricted deletes
    pub fn cascade_delete(mut self, enabled: bool) -> Self {
        self.cascade_delete = enabled;
        self
    }

    /// Parse options from JSON, e.g. `{"cascade_delete": false}`.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| DbError::Configuration(e.to_string()))
    }

    pub(crate) fn delete_rule(&self) -> DeleteRule {
        if self.cascade_delete {
            DeleteRule::Cascade
        } else {
            DeleteRule::Restrict
        }
    }
}
