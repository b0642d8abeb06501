//! Resolved deployment environment.

use std::collections::BTreeMap;
use std::sync::Arc;

/// Key/value settings handed to the start backend.
///
/// Resolved once from the base `environment` map and the selected variant
/// before a run begins; cheap to clone and never modified afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    variant: Option<String>,
    vars: Arc<BTreeMap<String, String>>,
}

impl Environment {
    /// Creates an environment from resolved variables.
    pub fn new(variant: Option<String>, vars: BTreeMap<String, String>) -> Self {
        Self {
            variant,
            vars: Arc::new(vars),
        }
    }

    /// Name of the selected variant, if any.
    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }

    /// Looks up a variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Iterates over variables in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
