use serde::Deserialize;
use crate::error::Result;

/// Tunables of a [Runtime](crate::Runtime). Every field has a default, so a partial JSON
/// document is enough to override one of them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// `@Prop` copies object values deeply (API 10 and later) instead of one level deep.
    pub prop_deep_copy: bool,
    /// Number of observed properties on one target above which a per-bind-id property
    /// index is kept, so clearing one binding does not scan every property.
    pub id_refs_threshold: usize,
    /// Number of `clear_binding` calls after which dead weak references are swept in an
    /// idle task.
    pub cleanup_threshold: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            prop_deep_copy: true,
            id_refs_threshold: 16,
            cleanup_threshold: 1000,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
