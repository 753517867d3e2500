//! Scope configuration.
//!
//! [`ScopeConfig`] is plain serde data, so it can come from whatever format
//! the application already loads its settings from.

use serde::{Deserialize, Serialize};

/// Default bound on nested resolutions before a cycle is assumed.
///
/// Each level costs several engine frames, so the bound has to trip well
/// before a 2 MiB thread stack runs out.
pub const DEFAULT_MAX_RESOLUTION_DEPTH: usize = 64;

/// Settings of a single scope.
///
/// ```
/// use warren_container::config::ScopeConfig;
///
/// let config: ScopeConfig = serde_json::from_str(r#"{ "name": "request" }"#).unwrap();
/// assert_eq!(config.name.as_deref(), Some("request"));
/// assert_eq!(config.max_resolution_depth, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Shown in logs and snapshots.
    pub name: Option<String>,
    /// Nested resolutions allowed on one thread before failing with an
    /// approximate circular dependency error.
    pub max_resolution_depth: usize,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            name: None,
            max_resolution_depth: DEFAULT_MAX_RESOLUTION_DEPTH,
        }
    }
}

impl ScopeConfig {
    /// Config a child inherits: everything but the name.
    pub fn for_child(&self) -> Self {
        Self {
            name: None,
            ..self.clone()
        }
    }
}
