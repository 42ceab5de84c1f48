use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::authz::AuthorizationStructure;
use crate::errors::EngineError;

/// Static engine configuration: list-query limits plus the authorization
/// join structure. Immutable after load; changes require a reload.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub limits: ListLimits,
    /// Root models and their join trees. Entries accept the camelCase wire
    /// names (`targetModel`, `sourceJoinType`, ...) and their snake_case
    /// equivalents, which config files use.
    #[serde(default)]
    pub authorisation_structure: AuthorizationStructure,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct ListLimits {
    /// Page size applied when the caller omits `limit`.
    #[serde(default)]
    pub default_list_query_limit: Option<u64>,
    /// Hard ceiling on any requested page size.
    #[serde(default)]
    pub max_list_query_limit: Option<u64>,
}

impl Settings {
    /// Loads settings from an optional file with environment overrides, e.g.
    /// `LODESTAR__LIMITS__MAX_LIST_QUERY_LIMIT=500`.
    pub fn load(path: &str) -> Result<Self, EngineError> {
        let mut builder = config::Config::builder();

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        builder = builder.add_source(config::Environment::with_prefix("LODESTAR").separator("__"));

        let cfg = builder.build()?;
        let settings: Settings = cfg.try_deserialize()?;
        Ok(settings)
    }
}
