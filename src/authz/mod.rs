//! Authorization graph: the static join structure, the permitted-id set
//! computed from it, and the per-request cache answering membership queries.

pub mod cache;
pub mod loader;

pub use cache::AuthorizationCache;
pub use loader::load_authorised_ids;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sentinel id used when a root identity is supplied without an id value.
pub const ANY_ID: &str = "ANY_ID";

const SEPARATOR: &str = "::";

/// Pseudo-models that authorize without document ids.
pub const PSEUDO_MODEL_PUBLIC: &str = "public";
pub const PSEUDO_MODEL_SIGNED_IN: &str = "signedIn";
pub const PSEUDO_MODEL_ADMIN: &str = "admin";

/// One permitted document: `model::id`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct AuthorizationId {
    model: String,
    id: String,
}

impl AuthorizationId {
    /// Builds an id in auth format; a missing or empty id becomes the
    /// [`ANY_ID`] sentinel.
    pub fn new(model: &str, id: Option<&str>) -> Self {
        let id = match id {
            Some(id) if !id.is_empty() => id,
            _ => ANY_ID,
        };
        Self {
            model: model.to_string(),
            id: id.to_string(),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let (model, id) = s.split_once(SEPARATOR)?;
        if model.is_empty() || id.is_empty() {
            return None;
        }
        Some(Self {
            model: model.to_string(),
            id: id.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for AuthorizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.model, SEPARATOR, self.id)
    }
}

impl From<AuthorizationId> for String {
    fn from(value: AuthorizationId) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for AuthorizationId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AuthorizationId::parse(&value).ok_or_else(|| format!("invalid authorization id `{value}`"))
    }
}

/// How one model joins to another for authorization-graph traversal.
///
/// An unknown join type on the wire fails deserialization, which aborts
/// configuration loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    /// `source_id_field` on the parent holds the target document's id.
    #[serde(rename = "hasOne", alias = "hasone")]
    HasOne,
    /// `target_id_field` on each target holds the parent's
    /// `source_id_field` value.
    #[serde(rename = "hasMany", alias = "hasmany")]
    HasMany,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelJoin {
    #[serde(alias = "source_join_type")]
    pub source_join_type: JoinType,
    #[serde(alias = "source_id_field")]
    pub source_id_field: String,
    #[serde(alias = "target_model")]
    pub target_model: String,
    #[serde(alias = "target_id_field")]
    pub target_id_field: String,
    #[serde(default)]
    pub joins: Vec<ModelJoin>,
}

/// One root of the authorization structure: the model a caller identity names
/// directly, plus the join tree hanging off it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootModelAccess {
    #[serde(alias = "target_model")]
    pub target_model: String,
    #[serde(default)]
    pub joins: Vec<ModelJoin>,
}

/// Immutable static configuration: the set of root models with their join
/// trees. Tree-shaped; no cycles.
pub type AuthorizationStructure = Vec<RootModelAccess>;
