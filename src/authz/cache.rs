//! Per-request cache of the permitted-document set.

use std::collections::{HashMap, HashSet};

use crate::authz::{
    loader, AuthorizationId, RootModelAccess, PSEUDO_MODEL_ADMIN, PSEUDO_MODEL_PUBLIC,
    PSEUDO_MODEL_SIGNED_IN,
};
use crate::errors::EngineError;
use crate::store::DocumentStore;

/// Holds the complete set of documents one caller may touch for the duration
/// of one request.
///
/// Built by traversing the join graph from the caller's root identities, or
/// restored from a previously serialized set. The id set only grows during
/// load and never shrinks afterwards. Never share one cache across callers
/// with different principals.
#[derive(Debug, Default)]
pub struct AuthorizationCache {
    initialised: bool,
    auth_ids: HashSet<AuthorizationId>,
    ids_per_model: HashMap<String, Vec<String>>,
    has_root_ids: bool,
    is_admin: bool,
}

impl AuthorizationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Traverses the join graph from `root_ids` and populates the cache.
    ///
    /// Root models declared in the structure but missing from `root_ids` are
    /// logged and skipped.
    pub async fn initialise(
        &mut self,
        store: &dyn DocumentStore,
        structure: &[RootModelAccess],
        root_ids: &HashMap<String, String>,
        is_admin: bool,
    ) -> Result<(), EngineError> {
        let missing: Vec<&str> = structure
            .iter()
            .map(|root| root.target_model.as_str())
            .filter(|model| !root_ids.contains_key(*model))
            .collect();
        if !missing.is_empty() {
            tracing::info!(?missing, "root ids missing when initialising authorization cache");
        }

        self.auth_ids = loader::load_authorised_ids(store, structure, root_ids).await?;
        self.has_root_ids = !root_ids.is_empty();
        self.is_admin = is_admin;
        self.rebuild_model_index();
        self.initialised = true;

        tracing::debug!(
            ids = self.auth_ids.len(),
            models = self.ids_per_model.len(),
            "authorization cache initialised"
        );
        Ok(())
    }

    /// Restores a previously serialized permitted-id set without traversal.
    ///
    /// Ownership and invalidation of the serialized blob are the caller's
    /// concern. Admin status is not part of the blob and stays false; the
    /// `signedIn` pseudo-model derives from the set being non-empty.
    pub fn initialise_from_serialised(&mut self, ids: Vec<AuthorizationId>) {
        self.has_root_ids = !ids.is_empty();
        self.auth_ids = ids.into_iter().collect();
        self.is_admin = false;
        self.rebuild_model_index();
        self.initialised = true;
    }

    /// The permitted-id set in a stable order, suitable for external caching.
    pub fn serialise(&self) -> Result<Vec<AuthorizationId>, EngineError> {
        self.check_initialised()?;
        let mut ids: Vec<AuthorizationId> = self.auth_ids.iter().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    /// True when the caller can reach at least one document of `model`, or
    /// the pseudo-model authorizes by itself.
    pub fn has_any_ids_for_model(&self, model: &str) -> Result<bool, EngineError> {
        self.check_initialised()?;
        if let Some(authorised) = self.pseudo_model_authorisation(model) {
            return Ok(authorised);
        }
        Ok(self
            .ids_per_model
            .get(model)
            .map(|ids| !ids.is_empty())
            .unwrap_or(false))
    }

    /// Membership test for one specific document.
    pub fn is_document_authorised(&self, model: &str, id: &str) -> Result<bool, EngineError> {
        self.check_initialised()?;
        if let Some(authorised) = self.pseudo_model_authorisation(model) {
            return Ok(authorised);
        }
        let authorised = self
            .auth_ids
            .contains(&AuthorizationId::new(model, Some(id)));
        tracing::debug!(model, id, authorised, "document authorisation check");
        Ok(authorised)
    }

    /// All permitted ids for one model; empty when none.
    pub fn ids_for_model(&self, model: &str) -> Result<Vec<String>, EngineError> {
        self.check_initialised()?;
        Ok(self.ids_per_model.get(model).cloned().unwrap_or_default())
    }

    fn check_initialised(&self) -> Result<(), EngineError> {
        if !self.initialised {
            return Err(EngineError::Uninitialised);
        }
        Ok(())
    }

    fn pseudo_model_authorisation(&self, model: &str) -> Option<bool> {
        match model {
            PSEUDO_MODEL_PUBLIC => Some(true),
            PSEUDO_MODEL_SIGNED_IN => Some(self.has_root_ids),
            PSEUDO_MODEL_ADMIN => Some(self.is_admin),
            _ => None,
        }
    }

    fn rebuild_model_index(&mut self) {
        let mut index: HashMap<String, Vec<String>> = HashMap::new();
        for auth_id in &self.auth_ids {
            index
                .entry(auth_id.model().to_string())
                .or_default()
                .push(auth_id.id().to_string());
        }
        self.ids_per_model = index;
    }
}
