//! Shared fixtures for the resolver-pipeline integration tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use lodestar::authz::AuthorizationCache;
use lodestar::errors::EngineError;
use lodestar::filter::Predicate;
use lodestar::hooks::{HookHandler, HookInvocation, Operation};
use lodestar::pipeline::{ModelAuthorizer, SharedContext};
use lodestar::settings::ListLimits;
use lodestar::store::{Document, MemoryStore};

pub const ID_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaa";
pub const ID_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbb";
pub const ID_C: &str = "cccccccccccccccccccccccc";

pub fn doc(value: Value) -> Document {
    value.as_object().cloned().expect("document literal")
}

/// A context whose cache is initialised but empty; pipeline tests drive
/// authorization through the scripted authorizer instead.
pub async fn empty_context(store: &MemoryStore) -> SharedContext {
    context_with_limits(store, ListLimits::default()).await
}

pub async fn context_with_limits(store: &MemoryStore, limits: ListLimits) -> SharedContext {
    let mut auth = AuthorizationCache::new();
    auth.initialise(store, &[], &HashMap::new(), false)
        .await
        .expect("cache initialise");
    SharedContext { auth, limits }
}

/// Authorizer scripted per test: which gates pass and which fields survive
/// redaction.
pub struct ScriptedAuthorizer {
    pub architectural: bool,
    pub authorise_documents: bool,
    /// `None` permits every field of the document.
    pub permitted: Option<HashSet<String>>,
    pub list_predicate: Option<Predicate>,
}

impl Default for ScriptedAuthorizer {
    fn default() -> Self {
        Self {
            architectural: true,
            authorise_documents: true,
            permitted: None,
            list_predicate: None,
        }
    }
}

impl ScriptedAuthorizer {
    pub fn permit_only(fields: &[&str]) -> Self {
        Self {
            permitted: Some(fields.iter().map(|f| f.to_string()).collect()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl ModelAuthorizer for ScriptedAuthorizer {
    async fn architectural_authorisation(
        &self,
        _context: &SharedContext,
        _operation: Operation,
    ) -> Result<bool, EngineError> {
        Ok(self.architectural)
    }

    async fn document_authorisation(
        &self,
        _context: &SharedContext,
        _document: &Document,
    ) -> Result<bool, EngineError> {
        Ok(self.authorise_documents)
    }

    async fn permitted_fields(
        &self,
        _context: &SharedContext,
        document: &Document,
    ) -> Result<HashSet<String>, EngineError> {
        Ok(match &self.permitted {
            Some(fields) => fields.clone(),
            None => document.keys().cloned().collect(),
        })
    }

    async fn list_filter(
        &self,
        _context: &SharedContext,
    ) -> Result<Option<Predicate>, EngineError> {
        Ok(self.list_predicate.clone())
    }
}

/// Appends its label to a shared log on every call.
pub struct RecordingHook {
    pub label: String,
    pub log: Arc<Mutex<Vec<String>>>,
}

impl RecordingHook {
    pub fn new(label: &str, log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn HookHandler> {
        Arc::new(Self {
            label: label.to_string(),
            log: Arc::clone(log),
        })
    }
}

#[async_trait]
impl HookHandler for RecordingHook {
    async fn call(&self, _invocation: HookInvocation<'_>) -> Result<(), EngineError> {
        self.log.lock().push(self.label.clone());
        Ok(())
    }
}

/// Sets one key on the args object, demonstrating that hook mutations are
/// visible downstream.
pub struct ArgsMutatingHook {
    pub key: String,
    pub value: Value,
}

#[async_trait]
impl HookHandler for ArgsMutatingHook {
    async fn call(&self, invocation: HookInvocation<'_>) -> Result<(), EngineError> {
        if let Some(map) = invocation.args.as_object_mut() {
            map.insert(self.key.clone(), self.value.clone());
        }
        Ok(())
    }
}

/// Sets one field on every working document.
pub struct DocumentMutatingHook {
    pub field: String,
    pub value: Value,
}

#[async_trait]
impl HookHandler for DocumentMutatingHook {
    async fn call(&self, invocation: HookInvocation<'_>) -> Result<(), EngineError> {
        if let Some(documents) = invocation.documents {
            for document in documents.iter_mut() {
                document.insert(self.field.clone(), self.value.clone());
            }
        }
        Ok(())
    }
}

/// Fails unconditionally with the given error constructor.
pub struct FailingHook;

#[async_trait]
impl HookHandler for FailingHook {
    async fn call(&self, _invocation: HookInvocation<'_>) -> Result<(), EngineError> {
        Err(EngineError::InvalidInput("rejected by hook".to_string()))
    }
}
