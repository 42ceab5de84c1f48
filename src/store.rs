//! Backing-store contract consumed by the resolver engine, plus an in-memory
//! reference backend used for tests and embedded deployments.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use miette::Diagnostic;
use parking_lot::RwLock;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::filter::{total_compare, Predicate};

/// A stored document: one flat JSON object.
pub type Document = serde_json::Map<String, Value>;

/// Field under which the store keys documents.
pub const PRIMARY_KEY_FIELD: &str = "_id";

/// Caller-facing alias for the primary key.
pub const ID_FIELD: &str = "id";

/// Soft-delete timestamp field; a document with this set is treated as
/// deleted everywhere except where a caller asks for it explicitly.
pub const SOFT_DELETE_FIELD: &str = "deletedAt";

/// Remaps the caller-facing `id` field to the store's primary-key field.
pub fn storage_field_name(field: &str) -> &str {
    if field == ID_FIELD {
        PRIMARY_KEY_FIELD
    } else {
        field
    }
}

/// Backend key format: 24 hexadecimal characters.
pub fn is_valid_document_id(id: &str) -> bool {
    id.len() == 24 && id.chars().all(|c| c.is_ascii_hexdigit())
}

/// Reads the primary key of a document, if present.
pub fn document_id(document: &Document) -> Option<&str> {
    document.get(PRIMARY_KEY_FIELD).and_then(Value::as_str)
}

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("Backend error: {0}")]
    #[diagnostic(code(lodestar::store::backend))]
    Backend(String),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(lodestar::store::serde))]
    Serialisation(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    #[serde(rename = "ASC")]
    Ascending,
    #[serde(rename = "DESC")]
    Descending,
}

impl SortDirection {
    /// Numeric direction understood by document stores: 1 ascending,
    /// -1 descending.
    pub fn numeric(self) -> i64 {
        match self {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub limit: Option<u64>,
    pub skip: u64,
    pub sort: Vec<SortKey>,
}

/// Contract the resolver engine consumes from a document store. All calls are
/// async and fallible; the engine never reaches past this trait.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_by_id(&self, model: &str, id: &str) -> Result<Option<Document>, StoreError>;

    async fn find(
        &self,
        model: &str,
        predicate: &Predicate,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError>;

    /// Persists a new document, assigning a primary key when absent, and
    /// returns the stored form.
    async fn create(&self, model: &str, document: Document) -> Result<Document, StoreError>;

    /// Replaces the stored document with the same primary key.
    async fn save(&self, model: &str, document: Document) -> Result<Document, StoreError>;
}

/// In-memory document store. Collections are keyed by model name; queries
/// evaluate compiled predicates directly against the stored JSON.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a document as-is, bypassing the `create` contract. Bootstrap and
    /// test helper.
    pub fn insert(&self, model: &str, document: Document) {
        self.collections
            .write()
            .entry(model.to_string())
            .or_default()
            .push(document);
    }

    pub fn count(&self, model: &str) -> usize {
        self.collections
            .read()
            .get(model)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_by_id(&self, model: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let collections = self.collections.read();
        Ok(collections
            .get(model)
            .and_then(|documents| {
                documents
                    .iter()
                    .find(|document| document_id(document) == Some(id))
            })
            .cloned())
    }

    async fn find(
        &self,
        model: &str,
        predicate: &Predicate,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        let mut matched: Vec<Document> = {
            let collections = self.collections.read();
            collections
                .get(model)
                .map(|documents| {
                    documents
                        .iter()
                        .filter(|document| predicate.matches(document))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };

        sort_documents(&mut matched, &options.sort);

        let limit = options.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(matched
            .into_iter()
            .skip(options.skip as usize)
            .take(limit)
            .collect())
    }

    async fn create(&self, model: &str, mut document: Document) -> Result<Document, StoreError> {
        if document_id(&document).is_none() {
            document.insert(
                PRIMARY_KEY_FIELD.to_string(),
                Value::String(random_document_id()),
            );
        }
        self.collections
            .write()
            .entry(model.to_string())
            .or_default()
            .push(document.clone());
        Ok(document)
    }

    async fn save(&self, model: &str, document: Document) -> Result<Document, StoreError> {
        let id = document_id(&document)
            .ok_or_else(|| StoreError::Backend("cannot save a document without a primary key".into()))?
            .to_string();

        let mut collections = self.collections.write();
        let stored = collections
            .get_mut(model)
            .and_then(|documents| {
                documents
                    .iter_mut()
                    .find(|existing| document_id(existing) == Some(id.as_str()))
            })
            .ok_or_else(|| {
                StoreError::Backend(format!("no document with id {id} in model {model}"))
            })?;
        *stored = document.clone();
        Ok(document)
    }
}

fn sort_documents(documents: &mut [Document], sort: &[SortKey]) {
    if sort.is_empty() {
        return;
    }
    documents.sort_by(|a, b| {
        for key in sort {
            let field = storage_field_name(&key.field);
            let ordering = match key.direction {
                SortDirection::Ascending => total_compare(a.get(field), b.get(field)),
                SortDirection::Descending => total_compare(a.get(field), b.get(field)).reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn random_document_id() -> String {
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
