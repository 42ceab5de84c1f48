//! Extension hooks for the resolver pipeline.
//!
//! Handlers are registered explicitly by the host application at startup and
//! bound to an operation, an operation category, or the wildcard. At each
//! pipeline stage the matching handlers run sequentially: exact-operation
//! matches first, then category matches, then wildcard matches, each group in
//! ascending `order`.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::EngineError;
use crate::pipeline::SharedContext;
use crate::store::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    List,
}

impl Operation {
    pub fn category(self) -> OperationCategory {
        match self {
            Operation::Read | Operation::List => OperationCategory::Queries,
            Operation::Create | Operation::Update | Operation::Delete => {
                OperationCategory::Mutations
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::List => "list",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationCategory {
    Queries,
    Mutations,
}

impl OperationCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationCategory::Queries => "queries",
            OperationCategory::Mutations => "mutations",
        }
    }
}

impl fmt::Display for OperationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a handler is bound to: one operation, a whole category, or everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookBinding {
    Operation(Operation),
    Category(OperationCategory),
    All,
}

impl HookBinding {
    fn matches(self, operation: Operation) -> bool {
        match self {
            HookBinding::Operation(bound) => bound == operation,
            HookBinding::Category(category) => category == operation.category(),
            HookBinding::All => true,
        }
    }

    /// Exact-operation bindings run before category bindings, which run
    /// before the wildcard.
    fn specificity(self) -> u8 {
        match self {
            HookBinding::Operation(_) => 0,
            HookBinding::Category(_) => 1,
            HookBinding::All => 2,
        }
    }
}

/// The fixed stages of the resolver pipeline where extension code may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    Initial,
    PreValidateArgs,
    PostValidateArgs,
    PreArchitecturalAuthorize,
    PostArchitecturalAuthorize,
    PreFetch,
    PostFetch,
    PreDocumentAuthorize,
    PostDocumentAuthorize,
    PreValidateDocument,
    PostValidateDocument,
    PreCommit,
    PostCommit,
    Final,
    Error,
}

impl HookPoint {
    pub fn as_str(self) -> &'static str {
        match self {
            HookPoint::Initial => "initial",
            HookPoint::PreValidateArgs => "preValidateArgs",
            HookPoint::PostValidateArgs => "postValidateArgs",
            HookPoint::PreArchitecturalAuthorize => "preArchitecturalAuthorize",
            HookPoint::PostArchitecturalAuthorize => "postArchitecturalAuthorize",
            HookPoint::PreFetch => "preFetch",
            HookPoint::PostFetch => "postFetch",
            HookPoint::PreDocumentAuthorize => "preDocumentAuthorize",
            HookPoint::PostDocumentAuthorize => "postDocumentAuthorize",
            HookPoint::PreValidateDocument => "preValidateDocument",
            HookPoint::PostValidateDocument => "postValidateDocument",
            HookPoint::PreCommit => "preCommit",
            HookPoint::PostCommit => "postCommit",
            HookPoint::Final => "final",
            HookPoint::Error => "error",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call view handed to a hook handler. Mutations made to `args` and
/// `documents` are visible to later hooks and to the pipeline itself.
pub struct HookInvocation<'a> {
    pub parent: &'a Value,
    pub args: &'a mut Value,
    pub context: &'a SharedContext,
    pub info: &'a Value,
    /// Current working document(s); `None` before anything is staged or
    /// fetched.
    pub documents: Option<&'a mut Vec<Document>>,
}

#[async_trait]
pub trait HookHandler: Send + Sync {
    async fn call(&self, invocation: HookInvocation<'_>) -> Result<(), EngineError>;
}

struct HookEntry {
    binding: HookBinding,
    point: HookPoint,
    order: i32,
    handler: Arc<dyn HookHandler>,
}

/// Registry of extension handlers, populated by the host application at
/// startup and immutable afterwards.
#[derive(Default)]
pub struct HookRegistry {
    entries: Vec<HookEntry>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        binding: HookBinding,
        point: HookPoint,
        order: i32,
        handler: Arc<dyn HookHandler>,
    ) {
        self.entries.push(HookEntry {
            binding,
            point,
            order,
            handler,
        });
    }

    /// Handlers applicable to `operation` at `point`, in execution order.
    /// Ties within a group keep registration order.
    pub fn hooks_for(&self, operation: Operation, point: HookPoint) -> Vec<Arc<dyn HookHandler>> {
        let mut matched: Vec<&HookEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.point == point && entry.binding.matches(operation))
            .collect();
        matched.sort_by_key(|entry| (entry.binding.specificity(), entry.order));
        matched
            .into_iter()
            .map(|entry| Arc::clone(&entry.handler))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for entry in &self.entries {
            list.entry(&(entry.binding, entry.point, entry.order));
        }
        list.finish()
    }
}
