//! Resolver pipeline: the staged execution protocol shared by the five
//! operation variants.
//!
//! Every operation walks the same stage sequence — argument validation,
//! architectural authorization, fetch, document authorization, document
//! validation, commit, redaction — with hooks before and after each step.
//! Hooks at one stage run sequentially; later hooks see the mutations of
//! earlier ones. Any failure jumps to the ERROR stage exactly once and leaves
//! the pipeline as a normalised error.

mod create;
mod delete;
mod list;
mod read;
mod update;

pub use list::ListResult;

use std::collections::HashSet;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::Value;

use crate::authz::AuthorizationCache;
use crate::errors::EngineError;
use crate::filter::Predicate;
use crate::hooks::{HookInvocation, HookPoint, HookRegistry, Operation};
use crate::settings::ListLimits;
use crate::store::{is_valid_document_id, Document, DocumentStore, ID_FIELD, PRIMARY_KEY_FIELD};

/// Fields kept on every outbound document regardless of the permitted set.
pub const FIELDS_ALWAYS_PERMITTED: [&str; 2] = [PRIMARY_KEY_FIELD, ID_FIELD];

/// Per-request state shared by the pipeline, its hooks, and the authorizer.
/// Owned by one request; never a process-wide singleton.
#[derive(Debug)]
pub struct SharedContext {
    pub auth: AuthorizationCache,
    pub limits: ListLimits,
}

/// Authorization and redaction collaborators for one model, supplied by the
/// host application.
#[async_trait]
pub trait ModelAuthorizer: Send + Sync {
    /// Coarse check: may this caller perform `operation` on the model at all?
    async fn architectural_authorisation(
        &self,
        context: &SharedContext,
        operation: Operation,
    ) -> Result<bool, EngineError>;

    /// Fine-grained check on one specific document. For create this receives
    /// the input payload, since no stored document exists yet.
    async fn document_authorisation(
        &self,
        context: &SharedContext,
        document: &Document,
    ) -> Result<bool, EngineError>;

    /// Fields of `document` the caller may see; everything else is redacted.
    async fn permitted_fields(
        &self,
        context: &SharedContext,
        document: &Document,
    ) -> Result<HashSet<String>, EngineError>;

    /// Authorization-derived predicate restricting list queries, if any.
    async fn list_filter(&self, context: &SharedContext) -> Result<Option<Predicate>, EngineError>;
}

/// Borrowed collaborators for one pipeline invocation.
pub struct PipelineParams<'a> {
    pub model_name: &'a str,
    pub store: &'a dyn DocumentStore,
    pub hooks: &'a HookRegistry,
    pub authorizer: &'a dyn ModelAuthorizer,
    pub context: &'a SharedContext,
}

/// One resolver-pipeline invocation for one model. Construct per operation;
/// all mutable state lives inside the operation call itself.
pub struct ResolverPipeline<'a> {
    pub(crate) model_name: &'a str,
    pub(crate) store: &'a dyn DocumentStore,
    pub(crate) hooks: &'a HookRegistry,
    pub(crate) authorizer: &'a dyn ModelAuthorizer,
    pub(crate) context: &'a SharedContext,
}

impl<'a> ResolverPipeline<'a> {
    pub fn new(params: PipelineParams<'a>) -> Self {
        Self {
            model_name: params.model_name,
            store: params.store,
            hooks: params.hooks,
            authorizer: params.authorizer,
            context: params.context,
        }
    }

    /// Runs every matching hook at `point` sequentially, in registry order.
    pub(crate) async fn run_hooks(
        &self,
        operation: Operation,
        point: HookPoint,
        parent: &Value,
        args: &mut Value,
        info: &Value,
        mut documents: Option<&mut Vec<Document>>,
    ) -> Result<(), EngineError> {
        let handlers = self.hooks.hooks_for(operation, point);
        if handlers.is_empty() {
            return Ok(());
        }
        tracing::debug!(%operation, %point, handlers = handlers.len(), "running hooks");
        for handler in handlers {
            handler
                .call(HookInvocation {
                    parent,
                    args: &mut *args,
                    context: self.context,
                    info,
                    documents: documents.as_deref_mut(),
                })
                .await?;
        }
        Ok(())
    }

    /// Coarse authorization gate shared by all operations.
    pub(crate) async fn check_architectural_access(
        &self,
        operation: Operation,
    ) -> Result<(), EngineError> {
        if self
            .authorizer
            .architectural_authorisation(self.context, operation)
            .await?
        {
            return Ok(());
        }
        Err(EngineError::NoArchitecturalAccess {
            model: self.model_name.to_string(),
            operation,
        })
    }

    /// Removes every top-level field not in the permitted set; primary-key
    /// fields are always retained.
    pub(crate) async fn redact_document(&self, document: Document) -> Result<Document, EngineError> {
        let permitted = self
            .authorizer
            .permitted_fields(self.context, &document)
            .await?;
        Ok(remove_unauthorised_fields(document, &permitted))
    }

    /// Redacts each document independently, concurrently.
    pub(crate) async fn redact_documents(
        &self,
        documents: Vec<Document>,
    ) -> Result<Vec<Document>, EngineError> {
        try_join_all(
            documents
                .into_iter()
                .map(|document| self.redact_document(document)),
        )
        .await
    }

    /// Error exit shared by all operations: logs, runs the ERROR hooks once
    /// with the last known document state, and normalises the error.
    pub(crate) async fn fail(
        &self,
        operation: Operation,
        parent: &Value,
        args: &mut Value,
        info: &Value,
        documents: &mut Vec<Document>,
        error: EngineError,
    ) -> EngineError {
        tracing::error!(
            model = self.model_name,
            %operation,
            error = %error,
            "pipeline operation failed"
        );
        let documents = if documents.is_empty() {
            None
        } else {
            Some(&mut *documents)
        };
        if let Err(hook_error) = self
            .run_hooks(operation, HookPoint::Error, parent, args, info, documents)
            .await
        {
            // An error hook must not mask the original failure.
            tracing::error!(error = %hook_error, "error hook failed");
        }
        normalise_error(error)
    }
}

pub(crate) fn remove_unauthorised_fields(
    mut document: Document,
    permitted: &HashSet<String>,
) -> Document {
    document.retain(|field, _| {
        FIELDS_ALWAYS_PERMITTED.contains(&field.as_str()) || permitted.contains(field)
    });
    document
}

/// Caller-fixable variants pass through; anything else is logged in full and
/// replaced by the generic internal error so backend detail never escapes.
pub(crate) fn normalise_error(error: EngineError) -> EngineError {
    match error {
        EngineError::InvalidInput(_)
        | EngineError::NotFound(_)
        | EngineError::NoArchitecturalAccess { .. }
        | EngineError::NotAuthorised(_)
        | EngineError::UnknownFilterOperator { .. } => error,
        other => {
            tracing::error!(error = %other, code = other.code(), "error normalised at pipeline boundary");
            EngineError::Internal
        }
    }
}

/// The `input` object of a mutation's arguments.
pub(crate) fn input_document(args: &Value) -> Result<Document, EngineError> {
    match args.get("input") {
        Some(Value::Object(map)) => Ok(map.clone()),
        _ => Err(EngineError::InvalidInput("`input` must be an object".to_string())),
    }
}

/// The `id` argument of read/delete.
pub(crate) fn arg_id(args: &Value) -> Result<String, EngineError> {
    args.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| EngineError::InvalidInput("`id` is required".to_string()))
}

/// The `input.id` argument of update.
pub(crate) fn input_id(args: &Value) -> Result<String, EngineError> {
    args.get("input")
        .and_then(|input| input.get(ID_FIELD))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| EngineError::InvalidInput("`input.id` is required".to_string()))
}

pub(crate) fn require_key_format(id: &str) -> Result<(), EngineError> {
    if is_valid_document_id(id) {
        return Ok(());
    }
    Err(EngineError::InvalidInput(format!(
        "id {id} is not a valid document id"
    )))
}
