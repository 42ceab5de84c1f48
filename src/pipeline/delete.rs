use chrono::{SecondsFormat, Utc};
use serde_json::Value;

use crate::errors::EngineError;
use crate::hooks::{HookPoint, Operation};
use crate::pipeline::{arg_id, require_key_format, ResolverPipeline};
use crate::store::{Document, SOFT_DELETE_FIELD};

impl ResolverPipeline<'_> {
    /// Soft-deletes one document: stamps the deletion timestamp and persists.
    /// Documents are never removed from the store.
    pub async fn delete(
        &self,
        parent: Value,
        mut args: Value,
        info: Value,
    ) -> Result<Document, EngineError> {
        let mut documents: Vec<Document> = Vec::new();
        match self
            .run_delete(&parent, &mut args, &info, &mut documents)
            .await
        {
            Ok(document) => Ok(document),
            Err(error) => Err(self
                .fail(Operation::Delete, &parent, &mut args, &info, &mut documents, error)
                .await),
        }
    }

    async fn run_delete(
        &self,
        parent: &Value,
        args: &mut Value,
        info: &Value,
        documents: &mut Vec<Document>,
    ) -> Result<Document, EngineError> {
        const OP: Operation = Operation::Delete;

        self.run_hooks(OP, HookPoint::Initial, parent, args, info, None)
            .await?;
        self.run_hooks(OP, HookPoint::PreValidateArgs, parent, args, info, None)
            .await?;
        let id = arg_id(args)?;
        require_key_format(&id)?;
        self.run_hooks(OP, HookPoint::PostValidateArgs, parent, args, info, None)
            .await?;

        self.run_hooks(OP, HookPoint::PreArchitecturalAuthorize, parent, args, info, None)
            .await?;
        self.check_architectural_access(OP).await?;
        self.run_hooks(OP, HookPoint::PostArchitecturalAuthorize, parent, args, info, None)
            .await?;

        self.run_hooks(OP, HookPoint::PreFetch, parent, args, info, None)
            .await?;
        // A second delete of the same document lands here: the soft-deleted
        // document no longer matches.
        let document = self
            .fetch_live_document(&id)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!(
                    "Document with id {id} does not exist, or has already been deleted"
                ))
            })?;
        documents.push(document);
        self.run_hooks(OP, HookPoint::PostFetch, parent, args, info, Some(&mut *documents))
            .await?;

        self.run_hooks(OP, HookPoint::PreDocumentAuthorize, parent, args, info, Some(&mut *documents))
            .await?;
        if let Some(fetched) = documents.first() {
            if !self
                .authorizer
                .document_authorisation(self.context, fetched)
                .await?
            {
                return Err(EngineError::NotAuthorised(format!(
                    "Caller does not have permission to access document with id {id}"
                )));
            }
        }
        self.run_hooks(OP, HookPoint::PostDocumentAuthorize, parent, args, info, Some(&mut *documents))
            .await?;

        self.run_hooks(OP, HookPoint::PreCommit, parent, args, info, Some(&mut *documents))
            .await?;
        if let Some(document) = documents.first_mut() {
            document.insert(
                SOFT_DELETE_FIELD.to_string(),
                Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
        }
        let stamped = documents.pop().unwrap_or_default();
        let saved = self.store.save(self.model_name, stamped).await?;
        documents.push(saved);
        self.run_hooks(OP, HookPoint::PostCommit, parent, args, info, Some(&mut *documents))
            .await?;

        let redacted = self
            .redact_document(documents.pop().unwrap_or_default())
            .await?;
        documents.push(redacted);
        self.run_hooks(OP, HookPoint::Final, parent, args, info, Some(&mut *documents))
            .await?;

        Ok(documents.pop().unwrap_or_default())
    }
}
