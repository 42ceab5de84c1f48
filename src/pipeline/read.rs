use serde_json::Value;

use crate::errors::EngineError;
use crate::hooks::{HookPoint, Operation};
use crate::pipeline::{arg_id, require_key_format, ResolverPipeline};
use crate::store::Document;

impl ResolverPipeline<'_> {
    /// Fetches one document by primary key, checking that the caller may see
    /// it.
    pub async fn read(
        &self,
        parent: Value,
        mut args: Value,
        info: Value,
    ) -> Result<Document, EngineError> {
        let mut documents: Vec<Document> = Vec::new();
        match self.run_read(&parent, &mut args, &info, &mut documents).await {
            Ok(document) => Ok(document),
            Err(error) => Err(self
                .fail(Operation::Read, &parent, &mut args, &info, &mut documents, error)
                .await),
        }
    }

    async fn run_read(
        &self,
        parent: &Value,
        args: &mut Value,
        info: &Value,
        documents: &mut Vec<Document>,
    ) -> Result<Document, EngineError> {
        const OP: Operation = Operation::Read;

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
        let document = self
            .store
            .find_by_id(self.model_name, &id)
            .await?
            .ok_or_else(|| {
                // Absence and denial are indistinguishable here on purpose.
                EngineError::NotFound(format!(
                    "Document with id {id} does not exist, or you do not have permission to access it"
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

        let redacted = self
            .redact_document(documents.pop().unwrap_or_default())
            .await?;
        documents.push(redacted);
        self.run_hooks(OP, HookPoint::Final, parent, args, info, Some(&mut *documents))
            .await?;

        Ok(documents.pop().unwrap_or_default())
    }
}
