use serde_json::Value;

use crate::errors::EngineError;
use crate::hooks::{HookPoint, Operation};
use crate::pipeline::{input_document, ResolverPipeline};
use crate::store::Document;

impl ResolverPipeline<'_> {
    /// Creates a new document from `args.input`.
    ///
    /// There is no stored document yet, so document authorization is
    /// evaluated against the input payload itself.
    pub async fn create(
        &self,
        parent: Value,
        mut args: Value,
        info: Value,
    ) -> Result<Document, EngineError> {
        let mut documents: Vec<Document> = Vec::new();
        match self
            .run_create(&parent, &mut args, &info, &mut documents)
            .await
        {
            Ok(document) => Ok(document),
            Err(error) => Err(self
                .fail(Operation::Create, &parent, &mut args, &info, &mut documents, error)
                .await),
        }
    }

    async fn run_create(
        &self,
        parent: &Value,
        args: &mut Value,
        info: &Value,
        documents: &mut Vec<Document>,
    ) -> Result<Document, EngineError> {
        const OP: Operation = Operation::Create;

        self.run_hooks(OP, HookPoint::Initial, parent, args, info, None)
            .await?;
        self.run_hooks(OP, HookPoint::PreValidateArgs, parent, args, info, None)
            .await?;
        // No id-shape check for create; the input carries no id.
        self.run_hooks(OP, HookPoint::PostValidateArgs, parent, args, info, None)
            .await?;

        self.run_hooks(OP, HookPoint::PreArchitecturalAuthorize, parent, args, info, None)
            .await?;
        self.check_architectural_access(OP).await?;
        self.run_hooks(OP, HookPoint::PostArchitecturalAuthorize, parent, args, info, None)
            .await?;

        self.run_hooks(OP, HookPoint::PreDocumentAuthorize, parent, args, info, None)
            .await?;
        let input = input_document(args)?;
        if !self
            .authorizer
            .document_authorisation(self.context, &input)
            .await?
        {
            return Err(EngineError::NotAuthorised(
                "Caller does not have permission to create a document with the provided input"
                    .to_string(),
            ));
        }
        self.run_hooks(OP, HookPoint::PostDocumentAuthorize, parent, args, info, None)
            .await?;

        // Stage the new document; authorize hooks may have amended the input.
        documents.push(input_document(args)?);
        self.run_hooks(OP, HookPoint::PreValidateDocument, parent, args, info, Some(&mut *documents))
            .await?;
        self.run_hooks(OP, HookPoint::PostValidateDocument, parent, args, info, Some(&mut *documents))
            .await?;

        self.run_hooks(OP, HookPoint::PreCommit, parent, args, info, Some(&mut *documents))
            .await?;
        let staged = documents.pop().unwrap_or_default();
        let persisted = self.store.create(self.model_name, staged).await?;
        documents.push(persisted);
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
