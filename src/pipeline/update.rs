use serde_json::Value;

use crate::errors::EngineError;
use crate::filter::{Comparison, Predicate};
use crate::hooks::{HookPoint, Operation};
use crate::pipeline::{input_document, input_id, require_key_format, ResolverPipeline};
use crate::store::{Document, FindOptions, ID_FIELD, PRIMARY_KEY_FIELD, SOFT_DELETE_FIELD};

impl ResolverPipeline<'_> {
    /// Merges `args.input` onto the stored document it identifies and
    /// persists the result.
    ///
    /// Document authorization runs against the fetched, pre-mutation
    /// document.
    pub async fn update(
        &self,
        parent: Value,
        mut args: Value,
        info: Value,
    ) -> Result<Document, EngineError> {
        let mut documents: Vec<Document> = Vec::new();
        match self
            .run_update(&parent, &mut args, &info, &mut documents)
            .await
        {
            Ok(document) => Ok(document),
            Err(error) => Err(self
                .fail(Operation::Update, &parent, &mut args, &info, &mut documents, error)
                .await),
        }
    }

    async fn run_update(
        &self,
        parent: &Value,
        args: &mut Value,
        info: &Value,
        documents: &mut Vec<Document>,
    ) -> Result<Document, EngineError> {
        const OP: Operation = Operation::Update;

        self.run_hooks(OP, HookPoint::Initial, parent, args, info, None)
            .await?;
        self.run_hooks(OP, HookPoint::PreValidateArgs, parent, args, info, None)
            .await?;
        let id = input_id(args)?;
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

        // Merge every input field except the id fields onto the stored
        // document.
        let input = input_document(args)?;
        if let Some(document) = documents.first_mut() {
            for (field, value) in input {
                if field == ID_FIELD || field == PRIMARY_KEY_FIELD {
                    continue;
                }
                document.insert(field, value);
            }
        }

        self.run_hooks(OP, HookPoint::PreValidateDocument, parent, args, info, Some(&mut *documents))
            .await?;
        self.run_hooks(OP, HookPoint::PostValidateDocument, parent, args, info, Some(&mut *documents))
            .await?;

        self.run_hooks(OP, HookPoint::PreCommit, parent, args, info, Some(&mut *documents))
            .await?;
        let merged = documents.pop().unwrap_or_default();
        let saved = self.store.save(self.model_name, merged).await?;
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

    /// Fetches the document with `id` that has not been soft-deleted.
    pub(crate) async fn fetch_live_document(
        &self,
        id: &str,
    ) -> Result<Option<Document>, EngineError> {
        let predicate = Predicate::And(vec![
            Predicate::Field {
                field: PRIMARY_KEY_FIELD.to_string(),
                tests: vec![Comparison::Eq(Value::String(id.to_string()))],
            },
            Predicate::Field {
                field: SOFT_DELETE_FIELD.to_string(),
                tests: vec![Comparison::Eq(Value::Null)],
            },
        ]);
        let options = FindOptions {
            limit: Some(1),
            ..Default::default()
        };
        let mut found = self.store.find(self.model_name, &predicate, &options).await?;
        Ok(found.pop())
    }
}
