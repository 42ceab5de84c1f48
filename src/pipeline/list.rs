use base64ct::{Base64UrlUnpadded, Encoding};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::errors::EngineError;
use crate::filter::{self, FilterNode, Predicate};
use crate::hooks::{HookPoint, Operation};
use crate::pipeline::ResolverPipeline;
use crate::store::{Document, FindOptions, SortKey, SOFT_DELETE_FIELD};

/// Hard fallback when neither the caller nor the context supplies a limit.
const DEFAULT_LIST_QUERY_LIMIT: u64 = 100;

/// One page of list results plus the opaque continuation token.
///
/// The token is withheld only when the page came back short of the requested
/// limit; a full final page therefore still yields a token whose next fetch
/// is empty. Known limitation under concurrent writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResult {
    pub results: Vec<Document>,
    pub next_token: Option<String>,
}

/// Payload of the opaque position token.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PositionToken {
    #[serde(default)]
    skip: u64,
}

impl ResolverPipeline<'_> {
    /// Lists documents matching the caller's filter, constrained by the
    /// authorization-derived filter and the implicit not-soft-deleted
    /// constraint, with pagination and per-document redaction.
    pub async fn list(
        &self,
        parent: Value,
        mut args: Value,
        info: Value,
    ) -> Result<ListResult, EngineError> {
        let mut documents: Vec<Document> = Vec::new();
        match self.run_list(&parent, &mut args, &info, &mut documents).await {
            Ok(result) => Ok(result),
            Err(error) => Err(self
                .fail(Operation::List, &parent, &mut args, &info, &mut documents, error)
                .await),
        }
    }

    async fn run_list(
        &self,
        parent: &Value,
        args: &mut Value,
        info: &Value,
        documents: &mut Vec<Document>,
    ) -> Result<ListResult, EngineError> {
        const OP: Operation = Operation::List;

        ensure_soft_delete_constraint(args);

        self.run_hooks(OP, HookPoint::Initial, parent, args, info, None)
            .await?;
        self.run_hooks(OP, HookPoint::PreValidateArgs, parent, args, info, None)
            .await?;
        self.run_hooks(OP, HookPoint::PostValidateArgs, parent, args, info, None)
            .await?;

        self.run_hooks(OP, HookPoint::PreArchitecturalAuthorize, parent, args, info, None)
            .await?;
        self.check_architectural_access(OP).await?;
        self.run_hooks(OP, HookPoint::PostArchitecturalAuthorize, parent, args, info, None)
            .await?;

        self.run_hooks(OP, HookPoint::PreFetch, parent, args, info, None)
            .await?;

        let caller_nodes = FilterNode::from_value(args.get("filter").unwrap_or(&Value::Null))?;
        let caller_predicate = filter::compile(&caller_nodes)?;
        tracing::debug!(predicate = ?caller_predicate, "compiled caller filter");
        let auth_predicate = self.authorizer.list_filter(self.context).await?;
        tracing::debug!(predicate = ?auth_predicate, "authorization filter");

        let mut parts = Vec::new();
        if !caller_predicate.is_empty() {
            parts.push(caller_predicate);
        }
        if let Some(auth_predicate) = auth_predicate {
            if !auth_predicate.is_empty() {
                parts.push(auth_predicate);
            }
        }
        let predicate = Predicate::conjunction(parts);

        let limit = self.effective_limit(args);
        let skip = decoded_skip(args);
        let options = FindOptions {
            limit: Some(limit),
            skip,
            sort: sort_keys(args),
        };
        tracing::debug!(limit, skip, "fetching list page");
        *documents = self.store.find(self.model_name, &predicate, &options).await?;

        self.run_hooks(OP, HookPoint::PostFetch, parent, args, info, Some(&mut *documents))
            .await?;
        self.run_hooks(OP, HookPoint::PreDocumentAuthorize, parent, args, info, Some(&mut *documents))
            .await?;
        self.run_hooks(OP, HookPoint::PostDocumentAuthorize, parent, args, info, Some(&mut *documents))
            .await?;

        let page_len = documents.len() as u64;
        *documents = self.redact_documents(std::mem::take(documents)).await?;
        self.run_hooks(OP, HookPoint::Final, parent, args, info, Some(&mut *documents))
            .await?;

        // End-of-list heuristic: a short page means there is nothing more.
        let next_token =
            (page_len > 0 && page_len == limit).then(|| encode_position_token(skip + limit));

        Ok(ListResult {
            results: std::mem::take(documents),
            next_token,
        })
    }

    /// Explicit arg, else context default, else the hard fallback; clamped to
    /// the context maximum when one is configured.
    fn effective_limit(&self, args: &Value) -> u64 {
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .or(self.context.limits.default_list_query_limit)
            .unwrap_or(DEFAULT_LIST_QUERY_LIMIT);
        match self.context.limits.max_list_query_limit {
            Some(max) => limit.min(max),
            None => limit,
        }
    }
}

/// Adds the not-soft-deleted constraint unless the caller's filter already
/// mentions the soft-delete field anywhere in its tree.
fn ensure_soft_delete_constraint(args: &mut Value) {
    if args
        .get("filter")
        .map(filter_mentions_soft_delete)
        .unwrap_or(false)
    {
        return;
    }
    let Some(map) = args.as_object_mut() else {
        return;
    };
    let filter = map
        .entry("filter")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Some(filter_map) = filter.as_object_mut() {
        filter_map.insert(SOFT_DELETE_FIELD.to_string(), json!({ "eq": null }));
    }
}

fn filter_mentions_soft_delete(filter: &Value) -> bool {
    match filter {
        Value::Object(map) => {
            map.contains_key(SOFT_DELETE_FIELD)
                || map.values().any(filter_mentions_soft_delete)
        }
        Value::Array(items) => items.iter().any(filter_mentions_soft_delete),
        _ => false,
    }
}

/// Skip offset from the opaque `nextToken` argument; an unparseable token
/// silently means the start of the list.
fn decoded_skip(args: &Value) -> u64 {
    let Some(token) = args.get("nextToken").and_then(Value::as_str) else {
        return 0;
    };
    match decode_position_token(token) {
        Some(position) => position.skip,
        None => {
            tracing::warn!("could not decode next token; starting from the beginning of the list");
            0
        }
    }
}

fn decode_position_token(token: &str) -> Option<PositionToken> {
    let bytes = Base64UrlUnpadded::decode_vec(token).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn encode_position_token(skip: u64) -> String {
    let payload = serde_json::to_vec(&PositionToken { skip }).unwrap_or_default();
    Base64UrlUnpadded::encode_string(&payload)
}

fn sort_keys(args: &Value) -> Vec<SortKey> {
    let Some(entries) = args.get("sort").and_then(Value::as_array) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| serde_json::from_value::<SortKey>(entry.clone()).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_delete_constraint_added_when_absent() {
        let mut args = json!({ "filter": { "status": { "eq": "open" } } });
        ensure_soft_delete_constraint(&mut args);
        assert_eq!(args["filter"]["deletedAt"], json!({ "eq": null }));
    }

    #[test]
    fn test_soft_delete_constraint_added_without_filter() {
        let mut args = json!({});
        ensure_soft_delete_constraint(&mut args);
        assert_eq!(args["filter"]["deletedAt"], json!({ "eq": null }));
    }

    #[test]
    fn test_soft_delete_constraint_respects_existing_mention() {
        let mut args = json!({ "filter": { "deletedAt": { "exists": true } } });
        ensure_soft_delete_constraint(&mut args);
        assert_eq!(args["filter"]["deletedAt"], json!({ "exists": true }));
    }

    #[test]
    fn test_soft_delete_mention_found_in_nested_branches() {
        // The mention sits in the second branch of an `or`; the scan must
        // reach every branch, not just the first.
        let mut args = json!({
            "filter": {
                "or": [
                    { "status": { "eq": "open" } },
                    { "deletedAt": { "exists": true } },
                ]
            }
        });
        ensure_soft_delete_constraint(&mut args);
        assert!(args["filter"].get("deletedAt").is_none());
    }

    #[test]
    fn test_position_token_round_trip() {
        let token = encode_position_token(250);
        let decoded = decode_position_token(&token).unwrap();
        assert_eq!(decoded.skip, 250);
    }

    #[test]
    fn test_garbage_token_decodes_to_none() {
        assert!(decode_position_token("!!not base64!!").is_none());
        let not_json = Base64UrlUnpadded::encode_string(b"not json");
        assert!(decode_position_token(&not_json).is_none());
    }

    #[test]
    fn test_token_with_wrong_skip_type_is_rejected() {
        let wrong = Base64UrlUnpadded::encode_string(br#"{"skip":"ten"}"#);
        assert!(decode_position_token(&wrong).is_none());
    }

    #[test]
    fn test_sort_keys_parse_directions() {
        use crate::store::SortDirection;
        let args = json!({
            "sort": [
                { "field": "rank", "direction": "ASC" },
                { "field": "createdAt", "direction": "DESC" },
            ]
        });
        let keys = sort_keys(&args);
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].direction, SortDirection::Ascending);
        assert_eq!(keys[0].direction.numeric(), 1);
        assert_eq!(keys[1].direction.numeric(), -1);
    }
}
