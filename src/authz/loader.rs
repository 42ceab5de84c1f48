//! Recursive, concurrent traversal of the authorization join graph.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture};
use serde_json::Value;

use crate::authz::{AuthorizationId, JoinType, ModelJoin, RootModelAccess};
use crate::errors::EngineError;
use crate::filter::{Comparison, Predicate};
use crate::store::{document_id, storage_field_name, Document, DocumentStore, FindOptions};

/// Walks the join graph from each supplied root identity and returns every
/// `AuthorizationId` reachable from it.
///
/// Each root contributes its own id. A root whose document is absent, or
/// whose model has no configured joins, contributes nothing further for that
/// branch. Sibling joins at one node fan out concurrently; nested joins
/// recurse depth-first. Ids reached along several paths deduplicate in the
/// returned set.
pub async fn load_authorised_ids(
    store: &dyn DocumentStore,
    structure: &[RootModelAccess],
    root_ids: &HashMap<String, String>,
) -> Result<HashSet<AuthorizationId>, EngineError> {
    let mut all_ids = HashSet::new();

    for (model, root_id) in root_ids {
        let root_id = (!root_id.is_empty()).then_some(root_id.as_str());
        all_ids.insert(AuthorizationId::new(model, root_id));

        let Some(root) = structure.iter().find(|root| root.target_model == *model) else {
            continue;
        };
        if root.joins.is_empty() {
            continue;
        }
        let Some(root_id) = root_id else {
            continue;
        };
        let Some(document) = store.find_by_id(model, root_id).await? else {
            tracing::debug!(model, id = root_id, "root document absent; branch skipped");
            continue;
        };

        let parents = Arc::new(vec![document]);
        let branches = try_join_all(
            root.joins
                .iter()
                .map(|join| collect_join_ids(store, join, Arc::clone(&parents))),
        )
        .await?;
        for branch in branches {
            all_ids.extend(branch);
        }
    }

    Ok(all_ids)
}

fn collect_join_ids<'a>(
    store: &'a dyn DocumentStore,
    join: &'a ModelJoin,
    parents: Arc<Vec<Document>>,
) -> BoxFuture<'a, Result<Vec<AuthorizationId>, EngineError>> {
    Box::pin(async move {
        let source_field = storage_field_name(&join.source_id_field);
        let parent_keys: Vec<Value> = parents
            .iter()
            .filter_map(|document| document.get(source_field))
            .filter(|value| !value.is_null())
            .cloned()
            .collect();
        if parent_keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        let children = match join.source_join_type {
            JoinType::HasOne => {
                // The target id is already on the parent document; fetching is
                // only needed to recurse into nested joins.
                for key in &parent_keys {
                    if let Some(target_id) = key.as_str() {
                        ids.push(AuthorizationId::new(&join.target_model, Some(target_id)));
                    }
                }
                if join.joins.is_empty() {
                    return Ok(ids);
                }
                fetch_join_targets(store, join, parent_keys).await?
            }
            JoinType::HasMany => {
                let documents = fetch_join_targets(store, join, parent_keys).await?;
                for document in &documents {
                    if let Some(target_id) = document_id(document) {
                        ids.push(AuthorizationId::new(&join.target_model, Some(target_id)));
                    }
                }
                documents
            }
        };

        if !join.joins.is_empty() && !children.is_empty() {
            let children = Arc::new(children);
            let branches = try_join_all(
                join.joins
                    .iter()
                    .map(|nested| collect_join_ids(store, nested, Arc::clone(&children))),
            )
            .await?;
            for branch in branches {
                ids.extend(branch);
            }
        }

        Ok(ids)
    })
}

/// One batched query per join per tree depth: all parents at this depth are
/// resolved together.
async fn fetch_join_targets(
    store: &dyn DocumentStore,
    join: &ModelJoin,
    parent_keys: Vec<Value>,
) -> Result<Vec<Document>, EngineError> {
    let predicate = Predicate::Field {
        field: storage_field_name(&join.target_id_field).to_string(),
        tests: vec![Comparison::In(parent_keys)],
    };
    Ok(store
        .find(&join.target_model, &predicate, &FindOptions::default())
        .await?)
}
