//! Proptest strategies for entity fields and workspace shapes.

use proptest::prelude::*;
use reqsync_core::{
    DataKind, EntityKind, Env, EnvVar, Request, RequestData, Store, TypedId,
};

/// Strategy for entity kinds.
pub fn entity_kind_strategy() -> impl Strategy<Value = EntityKind> {
    prop::sample::select(EntityKind::ALL.to_vec())
}

/// Strategy for request data kinds owned by the request.
pub fn request_data_kind_strategy() -> impl Strategy<Value = DataKind> {
    prop_oneof![Just(DataKind::Header), Just(DataKind::Param)]
}

/// Strategy for header and param keys.
pub fn field_key_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9-]{0,15}"
}

/// Strategy for free-form field values, including non-ASCII text.
pub fn field_value_strategy() -> impl Strategy<Value = String> {
    "\\PC{0,32}"
}

/// Strategy for request URLs.
pub fn url_strategy() -> impl Strategy<Value = String> {
    ("[a-z]{1,10}", "[a-z0-9/]{0,20}").prop_map(|(host, path)| format!("https://{host}.test/{path}"))
}

/// Strategy for display names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9 ]{0,23}"
}

/// The shape of a generated request.
#[derive(Debug, Clone)]
pub struct RequestShape {
    /// Request name.
    pub name: String,
    /// Request URL.
    pub url: String,
    /// Headers and params as (kind, key, value).
    pub fields: Vec<(DataKind, String, String)>,
}

/// The shape of a generated workspace.
#[derive(Debug, Clone)]
pub struct WorkspaceShape {
    /// Requests in the single project.
    pub requests: Vec<RequestShape>,
    /// Environment variables as (name, value).
    pub vars: Vec<(String, String)>,
}

/// Strategy for a request shape with up to `max_fields` headers and params.
pub fn request_shape_strategy(max_fields: usize) -> impl Strategy<Value = RequestShape> {
    (
        name_strategy(),
        url_strategy(),
        prop::collection::vec(
            (request_data_kind_strategy(), field_key_strategy(), field_value_strategy()),
            0..=max_fields,
        ),
    )
        .prop_map(|(name, url, fields)| RequestShape { name, url, fields })
}

/// Strategy for a workspace shape.
pub fn workspace_shape_strategy() -> impl Strategy<Value = WorkspaceShape> {
    (
        prop::collection::vec(request_shape_strategy(4), 1..4),
        prop::collection::vec((field_key_strategy(), field_value_strategy()), 0..4),
    )
        .prop_map(|(requests, vars)| WorkspaceShape { requests, vars })
}

/// Builds `shape` into a new sync-enabled workspace of `store`. Returns the
/// workspace id and the roots to push (each request, then the environment).
pub fn build_workspace(store: &Store, shape: &WorkspaceShape) -> (TypedId, Vec<TypedId>) {
    let ws = crate::fixtures::workspace(store, "Generated");
    let roots = store
        .transaction(|txn| {
            let project = txn.create_project(&ws, "Project")?;
            let mut roots = Vec::new();
            for rq in &shape.requests {
                let id = TypedId::mint(EntityKind::Request);
                let owner = project.clone();
                let request = txn.create_or_get(&id, &ws, |m| Request::new(m, owner))?;
                request.name = rq.name.clone();
                request.url = rq.url.clone();
                for (kind, key, value) in &rq.fields {
                    let item = TypedId::mint(EntityKind::RequestData);
                    let owner = id.clone();
                    txn.create_or_get(&item, &ws, |m| {
                        RequestData::new(m, owner, *kind, key.as_str(), value.as_str())
                    })?;
                }
                roots.push(id);
            }
            let env = TypedId::mint(EntityKind::Env);
            txn.create_or_get(&env, &ws, |m| Env::new(m, "generated"))?;
            for (name, value) in &shape.vars {
                let var = TypedId::mint(EntityKind::EnvVar);
                let owner = env.clone();
                txn.create_or_get(&var, &ws, |m| {
                    EnvVar::new(m, owner, name.as_str(), value.as_str())
                })?;
            }
            roots.push(env);
            Ok(roots)
        })
        .expect("Failed to build workspace");
    (ws, roots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqsync_core::EntityView;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn built_workspace_matches_shape(shape in workspace_shape_strategy()) {
            let store = crate::fixtures::synced_store();
            let (ws, roots) = build_workspace(&store, &shape);
            prop_assert_eq!(roots.len(), shape.requests.len() + 1);
            store.read(|g| {
                assert!(g.exists(&ws));
                let fields: usize = shape.requests.iter().map(|r| r.fields.len()).sum();
                assert_eq!(g.all::<RequestData>(false).len(), fields);
                assert_eq!(g.all::<EnvVar>(false).len(), shape.vars.len());
            });
        }
    }
}
