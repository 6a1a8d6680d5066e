//! Integration tests for the entity graph and cascade deletes.

use proptest::prelude::*;
use reqsync_core::{
    cascade, delete, Backend, Config, DataKind, DeleteMode, EntityKind, EntityView, Env, EnvVar,
    Project, Request, RequestData, Store, TypedId, Workspace,
};

struct Tree {
    ws: TypedId,
    project: TypedId,
    request: TypedId,
    header: TypedId,
    env: TypedId,
    var: TypedId,
}

fn tree(store: &Store) -> Tree {
    let ws = TypedId::mint(EntityKind::Workspace);
    let request = TypedId::mint(EntityKind::Request);
    let header = TypedId::mint(EntityKind::RequestData);
    let env = TypedId::mint(EntityKind::Env);
    let var = TypedId::mint(EntityKind::EnvVar);
    let project = store
        .transaction(|txn| {
            txn.create_or_get(&ws, &ws, |m| Workspace::new(m, "Default"))?;
            let project = txn.create_project(&ws, "API")?;
            let owner = project.clone();
            txn.create_or_get(&request, &ws, |m| Request::new(m, owner))?;
            let owner = request.clone();
            txn.create_or_get(&header, &ws, |m| {
                RequestData::new(m, owner, DataKind::Header, "Authorization", "Bearer x")
            })?;
            txn.create_or_get(&env, &ws, |m| Env::new(m, "dev"))?;
            let owner = env.clone();
            txn.create_or_get(&var, &ws, |m| EnvVar::new(m, owner, "host", "localhost"))?;
            Ok(project)
        })
        .unwrap();
    Tree {
        ws,
        project,
        request,
        header,
        env,
        var,
    }
}

#[test]
fn workspace_delete_is_complete() {
    let store = Store::new(Backend::Synced, Config::default());
    let t = tree(&store);
    store
        .transaction(|txn| delete(txn, &t.ws, DeleteMode::Direct))
        .unwrap();
    store.read(|g| {
        for id in [&t.ws, &t.project, &t.request, &t.header, &t.env, &t.var] {
            assert!(!g.exists(id), "{id} still fetchable");
        }
    });
    assert!(store.is_empty());
}

#[test]
fn tombstoned_workspace_hides_everything() {
    let store = Store::new(Backend::Synced, Config::default());
    let t = tree(&store);
    store
        .transaction(|txn| delete(txn, &t.ws, DeleteMode::Tombstone))
        .unwrap();
    store.read(|g| {
        assert!(g.all::<Project>(false).is_empty());
        assert!(g.all::<EnvVar>(false).is_empty());
        assert_eq!(g.all::<EnvVar>(true).len(), 1);
        assert!(g.get::<Request>(&t.request).unwrap().meta.mark_for_delete);
    });
}

#[test]
fn cascade_never_includes_root_or_unrelated() {
    let store = Store::new(Backend::Synced, Config::default());
    let a = tree(&store);
    let b = tree(&store);
    let set = store.read(|g| cascade(g, &a.ws));
    assert!(!set.contains(&a.ws));
    assert!(!set.contains(&b.project));
    // ws + project + 5 methods + request + header + env + var
    assert_eq!(set.len(), 10);
}

proptest! {
    #[test]
    fn cascade_of_workspace_covers_whole_workspace(
        requests in 0usize..4,
        headers in 0usize..4,
        envs in 0usize..3,
    ) {
        let store = Store::new(Backend::Local, Config::default().create_default_methods(false));
        let ws = TypedId::mint(EntityKind::Workspace);
        store.transaction(|txn| {
            txn.create_or_get(&ws, &ws, |m| Workspace::new(m, "w"))?;
            let project = txn.create_project(&ws, "p")?;
            for _ in 0..requests {
                let rq = TypedId::mint(EntityKind::Request);
                let owner = project.clone();
                txn.create_or_get(&rq, &ws, |m| Request::new(m, owner))?;
                for i in 0..headers {
                    let h = TypedId::mint(EntityKind::RequestData);
                    let owner = rq.clone();
                    txn.create_or_get(&h, &ws, |m| {
                        RequestData::new(m, owner, DataKind::Header, format!("h{i}"), "v")
                    })?;
                }
            }
            for _ in 0..envs {
                let env = TypedId::mint(EntityKind::Env);
                txn.create_or_get(&env, &ws, |m| Env::new(m, "e"))?;
            }
            Ok(())
        }).unwrap();

        let set = store.read(|g| cascade(g, &ws));
        prop_assert_eq!(set.len() + 1, store.len());

        store.transaction(|txn| delete(txn, &ws, DeleteMode::Direct)).unwrap();
        prop_assert!(store.is_empty());
    }
}
