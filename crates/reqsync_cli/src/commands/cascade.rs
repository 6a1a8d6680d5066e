//! Cascade preview command.

use super::{label, load_store};
use reqsync_core::{cascade, EntityView, TypedId};
use std::error::Error;
use std::path::Path;

/// Returns `root` followed by every entity a delete of `root` would take
/// with it, each paired with its display label.
pub fn preview(path: &Path, raw: &str) -> Result<Vec<(TypedId, String)>, Box<dyn Error>> {
    let root = TypedId::parse(raw)?;
    let store = load_store(path)?;
    store.read(|g| -> Result<_, Box<dyn Error>> {
        let entity = g
            .get_any(&root)
            .ok_or_else(|| format!("{root} is not in the backup"))?;
        let mut rows = vec![(root.clone(), label(entity))];
        for id in cascade(g, &root) {
            let text = g.get_any(&id).map(label).unwrap_or_default();
            rows.push((id, text));
        }
        Ok(rows)
    })
}

/// Runs the cascade command.
pub fn run(path: &Path, raw: &str) -> Result<(), Box<dyn Error>> {
    let rows = preview(path, raw)?;
    for (id, text) in &rows {
        println!("{:<16} {id} {text}", id.kind().to_string());
    }
    println!("{} entities would be removed", rows.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqsync_core::backup::write_backup;
    use reqsync_core::{Backend, Config, EntityKind, Project, Store, Workspace};

    #[test]
    fn lists_root_then_owned_entities() {
        let store = Store::new(Backend::Local, Config::default());
        let ws = TypedId::mint(EntityKind::Workspace);
        let project = store
            .transaction(|txn| {
                txn.create_or_get(&ws, &ws, |m| Workspace::new(m, "Default"))?;
                txn.create_project(&ws, "API")
            })
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.cbor");
        write_backup(&store, &path).unwrap();

        let rows = preview(&path, project.as_str()).unwrap();
        assert_eq!(rows[0], (project.clone(), "API".to_string()));
        assert_eq!(rows.len(), 6);
        assert!(rows[1..]
            .iter()
            .all(|(id, _)| id.kind() == EntityKind::RequestMethod));

        let whole = preview(&path, ws.as_str()).unwrap();
        assert_eq!(whole.len(), store.len());
        assert!(store.read(|g| g.get::<Project>(&project).is_some()));
    }

    #[test]
    fn unknown_ids_fail() {
        let store = Store::new(Backend::Local, Config::default());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.cbor");
        write_backup(&store, &path).unwrap();

        assert!(preview(&path, "zz-nope").is_err());
        let absent = TypedId::mint(EntityKind::Request);
        let err = preview(&path, absent.as_str()).unwrap_err();
        assert!(err.to_string().contains("not in the backup"));
    }
}
