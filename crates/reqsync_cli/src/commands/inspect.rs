//! Inspect command implementation.

use super::{label, load_store};
use reqsync_core::backup::read_backup;
use reqsync_core::{EntityView, Graph, TypedId, Workspace};
use serde::Serialize;
use std::path::Path;

/// Backup inspection result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectResult {
    /// Backup path.
    pub path: String,
    /// Creation time in milliseconds since the epoch.
    pub created_at: i64,
    /// Model version of the store that wrote the backup.
    pub model_version: u32,
    /// Number of entities after restore.
    pub entity_count: usize,
    /// Workspace trees.
    pub workspaces: Vec<Node>,
}

/// One entity and everything it owns.
#[derive(Debug, Serialize)]
pub struct Node {
    /// Entity id.
    pub id: String,
    /// Record type name.
    pub kind: String,
    /// Display label.
    pub label: String,
    /// Owned entities, oldest first.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

/// Reads a backup and builds the workspace trees it contains.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let metadata = read_backup(path)?.metadata;
    let store = load_store(path)?;
    let workspaces: Vec<Node> = store.read(|g| {
        g.all::<Workspace>(false)
            .into_iter()
            .filter_map(|ws| node(g, ws.meta.id()))
            .collect()
    });
    Ok(InspectResult {
        path: path.display().to_string(),
        created_at: metadata.created_at.as_millis(),
        model_version: metadata.model_version,
        entity_count: store.len(),
        workspaces,
    })
}

fn node(graph: &Graph, id: &TypedId) -> Option<Node> {
    let entity = graph.get_any(id)?;
    let mut owned: Vec<_> = graph
        .child_ids(id)
        .into_iter()
        .filter_map(|child| graph.get_any(&child))
        .filter(|child| !child.is_deleted())
        .collect();
    owned.sort_by(|a, b| {
        a.meta()
            .created()
            .cmp(&b.meta().created())
            .then_with(|| a.id().cmp(b.id()))
    });
    Some(Node {
        id: id.to_string(),
        kind: entity.kind().to_string(),
        label: label(entity),
        children: owned.into_iter().filter_map(|c| node(graph, c.id())).collect(),
    })
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        "text" => print!("{}", render_text(&result)),
        other => return Err(format!("unknown format {other:?}, expected text or json").into()),
    }
    Ok(())
}

/// Renders an inspection result as an indented tree.
pub fn render_text(result: &InspectResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("Backup: {}\n", result.path));
    out.push_str(&format!("  Created: {}\n", result.created_at));
    out.push_str(&format!("  Model version: {}\n", result.model_version));
    out.push_str(&format!("  Entities: {}\n", result.entity_count));
    for workspace in &result.workspaces {
        write_node(&mut out, workspace, 1);
    }
    out
}

fn write_node(out: &mut String, node: &Node, depth: usize) {
    out.push_str(&format!(
        "{:indent$}{} {} {}\n",
        "",
        node.kind,
        node.id,
        node.label,
        indent = depth * 2
    ));
    for child in &node.children {
        write_node(out, child, depth + 1);
    }
}
