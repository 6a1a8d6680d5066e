//! Structural diff of a request aggregate against its session snapshot.
//!
//! Both sides are dictionary projections (see
//! [`reqsync_core::export_request`]), so the diff never touches entity
//! types directly. File bytes are not projected; the [`Baseline`] keeps a
//! SHA-256 digest per attached file and content is compared against that.
//!
//! Checks run cheapest first and stop at the first divergence:
//!
//! 1. request tombstone flag
//! 2. empty URL guard: an aggregate without a URL is never dirty
//! 3. request scalars
//! 4. selected method, then every custom method of the project
//! 5. body presence, body scalars, then the selected variant's items
//!    (form items include their attachments)
//! 6. headers, then params

use reqsync_codec::Value;
use reqsync_core::{export_custom_methods, export_request, BodyKind, EntityView, File, Request, TypedId};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Key under which a snapshot carries the project's custom methods.
pub const CUSTOM_METHODS_KEY: &str = "customMethods";

const REQUEST_FIELDS: &[&str] = &["validateSSL", "name", "desc", "url", "selectedMethodIndex"];
const METHOD_FIELDS: &[&str] = &["name", "isCustom", "markForDelete"];
const BODY_FIELDS: &[&str] = &["selectedIndex", "json", "xml", "raw", "markForDelete"];
const DATA_FIELDS: &[&str] = &["key", "value", "desc", "format", "disabled", "markForDelete"];
const IMAGE_FIELDS: &[&str] = &["name", "isCameraPhoto", "markForDelete"];
const FILE_FIELDS: &[&str] = &["name", "path", "markForDelete"];

/// The first difference found between a snapshot and the live aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divergence {
    /// The entity to mark as changed.
    pub entity: TypedId,
    /// The field or list that differs.
    pub field: &'static str,
}

impl Divergence {
    fn at(entity: &TypedId, field: &'static str) -> Option<Self> {
        Some(Self {
            entity: entity.clone(),
            field,
        })
    }
}

/// Projects a request aggregate together with the custom methods of its
/// project. Returns `None` if the request does not exist.
pub fn snapshot_of<V: EntityView>(view: &V, request_id: &TypedId) -> Option<Value> {
    let project_id = view.get::<Request>(request_id)?.project_id.clone();
    let methods = export_custom_methods(view, &project_id);
    Some(export_request(view, request_id)?.with(CUSTOM_METHODS_KEY, methods))
}

/// What a check compares against: the projection plus a content digest of
/// every file attached to a form item.
#[derive(Debug, Clone, PartialEq)]
pub struct Baseline {
    /// Dictionary projection from [`snapshot_of`].
    pub snapshot: Value,
    files: BTreeMap<TypedId, [u8; 32]>,
}

impl Baseline {
    /// Captures `request_id` as seen by `view`. Returns `None` if the
    /// request does not exist.
    pub fn capture<V: EntityView>(view: &V, request_id: &TypedId) -> Option<Self> {
        let snapshot = snapshot_of(view, request_id)?;
        let files = form_file_ids(&snapshot)
            .into_iter()
            .filter_map(|id| {
                let digest = digest_of(view, &id)?;
                Some((id, digest))
            })
            .collect();
        Some(Self { snapshot, files })
    }

    /// Number of file digests held.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

fn form_file_ids(snapshot: &Value) -> Vec<TypedId> {
    let Some(body) = present(snapshot, "body") else {
        return Vec::new();
    };
    body.array_or_empty("form")
        .iter()
        .flat_map(|item| item.array_or_empty("files"))
        .filter_map(id_of)
        .collect()
}

fn digest_of<V: EntityView>(view: &V, file: &TypedId) -> Option<[u8; 32]> {
    view.get::<File>(file).map(|f| Sha256::digest(&f.data).into())
}

/// Compares `live` against `baseline`. `current` resolves the bytes of
/// attached files, including the session's staged changes.
pub fn diff<L: EntityView>(baseline: &Baseline, live: &Value, current: &L) -> Option<Divergence> {
    Differ { baseline, current }.request(&baseline.snapshot, live)
}

struct Differ<'v, L> {
    baseline: &'v Baseline,
    current: &'v L,
}

impl<L: EntityView> Differ<'_, L> {
    fn request(&self, old: &Value, new: &Value) -> Option<Divergence> {
        let request = id_of(new)?;
        if flag(old) != flag(new) {
            return Divergence::at(&request, "markForDelete");
        }
        if new.text_or_default("url").trim().is_empty() {
            return None;
        }
        changed_field(old, new, REQUEST_FIELDS)
            .and_then(|field| Divergence::at(&request, field))
            .or_else(|| self.methods(&request, old, new))
            .or_else(|| self.body(&request, old, new))
            .or_else(|| self.list(&request, "headers", old, new, false))
            .or_else(|| self.list(&request, "params", old, new, false))
    }

    fn methods(&self, request: &TypedId, old: &Value, new: &Value) -> Option<Divergence> {
        if old.get("methodId") != new.get("methodId") {
            return Divergence::at(request, "methodId");
        }
        match (present(old, "method"), present(new, "method")) {
            (None, None) => {}
            (Some(a), Some(b)) => {
                if let Some(field) = changed_field(a, b, METHOD_FIELDS) {
                    return Divergence::at(&id_of(b)?, field);
                }
            }
            _ => return Divergence::at(request, "method"),
        }
        positional(
            request,
            CUSTOM_METHODS_KEY,
            old.array_or_empty(CUSTOM_METHODS_KEY),
            new.array_or_empty(CUSTOM_METHODS_KEY),
            |a, b| changed_field(a, b, METHOD_FIELDS).and_then(|f| Divergence::at(&id_of(b)?, f)),
        )
    }

    fn body(&self, request: &TypedId, old: &Value, new: &Value) -> Option<Divergence> {
        let (a, b) = match (present(old, "body"), present(new, "body")) {
            (None, None) => return None,
            (Some(a), Some(b)) => (a, b),
            _ => return Divergence::at(request, "body"),
        };
        let body = id_of(b)?;
        if a.get("id") != b.get("id") {
            return Divergence::at(request, "body");
        }
        if let Some(field) = changed_field(a, b, BODY_FIELDS) {
            return Divergence::at(&body, field);
        }
        match BodyKind::from_index(b.integer_or("selectedIndex", 0)) {
            BodyKind::Form => self.list(&body, "form", a, b, true),
            BodyKind::Multipart => self.list(&body, "multipart", a, b, false),
            BodyKind::Binary => match (present(a, "binary"), present(b, "binary")) {
                (None, None) => None,
                (Some(x), Some(y)) if x.get("id") == y.get("id") => self.item(x, y, false),
                _ => Divergence::at(&body, "binary"),
            },
            BodyKind::Json | BodyKind::Xml | BodyKind::Raw => None,
        }
    }

    fn list(
        &self,
        owner: &TypedId,
        key: &'static str,
        old: &Value,
        new: &Value,
        attachments: bool,
    ) -> Option<Divergence> {
        positional(owner, key, old.array_or_empty(key), new.array_or_empty(key), |a, b| {
            self.item(a, b, attachments)
        })
    }

    fn item(&self, old: &Value, new: &Value, attachments: bool) -> Option<Divergence> {
        let data = id_of(new)?;
        if let Some(field) = changed_field(old, new, DATA_FIELDS) {
            return Divergence::at(&data, field);
        }
        if !attachments {
            return None;
        }
        match (present(old, "image"), present(new, "image")) {
            (None, None) => {}
            (Some(a), Some(b)) if a.get("id") == b.get("id") => {
                if let Some(field) = changed_field(a, b, IMAGE_FIELDS) {
                    return Divergence::at(&id_of(b)?, field);
                }
            }
            _ => return Divergence::at(&data, "image"),
        }
        positional(&data, "files", old.array_or_empty("files"), new.array_or_empty("files"), |a, b| {
            let file = id_of(b)?;
            if let Some(field) = changed_field(a, b, FILE_FIELDS) {
                return Divergence::at(&file, field);
            }
            let recorded = self.baseline.files.get(&file).copied();
            if recorded.is_some() && recorded == digest_of(self.current, &file) {
                None
            } else {
                Divergence::at(&file, "data")
            }
        })
    }
}

/// Diffs two lists item by item after ordering both by creation time. A
/// length mismatch or a different item at the same position marks `owner`.
fn positional(
    owner: &TypedId,
    key: &'static str,
    old: &[Value],
    new: &[Value],
    each: impl Fn(&Value, &Value) -> Option<Divergence>,
) -> Option<Divergence> {
    if old.len() != new.len() {
        return Divergence::at(owner, key);
    }
    by_created(old)
        .into_iter()
        .zip(by_created(new))
        .find_map(|(a, b)| {
            if a.get("id") != b.get("id") {
                Divergence::at(owner, key)
            } else {
                each(a, b)
            }
        })
}

fn by_created(items: &[Value]) -> Vec<&Value> {
    let mut sorted: Vec<&Value> = items.iter().collect();
    sorted.sort_by_key(|v| (v.integer_or("created", 0), v.text_or_default("id")));
    sorted
}

fn changed_field(old: &Value, new: &Value, fields: &[&'static str]) -> Option<&'static str> {
    fields.iter().copied().find(|f| old.get(f) != new.get(f))
}

fn present<'a>(dict: &'a Value, key: &str) -> Option<&'a Value> {
    dict.get(key).filter(|v| !v.is_null())
}

fn flag(dict: &Value) -> bool {
    dict.bool_or("markForDelete", false)
}

fn id_of(dict: &Value) -> Option<TypedId> {
    dict.get("id")?.as_text().and_then(|raw| TypedId::parse(raw).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqsync_core::{
        Backend, Config, DataKind, EntityKind, RequestData, Store, Transaction, Workspace,
    };

    struct Fixture {
        store: Store,
        request: TypedId,
    }

    fn fixture() -> Fixture {
        let store = Store::new(Backend::Local, Config::default());
        let ws = TypedId::mint(EntityKind::Workspace);
        let request = TypedId::mint(EntityKind::Request);
        store
            .transaction(|txn| {
                txn.create_or_get(&ws, &ws, |m| Workspace::new(m, "W"))?;
                let project = txn.create_project(&ws, "P")?;
                let rq = txn.create_or_get(&request, &ws, |m| Request::new(m, project))?;
                rq.url = "https://example.test".into();
                Ok(())
            })
            .unwrap();
        Fixture { store, request }
    }

    /// Applies `f` in a throwaway transaction and diffs the result against
    /// the committed snapshot.
    fn diff_after(fx: &Fixture, f: impl FnOnce(&mut Transaction<'_>)) -> Option<Divergence> {
        let baseline = fx.store.read(|g| Baseline::capture(g, &fx.request)).unwrap();
        let mut out = None;
        let _ = fx.store.transaction(|txn| {
            f(txn);
            let live = snapshot_of(&*txn, &fx.request).unwrap();
            out = diff(&baseline, &live, &*txn);
            Err::<(), _>(reqsync_core::CoreError::invalid_operation("discard"))
        });
        out
    }

    #[test]
    fn unchanged_is_clean() {
        let fx = fixture();
        assert_eq!(diff_after(&fx, |_| {}), None);
    }

    #[test]
    fn scalar_change() {
        let fx = fixture();
        let id = fx.request.clone();
        let d = diff_after(&fx, |txn| {
            txn.edit::<Request>(&id, |r| r.name = "renamed".into()).unwrap();
        })
        .unwrap();
        assert_eq!(d.entity, fx.request);
        assert_eq!(d.field, "name");
    }

    #[test]
    fn empty_url_is_never_dirty() {
        let fx = fixture();
        let id = fx.request.clone();
        let d = diff_after(&fx, |txn| {
            txn.edit::<Request>(&id, |r| {
                r.url = "   ".into();
                r.name = "renamed".into();
            })
            .unwrap();
        });
        assert_eq!(d, None);
    }

    #[test]
    fn added_header_marks_request() {
        let fx = fixture();
        let id = fx.request.clone();
        let d = diff_after(&fx, |txn| {
            let ws = txn.get_any(&id).unwrap().meta().workspace_id().clone();
            let header = TypedId::mint(EntityKind::RequestData);
            let owner = id.clone();
            txn.create_or_get(&header, &ws, |m| {
                RequestData::new(m, owner, DataKind::Header, "Authorization", "Bearer x")
            })
            .unwrap();
        })
        .unwrap();
        assert_eq!(d, Divergence { entity: fx.request.clone(), field: "headers" });
    }

    #[test]
    fn tombstone_wins_over_guard() {
        let fx = fixture();
        let id = fx.request.clone();
        let d = diff_after(&fx, |txn| {
            txn.edit::<Request>(&id, |r| r.url.clear()).unwrap();
            txn.tombstone(&id);
        })
        .unwrap();
        assert_eq!(d.field, "markForDelete");
    }

    #[test]
    fn positional_detects_reordering() {
        let owner = TypedId::mint(EntityKind::Request);
        let item = |id: &str, created: i64| {
            Value::empty_map().with("id", id).with("created", created)
        };
        let old = vec![item("rdA", 1), item("rdB", 2)];
        let same = vec![item("rdB", 2), item("rdA", 1)];
        let swapped = vec![item("rdA", 2), item("rdB", 1)];
        assert_eq!(positional(&owner, "headers", &old, &same, |_, _| None), None);
        assert!(positional(&owner, "headers", &old, &swapped, |_, _| None).is_some());
    }
}
