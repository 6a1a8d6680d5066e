//! Typed entity identifiers.

use crate::error::{CoreError, CoreResult};
use sha2::{Digest, Sha256};
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use uuid::Uuid;

/// The entity type encoded in the first two characters of a [`TypedId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    /// Workspace (`ws`).
    Workspace,
    /// Project (`pj`).
    Project,
    /// Request (`rq`).
    Request,
    /// Request body (`rb`).
    RequestBodyData,
    /// Header, param, or body field (`rd`).
    RequestData,
    /// Request method definition (`rm`).
    RequestMethod,
    /// File attachment (`fl`).
    File,
    /// Image attachment (`im`).
    Image,
    /// Zone tombstone (`zn`).
    Zone,
    /// Request history entry (`hs`).
    History,
    /// Environment (`en`).
    Env,
    /// Environment variable (`ev`).
    EnvVar,
}

impl EntityKind {
    /// Every kind, in tag order of the data model.
    pub const ALL: [EntityKind; 12] = [
        EntityKind::Workspace,
        EntityKind::Project,
        EntityKind::Request,
        EntityKind::RequestBodyData,
        EntityKind::RequestData,
        EntityKind::RequestMethod,
        EntityKind::File,
        EntityKind::Image,
        EntityKind::Zone,
        EntityKind::History,
        EntityKind::Env,
        EntityKind::EnvVar,
    ];

    /// Returns the two-character id tag.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            EntityKind::Workspace => "ws",
            EntityKind::Project => "pj",
            EntityKind::Request => "rq",
            EntityKind::RequestBodyData => "rb",
            EntityKind::RequestData => "rd",
            EntityKind::RequestMethod => "rm",
            EntityKind::File => "fl",
            EntityKind::Image => "im",
            EntityKind::Zone => "zn",
            EntityKind::History => "hs",
            EntityKind::Env => "en",
            EntityKind::EnvVar => "ev",
        }
    }

    /// Parses a two-character id tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag() == tag)
    }

    /// Returns the remote record type name for this kind.
    #[must_use]
    pub const fn record_type(self) -> &'static str {
        match self {
            EntityKind::Workspace => "Workspace",
            EntityKind::Project => "Project",
            EntityKind::Request => "Request",
            EntityKind::RequestBodyData => "RequestBodyData",
            EntityKind::RequestData => "RequestData",
            EntityKind::RequestMethod => "RequestMethodData",
            EntityKind::File => "File",
            EntityKind::Image => "Image",
            EntityKind::Zone => "Zone",
            EntityKind::History => "History",
            EntityKind::Env => "Env",
            EntityKind::EnvVar => "EnvVar",
        }
    }

    /// Parses a remote record type name.
    #[must_use]
    pub fn from_record_type(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.record_type() == name)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.record_type())
    }
}

/// A globally unique identifier whose prefix names the entity type.
///
/// The first two characters are the [`EntityKind`] tag, followed by a
/// random (UUID) or content-derived (SHA-256) suffix. Ids are immutable
/// and order lexicographically, so all ids of one kind are contiguous.
#[derive(Clone)]
pub struct TypedId {
    kind: EntityKind,
    raw: String,
}

impl TypedId {
    /// Mints a fresh random id of the given kind.
    #[must_use]
    pub fn mint(kind: EntityKind) -> Self {
        Self {
            kind,
            raw: format!("{}{}", kind.tag(), Uuid::new_v4().simple()),
        }
    }

    /// Mints a content-derived id: the same seed always yields the same id.
    #[must_use]
    pub fn derive(kind: EntityKind, seed: &str) -> Self {
        let digest = Sha256::digest(seed.as_bytes());
        let suffix: String = digest[..16].iter().map(|b| format!("{b:02x}")).collect();
        Self {
            kind,
            raw: format!("{}{}", kind.tag(), suffix),
        }
    }

    /// Builds an id of `kind` that shares the suffix of `other`.
    #[must_use]
    pub fn with_suffix_of(kind: EntityKind, other: &TypedId) -> Self {
        Self {
            kind,
            raw: format!("{}{}", kind.tag(), other.suffix()),
        }
    }

    /// Parses and validates an id.
    ///
    /// # Errors
    ///
    /// Returns an addressing error when the id is too short, carries an
    /// unknown tag, or has characters outside `[A-Za-z0-9_-]` in its suffix.
    pub fn parse(raw: &str) -> CoreResult<Self> {
        if raw.len() < 3 || !raw.is_char_boundary(2) {
            return Err(CoreError::invalid_id(raw, "too short"));
        }
        let (tag, suffix) = raw.split_at(2);
        let kind = EntityKind::from_tag(tag).ok_or_else(|| CoreError::UnknownTypeTag {
            tag: tag.to_string(),
        })?;
        if !suffix
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(CoreError::invalid_id(raw, "illegal character in suffix"));
        }
        Ok(Self {
            kind,
            raw: raw.to_string(),
        })
    }

    /// Returns the entity kind encoded in the tag.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns everything after the tag.
    #[must_use]
    pub fn suffix(&self) -> &str {
        &self.raw[2..]
    }

    /// Fails with [`CoreError::KindMismatch`] unless this id is of `kind`.
    pub fn expect_kind(&self, kind: EntityKind) -> CoreResult<()> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(CoreError::KindMismatch {
                id: self.raw.clone(),
                expected: kind.record_type(),
            })
        }
    }
}

/// Returns the entity kind of a raw id string.
///
/// # Errors
///
/// Returns an addressing error for malformed ids.
pub fn type_of(raw: &str) -> CoreResult<EntityKind> {
    TypedId::parse(raw).map(|id| id.kind())
}

impl PartialEq for TypedId {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for TypedId {}

impl Hash for TypedId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl PartialOrd for TypedId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypedId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl Borrow<str> for TypedId {
    fn borrow(&self) -> &str {
        &self.raw
    }
}

impl AsRef<str> for TypedId {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

impl FromStr for TypedId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for TypedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypedId({})", self.raw)
    }
}

impl fmt::Display for TypedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
