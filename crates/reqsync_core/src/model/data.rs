//! Request body and request data fields.

use super::Meta;
use crate::id::TypedId;

/// Which body representation is selected. The discriminant is the persisted
/// index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyKind {
    /// JSON text body.
    #[default]
    Json,
    /// XML text body.
    Xml,
    /// Raw text body.
    Raw,
    /// URL-encoded form fields.
    Form,
    /// Multipart fields.
    Multipart,
    /// Single binary attachment.
    Binary,
}

impl BodyKind {
    /// Persisted index.
    #[must_use]
    pub const fn index(self) -> i64 {
        match self {
            BodyKind::Json => 0,
            BodyKind::Xml => 1,
            BodyKind::Raw => 2,
            BodyKind::Form => 3,
            BodyKind::Multipart => 4,
            BodyKind::Binary => 5,
        }
    }

    /// Parses a persisted index; unknown indexes fall back to JSON.
    #[must_use]
    pub fn from_index(index: i64) -> Self {
        match index {
            1 => BodyKind::Xml,
            2 => BodyKind::Raw,
            3 => BodyKind::Form,
            4 => BodyKind::Multipart,
            5 => BodyKind::Binary,
            _ => BodyKind::Json,
        }
    }
}

/// Which list a [`RequestData`] item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    /// Request header; owned by the request.
    Header,
    /// Query parameter; owned by the request.
    Param,
    /// URL-encoded form field; owned by the body.
    Form,
    /// Multipart field; owned by the body.
    Multipart,
    /// Binary body field; owned by the body.
    Binary,
}

impl DataKind {
    /// Persisted name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            DataKind::Header => "header",
            DataKind::Param => "param",
            DataKind::Form => "form",
            DataKind::Multipart => "multipart",
            DataKind::Binary => "binary",
        }
    }

    /// Parses a persisted name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "header" => Some(DataKind::Header),
            "param" => Some(DataKind::Param),
            "form" => Some(DataKind::Form),
            "multipart" => Some(DataKind::Multipart),
            "binary" => Some(DataKind::Binary),
            _ => None,
        }
    }

    /// Whether items of this kind are owned by the body rather than the
    /// request.
    #[must_use]
    pub const fn is_body_field(self) -> bool {
        matches!(self, DataKind::Form | DataKind::Multipart | DataKind::Binary)
    }
}

/// Whether a field carries text or an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldFormat {
    /// Plain text value.
    #[default]
    Text,
    /// File or image attachment.
    File,
}

impl FieldFormat {
    /// Persisted index.
    #[must_use]
    pub const fn index(self) -> i64 {
        match self {
            FieldFormat::Text => 0,
            FieldFormat::File => 1,
        }
    }

    /// Parses a persisted index.
    #[must_use]
    pub fn from_index(index: i64) -> Self {
        if index == 1 {
            FieldFormat::File
        } else {
            FieldFormat::Text
        }
    }
}

/// The body of a request. At most one per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBodyData {
    /// Shared bookkeeping.
    pub meta: Meta,
    /// Owning request.
    pub request_id: TypedId,
    /// Selected representation.
    pub selected: BodyKind,
    /// JSON text.
    pub json: String,
    /// XML text.
    pub xml: String,
    /// Raw text.
    pub raw: String,
}

impl RequestBodyData {
    /// Creates an empty JSON body.
    #[must_use]
    pub fn new(meta: Meta, request_id: TypedId) -> Self {
        Self {
            meta,
            request_id,
            selected: BodyKind::Json,
            json: String::new(),
            xml: String::new(),
            raw: String::new(),
        }
    }
}

/// A header, query param or body field.
///
/// Headers and params are owned by the request; form, multipart and binary
/// fields by the body. The owner is tracked in `owner_id` either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestData {
    /// Shared bookkeeping.
    pub meta: Meta,
    /// Owning request or body.
    pub owner_id: TypedId,
    /// Which list the item belongs to.
    pub kind: DataKind,
    /// Field key.
    pub key: String,
    /// Field value.
    pub value: String,
    /// Description.
    pub desc: String,
    /// Text or attachment.
    pub format: FieldFormat,
    /// Whether the item is sent.
    pub disabled: bool,
}

impl RequestData {
    /// Creates an item.
    #[must_use]
    pub fn new(
        meta: Meta,
        owner_id: TypedId,
        kind: DataKind,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            meta,
            owner_id,
            kind,
            key: key.into(),
            value: value.into(),
            desc: String::new(),
            format: FieldFormat::Text,
            disabled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_kind_index_roundtrip() {
        for kind in [
            BodyKind::Json,
            BodyKind::Xml,
            BodyKind::Raw,
            BodyKind::Form,
            BodyKind::Multipart,
            BodyKind::Binary,
        ] {
            assert_eq!(BodyKind::from_index(kind.index()), kind);
        }
        assert_eq!(BodyKind::from_index(99), BodyKind::Json);
    }

    #[test]
    fn data_kind_ownership() {
        assert!(!DataKind::Header.is_body_field());
        assert!(!DataKind::Param.is_body_field());
        assert!(DataKind::Form.is_body_field());
        assert_eq!(DataKind::parse("multipart"), Some(DataKind::Multipart));
        assert_eq!(DataKind::parse("cookie"), None);
    }
}
