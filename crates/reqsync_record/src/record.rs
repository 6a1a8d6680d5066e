//! Remote records.

use crate::error::{RecordError, RecordResult};
use reqsync_codec::{from_cbor, to_canonical_cbor, CodecError, Value};
use reqsync_core::{EntityKind, RecordKey, Timestamp, TypedId, ZoneHandle};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// What the remote store does with a record when the referenced record is
/// deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceAction {
    /// Delete the referencing record too (ownership edge).
    Cascade,
    /// Leave the referencing record alone (shared reference).
    None,
}

impl ReferenceAction {
    fn as_str(self) -> &'static str {
        match self {
            ReferenceAction::Cascade => "cascade",
            ReferenceAction::None => "none",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "cascade" => Some(ReferenceAction::Cascade),
            "none" => Some(ReferenceAction::None),
            _ => None,
        }
    }
}

/// A reference to another record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    /// Key of the referenced record.
    pub key: RecordKey,
    /// Delete behavior.
    pub action: ReferenceAction,
}

impl Reference {
    /// Creates a reference.
    #[must_use]
    pub fn new(key: RecordKey, action: ReferenceAction) -> Self {
        Self { key, action }
    }
}

/// An externally stored blob, referenced by the path of a local file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetRef {
    /// Location of the file holding the blob.
    pub path: PathBuf,
}

/// A record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// Inline scalar value.
    Value(Value),
    /// Reference to another record.
    Reference(Reference),
    /// External blob.
    Asset(AssetRef),
}

/// Version information used to arbitrate conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RecordStamp {
    /// Model version the record was written with.
    pub version: u32,
    /// Last modification time.
    pub modified: Timestamp,
}

/// One record of the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Zone and record name.
    pub key: RecordKey,
    /// Record type name.
    pub record_type: String,
    /// Named fields.
    pub fields: BTreeMap<String, Field>,
    /// Change tag assigned by the store on every save; `None` before the
    /// first save.
    pub change_tag: Option<u64>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new(key: RecordKey, record_type: impl Into<String>) -> Self {
        Self {
            key,
            record_type: record_type.into(),
            fields: BTreeMap::new(),
            change_tag: None,
        }
    }

    /// Creates an empty record for an entity of `kind`.
    #[must_use]
    pub fn for_kind(kind: EntityKind, key: RecordKey) -> Self {
        Self::new(key, kind.record_type())
    }

    /// The entity kind named by the record type.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::UnknownRecordType`] for foreign types.
    pub fn kind(&self) -> RecordResult<EntityKind> {
        EntityKind::from_record_type(&self.record_type).ok_or_else(|| {
            RecordError::UnknownRecordType {
                name: self.record_type.clone(),
            }
        })
    }

    /// The entity id encoded in the record name.
    ///
    /// # Errors
    ///
    /// Returns an addressing error for malformed names.
    pub fn entity_id(&self) -> RecordResult<TypedId> {
        Ok(self.key.entity_id()?)
    }

    /// Sets an inline value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), Field::Value(value.into()));
    }

    /// Builder-style variant of [`Record::set`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a reference field.
    pub fn set_reference(&mut self, name: impl Into<String>, key: RecordKey, action: ReferenceAction) {
        self.fields
            .insert(name.into(), Field::Reference(Reference::new(key, action)));
    }

    /// Sets an asset field.
    pub fn set_asset(&mut self, name: impl Into<String>, path: PathBuf) {
        self.fields
            .insert(name.into(), Field::Asset(AssetRef { path }));
    }

    /// Looks up a field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Looks up an inline value.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.fields.get(name) {
            Some(Field::Value(v)) => Some(v),
            _ => None,
        }
    }

    /// Looks up a reference.
    #[must_use]
    pub fn reference(&self, name: &str) -> Option<&Reference> {
        match self.fields.get(name) {
            Some(Field::Reference(r)) => Some(r),
            _ => None,
        }
    }

    /// Looks up an asset.
    #[must_use]
    pub fn asset(&self, name: &str) -> Option<&AssetRef> {
        match self.fields.get(name) {
            Some(Field::Asset(a)) => Some(a),
            _ => None,
        }
    }

    /// Iterates the asset fields.
    pub fn assets(&self) -> impl Iterator<Item = (&String, &AssetRef)> {
        self.fields.iter().filter_map(|(name, field)| match field {
            Field::Asset(a) => Some((name, a)),
            _ => None,
        })
    }

    /// Returns a text field, or the empty string.
    #[must_use]
    pub fn text(&self, name: &str) -> String {
        self.value(name)
            .and_then(Value::as_text)
            .unwrap_or_default()
            .to_string()
    }

    /// Returns an optional text field.
    #[must_use]
    pub fn opt_text(&self, name: &str) -> Option<&str> {
        self.value(name).and_then(Value::as_text)
    }

    /// Returns an integer field, or `default`.
    #[must_use]
    pub fn integer_or(&self, name: &str, default: i64) -> i64 {
        self.value(name)
            .and_then(Value::as_integer)
            .unwrap_or(default)
    }

    /// Returns a boolean field, or `default`.
    #[must_use]
    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        self.value(name).and_then(Value::as_bool).unwrap_or(default)
    }

    /// Returns a byte field.
    #[must_use]
    pub fn bytes(&self, name: &str) -> Option<&[u8]> {
        self.value(name).and_then(Value::as_bytes)
    }

    /// Returns a required integer field.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::MissingField`] if absent or not an integer.
    pub fn require_integer(&self, name: &str) -> RecordResult<i64> {
        self.value(name)
            .and_then(Value::as_integer)
            .ok_or_else(|| RecordError::missing_field(&self.record_type, name))
    }

    /// Returns a required reference.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::MissingField`] if absent or not a reference.
    pub fn require_reference(&self, name: &str) -> RecordResult<&Reference> {
        self.reference(name)
            .ok_or_else(|| RecordError::missing_field(&self.record_type, name))
    }

    /// The record's version stamp, read from its `version` and `modified`
    /// fields.
    #[must_use]
    pub fn stamp(&self) -> RecordStamp {
        RecordStamp {
            version: u32::try_from(self.integer_or("version", 0)).unwrap_or(0),
            modified: Timestamp::from_millis(self.integer_or("modified", 0)),
        }
    }

    /// Converts the record into its wire value.
    ///
    /// # Errors
    ///
    /// Fails if the change tag exceeds the integer range.
    pub fn to_value(&self) -> RecordResult<Value> {
        let fields: Value = self
            .fields
            .iter()
            .map(|(name, field)| (name.clone(), field_to_value(field)))
            .collect();
        let tag = self
            .change_tag
            .map(i64::try_from)
            .transpose()
            .map_err(|_| CodecError::IntegerOverflow)?;
        Ok(Value::empty_map()
            .with("zone", self.key.zone.name())
            .with("name", &self.key.name)
            .with("type", &self.record_type)
            .with("tag", tag)
            .with("fields", fields))
    }

    /// Parses a wire value.
    ///
    /// # Errors
    ///
    /// Fails on missing keys or malformed fields.
    pub fn from_value(value: &Value) -> RecordResult<Self> {
        let key = RecordKey::new(
            ZoneHandle::from_name(value.require_text("zone")?),
            value.require_text("name")?,
        );
        let change_tag = value
            .get("tag")
            .and_then(Value::as_integer)
            .map(u64::try_from)
            .transpose()
            .map_err(|_| CodecError::IntegerOverflow)?;
        let mut fields = BTreeMap::new();
        if let Some(map) = value.get("fields").and_then(Value::as_map) {
            for (name, raw) in map {
                fields.insert(name.clone(), field_from_value(name, raw)?);
            }
        }
        Ok(Self {
            key,
            record_type: value.require_text("type")?.to_string(),
            fields,
            change_tag,
        })
    }

    /// Encodes the record to canonical CBOR.
    ///
    /// # Errors
    ///
    /// Fails if encoding fails.
    pub fn encode(&self) -> RecordResult<Vec<u8>> {
        Ok(to_canonical_cbor(&self.to_value()?)?)
    }

    /// Decodes a record from CBOR.
    ///
    /// # Errors
    ///
    /// Fails on malformed input.
    pub fn decode(bytes: &[u8]) -> RecordResult<Self> {
        Self::from_value(&from_cbor(bytes)?)
    }
}

fn field_to_value(field: &Field) -> Value {
    match field {
        Field::Value(v) => Value::empty_map().with("value", v.clone()),
        Field::Reference(r) => Value::empty_map()
            .with("ref", &r.key.name)
            .with("zone", r.key.zone.name())
            .with("action", r.action.as_str()),
        Field::Asset(a) => Value::empty_map().with("asset", a.path.to_string_lossy().into_owned()),
    }
}

fn field_from_value(name: &str, raw: &Value) -> RecordResult<Field> {
    if let Some(v) = raw.get("value") {
        return Ok(Field::Value(v.clone()));
    }
    if let Some(target) = raw.get("ref").and_then(Value::as_text) {
        let zone = raw.require_text("zone")?;
        let action = raw
            .get("action")
            .and_then(Value::as_text)
            .and_then(ReferenceAction::parse)
            .ok_or_else(|| RecordError::wrong_kind(name, "reference action"))?;
        return Ok(Field::Reference(Reference::new(
            RecordKey::new(ZoneHandle::from_name(zone), target),
            action,
        )));
    }
    if let Some(path) = raw.get("asset").and_then(Value::as_text) {
        return Ok(Field::Asset(AssetRef {
            path: PathBuf::from(path),
        }));
    }
    Err(RecordError::wrong_kind(name, "record field"))
}
