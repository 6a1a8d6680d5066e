//! File and image attachments of request data fields.

use super::Meta;
use crate::id::TypedId;

/// A file attached to a request data field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    /// Shared bookkeeping.
    pub meta: Meta,
    /// Owning request data field.
    pub data_id: TypedId,
    /// File name.
    pub name: String,
    /// Original location on the device, informational only.
    pub path: String,
    /// File content. Excluded from dictionary projections.
    pub data: Vec<u8>,
}

impl File {
    /// Creates a file attachment.
    #[must_use]
    pub fn new(meta: Meta, data_id: TypedId, name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            meta,
            data_id,
            name: name.into(),
            path: String::new(),
            data,
        }
    }
}

/// An image attached to a request data field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Shared bookkeeping.
    pub meta: Meta,
    /// Owning request data field.
    pub data_id: TypedId,
    /// Image name.
    pub name: String,
    /// Whether the image was captured with the camera.
    pub is_camera_photo: bool,
    /// Encoded image bytes. Excluded from dictionary projections.
    pub data: Vec<u8>,
}

impl Image {
    /// Creates an image attachment.
    #[must_use]
    pub fn new(meta: Meta, data_id: TypedId, name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            meta,
            data_id,
            name: name.into(),
            is_camera_photo: false,
            data,
        }
    }
}
