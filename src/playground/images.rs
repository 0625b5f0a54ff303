use std::fmt;
use std::io::Cursor;

use image::{DynamicImage, ImageOutputFormat};
use serde::{Deserialize, Serialize};

use crate::playground::error::{PlaygroundError, Result};

/// MIME type recorded for every image written to shared storage.
pub const PNG_MIME_TYPE: &str = "image/png";

/// File extension the owned store lists.
pub const PNG_EXTENSION: &str = "png";

/// Which backend an image lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageKind {
    /// App-private storage, no credential needed.
    Owned,
    /// System-indexed media store shared with other apps.
    Shared,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Owned => write!(f, "owned"),
            StorageKind::Shared => write!(f, "shared"),
        }
    }
}

/// Opaque address of an item in the shared media catalog.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MediaLocator(String);

impl MediaLocator {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An image decoded from app-private storage.
#[derive(Debug, Clone, PartialEq)]
pub struct InternalImage {
    pub name: String,
    pub image: DynamicImage,
}

/// An entry of the shared media catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalImage {
    pub id: i64,
    pub name: String,
    pub locator: MediaLocator,
}

/// Identifies a single image for deletion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageIdentity {
    Owned(String),
    Shared(MediaLocator),
}

impl ImageIdentity {
    pub fn kind(&self) -> StorageKind {
        match self {
            ImageIdentity::Owned(_) => StorageKind::Owned,
            ImageIdentity::Shared(_) => StorageKind::Shared,
        }
    }
}

impl fmt::Display for ImageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageIdentity::Owned(name) => write!(f, "owned:{}", name),
            ImageIdentity::Shared(locator) => write!(f, "shared:{}", locator),
        }
    }
}

impl From<&InternalImage> for ImageIdentity {
    fn from(image: &InternalImage) -> Self {
        ImageIdentity::Owned(image.name.clone())
    }
}

impl From<&ExternalImage> for ImageIdentity {
    fn from(image: &ExternalImage) -> Self {
        ImageIdentity::Shared(image.locator.clone())
    }
}

/// Encodes `image` as PNG.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageOutputFormat::Png)?;
    Ok(buffer.into_inner())
}

pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    Ok(image::load_from_memory(bytes)?)
}

/// Rejects names that are empty or would escape the storage directory.
pub(crate) fn validate_image_name(name: &str) -> Result<()> {
    let invalid = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');

    if invalid {
        return Err(PlaygroundError::InvalidImageName(name.to_string()));
    }
    Ok(())
}
