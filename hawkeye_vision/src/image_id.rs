//! Content-derived identity for captured images.
//!
//! An image is known by the SHA-256 of its encoded bytes, so the same photo uploaded
//! twice gets the same id and the same artifact names.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(String);

/// The overlay rasters produced for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Areas,
    Pins,
    Boxes,
    Shafts,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Areas,
        ArtifactKind::Pins,
        ArtifactKind::Boxes,
        ArtifactKind::Shafts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Areas => "areas",
            ArtifactKind::Pins => "pins",
            ArtifactKind::Boxes => "boxes",
            ArtifactKind::Shafts => "shafts",
        }
    }
}

impl ImageId {
    /// Digest of the encoded file bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        ImageId(hex::encode(hasher.finalize()))
    }

    /// Digest of a decoded raster: dimensions (little endian) followed by the pixel bytes.
    pub fn from_raster(image: &RgbImage) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(image.width().to_le_bytes());
        hasher.update(image.height().to_le_bytes());
        hasher.update(image.as_raw());
        ImageId(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Relative storage name of an overlay, `{sha256}/processed_{kind}.png`.
    pub fn artifact_name(&self, kind: ArtifactKind) -> String {
        format!("{}/processed_{}.png", self.0, kind.as_str())
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
