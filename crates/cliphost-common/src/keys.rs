//! Object key layout.
//!
//! Every object belonging to an asset lives under the `{asset_id}/` namespace:
//!
//! - `raw` - the uploaded source, deleted after a successful transcode
//! - `thumbnail.jpg` - single frame extracted from the source
//! - `manifest.mpd` - top-level DASH manifest
//! - the segment/representation files the encoder writes next to the manifest
//!
//! Chunked uploads stage their parts as `{key}-{index}` before composing.

use crate::AssetId;
use std::fmt;

/// Object name of the uploaded source video.
pub const RAW_OBJECT: &str = "raw";

/// Object name of the generated thumbnail.
pub const THUMBNAIL_OBJECT: &str = "thumbnail.jpg";

/// Object name of the top-level streaming manifest.
pub const MANIFEST_OBJECT: &str = "manifest.mpd";

/// A fully qualified object key: an asset namespace plus an object name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    asset: AssetId,
    name: String,
}

impl ObjectKey {
    /// Build a key for `name` inside the asset's namespace.
    ///
    /// Returns `None` when the name is not a plain file name (see
    /// [`is_valid_object_name`]).
    pub fn new(asset: AssetId, name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        is_valid_object_name(&name).then_some(Self { asset, name })
    }

    /// Key of the uploaded source video.
    pub fn raw(asset: AssetId) -> Self {
        Self {
            asset,
            name: RAW_OBJECT.to_string(),
        }
    }

    /// Key of the thumbnail image.
    pub fn thumbnail(asset: AssetId) -> Self {
        Self {
            asset,
            name: THUMBNAIL_OBJECT.to_string(),
        }
    }

    /// Key of the streaming manifest.
    pub fn manifest(asset: AssetId) -> Self {
        Self {
            asset,
            name: MANIFEST_OBJECT.to_string(),
        }
    }

    pub fn asset(&self) -> AssetId {
        self.asset
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this key addresses the asset's top-level manifest.
    pub fn is_manifest(&self) -> bool {
        self.name == MANIFEST_OBJECT
    }

    /// Storage path of the `index`-th staged part of a chunked upload.
    pub fn part(&self, index: usize) -> String {
        format!("{self}-{index}")
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.asset, self.name)
    }
}

/// Prefix shared by every object of an asset.
pub fn asset_prefix(asset: AssetId) -> String {
    format!("{asset}/")
}

/// Check that `name` is a single, non-hidden path component.
///
/// # Examples
///
/// ```
/// use cliphost_common::keys::is_valid_object_name;
///
/// assert!(is_valid_object_name("chunk-stream0-00001.m4s"));
/// assert!(!is_valid_object_name("../raw"));
/// assert!(!is_valid_object_name(""));
/// ```
pub fn is_valid_object_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 255
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
}
