//! Cliphost-Common: Shared types and utilities.
//!
//! This crate provides common functionality used across cliphost:
//!
//! - **Typed IDs**: UUID wrapper identifying a clip's media asset
//! - **Object keys**: The per-asset object layout (`raw`, `thumbnail.jpg`,
//!   `manifest.mpd`, encoder segments) and chunk part naming
//! - **Error Handling**: Common error types and result aliases
//!
//! # Examples
//!
//! ```
//! use cliphost_common::{AssetId, ObjectKey};
//!
//! let asset = AssetId::new();
//! let key = ObjectKey::manifest(asset);
//! assert!(key.is_manifest());
//! assert_eq!(key.to_string(), format!("{asset}/manifest.mpd"));
//! ```

pub mod error;
pub mod ids;
pub mod keys;

pub use error::{Error, Result};
pub use ids::*;
pub use keys::*;
