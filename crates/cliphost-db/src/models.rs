use chrono::{DateTime, Utc};
use cliphost_common::AssetId;
use serde::{Deserialize, Serialize};

/// A catalogued clip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    /// True from upload until the transcode succeeds.
    pub processing: bool,
    pub views: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}
