//! Records persisted in the metadata database.
//!
//! Every struct serializes to camelCase JSON so API handlers can return
//! them directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Campaign
// ---------------------------------------------------------------------------

/// Off-chain metadata of a fundraiser. `campaign_id` is the on-chain id
/// rendered as a string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub campaign_id: String,
    pub title: String,
    pub description: String,
    /// Main image; empty until one is set or uploaded.
    pub image_url: String,
    pub location: String,
    /// Lowercased creator address.
    pub creator: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input of [`Database::upsert_campaign`](crate::Database::upsert_campaign).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct CampaignInput {
    pub campaign_id: String,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub location: String,
    pub creator: String,
}

/// Result of an upsert: the stored campaign and whether it already existed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted {
    pub campaign: Campaign,
    pub updated: bool,
}

// ---------------------------------------------------------------------------
// Gallery
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GalleryEntry {
    pub image_id: Uuid,
    pub url: String,
    pub filename: String,
    pub uploader: String,
    pub uploaded_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Image file metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    /// Also the file name in the image directory.
    pub id: Uuid,
    pub campaign_id: String,
    /// Original client file name.
    pub filename: String,
    pub content_type: String,
    pub size: i64,
    /// Lowercased uploader address.
    pub uploader: String,
    /// BLAKE3 content hash (hex string).
    pub blake3_hash: String,
    pub created_at: DateTime<Utc>,
}
