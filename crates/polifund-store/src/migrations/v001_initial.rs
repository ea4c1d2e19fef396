//! v001 -- Initial schema creation.
//!
//! Creates `campaigns`, `gallery_entries` and `images`.

use rusqlite::Connection;

const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Campaign metadata (keyed by the on-chain fundraiser id)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS campaigns (
    campaign_id TEXT PRIMARY KEY NOT NULL,
    title       TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    image_url   TEXT NOT NULL DEFAULT '',
    location    TEXT NOT NULL DEFAULT '',
    creator     TEXT NOT NULL,               -- lowercased 0x address
    created_at  TEXT NOT NULL,               -- RFC-3339
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_campaigns_created_at ON campaigns(created_at DESC);

-- ----------------------------------------------------------------
-- Uploaded image files (bytes on disk, metadata here)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS images (
    id           TEXT PRIMARY KEY NOT NULL,  -- UUID v4, also the file name on disk
    campaign_id  TEXT NOT NULL,
    filename     TEXT NOT NULL,              -- original client file name
    content_type TEXT NOT NULL,
    size         INTEGER NOT NULL,
    uploader     TEXT NOT NULL,
    blake3_hash  TEXT NOT NULL,
    created_at   TEXT NOT NULL,

    FOREIGN KEY (campaign_id) REFERENCES campaigns(campaign_id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_images_campaign ON images(campaign_id);

-- ----------------------------------------------------------------
-- Campaign gallery, in upload order
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS gallery_entries (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    campaign_id TEXT NOT NULL,
    image_id    TEXT NOT NULL,
    url         TEXT NOT NULL,
    filename    TEXT NOT NULL,
    uploader    TEXT NOT NULL,
    uploaded_at TEXT NOT NULL,

    FOREIGN KEY (campaign_id) REFERENCES campaigns(campaign_id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_gallery_campaign ON gallery_entries(campaign_id, seq);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
