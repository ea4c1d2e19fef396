use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension};

use crate::database::{not_found, Database};
use crate::error::Result;
use crate::models::{Campaign, CampaignInput, GalleryEntry, Upserted};

const CAMPAIGN_COLUMNS: &str =
    "campaign_id, title, description, image_url, location, creator, created_at, updated_at";

/// Fixed-width RFC-3339 so text ordering matches time ordering.
pub(crate) fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

impl Database {
    /// Insert a campaign, or update the existing one with the same id.
    ///
    /// On update the title, description and location are replaced, the
    /// image URL only when a non-empty one is given, and the creator is
    /// kept as first recorded.
    pub fn upsert_campaign(&self, input: &CampaignInput) -> Result<Upserted> {
        let now = timestamp(Utc::now());
        let tx = self.conn().unchecked_transaction()?;

        let exists = tx
            .query_row(
                "SELECT 1 FROM campaigns WHERE campaign_id = ?1",
                params![input.campaign_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        let image_url = input.image_url.as_deref().filter(|u| !u.is_empty());
        if exists {
            tx.execute(
                "UPDATE campaigns
                 SET title = ?2, description = ?3, location = ?4,
                     image_url = COALESCE(?5, image_url), updated_at = ?6
                 WHERE campaign_id = ?1",
                params![
                    input.campaign_id,
                    input.title,
                    input.description,
                    input.location,
                    image_url,
                    now,
                ],
            )?;
        } else {
            tx.execute(
                "INSERT INTO campaigns (campaign_id, title, description, image_url, location, creator, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    input.campaign_id,
                    input.title,
                    input.description,
                    image_url.unwrap_or_default(),
                    input.location,
                    input.creator.trim().to_lowercase(),
                    now,
                ],
            )?;
        }
        tx.commit()?;

        tracing::debug!(campaign_id = %input.campaign_id, updated = exists, "campaign upserted");
        Ok(Upserted {
            campaign: self.get_campaign(&input.campaign_id)?,
            updated: exists,
        })
    }

    pub fn get_campaign(&self, campaign_id: &str) -> Result<Campaign> {
        self.conn()
            .query_row(
                &format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE campaign_id = ?1"),
                params![campaign_id],
                row_to_campaign,
            )
            .map_err(not_found)
    }

    /// All campaigns, newest first.
    pub fn list_campaigns(&self) -> Result<Vec<Campaign>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns ORDER BY created_at DESC, rowid DESC"
        ))?;

        let rows = stmt.query_map([], row_to_campaign)?;

        let mut campaigns = Vec::new();
        for row in rows {
            campaigns.push(row?);
        }
        Ok(campaigns)
    }

    /// Set the main image. Unless `overwrite` is set, an existing image is
    /// kept. Returns whether the URL changed.
    pub fn set_campaign_image(&self, campaign_id: &str, url: &str, overwrite: bool) -> Result<bool> {
        let sql = if overwrite {
            "UPDATE campaigns SET image_url = ?2, updated_at = ?3 WHERE campaign_id = ?1"
        } else {
            "UPDATE campaigns SET image_url = ?2, updated_at = ?3
             WHERE campaign_id = ?1 AND image_url = ''"
        };
        let affected = self
            .conn()
            .execute(sql, params![campaign_id, url, timestamp(Utc::now())])?;
        Ok(affected > 0)
    }

    pub fn add_gallery_entry(&self, campaign_id: &str, entry: &GalleryEntry) -> Result<()> {
        self.conn().execute(
            "INSERT INTO gallery_entries (campaign_id, image_id, url, filename, uploader, uploaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                campaign_id,
                entry.image_id.to_string(),
                entry.url,
                entry.filename,
                entry.uploader,
                timestamp(entry.uploaded_at),
            ],
        )?;
        Ok(())
    }

    /// Gallery of a campaign in upload order.
    pub fn list_gallery(&self, campaign_id: &str) -> Result<Vec<GalleryEntry>> {
        let mut stmt = self.conn().prepare(
            "SELECT image_id, url, filename, uploader, uploaded_at
             FROM gallery_entries
             WHERE campaign_id = ?1
             ORDER BY seq ASC",
        )?;

        let rows = stmt.query_map(params![campaign_id], |row| {
            let id_str: String = row.get(0)?;
            let uploaded: String = row.get(4)?;
            Ok(GalleryEntry {
                image_id: uuid::Uuid::parse_str(&id_str).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
                })?,
                url: row.get(1)?,
                filename: row.get(2)?,
                uploader: row.get(3)?,
                uploaded_at: parse_timestamp(4, &uploaded)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

fn row_to_campaign(row: &rusqlite::Row<'_>) -> rusqlite::Result<Campaign> {
    let created: String = row.get(6)?;
    let updated: String = row.get(7)?;

    Ok(Campaign {
        campaign_id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        image_url: row.get(3)?,
        location: row.get(4)?,
        creator: row.get(5)?,
        created_at: parse_timestamp(6, &created)?,
        updated_at: parse_timestamp(7, &updated)?,
    })
}
