use rusqlite::params;
use uuid::Uuid;

use crate::campaigns::{parse_timestamp, timestamp};
use crate::database::{not_found, Database};
use crate::error::Result;
use crate::models::ImageRecord;

impl Database {
    pub fn insert_image(&self, image: &ImageRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO images (id, campaign_id, filename, content_type, size, uploader, blake3_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                image.id.to_string(),
                image.campaign_id,
                image.filename,
                image.content_type,
                image.size,
                image.uploader,
                image.blake3_hash,
                timestamp(image.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_image(&self, id: Uuid) -> Result<ImageRecord> {
        self.conn()
            .query_row(
                "SELECT id, campaign_id, filename, content_type, size, uploader, blake3_hash, created_at
                 FROM images
                 WHERE id = ?1",
                params![id.to_string()],
                row_to_image,
            )
            .map_err(not_found)
    }

    // only removes the db record, not the file on disk
    pub fn delete_image(&self, id: Uuid) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM images WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

fn row_to_image(row: &rusqlite::Row<'_>) -> rusqlite::Result<ImageRecord> {
    let id_str: String = row.get(0)?;
    let created_str: String = row.get(7)?;

    let id = Uuid::parse_str(&id_str)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?;

    Ok(ImageRecord {
        id,
        campaign_id: row.get(1)?,
        filename: row.get(2)?,
        content_type: row.get(3)?,
        size: row.get(4)?,
        uploader: row.get(5)?,
        blake3_hash: row.get(6)?,
        created_at: parse_timestamp(7, &created_str)?,
    })
}
