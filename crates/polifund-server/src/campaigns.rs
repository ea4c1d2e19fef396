//! Campaign metadata, gallery and image upload routes.

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use polifund_shared::{check_image, same_address, Lang};
use polifund_store::{Campaign, CampaignInput, GalleryEntry, ImageRecord, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::AppState;
use crate::error::ServerError;
use crate::image_store::{canonical_content_type, sniff_content_type};

const CAMPAIGN_NOT_FOUND: &str = "Kampania nie została znaleziona";

fn campaign_lookup_error(e: StoreError) -> ServerError {
    match e {
        StoreError::NotFound => ServerError::NotFound(CAMPAIGN_NOT_FOUND.to_string()),
        other => other.into(),
    }
}

// ─── Metadata ───

/// Campaign ids arrive either as strings or as bare JSON numbers.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignRequest {
    #[serde(default)]
    campaign_id: Value,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    image_url: Option<String>,
    #[serde(default)]
    location: String,
    #[serde(default)]
    creator: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertResponse {
    success: bool,
    updated: bool,
    campaign: Campaign,
}

pub async fn upsert_campaign(
    State(state): State<AppState>,
    Json(req): Json<CampaignRequest>,
) -> Result<(StatusCode, Json<UpsertResponse>), ServerError> {
    let campaign_id = id_string(&req.campaign_id);
    let (Some(campaign_id), false, false) = (
        campaign_id,
        req.title.trim().is_empty(),
        req.creator.trim().is_empty(),
    ) else {
        return Err(ServerError::BadRequest(
            "Brak wymaganych pól: campaignId, title, creator".to_string(),
        ));
    };

    let input = CampaignInput {
        campaign_id,
        title: req.title.trim().to_string(),
        description: req.description,
        image_url: req.image_url,
        location: req.location,
        creator: req.creator,
    };
    let caller = input.creator.clone();
    let upserted = state
        .store
        .run(move |db| {
            match db.get_campaign(&input.campaign_id) {
                Ok(existing) if !same_address(&existing.creator, &input.creator) => {
                    return Ok(None)
                }
                Ok(_) | Err(StoreError::NotFound) => {}
                Err(e) => return Err(e),
            }
            db.upsert_campaign(&input).map(Some)
        })
        .await?;
    let Some(upserted) = upserted else {
        warn!(editor = %caller, "Campaign update by non-creator rejected");
        return Err(ServerError::Forbidden(
            "Tylko twórca kampanii może edytować kampanię".to_string(),
        ));
    };

    info!(
        campaign_id = %upserted.campaign.campaign_id,
        updated = upserted.updated,
        "Campaign metadata saved"
    );

    let status = if upserted.updated {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(UpsertResponse {
            success: true,
            updated: upserted.updated,
            campaign: upserted.campaign,
        }),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignQuery {
    campaign_id: Option<String>,
}

/// One campaign when `campaignId` is given, otherwise all of them, newest
/// first.
pub async fn get_campaigns(
    State(state): State<AppState>,
    Query(query): Query<CampaignQuery>,
) -> Result<Response, ServerError> {
    match query.campaign_id.filter(|id| !id.trim().is_empty()) {
        Some(id) => {
            let campaign = state
                .store
                .run(move |db| db.get_campaign(id.trim()))
                .await
                .map_err(campaign_lookup_error)?;
            Ok(Json(campaign).into_response())
        }
        None => {
            let campaigns = state.store.run(|db| db.list_campaigns()).await?;
            Ok(Json(campaigns).into_response())
        }
    }
}

#[derive(Serialize)]
pub struct GalleryResponse {
    gallery: Vec<GalleryEntry>,
}

pub async fn gallery(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<GalleryResponse>, ServerError> {
    let gallery = state
        .store
        .run(move |db| {
            db.get_campaign(&id)?;
            db.list_gallery(&id)
        })
        .await
        .map_err(campaign_lookup_error)?;
    Ok(Json(GalleryResponse { gallery }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MainImageResponse {
    image_url: String,
}

pub async fn main_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MainImageResponse>, ServerError> {
    let campaign = state
        .store
        .run(move |db| db.get_campaign(&id))
        .await
        .map_err(campaign_lookup_error)?;
    Ok(Json(MainImageResponse {
        image_url: campaign.image_url,
    }))
}

// ─── Upload ───

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    success: bool,
    image_url: String,
    image_id: Uuid,
    filename: String,
}

struct UploadedFile {
    filename: String,
    content_type: String,
    data: Vec<u8>,
}

fn multipart_error(e: MultipartError) -> ServerError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::PayloadTooLarge
    } else {
        ServerError::BadRequest(format!("Nieprawidłowe dane formularza: {e}"))
    }
}

/// Client file name without any directory part.
fn clean_filename(raw: Option<&str>) -> String {
    raw.and_then(|name| name.rsplit(['/', '\\']).next())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| name.chars().take(255).collect())
        .unwrap_or_else(|| "image".to_string())
}

fn too_large(max: usize) -> ServerError {
    ServerError::BadRequest(
        polifund_shared::FormError::ImageTooLarge { max }.user_message(Lang::Pl),
    )
}

/// `POST /api/campaigns/:id/add-image` with multipart fields `file` and
/// `creator`.
pub async fn add_image(
    State(state): State<AppState>,
    Path(campaign_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ServerError> {
    let max_size = state.config.max_image_size;
    let mut file: Option<UploadedFile> = None;
    let mut creator: Option<String> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let filename = clean_filename(field.file_name());
                let content_type = field.content_type().unwrap_or("").to_string();

                // Stop reading as soon as the limit is crossed.
                let mut data = Vec::new();
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    if data.len() + chunk.len() > max_size {
                        return Err(too_large(max_size));
                    }
                    data.extend_from_slice(&chunk);
                }

                file = Some(UploadedFile {
                    filename,
                    content_type,
                    data,
                });
            }
            "creator" => {
                creator = Some(field.text().await.map_err(multipart_error)?.trim().to_string());
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| ServerError::BadRequest("Nie przesłano pliku".to_string()))?;
    let creator = creator
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ServerError::BadRequest("Brak adresu twórcy kampanii".to_string()))?;

    check_image(&file.content_type, file.data.len(), max_size)
        .map_err(|e| ServerError::BadRequest(e.user_message(Lang::Pl)))?;

    let content_type = canonical_content_type(&file.content_type);
    if sniff_content_type(&file.data) != Some(content_type.as_str()) {
        return Err(ServerError::BadRequest(
            "Zawartość pliku nie odpowiada jego typowi".to_string(),
        ));
    }

    let lookup_id = campaign_id.clone();
    let campaign = state
        .store
        .run(move |db| db.get_campaign(&lookup_id))
        .await
        .map_err(campaign_lookup_error)?;

    if !same_address(&campaign.creator, &creator) {
        warn!(campaign_id = %campaign_id, uploader = %creator, "Image upload by non-creator rejected");
        return Err(ServerError::Forbidden(
            "Tylko twórca kampanii może dodawać zdjęcia".to_string(),
        ));
    }

    let image_id = Uuid::new_v4();
    let hash = state.images.put(image_id, &file.data).await?;
    let image_url = format!("/api/images/{image_id}");
    let now = Utc::now();
    let uploader = creator.to_lowercase();

    let record = ImageRecord {
        id: image_id,
        campaign_id: campaign_id.clone(),
        filename: file.filename.clone(),
        content_type,
        size: file.data.len() as i64,
        uploader: uploader.clone(),
        blake3_hash: hash,
        created_at: now,
    };
    let entry = GalleryEntry {
        image_id,
        url: image_url.clone(),
        filename: file.filename.clone(),
        uploader,
        uploaded_at: now,
    };

    let saved = state
        .store
        .run(move |db| {
            let tx = db.conn().unchecked_transaction()?;
            db.insert_image(&record)?;
            db.add_gallery_entry(&record.campaign_id, &entry)?;
            db.set_campaign_image(&record.campaign_id, &entry.url, false)?;
            tx.commit()?;
            Ok(())
        })
        .await;

    if let Err(e) = saved {
        if let Err(cleanup) = discard_image(&state, image_id).await {
            warn!(error = %cleanup, "Failed to clean up after upload");
        }
        return Err(e.into());
    }

    info!(
        campaign_id = %campaign_id,
        image_id = %image_id,
        size = file.data.len(),
        "Campaign image uploaded"
    );

    Ok(Json(UploadResponse {
        success: true,
        image_url,
        image_id,
        filename: file.filename,
    }))
}

/// Remove an upload's row and file together.
async fn discard_image(state: &AppState, image_id: Uuid) -> Result<(), ServerError> {
    let row = state.store.run(move |db| db.delete_image(image_id)).await;
    let file = state.images.delete(image_id).await;
    match (row, file) {
        (Ok(_), Ok(())) => Ok(()),
        (Err(e), _) => Err(ServerError::Internal(format!(
            "image {image_id} row not removed: {e}"
        ))),
        (_, Err(e)) => Err(ServerError::Internal(format!(
            "image {image_id} file not removed: {e}"
        ))),
    }
}

/// `GET /api/images/:id`: the stored bytes with their content type.
pub async fn serve_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServerError> {
    let record = state
        .store
        .run(move |db| db.get_image(id))
        .await
        .map_err(|e| match e {
            StoreError::NotFound => ServerError::NotFound("Zdjęcie nie istnieje".to_string()),
            other => other.into(),
        })?;
    let data = state.images.get(id).await?;

    Ok((
        [
            (header::CONTENT_TYPE, record.content_type),
            (
                header::CACHE_CONTROL,
                "public, max-age=31536000, immutable".to_string(),
            ),
        ],
        data,
    )
        .into_response())
}
