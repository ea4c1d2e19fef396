//! HTTP client for the campaign metadata API.

use chrono::{DateTime, Utc};
use polifund_shared::Lang;
use reqwest::{multipart, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with an error status and its `{"error"}` body.
    #[error("Server responded {status}: {message}")]
    Api { status: u16, message: String },
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Api { status, .. } => Some(*status),
        }
    }

    /// Server messages are shown as-is; transport failures get a generic
    /// text.
    pub fn user_message(&self, lang: Lang) -> String {
        match self {
            Self::Api { message, .. } => message.clone(),
            Self::Http(_) => lang
                .pick(
                    "Nie można połączyć się z serwerem",
                    "Could not connect to the server",
                )
                .to_string(),
        }
    }
}

/// Metadata sent when a campaign is created or edited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignMetadata {
    pub campaign_id: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub location: String,
    pub creator: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub campaign_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub location: String,
    pub creator: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedCampaign {
    pub success: bool,
    pub updated: bool,
    pub campaign: Campaign,
}

/// Image file picked by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedImage {
    pub success: bool,
    pub image_url: String,
    pub image_id: Uuid,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryEntry {
    pub image_id: Uuid,
    pub url: String,
    pub filename: String,
    pub uploader: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct GalleryResponse {
    gallery: Vec<GalleryEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MainImageResponse {
    image_url: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// `base_url` is the server origin, e.g. `http://localhost:3000`.
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Decode a success body, or turn an error status into
    /// [`ClientError::Api`].
    async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }

        let message = match resp.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string(),
        };
        debug!(status = status.as_u16(), %message, "API request failed");
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    pub async fn upsert_campaign(
        &self,
        metadata: &CampaignMetadata,
    ) -> Result<SavedCampaign, ClientError> {
        let resp = self
            .http
            .post(self.url("/api/campaigns"))
            .json(metadata)
            .send()
            .await?;
        Self::decode(resp).await
    }

    /// `None` when the server has no metadata for this campaign.
    pub async fn get_campaign(&self, campaign_id: &str) -> Result<Option<Campaign>, ClientError> {
        let resp = self
            .http
            .get(self.url("/api/campaigns"))
            .query(&[("campaignId", campaign_id)])
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::decode(resp).await.map(Some)
    }

    /// All campaigns, newest first.
    pub async fn list_campaigns(&self) -> Result<Vec<Campaign>, ClientError> {
        let resp = self.http.get(self.url("/api/campaigns")).send().await?;
        Self::decode(resp).await
    }

    pub async fn upload_image(
        &self,
        campaign_id: &str,
        creator: &str,
        image: &ImageUpload,
    ) -> Result<UploadedImage, ClientError> {
        let part = multipart::Part::bytes(image.data.clone())
            .file_name(image.filename.clone())
            .mime_str(&image.content_type)?;
        let form = multipart::Form::new()
            .text("creator", creator.to_string())
            .part("file", part);

        let resp = self
            .http
            .post(self.url(&format!("/api/campaigns/{campaign_id}/add-image")))
            .multipart(form)
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn gallery(&self, campaign_id: &str) -> Result<Vec<GalleryEntry>, ClientError> {
        let resp = self
            .http
            .get(self.url(&format!("/api/campaigns/{campaign_id}/gallery")))
            .send()
            .await?;
        Ok(Self::decode::<GalleryResponse>(resp).await?.gallery)
    }

    /// URL of the campaign's main image, empty when none was uploaded.
    pub async fn main_image(&self, campaign_id: &str) -> Result<String, ClientError> {
        let resp = self
            .http
            .get(self.url(&format!("/api/campaigns/{campaign_id}/images")))
            .send()
            .await?;
        Ok(Self::decode::<MainImageResponse>(resp).await?.image_url)
    }
}
