//! End-to-end campaign creation: the on-chain fundraiser first, then its
//! off-chain metadata and optional cover image.
//!
//! Steps, in order: validate, whitelist check, simulation, transaction,
//! `FundraiserCreated` id extraction, metadata save, image upload. The
//! metadata has to exist before an image can be attached to it, and the
//! first uploaded image becomes the campaign's main image.

use async_trait::async_trait;
use ethers::types::{Address, H256};
use polifund_chain::writer::parse_created_id;
use polifund_chain::{ChainError, CreateFundraiserParams, FundraiserWriter};
use polifund_shared::{normalize_address, CampaignForm, FieldErrors, FormError, FormField, Lang};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::api::{
    ApiClient, Campaign, CampaignMetadata, ClientError, ImageUpload, SavedCampaign, UploadedImage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CreationStep {
    Validate,
    Whitelist,
    Simulate,
    Send,
    ParseEvent,
    SaveMetadata,
    UploadImage,
}

#[derive(Error, Debug)]
pub enum CreationError {
    #[error("Form has {} invalid field(s)", .0.len())]
    Invalid(FieldErrors),

    #[error("Token {0:#x} is not whitelisted")]
    TokenNotWhitelisted(Address),

    #[error("{step:?} failed: {source}")]
    Chain {
        step: CreationStep,
        #[source]
        source: ChainError,
    },

    #[error("Transaction {tx_hash:#x} emitted no FundraiserCreated event")]
    MissingEvent { tx_hash: H256 },

    /// The fundraiser exists on chain; only its off-chain data failed.
    #[error("Fundraiser {fundraiser_id} created, but {step:?} failed: {source}")]
    Metadata {
        fundraiser_id: u64,
        step: CreationStep,
        #[source]
        source: ClientError,
    },
}

impl CreationError {
    pub fn step(&self) -> CreationStep {
        match self {
            Self::Invalid(_) => CreationStep::Validate,
            Self::TokenNotWhitelisted(_) => CreationStep::Whitelist,
            Self::Chain { step, .. } | Self::Metadata { step, .. } => *step,
            Self::MissingEvent { .. } => CreationStep::ParseEvent,
        }
    }

    /// Id of the fundraiser if it was already created on chain.
    pub fn fundraiser_id(&self) -> Option<u64> {
        match self {
            Self::Metadata { fundraiser_id, .. } => Some(*fundraiser_id),
            _ => None,
        }
    }

    pub fn user_message(&self, lang: Lang) -> String {
        match self {
            Self::Invalid(_) => lang
                .pick("Formularz zawiera błędy", "The form contains errors")
                .to_string(),
            Self::TokenNotWhitelisted(_) => lang
                .pick(
                    "Wybrany token nie jest obsługiwany przez platformę",
                    "The selected token is not supported by the platform",
                )
                .to_string(),
            Self::Chain {
                source: ChainError::Revert(revert),
                ..
            } => revert.user_message(lang),
            Self::Chain { .. } => lang
                .pick(
                    "Błąd połączenia z siecią blockchain",
                    "Could not reach the blockchain network",
                )
                .to_string(),
            Self::MissingEvent { .. } => lang
                .pick(
                    "Transakcja została wysłana, ale nie udało się odczytać ID kampanii",
                    "The transaction was sent, but the campaign ID could not be read",
                )
                .to_string(),
            Self::Metadata {
                fundraiser_id,
                source,
                ..
            } => match lang {
                Lang::Pl => format!(
                    "Kampania #{fundraiser_id} została utworzona, ale nie udało się zapisać jej danych: {}",
                    source.user_message(lang)
                ),
                Lang::En => format!(
                    "Campaign #{fundraiser_id} was created, but its details could not be saved: {}",
                    source.user_message(lang)
                ),
            },
        }
    }
}

/// Where campaign metadata and images go after the chain transaction.
#[async_trait]
pub trait MetadataSink: Send + Sync {
    async fn save_campaign(&self, metadata: &CampaignMetadata) -> Result<SavedCampaign, ClientError>;

    async fn upload_image(
        &self,
        campaign_id: &str,
        creator: &str,
        image: &ImageUpload,
    ) -> Result<UploadedImage, ClientError>;
}

#[async_trait]
impl MetadataSink for ApiClient {
    async fn save_campaign(&self, metadata: &CampaignMetadata) -> Result<SavedCampaign, ClientError> {
        self.upsert_campaign(metadata).await
    }

    async fn upload_image(
        &self,
        campaign_id: &str,
        creator: &str,
        image: &ImageUpload,
    ) -> Result<UploadedImage, ClientError> {
        ApiClient::upload_image(self, campaign_id, creator, image).await
    }
}

#[derive(Debug, Clone)]
pub struct CreatedCampaign {
    pub fundraiser_id: u64,
    pub tx_hash: H256,
    pub campaign: Campaign,
    pub image: Option<UploadedImage>,
}

pub struct CampaignCreation<W, S> {
    writer: W,
    sink: S,
    creator: Address,
}

impl<W: FundraiserWriter, S: MetadataSink> CampaignCreation<W, S> {
    /// `creator` is the connected wallet that signs the transaction.
    pub fn new(writer: W, sink: S, creator: Address) -> Self {
        Self {
            writer,
            sink,
            creator,
        }
    }

    /// Contract parameters for a fully validated form.
    pub fn params(form: &CampaignForm) -> Result<CreateFundraiserParams, CreationError> {
        let errors = form.validate_all();
        if !errors.is_empty() {
            return Err(CreationError::Invalid(errors));
        }

        let invalid = |field, error| CreationError::Invalid(FieldErrors::from([(field, error)]));
        let token: Address = normalize_address(&form.token)
            .ok()
            .and_then(|a| a.parse().ok())
            .ok_or_else(|| invalid(FormField::Token, FormError::InvalidAddress))?;
        let goal = form
            .goal_base_units()
            .ok_or_else(|| invalid(FormField::GoalAmount, FormError::InvalidAmount))?;

        Ok(CreateFundraiserParams {
            token,
            goal,
            duration_secs: form.duration_secs(),
            is_flexible: form.is_flexible,
        })
    }

    pub async fn run(
        &self,
        form: &CampaignForm,
        image: Option<&ImageUpload>,
    ) -> Result<CreatedCampaign, CreationError> {
        let params = Self::params(form)?;
        let chain_err = |step| move |source| CreationError::Chain { step, source };

        let whitelisted = self
            .writer
            .is_token_whitelisted(params.token)
            .await
            .map_err(chain_err(CreationStep::Whitelist))?;
        if !whitelisted {
            return Err(CreationError::TokenNotWhitelisted(params.token));
        }

        self.writer
            .simulate_create(&params)
            .await
            .map_err(chain_err(CreationStep::Simulate))?;

        let outcome = self
            .writer
            .send_create(&params)
            .await
            .map_err(chain_err(CreationStep::Send))?;

        let fundraiser_id = parse_created_id(&outcome.logs).ok_or(CreationError::MissingEvent {
            tx_hash: outcome.tx_hash,
        })?;
        info!(
            fundraiser_id,
            tx = ?outcome.tx_hash,
            block = ?outcome.block_number,
            "Fundraiser created on chain"
        );

        let campaign_id = fundraiser_id.to_string();
        let creator = format!("{:#x}", self.creator);
        let metadata_err = |step| {
            move |source| CreationError::Metadata {
                fundraiser_id,
                step,
                source,
            }
        };

        let saved = self
            .sink
            .save_campaign(&CampaignMetadata {
                campaign_id: campaign_id.clone(),
                title: form.title.trim().to_string(),
                description: form.description.trim().to_string(),
                image_url: None,
                location: form.location.trim().to_string(),
                creator: creator.clone(),
            })
            .await
            .map_err(metadata_err(CreationStep::SaveMetadata))?;
        let mut campaign = saved.campaign;

        let image = match image {
            Some(image) => {
                let uploaded = self
                    .sink
                    .upload_image(&campaign_id, &creator, image)
                    .await
                    .map_err(|e| {
                        warn!(fundraiser_id, error = %e, "Cover image upload failed");
                        metadata_err(CreationStep::UploadImage)(e)
                    })?;
                if campaign.image_url.is_empty() {
                    campaign.image_url = uploaded.image_url.clone();
                }
                Some(uploaded)
            }
            None => None,
        };

        info!(fundraiser_id, with_image = image.is_some(), "Campaign created");

        Ok(CreatedCampaign {
            fundraiser_id,
            tx_hash: outcome.tx_hash,
            campaign,
            image,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::Utc;
    use ethers::types::{Log, U256};
    use polifund_chain::{abi, ContractError, TxOutcome};
    use uuid::Uuid;

    use super::*;

    const TOKEN: &str = "0x94a9D9AC8a22534E3FaCa9F4e7F2E2cf85d5E4C8";

    #[derive(Default)]
    struct MockWriter {
        not_whitelisted: bool,
        revert: Option<ContractError>,
        offline: bool,
        no_event: bool,
        calls: Mutex<Vec<&'static str>>,
    }

    impl MockWriter {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FundraiserWriter for MockWriter {
        async fn is_token_whitelisted(&self, _token: Address) -> Result<bool, ChainError> {
            self.calls.lock().unwrap().push("whitelist");
            if self.offline {
                return Err(ChainError::Transport("connection refused".into()));
            }
            Ok(!self.not_whitelisted)
        }

        async fn simulate_create(&self, params: &CreateFundraiserParams) -> Result<(), ChainError> {
            self.calls.lock().unwrap().push("simulate");
            assert_eq!(params.goal, U256::from(1_000_000_000u64));
            assert_eq!(params.duration_secs, 30 * 86_400);
            match &self.revert {
                Some(e) => Err(ChainError::Revert(e.clone())),
                None => Ok(()),
            }
        }

        async fn send_create(&self, _params: &CreateFundraiserParams) -> Result<TxOutcome, ChainError> {
            self.calls.lock().unwrap().push("send");
            let logs = if self.no_event {
                vec![]
            } else {
                vec![Log {
                    topics: vec![abi::fundraiser_created_topic(), H256::from_low_u64_be(17)],
                    ..Default::default()
                }]
            };
            Ok(TxOutcome {
                tx_hash: H256::repeat_byte(0xab),
                block_number: Some(100),
                logs,
            })
        }
    }

    #[derive(Default)]
    struct MockSink {
        fail_upload: bool,
        saved: Mutex<Vec<CampaignMetadata>>,
        uploads: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl MetadataSink for MockSink {
        async fn save_campaign(&self, metadata: &CampaignMetadata) -> Result<SavedCampaign, ClientError> {
            self.saved.lock().unwrap().push(metadata.clone());
            Ok(SavedCampaign {
                success: true,
                updated: false,
                campaign: Campaign {
                    campaign_id: metadata.campaign_id.clone(),
                    title: metadata.title.clone(),
                    description: metadata.description.clone(),
                    image_url: String::new(),
                    location: metadata.location.clone(),
                    creator: metadata.creator.clone(),
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                },
            })
        }

        async fn upload_image(
            &self,
            campaign_id: &str,
            creator: &str,
            image: &ImageUpload,
        ) -> Result<UploadedImage, ClientError> {
            if self.fail_upload {
                return Err(ClientError::Api {
                    status: 400,
                    message: "Plik jest za duży. Maksymalny rozmiar to 5MB".into(),
                });
            }
            self.uploads
                .lock()
                .unwrap()
                .push((campaign_id.to_string(), creator.to_string()));
            let image_id = Uuid::new_v4();
            Ok(UploadedImage {
                success: true,
                image_url: format!("/api/images/{image_id}"),
                image_id,
                filename: image.filename.clone(),
            })
        }
    }

    fn form() -> CampaignForm {
        CampaignForm {
            title: " Nowa biblioteka ".into(),
            description: "Zbiórka na wyposażenie biblioteki szkolnej".into(),
            location: "Kraków".into(),
            token: TOKEN.into(),
            goal_amount: "1000".into(),
            token_decimals: 6,
            duration_days: 30,
            accept_terms: true,
            accept_privacy: true,
            confirm_truthful: true,
            ..CampaignForm::default()
        }
    }

    fn cover() -> ImageUpload {
        ImageUpload {
            filename: "cover.png".into(),
            content_type: "image/png".into(),
            data: vec![0; 32],
        }
    }

    fn creation(writer: MockWriter, sink: MockSink) -> CampaignCreation<MockWriter, MockSink> {
        CampaignCreation::new(writer, sink, Address::repeat_byte(0xcd))
    }

    #[tokio::test]
    async fn test_full_flow_with_image() {
        let flow = creation(MockWriter::default(), MockSink::default());
        let created = flow.run(&form(), Some(&cover())).await.unwrap();

        assert_eq!(created.fundraiser_id, 17);
        assert_eq!(created.tx_hash, H256::repeat_byte(0xab));
        assert_eq!(flow.writer.calls(), vec!["whitelist", "simulate", "send"]);

        let saved = flow.sink.saved.lock().unwrap().clone();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].campaign_id, "17");
        assert_eq!(saved[0].title, "Nowa biblioteka");
        assert_eq!(saved[0].creator, format!("0x{}", "cd".repeat(20)));

        let image = created.image.unwrap();
        assert_eq!(created.campaign.image_url, image.image_url);
        assert_eq!(
            flow.sink.uploads.lock().unwrap().clone(),
            vec![("17".to_string(), format!("0x{}", "cd".repeat(20)))]
        );
    }

    #[tokio::test]
    async fn test_invalid_form_stops_before_chain() {
        let flow = creation(MockWriter::default(), MockSink::default());
        let mut form = form();
        form.accept_terms = false;

        let err = flow.run(&form, None).await.unwrap_err();
        assert_eq!(err.step(), CreationStep::Validate);
        assert!(matches!(&err, CreationError::Invalid(errors) if errors.contains_key(&FormField::AcceptTerms)));
        assert!(flow.writer.calls().is_empty());
    }

    #[tokio::test]
    async fn test_token_not_whitelisted() {
        let writer = MockWriter {
            not_whitelisted: true,
            ..Default::default()
        };
        let flow = creation(writer, MockSink::default());
        let err = flow.run(&form(), None).await.unwrap_err();
        assert_eq!(err.step(), CreationStep::Whitelist);
        assert_eq!(flow.writer.calls(), vec!["whitelist"]);
    }

    #[tokio::test]
    async fn test_simulation_revert_is_decoded() {
        let writer = MockWriter {
            revert: Some(ContractError::ContractPaused),
            ..Default::default()
        };
        let flow = creation(writer, MockSink::default());
        let err = flow.run(&form(), None).await.unwrap_err();

        assert_eq!(err.step(), CreationStep::Simulate);
        assert_eq!(
            err.user_message(Lang::Pl),
            ContractError::ContractPaused.user_message(Lang::Pl)
        );
        assert_eq!(flow.writer.calls(), vec!["whitelist", "simulate"]);
        assert!(flow.sink.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let writer = MockWriter {
            offline: true,
            ..Default::default()
        };
        let flow = creation(writer, MockSink::default());
        let err = flow.run(&form(), None).await.unwrap_err();
        assert_eq!(err.user_message(Lang::En), "Could not reach the blockchain network");
    }

    #[tokio::test]
    async fn test_missing_event() {
        let writer = MockWriter {
            no_event: true,
            ..Default::default()
        };
        let flow = creation(writer, MockSink::default());
        let err = flow.run(&form(), None).await.unwrap_err();
        assert_eq!(err.step(), CreationStep::ParseEvent);
        assert!(flow.sink.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_failure_keeps_fundraiser_id() {
        let sink = MockSink {
            fail_upload: true,
            ..Default::default()
        };
        let flow = creation(MockWriter::default(), sink);
        let err = flow.run(&form(), Some(&cover())).await.unwrap_err();

        assert_eq!(err.step(), CreationStep::UploadImage);
        assert_eq!(err.fundraiser_id(), Some(17));
        assert!(err.user_message(Lang::Pl).starts_with("Kampania #17 została utworzona"));
        // Metadata was saved before the image failed.
        assert_eq!(flow.sink.saved.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_flexible_campaign_without_goal() {
        let mut form = form();
        form.is_flexible = true;
        form.goal_amount.clear();
        let params = CampaignCreation::<MockWriter, MockSink>::params(&form).unwrap();
        assert!(params.goal.is_zero());
        assert!(params.is_flexible);
        assert_eq!(params.token, TOKEN.parse::<Address>().unwrap());
    }

    #[test]
    fn test_eighteen_decimal_goal_keeps_full_precision() {
        let mut form = form();
        form.token_decimals = 18;
        form.goal_amount = "1000000000000000000000".into();
        let params = CampaignCreation::<MockWriter, MockSink>::params(&form).unwrap();
        assert_eq!(params.goal, U256::exp10(39));
    }
}
