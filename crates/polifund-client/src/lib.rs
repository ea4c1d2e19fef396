//! # polifund-client
//!
//! Client side of campaign creation:
//! - **api**: reqwest client for the metadata and image routes
//! - **wizard**: the three-step form state machine
//! - **creation**: the chain transaction followed by the metadata and
//!   image requests, with failures reported per step

pub mod api;
pub mod creation;
pub mod wizard;

pub use api::{
    ApiClient, Campaign, CampaignMetadata, ClientError, GalleryEntry, ImageUpload, SavedCampaign,
    UploadedImage,
};
pub use creation::{CampaignCreation, CreatedCampaign, CreationError, CreationStep, MetadataSink};
pub use wizard::{CampaignWizard, WizardError};
