//! # polifund-shared
//!
//! Types and rules shared by every PolyFund crate: platform constants,
//! wallet address handling, display language and the campaign creation
//! form validator.

pub mod address;
pub mod constants;
pub mod error;
pub mod form;
pub mod lang;

pub use address::{normalize_address, same_address};
pub use error::{AddressError, FormError};
pub use form::{check_image, CampaignForm, FieldErrors, FormField, ImageAttachment, Step};
pub use lang::Lang;
