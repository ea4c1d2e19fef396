use serde::Serialize;
use thiserror::Error;

use crate::lang::Lang;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Address must start with 0x")]
    MissingPrefix,

    #[error("Address must have 40 hex digits, got {0}")]
    InvalidLength(usize),

    #[error("Address contains non-hex characters")]
    InvalidHex,
}

/// A single field-level validation failure of the campaign form.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FormError {
    #[error("Field is required")]
    Required,

    #[error("Too short (min {min} characters)")]
    TooShort { min: usize },

    #[error("Too long (max {max} characters)")]
    TooLong { max: usize },

    #[error("Invalid wallet or token address")]
    InvalidAddress,

    #[error("Invalid amount")]
    InvalidAmount,

    #[error("Amount must be greater than zero")]
    AmountNotPositive,

    #[error("Duration must be between {min} and {max} days")]
    DurationOutOfRange { min: u32, max: u32 },

    #[error("Unsupported image type")]
    UnsupportedImageType,

    #[error("Image too large (max {max} bytes)")]
    ImageTooLarge { max: usize },

    #[error("Consent is required")]
    ConsentRequired,
}

impl FormError {
    /// Message shown inline next to the offending field.
    pub fn user_message(&self, lang: Lang) -> String {
        match self {
            Self::Required => lang.pick("To pole jest wymagane", "This field is required").into(),
            Self::TooShort { min } => match lang {
                Lang::Pl => format!("Minimalna długość to {min} znaków"),
                Lang::En => format!("Must be at least {min} characters"),
            },
            Self::TooLong { max } => match lang {
                Lang::Pl => format!("Maksymalna długość to {max} znaków"),
                Lang::En => format!("Must be at most {max} characters"),
            },
            Self::InvalidAddress => lang
                .pick("Nieprawidłowy adres", "Invalid address")
                .into(),
            Self::InvalidAmount => lang
                .pick("Nieprawidłowa kwota", "Invalid amount")
                .into(),
            Self::AmountNotPositive => lang
                .pick("Kwota musi być większa od zera", "Amount must be greater than zero")
                .into(),
            Self::DurationOutOfRange { min, max } => match lang {
                Lang::Pl => format!("Czas trwania musi wynosić od {min} do {max} dni"),
                Lang::En => format!("Duration must be between {min} and {max} days"),
            },
            Self::UnsupportedImageType => lang
                .pick(
                    "Nieprawidłowy typ pliku. Dozwolone: JPEG, PNG, WebP",
                    "Invalid file type. Allowed: JPEG, PNG, WebP",
                )
                .into(),
            Self::ImageTooLarge { max } => match lang {
                Lang::Pl => format!("Plik jest za duży. Maksymalny rozmiar to {}MB", max / (1024 * 1024)),
                Lang::En => format!("File is too large. Maximum size is {}MB", max / (1024 * 1024)),
            },
            Self::ConsentRequired => lang
                .pick("Ta zgoda jest wymagana", "This consent is required")
                .into(),
        }
    }
}
