//! Campaign creation form and its per-step validation rules.
//!
//! The form is filled in three linear steps: campaign details, financial
//! settings and consents. Each step is validated independently into a
//! field-keyed error map; an empty map means the step is complete.

use std::collections::BTreeMap;

use ethers::types::U256;
use serde::{Deserialize, Serialize};

use crate::address::normalize_address;
use crate::constants::*;
use crate::error::FormError;

/// The three steps of the creation form, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    Details,
    Financial,
    Consents,
}

impl Step {
    pub const ALL: [Step; 3] = [Step::Details, Step::Financial, Step::Consents];

    /// 1-based position of the step.
    pub fn number(self) -> u8 {
        match self {
            Self::Details => 1,
            Self::Financial => 2,
            Self::Consents => 3,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Self::Details),
            2 => Some(Self::Financial),
            3 => Some(Self::Consents),
            _ => None,
        }
    }

    pub fn next(self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }

    pub fn prev(self) -> Option<Self> {
        self.number().checked_sub(1).and_then(Self::from_number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FormField {
    Title,
    Description,
    Location,
    Image,
    Token,
    GoalAmount,
    DurationDays,
    AcceptTerms,
    AcceptPrivacy,
    ConfirmTruthful,
}

/// Image picked by the user, described by what the browser reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAttachment {
    pub filename: String,
    pub content_type: String,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignForm {
    // -- step 1: details --
    pub title: String,
    pub description: String,
    pub location: String,
    pub image: Option<ImageAttachment>,

    // -- step 2: financial settings --
    /// Payment token contract address.
    pub token: String,
    /// Goal in whole token units, e.g. `"1500.50"`.
    pub goal_amount: String,
    pub token_decimals: u32,
    pub duration_days: u32,
    /// Flexible campaigns keep whatever they raise; goal campaigns refund
    /// donors when the goal is missed.
    pub is_flexible: bool,

    // -- step 3: consents --
    pub accept_terms: bool,
    pub accept_privacy: bool,
    pub confirm_truthful: bool,
}

impl Default for CampaignForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            location: String::new(),
            image: None,
            token: String::new(),
            goal_amount: String::new(),
            token_decimals: DEFAULT_TOKEN_DECIMALS,
            duration_days: 30,
            is_flexible: false,
            accept_terms: false,
            accept_privacy: false,
            confirm_truthful: false,
        }
    }
}

pub type FieldErrors = BTreeMap<FormField, FormError>;

impl CampaignForm {
    /// Validate one step. An empty map means the step may be left.
    pub fn validate_step(&self, step: Step) -> FieldErrors {
        let mut errors = FieldErrors::new();
        match step {
            Step::Details => self.validate_details(&mut errors),
            Step::Financial => self.validate_financial(&mut errors),
            Step::Consents => self.validate_consents(&mut errors),
        }
        errors
    }

    /// Validate every step, merging the maps.
    pub fn validate_all(&self) -> FieldErrors {
        Step::ALL
            .iter()
            .flat_map(|step| self.validate_step(*step))
            .collect()
    }

    /// Goal converted to token base units, `None` while it does not parse.
    /// Flexible campaigns without a goal yield zero.
    pub fn goal_base_units(&self) -> Option<U256> {
        if self.is_flexible && self.goal_amount.trim().is_empty() {
            return Some(U256::zero());
        }
        parse_units(&self.goal_amount, self.token_decimals)
    }

    pub fn duration_secs(&self) -> u64 {
        u64::from(self.duration_days) * 24 * 60 * 60
    }

    fn validate_details(&self, errors: &mut FieldErrors) {
        check_length(errors, FormField::Title, &self.title, TITLE_MIN_LEN, TITLE_MAX_LEN);
        check_length(
            errors,
            FormField::Description,
            &self.description,
            DESCRIPTION_MIN_LEN,
            DESCRIPTION_MAX_LEN,
        );

        if self.location.trim().chars().count() > LOCATION_MAX_LEN {
            errors.insert(FormField::Location, FormError::TooLong { max: LOCATION_MAX_LEN });
        }

        if let Some(image) = &self.image {
            if let Err(e) = check_image(&image.content_type, image.size, MAX_IMAGE_SIZE) {
                errors.insert(FormField::Image, e);
            }
        }
    }

    fn validate_financial(&self, errors: &mut FieldErrors) {
        if self.token.trim().is_empty() {
            errors.insert(FormField::Token, FormError::Required);
        } else if normalize_address(&self.token).is_err() {
            errors.insert(FormField::Token, FormError::InvalidAddress);
        }

        let goal = self.goal_amount.trim();
        if goal.is_empty() {
            if !self.is_flexible {
                errors.insert(FormField::GoalAmount, FormError::Required);
            }
        } else {
            match parse_units(goal, self.token_decimals) {
                None => {
                    errors.insert(FormField::GoalAmount, FormError::InvalidAmount);
                }
                Some(units) if units.is_zero() => {
                    errors.insert(FormField::GoalAmount, FormError::AmountNotPositive);
                }
                Some(_) => {}
            }
        }

        if !(MIN_DURATION_DAYS..=MAX_DURATION_DAYS).contains(&self.duration_days) {
            errors.insert(
                FormField::DurationDays,
                FormError::DurationOutOfRange {
                    min: MIN_DURATION_DAYS,
                    max: MAX_DURATION_DAYS,
                },
            );
        }
    }

    fn validate_consents(&self, errors: &mut FieldErrors) {
        for (field, given) in [
            (FormField::AcceptTerms, self.accept_terms),
            (FormField::AcceptPrivacy, self.accept_privacy),
            (FormField::ConfirmTruthful, self.confirm_truthful),
        ] {
            if !given {
                errors.insert(field, FormError::ConsentRequired);
            }
        }
    }
}

fn check_length(errors: &mut FieldErrors, field: FormField, value: &str, min: usize, max: usize) {
    let len = value.trim().chars().count();
    if len == 0 {
        errors.insert(field, FormError::Required);
    } else if len < min {
        errors.insert(field, FormError::TooShort { min });
    } else if len > max {
        errors.insert(field, FormError::TooLong { max });
    }
}

/// Image acceptance rule shared by the form and the upload endpoint.
pub fn check_image(content_type: &str, size: usize, max_size: usize) -> Result<(), FormError> {
    let content_type = content_type.trim().to_ascii_lowercase();
    if !ALLOWED_IMAGE_TYPES.contains(&content_type.as_str()) {
        return Err(FormError::UnsupportedImageType);
    }
    if size > max_size {
        return Err(FormError::ImageTooLarge { max: max_size });
    }
    Ok(())
}

/// Digits that always fit in a `U256` (its maximum is about 1.16e77).
const MAX_UNIT_DIGITS: usize = 77;

/// Parse a decimal amount (`"12.5"`, `"12,5"`) into base units with the
/// given number of decimals. Rejects signs, exponents, excess precision
/// and anything too large for a `U256`.
pub fn parse_units(amount: &str, decimals: u32) -> Option<U256> {
    let amount = amount.trim().replace(',', ".");
    let (whole, frac) = amount.split_once('.').unwrap_or((amount.as_str(), ""));
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    // ethers silently truncates extra decimals.
    if frac.len() > decimals as usize {
        return None;
    }
    let significant = whole.trim_start_matches('0').len();
    if significant + decimals as usize > MAX_UNIT_DIGITS {
        return None;
    }

    let whole = if whole.is_empty() { "0" } else { whole };
    let normalized = if frac.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{frac}")
    };
    ethers::utils::parse_units(normalized, decimals)
        .ok()
        .map(U256::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_form() -> CampaignForm {
        CampaignForm {
            title: "Nowa biblioteka".into(),
            description: "Zbiórka na wyposażenie biblioteki szkolnej w Krakowie".into(),
            location: "Kraków".into(),
            image: Some(ImageAttachment {
                filename: "cover.png".into(),
                content_type: "image/png".into(),
                size: 1024,
            }),
            token: "0x94a9D9AC8a22534E3FaCa9F4e7F2E2cf85d5E4C8".into(),
            goal_amount: "1500.50".into(),
            token_decimals: 6,
            duration_days: 30,
            is_flexible: false,
            accept_terms: true,
            accept_privacy: true,
            confirm_truthful: true,
        }
    }

    #[test]
    fn test_complete_form_has_no_errors() {
        let form = filled_form();
        for step in Step::ALL {
            assert!(form.validate_step(step).is_empty(), "step {step:?}");
        }
        assert!(form.validate_all().is_empty());
    }

    #[test]
    fn test_empty_form_errors_per_step() {
        let form = CampaignForm::default();

        let details = form.validate_step(Step::Details);
        assert_eq!(details.get(&FormField::Title), Some(&FormError::Required));
        assert_eq!(details.get(&FormField::Description), Some(&FormError::Required));
        assert!(!details.contains_key(&FormField::Token));

        let financial = form.validate_step(Step::Financial);
        assert_eq!(financial.get(&FormField::Token), Some(&FormError::Required));
        assert_eq!(financial.get(&FormField::GoalAmount), Some(&FormError::Required));
        assert!(!financial.contains_key(&FormField::DurationDays));

        let consents = form.validate_step(Step::Consents);
        assert_eq!(consents.len(), 3);
    }

    #[test]
    fn test_details_length_bounds() {
        let mut form = filled_form();
        form.title = "abc".into();
        form.description = "x".repeat(DESCRIPTION_MAX_LEN + 1);
        let errors = form.validate_step(Step::Details);
        assert_eq!(errors.get(&FormField::Title), Some(&FormError::TooShort { min: TITLE_MIN_LEN }));
        assert_eq!(
            errors.get(&FormField::Description),
            Some(&FormError::TooLong { max: DESCRIPTION_MAX_LEN })
        );
    }

    #[test]
    fn test_image_rules() {
        let mut form = filled_form();
        form.image = Some(ImageAttachment {
            filename: "doc.gif".into(),
            content_type: "image/gif".into(),
            size: 10,
        });
        assert_eq!(
            form.validate_step(Step::Details).get(&FormField::Image),
            Some(&FormError::UnsupportedImageType)
        );

        form.image = Some(ImageAttachment {
            filename: "big.jpg".into(),
            content_type: "image/jpeg".into(),
            size: MAX_IMAGE_SIZE + 1,
        });
        assert_eq!(
            form.validate_step(Step::Details).get(&FormField::Image),
            Some(&FormError::ImageTooLarge { max: MAX_IMAGE_SIZE })
        );
    }

    #[test]
    fn test_financial_rules() {
        let mut form = filled_form();
        form.token = "0x1234".into();
        form.goal_amount = "0".into();
        form.duration_days = 0;
        let errors = form.validate_step(Step::Financial);
        assert_eq!(errors.get(&FormField::Token), Some(&FormError::InvalidAddress));
        assert_eq!(errors.get(&FormField::GoalAmount), Some(&FormError::AmountNotPositive));
        assert!(matches!(
            errors.get(&FormField::DurationDays),
            Some(FormError::DurationOutOfRange { .. })
        ));

        form.goal_amount = "12.1234567".into();
        assert_eq!(
            form.validate_step(Step::Financial).get(&FormField::GoalAmount),
            Some(&FormError::InvalidAmount)
        );
    }

    #[test]
    fn test_flexible_campaign_may_skip_goal() {
        let mut form = filled_form();
        form.is_flexible = true;
        form.goal_amount = String::new();
        assert!(form.validate_step(Step::Financial).is_empty());
        assert_eq!(form.goal_base_units(), Some(U256::zero()));
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_units("1500.50", 6), Some(U256::from(1_500_500_000u64)));
        assert_eq!(parse_units("1,5", 6), Some(U256::from(1_500_000u64)));
        assert_eq!(parse_units(".5", 2), Some(U256::from(50u64)));
        assert_eq!(parse_units("5.", 2), Some(U256::from(500u64)));
        assert_eq!(parse_units("7", 0), Some(U256::from(7u64)));
        assert_eq!(parse_units("1.234", 2), None);
        assert_eq!(parse_units("1.2.3", 2), None);
        assert_eq!(parse_units("-1", 6), None);
        assert_eq!(parse_units("1e6", 6), None);
        assert_eq!(parse_units(".", 6), None);
        assert_eq!(parse_units("", 6), None);
    }

    #[test]
    fn test_parse_units_beyond_u128() {
        // 1e21 tokens with 18 decimals is 1e39 base units.
        let units = parse_units("1000000000000000000000", 18).unwrap();
        assert_eq!(units, U256::exp10(39));
        assert!(units > U256::from(u128::MAX));

        assert_eq!(parse_units("0.000000000000000001", 18), Some(U256::one()));
        assert_eq!(parse_units("1", 77), None);
        assert_eq!(parse_units(&"9".repeat(78), 0), None);
    }

    #[test]
    fn test_step_navigation() {
        assert_eq!(Step::Details.next(), Some(Step::Financial));
        assert_eq!(Step::Consents.next(), None);
        assert_eq!(Step::Details.prev(), None);
        assert_eq!(Step::Consents.prev(), Some(Step::Financial));
    }
}
