//! Three-step campaign creation wizard.
//!
//! The wizard only moves forward when the current step validates; the
//! errors of the last attempt stay available for inline display until the
//! next validation.

use polifund_shared::{CampaignForm, FieldErrors, FormField, Step};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WizardError {
    #[error("Step {step:?} has {} invalid field(s)", .errors.len())]
    Invalid { step: Step, errors: FieldErrors },

    #[error("The form can only be submitted from the last step")]
    NotOnLastStep,

    #[error("The form was already submitted")]
    AlreadySubmitted,
}

#[derive(Debug, Clone)]
pub struct CampaignWizard {
    form: CampaignForm,
    step: Step,
    errors: FieldErrors,
    submitted: bool,
}

impl CampaignWizard {
    pub fn new(form: CampaignForm) -> Self {
        Self {
            form,
            step: Step::Details,
            errors: FieldErrors::new(),
            submitted: false,
        }
    }

    pub fn form(&self) -> &CampaignForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut CampaignForm {
        &mut self.form
    }

    pub fn step(&self) -> Step {
        self.step
    }

    /// Errors of the last failed validation.
    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    /// `(current step, number of steps)`, e.g. `(2, 3)`.
    pub fn progress(&self) -> (u8, u8) {
        (self.step.number(), Step::ALL.len() as u8)
    }

    /// Forget the error shown for `field` once the user edits it.
    pub fn clear_error(&mut self, field: FormField) {
        self.errors.remove(&field);
    }

    /// Validate the current step and move to the next one. The last step
    /// stays where it is; use [`CampaignWizard::submit`] there.
    pub fn next(&mut self) -> Result<Step, WizardError> {
        let errors = self.form.validate_step(self.step);
        if !errors.is_empty() {
            self.errors = errors.clone();
            return Err(WizardError::Invalid {
                step: self.step,
                errors,
            });
        }

        self.errors.clear();
        if let Some(next) = self.step.next() {
            self.step = next;
        }
        Ok(self.step)
    }

    /// Go one step back. Never fails; the first step stays put.
    pub fn back(&mut self) -> Step {
        self.errors.clear();
        if let Some(prev) = self.step.prev() {
            self.step = prev;
        }
        self.step
    }

    /// Validate the whole form and hand it over for creation. On failure
    /// the wizard jumps to the earliest step with errors.
    pub fn submit(&mut self) -> Result<CampaignForm, WizardError> {
        if self.submitted {
            return Err(WizardError::AlreadySubmitted);
        }
        if self.step != Step::Consents {
            return Err(WizardError::NotOnLastStep);
        }

        for step in Step::ALL {
            let errors = self.form.validate_step(step);
            if !errors.is_empty() {
                self.step = step;
                self.errors = errors.clone();
                return Err(WizardError::Invalid { step, errors });
            }
        }

        self.errors.clear();
        self.submitted = true;
        Ok(self.form.clone())
    }
}

impl Default for CampaignWizard {
    fn default() -> Self {
        Self::new(CampaignForm::default())
    }
}
