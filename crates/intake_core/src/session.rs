//! One registration form session: composes the validation engine, the step
//! controller and the debouncer, and talks to the submission collaborator.

use std::sync::Arc;

use shared::{domain::FieldValue, protocol::SubmissionReceipt};
use tracing::{debug, info};

use crate::{
    config::Settings,
    debounce::Debouncer,
    notice::NoticeQueue,
    registration::{
        patient_rule_table, patient_steps, provider_rule_table, provider_steps, RulesConfig,
    },
    rules::{DefinitionError, RuleTable},
    steps::{Step, StepController, StepProgress},
    submit::{RegistrationSubmitter, SubmitError},
    validation::{ErrorMap, FieldValidationEngine},
    Clock,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    Moved { from: usize, to: usize },
    Unchanged,
    /// The current step has invalid fields; they are now touched.
    Blocked {
        step: usize,
        invalid_fields: Vec<String>,
    },
}

pub struct RegistrationSession {
    engine: FieldValidationEngine,
    steps: StepController,
    debouncer: Debouncer,
    submitter: Arc<dyn RegistrationSubmitter>,
    notices: NoticeQueue,
    submitted: Option<SubmissionReceipt>,
    submission_error: Option<String>,
}

impl RegistrationSession {
    /// Patient registration with the rule set chosen by `settings`.
    pub fn patient(
        settings: &Settings,
        submitter: Arc<dyn RegistrationSubmitter>,
        notices: NoticeQueue,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, DefinitionError> {
        let rules = patient_rule_table(&settings.rules_config())?;
        Self::new(
            Arc::new(rules),
            patient_steps(),
            Debouncer::new(settings.debounce()),
            submitter,
            notices,
            clock,
        )
    }

    /// Provider registration. Uses the provider rule set; only the debounce
    /// delay is taken from `settings`.
    pub fn provider(
        settings: &Settings,
        submitter: Arc<dyn RegistrationSubmitter>,
        notices: NoticeQueue,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, DefinitionError> {
        let rules = provider_rule_table(&RulesConfig::provider())?;
        Self::new(
            Arc::new(rules),
            provider_steps(),
            Debouncer::new(settings.debounce()),
            submitter,
            notices,
            clock,
        )
    }

    /// Fails when a step lists a field the rule table does not know.
    pub fn new(
        rules: Arc<RuleTable>,
        steps: Vec<Step>,
        debouncer: Debouncer,
        submitter: Arc<dyn RegistrationSubmitter>,
        notices: NoticeQueue,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, DefinitionError> {
        for step in &steps {
            if let Some(field) = step.fields.iter().find(|field| !rules.contains(field)) {
                return Err(DefinitionError::UnknownStepField {
                    step: step.id.clone(),
                    field: field.clone(),
                });
            }
        }

        Ok(Self {
            engine: FieldValidationEngine::new(rules, clock)?,
            steps: StepController::new(steps)?,
            debouncer,
            submitter,
            notices,
            submitted: None,
            submission_error: None,
        })
    }

    pub fn engine(&self) -> &FieldValidationEngine {
        &self.engine
    }

    pub fn steps(&self) -> &StepController {
        &self.steps
    }

    pub fn progress(&self) -> StepProgress {
        self.steps.progress()
    }

    pub fn set_value(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        let ticket = self.engine.set_value(field, value);
        self.debouncer.schedule(ticket);
    }

    pub fn blur(&mut self, field: impl Into<String>) {
        self.engine.touch(field);
    }

    pub fn visible_error(&self, field: &str) -> Option<&str> {
        self.engine.visible_error(field)
    }

    /// Advances only when every field of the current step passes. Otherwise
    /// those fields are touched so their messages show, and nothing moves.
    pub fn next(&mut self) -> NavigationOutcome {
        let from = self.steps.current_index();
        let fields = self.steps.current_step().fields.clone();
        if !self.engine.is_step_valid(fields.as_slice()) {
            let invalid_fields: Vec<String> = fields
                .iter()
                .filter(|field| {
                    let value = self.engine.values().value_or_null(field);
                    self.engine.validate_field(field, &value).is_some()
                })
                .cloned()
                .collect();
            for field in &fields {
                self.engine.touch(field.as_str());
            }
            debug!(step = from, invalid = invalid_fields.len(), "next blocked");
            return NavigationOutcome::Blocked {
                step: from,
                invalid_fields,
            };
        }

        if self.steps.next() {
            NavigationOutcome::Moved {
                from,
                to: self.steps.current_index(),
            }
        } else {
            NavigationOutcome::Unchanged
        }
    }

    pub fn prev(&mut self) -> NavigationOutcome {
        let from = self.steps.current_index();
        if self.steps.prev() {
            NavigationOutcome::Moved {
                from,
                to: self.steps.current_index(),
            }
        } else {
            NavigationOutcome::Unchanged
        }
    }

    /// Step-indicator click. Earlier steps are always reachable; a later one
    /// only when the step right before it has been completed.
    pub fn select_step(&mut self, index: usize) -> NavigationOutcome {
        let from = self.steps.current_index();
        if index == from || index >= self.steps.len() {
            return NavigationOutcome::Unchanged;
        }
        let reachable = index < from || self.steps.is_completed(index - 1);
        if !reachable {
            debug!(step = index, "step selection refused");
            return NavigationOutcome::Unchanged;
        }
        self.steps.go_to(index);
        NavigationOutcome::Moved { from, to: index }
    }

    /// Waits for the pending debounced validation, if any, and applies it.
    pub async fn settle(&mut self) -> bool {
        let Some(latest) = self.engine.pending_ticket() else {
            return false;
        };
        if !self.debouncer.is_scheduled() {
            return self.engine.apply_full_validation(latest);
        }
        while let Some(ticket) = self.debouncer.next_due().await {
            if self.engine.apply_full_validation(ticket) {
                return true;
            }
            if self.engine.pending_ticket().is_none() {
                return false;
            }
        }
        false
    }

    /// Applies a debounced validation that has already come due.
    pub fn poll_validation(&mut self) -> bool {
        self.debouncer
            .try_due()
            .is_some_and(|ticket| self.engine.apply_full_validation(ticket))
    }

    /// Skips the quiet period and validates the whole form now.
    pub fn flush_validation(&mut self) -> &ErrorMap {
        self.debouncer.cancel();
        self.engine.validate_now()
    }

    /// Offered on the last step only. On success the form is cleared and the
    /// receipt kept; on failure a single message is recorded for display.
    pub async fn submit(&mut self) -> Result<SubmissionReceipt, SubmitError> {
        if !self.steps.is_last_step() {
            return Err(SubmitError::NotAtFinalStep);
        }
        self.debouncer.cancel();
        self.submission_error = None;

        let submitter = Arc::clone(&self.submitter);
        match self.engine.submit(submitter.as_ref()).await {
            Ok(receipt) => {
                info!(
                    registration_id = receipt.registration_id.0,
                    "registration session completed"
                );
                self.notices.success(
                    "Registration successful",
                    Some("Your account has been created".to_string()),
                );
                let last = self.steps.current_index();
                self.steps.mark_completed(last);
                self.engine.reset();
                self.submitted = Some(receipt.clone());
                Ok(receipt)
            }
            Err(err) => {
                let message = err.user_message();
                if matches!(err, SubmitError::Rejected { .. }) {
                    self.notices
                        .error("Registration failed", Some(message.clone()));
                }
                self.submission_error = Some(message);
                Err(err)
            }
        }
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted.is_some()
    }

    pub fn receipt(&self) -> Option<&SubmissionReceipt> {
        self.submitted.as_ref()
    }

    pub fn submission_error(&self) -> Option<&str> {
        self.submission_error.as_deref()
    }

    pub fn is_submitting(&self) -> bool {
        self.engine.is_submitting()
    }

    pub fn reset(&mut self) {
        self.debouncer.cancel();
        self.engine.reset();
        self.steps.reset();
        self.submitted = None;
        self.submission_error = None;
    }
}
