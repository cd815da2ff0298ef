//! Field values, touched state and error bookkeeping for one form session.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use shared::domain::{FieldValue, FormRecord};
use tracing::debug;

use crate::{
    rules::{DefinitionError, RuleContext, RuleTable},
    sanitize::SubmissionScreen,
    submit::SubmissionGate,
    Clock,
};

/// Field name to the message of its first failing rule.
pub type ErrorMap = BTreeMap<String, String>;

/// Identifies one scheduled whole-form validation. Only the most recent
/// ticket handed out by [`FieldValidationEngine::set_value`] is honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValidationTicket(pub(crate) u64);

impl ValidationTicket {
    pub fn generation(self) -> u64 {
        self.0
    }
}

pub struct FieldValidationEngine {
    rules: Arc<RuleTable>,
    clock: Arc<dyn Clock>,
    values: FormRecord,
    touched: BTreeSet<String>,
    errors: ErrorMap,
    is_valid: bool,
    generation: u64,
    pending: Option<u64>,
    pub(crate) screen: SubmissionScreen,
    pub(crate) gate: SubmissionGate,
}

impl FieldValidationEngine {
    pub fn new(rules: Arc<RuleTable>, clock: Arc<dyn Clock>) -> Result<Self, DefinitionError> {
        let screen = SubmissionScreen::new(&rules)?;
        Ok(Self {
            rules,
            clock,
            values: FormRecord::new(),
            touched: BTreeSet::new(),
            errors: ErrorMap::new(),
            is_valid: false,
            generation: 0,
            pending: None,
            screen,
            gate: SubmissionGate::default(),
        })
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Stores `value`, revalidates the field if it was touched, and hands out
    /// a ticket for the debounced whole-form pass. Any earlier ticket is stale
    /// from this point on.
    pub fn set_value(
        &mut self,
        field: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> ValidationTicket {
        let field = field.into();
        self.values.set(field.clone(), value);
        if self.touched.contains(&field) {
            self.refresh_field(&field);
        }

        self.generation += 1;
        self.pending = Some(self.generation);
        ValidationTicket(self.generation)
    }

    pub fn touch(&mut self, field: impl Into<String>) {
        let field = field.into();
        self.refresh_field(&field);
        self.touched.insert(field);
    }

    fn refresh_field(&mut self, field: &str) {
        let value = self.values.value_or_null(field);
        match self.validate_field(field, &value) {
            Some(message) => {
                self.errors.insert(field.to_string(), message);
            }
            None => {
                self.errors.remove(field);
            }
        }
    }

    /// Checks `value` as if it were stored under `field`. Cross-field rules
    /// read the other fields from the current values. Fields without a rule
    /// always pass.
    pub fn validate_field(&self, field: &str, value: &FieldValue) -> Option<String> {
        let rule = self.rules.get(field)?;
        let ctx = RuleContext {
            values: &self.values,
            today: self.clock.today(),
        };
        rule.check(value, &ctx)
    }

    /// Fresh error map over every field with a rule. Does not store it.
    pub fn validate_all(&self) -> ErrorMap {
        self.rules
            .fields()
            .filter_map(|field| {
                let value = self.values.value_or_null(field);
                self.validate_field(field, &value)
                    .map(|message| (field.to_string(), message))
            })
            .collect()
    }

    pub fn is_step_valid<S: AsRef<str>>(&self, fields: &[S]) -> bool {
        fields.iter().all(|field| {
            let field = field.as_ref();
            let value = self.values.value_or_null(field);
            self.validate_field(field, &value).is_none()
        })
    }

    /// Replaces the error map with a whole-form pass if `ticket` is still the
    /// latest one. Returns whether it was applied.
    pub fn apply_full_validation(&mut self, ticket: ValidationTicket) -> bool {
        if self.pending != Some(ticket.0) {
            debug!(
                ticket = ticket.0,
                latest = self.generation,
                "discarding stale validation"
            );
            return false;
        }
        self.pending = None;
        self.store_full_validation();
        true
    }

    /// Runs the whole-form pass now, superseding anything scheduled.
    pub fn validate_now(&mut self) -> &ErrorMap {
        self.pending = None;
        self.store_full_validation();
        &self.errors
    }

    fn store_full_validation(&mut self) {
        self.errors = self.validate_all();
        self.is_valid = self.errors.is_empty();
        debug!(
            errors = self.errors.len(),
            valid = self.is_valid,
            "applied whole-form validation"
        );
    }

    pub fn pending_ticket(&self) -> Option<ValidationTicket> {
        self.pending.map(ValidationTicket)
    }

    pub(crate) fn mark_touched(&mut self, fields: impl IntoIterator<Item = String>) {
        self.touched.extend(fields);
    }

    pub(crate) fn replace_errors(&mut self, errors: ErrorMap) {
        self.is_valid = errors.is_empty();
        self.errors = errors;
    }

    /// The field's message, but only once the field has been touched.
    pub fn visible_error(&self, field: &str) -> Option<&str> {
        if !self.touched.contains(field) {
            return None;
        }
        self.errors.get(field).map(String::as_str)
    }

    pub fn visible_errors(&self) -> ErrorMap {
        self.errors
            .iter()
            .filter(|(field, _)| self.touched.contains(field.as_str()))
            .map(|(field, message)| (field.clone(), message.clone()))
            .collect()
    }

    pub fn errors(&self) -> &ErrorMap {
        &self.errors
    }

    pub fn is_touched(&self, field: &str) -> bool {
        self.touched.contains(field)
    }

    pub fn touched(&self) -> &BTreeSet<String> {
        &self.touched
    }

    /// Last result of a whole-form pass. `false` until one has run.
    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn values(&self) -> &FormRecord {
        &self.values
    }

    pub fn value(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    pub fn is_submitting(&self) -> bool {
        self.gate.is_busy()
    }

    /// Clears values, touched fields and errors. Outstanding tickets become
    /// stale.
    pub fn reset(&mut self) {
        self.values.clear();
        self.touched.clear();
        self.errors.clear();
        self.is_valid = false;
        self.pending = None;
        self.generation += 1;
        debug!("form state reset");
    }
}
