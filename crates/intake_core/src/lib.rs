pub mod availability;
pub mod config;
pub mod debounce;
pub mod notice;
pub mod registration;
pub mod rules;
pub mod sanitize;
pub mod session;
pub mod steps;
pub mod strength;
pub mod submit;
pub mod validation;

use chrono::{Local, NaiveDate};

pub use registration::{
    fields, patient_rule_table, patient_steps, provider_rule_table, provider_steps, RulesConfig,
};
pub use rules::{DefinitionError, FieldRule, PasswordPolicy, PhoneRule, RuleTable};
pub use session::{NavigationOutcome, RegistrationSession};
pub use steps::{Step, StepController, StepProgress};
pub use submit::{MockRegistrationApi, RegistrationSubmitter, SubmitError};
pub use validation::{ErrorMap, FieldValidationEngine, ValidationTicket};

/// Source of "today" for age checks and the availability grid.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

#[cfg(test)]
#[path = "tests/fixtures.rs"]
mod fixtures;

#[cfg(test)]
#[path = "tests/rules_tests.rs"]
mod rules_tests;

#[cfg(test)]
#[path = "tests/validation_tests.rs"]
mod validation_tests;

#[cfg(test)]
#[path = "tests/steps_tests.rs"]
mod steps_tests;

#[cfg(test)]
#[path = "tests/provider_tests.rs"]
mod provider_tests;

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod session_tests;

#[cfg(test)]
#[path = "tests/support_tests.rs"]
mod support_tests;
