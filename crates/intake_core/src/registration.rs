//! Registration form definitions: field names, rule tables and steps for the
//! patient and provider forms. Both run on the same rule engine.

use serde::{Deserialize, Serialize};
use shared::domain::FieldValue;

use crate::{
    rules::{
        birth_date_check, one_of_check, password_complexity_check, phone_digit_count_check,
        DefinitionError, FieldRule, PasswordPolicy, PhoneRule, RuleContext, RuleTable,
    },
    steps::Step,
};

pub mod fields {
    pub const FIRST_NAME: &str = "first_name";
    pub const LAST_NAME: &str = "last_name";
    pub const EMAIL: &str = "email";
    pub const PHONE_NUMBER: &str = "phone_number";
    pub const DATE_OF_BIRTH: &str = "date_of_birth";
    pub const GENDER: &str = "gender";
    pub const PASSWORD: &str = "password";
    pub const CONFIRM_PASSWORD: &str = "confirm_password";
    pub const STREET: &str = "street";
    pub const CITY: &str = "city";
    pub const STATE: &str = "state";
    pub const ZIP: &str = "zip";
    pub const EMERGENCY_NAME: &str = "emergency_name";
    pub const EMERGENCY_PHONE: &str = "emergency_phone";
    pub const EMERGENCY_RELATIONSHIP: &str = "emergency_relationship";
    pub const INSURANCE_PROVIDER: &str = "insurance_provider";
    pub const POLICY_NUMBER: &str = "policy_number";
    pub const MEDICAL_CONDITIONS: &str = "medical_conditions";
    pub const SPECIALIZATION: &str = "specialization";
    pub const LICENSE_NUMBER: &str = "license_number";
    pub const YEARS_OF_EXPERIENCE: &str = "years_of_experience";
}

use fields::*;

const NAME_PATTERN: &str = r"^[a-zA-Z\s'-]+$";
const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";
const ZIP_PATTERN: &str = r"^\d{5}(-\d{4})?$";
const GENDER_OPTIONS: &[&str] = &["male", "female", "other", "prefer_not_to_say"];

/// Deployment-level choices that shape the rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesConfig {
    pub password_policy: PasswordPolicy,
    pub phone_rule: PhoneRule,
    pub minimum_age: u32,
}

impl RulesConfig {
    /// Provider accounts use the broad password set and count phone digits.
    pub fn provider() -> Self {
        Self {
            password_policy: PasswordPolicy::Broad,
            phone_rule: PhoneRule::DigitCount,
            ..Self::default()
        }
    }
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            password_policy: PasswordPolicy::Strict,
            phone_rule: PhoneRule::Pattern,
            minimum_age: 13,
        }
    }
}

fn name_rule(field: &str, label: &str) -> Result<FieldRule, DefinitionError> {
    FieldRule::new(field, label)
        .required(format!("{label} is required"))
        .min_length(2, format!("{label} must be at least 2 characters"))
        .max_length(50, format!("{label} cannot exceed 50 characters"))
        .pattern(
            NAME_PATTERN,
            Some("Only letters, spaces, hyphens, and apostrophes allowed"),
        )
}

fn phone_rule(
    field: &str,
    label: &str,
    rule: PhoneRule,
    required: bool,
) -> Result<FieldRule, DefinitionError> {
    let mut phone = FieldRule::new(field, label);
    if required {
        phone = phone.required("Phone number is required");
    }
    match rule {
        PhoneRule::Pattern => {
            phone.pattern(PhoneRule::PATTERN, Some("Please enter a valid phone number"))
        }
        PhoneRule::DigitCount => Ok(phone.predicate("phone_digits", phone_digit_count_check())),
    }
}

fn password_rule(policy: PasswordPolicy) -> FieldRule {
    let mut password = FieldRule::new(PASSWORD, "Password")
        .required("Password is required")
        .min_length(
            PasswordPolicy::MIN_LENGTH,
            format!(
                "Password must be at least {} characters",
                PasswordPolicy::MIN_LENGTH
            ),
        );
    if let Some(max) = policy.max_length() {
        password = password.max_length(max, format!("Password is too long (max {max} characters)"));
    }
    password.predicate("password_complexity", password_complexity_check(policy))
}

/// Rule table for the three-step patient registration form.
pub fn patient_rule_table(config: &RulesConfig) -> Result<RuleTable, DefinitionError> {
    RuleTable::new(vec![
        name_rule(FIRST_NAME, "First name")?,
        name_rule(LAST_NAME, "Last name")?,
        FieldRule::new(EMAIL, "Email")
            .required("Email is required")
            .pattern(EMAIL_PATTERN, Some("Please enter a valid email address"))?,
        phone_rule(PHONE_NUMBER, "Phone number", config.phone_rule, true)?,
        FieldRule::new(DATE_OF_BIRTH, "Date of birth")
            .required("Date of birth is required")
            .predicate("minimum_age", birth_date_check(config.minimum_age)),
        FieldRule::new(GENDER, "Gender").predicate("gender_option", one_of_check(GENDER_OPTIONS)),
        password_rule(config.password_policy),
        FieldRule::new(CONFIRM_PASSWORD, "Confirm password")
            .required("Please confirm your password")
            .equals(PASSWORD, "Passwords must match"),
        FieldRule::new(STREET, "Street address")
            .required("Street address is required")
            .max_length(200, "Street address cannot exceed 200 characters"),
        FieldRule::new(CITY, "City")
            .required("City is required")
            .max_length(100, "City cannot exceed 100 characters"),
        FieldRule::new(STATE, "State")
            .required("State is required")
            .max_length(50, "State cannot exceed 50 characters"),
        FieldRule::new(ZIP, "ZIP code")
            .required("ZIP code is required")
            .pattern(
                ZIP_PATTERN,
                Some("Please enter a valid ZIP code (12345 or 12345-6789)"),
            )?,
        FieldRule::new(EMERGENCY_NAME, "Emergency contact name")
            .max_length(100, "Name cannot exceed 100 characters"),
        phone_rule(
            EMERGENCY_PHONE,
            "Emergency contact phone",
            config.phone_rule,
            false,
        )?,
        FieldRule::new(EMERGENCY_RELATIONSHIP, "Relationship")
            .max_length(50, "Relationship cannot exceed 50 characters"),
        FieldRule::new(INSURANCE_PROVIDER, "Insurance provider")
            .max_length(100, "Provider name cannot exceed 100 characters"),
        FieldRule::new(POLICY_NUMBER, "Policy number")
            .max_length(50, "Policy number cannot exceed 50 characters"),
        FieldRule::new(MEDICAL_CONDITIONS, "Medical conditions"),
    ])
}

pub fn patient_steps() -> Vec<Step> {
    vec![
        Step::new(
            "personal",
            "Personal Information",
            "Basic details and login credentials (Required)",
            &[
                FIRST_NAME,
                LAST_NAME,
                EMAIL,
                PHONE_NUMBER,
                DATE_OF_BIRTH,
                GENDER,
                PASSWORD,
                CONFIRM_PASSWORD,
            ],
        ),
        Step::new(
            "address",
            "Address Information",
            "Your residential address (Required)",
            &[STREET, CITY, STATE, ZIP],
        ),
        Step::new(
            "additional",
            "Additional Information",
            "Emergency contact, insurance, and medical history (Optional)",
            &[
                EMERGENCY_NAME,
                EMERGENCY_PHONE,
                EMERGENCY_RELATIONSHIP,
                INSURANCE_PROVIDER,
                POLICY_NUMBER,
                MEDICAL_CONDITIONS,
            ],
        ),
    ]
}

const POSTAL_CODE_PATTERN: &str = r"^[A-Za-z0-9\s-]{3,10}$";
const MAX_YEARS_OF_EXPERIENCE: i64 = 50;

/// 5 to 20 letters or digits once spaces are removed.
fn license_number_check(value: &FieldValue, _ctx: &RuleContext<'_>) -> Result<(), String> {
    let Some(raw) = value.as_text() else {
        return Err("License number can only contain letters and numbers".to_string());
    };
    let license: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if license.chars().count() < 5 {
        Err("License number must be at least 5 characters".to_string())
    } else if license.chars().count() > 20 {
        Err("License number must be less than 20 characters".to_string())
    } else if !license.chars().all(|c| c.is_ascii_alphanumeric()) {
        Err("License number can only contain letters and numbers".to_string())
    } else {
        Ok(())
    }
}

fn years_of_experience_check(value: &FieldValue, _ctx: &RuleContext<'_>) -> Result<(), String> {
    let Some(years) = value.as_text().and_then(|text| text.trim().parse::<i64>().ok()) else {
        return Err("Years of experience must be a whole number".to_string());
    };
    if years < 0 {
        Err("Years of experience cannot be negative".to_string())
    } else if years > MAX_YEARS_OF_EXPERIENCE {
        Err(format!(
            "Years of experience cannot exceed {MAX_YEARS_OF_EXPERIENCE} years"
        ))
    } else {
        Ok(())
    }
}

/// Rule table for the four-step provider registration form. Pass
/// [`RulesConfig::provider`] for the usual provider rules.
pub fn provider_rule_table(config: &RulesConfig) -> Result<RuleTable, DefinitionError> {
    RuleTable::new(vec![
        name_rule(FIRST_NAME, "First name")?,
        name_rule(LAST_NAME, "Last name")?,
        FieldRule::new(EMAIL, "Email")
            .required("Email is required")
            .max_length(254, "Email address is too long")
            .pattern(EMAIL_PATTERN, Some("Please enter a valid email address"))?,
        phone_rule(PHONE_NUMBER, "Phone number", config.phone_rule, true)?,
        FieldRule::new(SPECIALIZATION, "Specialization")
            .required("Specialization is required")
            .min_length(3, "Specialization must be at least 3 characters")
            .max_length(100, "Specialization must be less than 100 characters"),
        FieldRule::new(LICENSE_NUMBER, "License number")
            .required("Medical license number is required")
            .predicate("license_number", license_number_check),
        FieldRule::new(YEARS_OF_EXPERIENCE, "Years of experience")
            .required("Years of experience is required")
            .predicate("years_of_experience", years_of_experience_check),
        FieldRule::new(STREET, "Street address")
            .required("Street address is required")
            .max_length(200, "Street address must be less than 200 characters"),
        FieldRule::new(CITY, "City")
            .required("City is required")
            .max_length(100, "City must be less than 100 characters"),
        FieldRule::new(STATE, "State/Province")
            .required("State/Province is required")
            .max_length(50, "State/Province must be less than 50 characters"),
        FieldRule::new(ZIP, "ZIP/Postal code")
            .required("ZIP/Postal code is required")
            .pattern(POSTAL_CODE_PATTERN, Some("Please enter a valid ZIP/Postal code"))?,
        password_rule(config.password_policy),
        FieldRule::new(CONFIRM_PASSWORD, "Confirm password")
            .required("Please confirm your password")
            .equals(PASSWORD, "Passwords do not match"),
    ])
}

pub fn provider_steps() -> Vec<Step> {
    vec![
        Step::new(
            "personal",
            "Personal Information",
            "Your name and contact details",
            &[FIRST_NAME, LAST_NAME, EMAIL, PHONE_NUMBER],
        ),
        Step::new(
            "professional",
            "Professional Information",
            "Specialization, license and experience",
            &[SPECIALIZATION, LICENSE_NUMBER, YEARS_OF_EXPERIENCE],
        ),
        Step::new(
            "clinic",
            "Clinic Address",
            "Where patients will visit you",
            &[STREET, CITY, STATE, ZIP],
        ),
        Step::new(
            "security",
            "Account Security",
            "Choose a password for your account",
            &[PASSWORD, CONFIRM_PASSWORD],
        ),
    ]
}
