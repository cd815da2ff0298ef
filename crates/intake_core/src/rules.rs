//! Declarative field rules.
//!
//! Each field owns an ordered list of [`Rule`] variants. Rules are always
//! evaluated in the order `Required, MinLength, MaxLength, Pattern, Equals,
//! Predicate`, regardless of the order they were attached in, and the first
//! failure wins. Blank values short-circuit: a required field reports its
//! required message, an optional field passes without running the rest.

use std::{collections::BTreeMap, fmt, sync::Arc};

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use shared::domain::{FieldValue, FormRecord};
use thiserror::Error;

/// Inputs a rule may consult besides the value under test.
pub struct RuleContext<'a> {
    pub values: &'a FormRecord,
    pub today: NaiveDate,
}

pub type PredicateFn =
    Arc<dyn Fn(&FieldValue, &RuleContext<'_>) -> Result<(), String> + Send + Sync>;

#[derive(Clone)]
pub enum Rule {
    Required {
        message: Option<String>,
    },
    MinLength {
        min: usize,
        message: Option<String>,
    },
    MaxLength {
        max: usize,
        message: Option<String>,
    },
    Pattern {
        regex: Regex,
        message: Option<String>,
    },
    Equals {
        other: String,
        message: Option<String>,
    },
    Predicate {
        name: &'static str,
        check: PredicateFn,
    },
}

impl Rule {
    fn rank(&self) -> u8 {
        match self {
            Rule::Required { .. } => 0,
            Rule::MinLength { .. } => 1,
            Rule::MaxLength { .. } => 2,
            Rule::Pattern { .. } => 3,
            Rule::Equals { .. } => 4,
            Rule::Predicate { .. } => 5,
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Required { .. } => write!(f, "Required"),
            Rule::MinLength { min, .. } => write!(f, "MinLength({min})"),
            Rule::MaxLength { max, .. } => write!(f, "MaxLength({max})"),
            Rule::Pattern { regex, .. } => write!(f, "Pattern({})", regex.as_str()),
            Rule::Equals { other, .. } => write!(f, "Equals({other})"),
            Rule::Predicate { name, .. } => write!(f, "Predicate({name})"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("field '{field}' declares an invalid pattern: {source}")]
    InvalidPattern {
        field: String,
        source: regex::Error,
    },
    #[error("field '{0}' is declared more than once")]
    DuplicateField(String),
    #[error("field '{field}' must equal unknown field '{other}'")]
    UnknownEqualsTarget { field: String, other: String },
    #[error("field '{0}' cannot be compared with itself")]
    SelfReference(String),
    #[error("field '{field}' has min length {min} above max length {max}")]
    LengthBounds { field: String, min: usize, max: usize },
    #[error("no steps defined")]
    NoSteps,
    #[error("step '{0}' is declared more than once")]
    DuplicateStep(String),
    #[error("step '{step}' references field '{field}' with no rule")]
    UnknownStepField { step: String, field: String },
    #[error("failed to compile submission screen: {0}")]
    Screen(#[from] regex::Error),
}

/// Rules attached to one field, plus the label used in generic messages.
#[derive(Debug, Clone)]
pub struct FieldRule {
    field: String,
    label: String,
    rules: Vec<Rule>,
}

impl FieldRule {
    pub fn new(field: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            label: label.into(),
            rules: Vec::new(),
        }
    }

    fn push(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self.rules.sort_by_key(Rule::rank);
        self
    }

    pub fn required(self, message: impl Into<String>) -> Self {
        self.push(Rule::Required {
            message: Some(message.into()),
        })
    }

    pub fn min_length(self, min: usize, message: impl Into<String>) -> Self {
        self.push(Rule::MinLength {
            min,
            message: Some(message.into()),
        })
    }

    pub fn max_length(self, max: usize, message: impl Into<String>) -> Self {
        self.push(Rule::MaxLength {
            max,
            message: Some(message.into()),
        })
    }

    /// Attach a pattern rule. A `None` message falls back to the generic
    /// "has an invalid format" text.
    pub fn pattern(self, pattern: &str, message: Option<&str>) -> Result<Self, DefinitionError> {
        let regex = Regex::new(pattern).map_err(|source| DefinitionError::InvalidPattern {
            field: self.field.clone(),
            source,
        })?;
        Ok(self.push(Rule::Pattern {
            regex,
            message: message.map(str::to_string),
        }))
    }

    pub fn equals(self, other: impl Into<String>, message: impl Into<String>) -> Self {
        self.push(Rule::Equals {
            other: other.into(),
            message: Some(message.into()),
        })
    }

    pub fn predicate(
        self,
        name: &'static str,
        check: impl Fn(&FieldValue, &RuleContext<'_>) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.push(Rule::Predicate {
            name,
            check: Arc::new(check),
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn has_pattern(&self) -> bool {
        self.rules
            .iter()
            .any(|rule| matches!(rule, Rule::Pattern { .. }))
    }

    pub fn is_required(&self) -> bool {
        self.rules
            .iter()
            .any(|rule| matches!(rule, Rule::Required { .. }))
    }

    /// First failing rule's message, or `None` when the value is acceptable.
    pub fn check(&self, value: &FieldValue, ctx: &RuleContext<'_>) -> Option<String> {
        if value.is_blank() {
            return self.rules.iter().find_map(|rule| match rule {
                Rule::Required { message } => Some(
                    message
                        .clone()
                        .unwrap_or_else(|| format!("{} is required", self.label)),
                ),
                _ => None,
            });
        }

        for rule in &self.rules {
            let failure = match rule {
                Rule::Required { .. } => None,
                Rule::MinLength { min, message } => match value.char_len() {
                    None => Some(self.format_message()),
                    Some(len) if len < *min => Some(message.clone().unwrap_or_else(|| {
                        format!("{} must be at least {min} characters", self.label)
                    })),
                    Some(_) => None,
                },
                Rule::MaxLength { max, message } => match value.char_len() {
                    None => Some(self.format_message()),
                    Some(len) if len > *max => Some(message.clone().unwrap_or_else(|| {
                        format!("{} cannot exceed {max} characters", self.label)
                    })),
                    Some(_) => None,
                },
                Rule::Pattern { regex, .. } => match value.as_text() {
                    Some(text) if regex.is_match(text) => None,
                    _ => Some(self.format_message()),
                },
                Rule::Equals { other, message } => {
                    if *value == ctx.values.value_or_null(other) {
                        None
                    } else {
                        Some(
                            message
                                .clone()
                                .unwrap_or_else(|| format!("{} must match {other}", self.label)),
                        )
                    }
                }
                Rule::Predicate { check, .. } => check(value, ctx).err(),
            };
            if failure.is_some() {
                return failure;
            }
        }

        None
    }

    /// The pattern's message if the field has one, else a generic one. Also
    /// used when a text rule is handed a date or a list.
    fn format_message(&self) -> String {
        self.rules
            .iter()
            .find_map(|rule| match rule {
                Rule::Pattern { message, .. } => message.clone(),
                _ => None,
            })
            .unwrap_or_else(|| format!("{} has an invalid format", self.label))
    }

    fn length_bounds(&self) -> (Option<usize>, Option<usize>) {
        let mut min = None;
        let mut max = None;
        for rule in &self.rules {
            match rule {
                Rule::MinLength { min: n, .. } => min = Some(*n),
                Rule::MaxLength { max: n, .. } => max = Some(*n),
                _ => {}
            }
        }
        (min, max)
    }
}

/// Immutable, checked set of field rules.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: BTreeMap<String, FieldRule>,
}

impl RuleTable {
    /// Builds the table, rejecting duplicate fields, dangling `Equals` targets
    /// and inverted length bounds.
    pub fn new(rules: Vec<FieldRule>) -> Result<Self, DefinitionError> {
        let mut table = BTreeMap::new();
        for rule in rules {
            if table.contains_key(rule.field()) {
                return Err(DefinitionError::DuplicateField(rule.field.clone()));
            }
            table.insert(rule.field.clone(), rule);
        }

        for rule in table.values() {
            for entry in &rule.rules {
                if let Rule::Equals { other, .. } = entry {
                    if other == &rule.field {
                        return Err(DefinitionError::SelfReference(rule.field.clone()));
                    }
                    if !table.contains_key(other) {
                        return Err(DefinitionError::UnknownEqualsTarget {
                            field: rule.field.clone(),
                            other: other.clone(),
                        });
                    }
                }
            }
            if let (Some(min), Some(max)) = rule.length_bounds() {
                if min > max {
                    return Err(DefinitionError::LengthBounds {
                        field: rule.field.clone(),
                        min,
                        max,
                    });
                }
            }
        }

        Ok(Self { rules: table })
    }

    pub fn get(&self, field: &str) -> Option<&FieldRule> {
        self.rules.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.rules.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldRule> {
        self.rules.values()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Canonical password rule set for a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordPolicy {
    /// Special characters limited to `@$!%*?&`.
    #[default]
    Strict,
    /// Wider special set and a 128 character ceiling.
    Broad,
}

impl PasswordPolicy {
    pub const MIN_LENGTH: usize = 8;

    pub fn special_chars(self) -> &'static str {
        match self {
            PasswordPolicy::Strict => "@$!%*?&",
            PasswordPolicy::Broad => "!@#$%^&*()_+-=[]{};':\"\\|,.<>/?",
        }
    }

    pub fn max_length(self) -> Option<usize> {
        match self {
            PasswordPolicy::Strict => None,
            PasswordPolicy::Broad => Some(128),
        }
    }

    pub fn is_special(self, ch: char) -> bool {
        self.special_chars().contains(ch)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(PasswordPolicy::Strict),
            "broad" => Some(PasswordPolicy::Broad),
            _ => None,
        }
    }
}

/// Phone number acceptance rule for a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhoneRule {
    /// `^\+?[\d\s\-\(\)]{10,}$`
    #[default]
    Pattern,
    /// 10 to 15 digits once every non-digit is stripped.
    DigitCount,
}

impl PhoneRule {
    pub const PATTERN: &'static str = r"^\+?[\d\s\-\(\)]{10,}$";
    pub const MIN_DIGITS: usize = 10;
    pub const MAX_DIGITS: usize = 15;

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "pattern" => Some(PhoneRule::Pattern),
            "digit_count" | "digits" => Some(PhoneRule::DigitCount),
            _ => None,
        }
    }
}

/// Whole years between `birth` and `today`, counting a birthday only once its
/// month and day have been reached.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    age
}

pub fn birth_date_check(minimum_age: u32) -> impl Fn(&FieldValue, &RuleContext<'_>) -> Result<(), String> {
    move |value, ctx| {
        let Some(birth) = value.as_date() else {
            return Err("Please enter a valid date".to_string());
        };
        if birth > ctx.today {
            return Err("Date of birth cannot be in the future".to_string());
        }
        if age_on(birth, ctx.today) < minimum_age as i32 {
            return Err(format!("Must be at least {minimum_age} years old"));
        }
        Ok(())
    }
}

pub fn password_complexity_check(
    policy: PasswordPolicy,
) -> impl Fn(&FieldValue, &RuleContext<'_>) -> Result<(), String> {
    move |value, _ctx| {
        let Some(password) = value.as_text() else {
            return Err("Password is required".to_string());
        };
        let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
        let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
        let has_digit = password.chars().any(|c| c.is_ascii_digit());
        let has_special = password.chars().any(|c| policy.is_special(c));

        match policy {
            PasswordPolicy::Strict => {
                if has_lower && has_upper && has_digit && has_special {
                    Ok(())
                } else {
                    Err(
                        "Password must contain uppercase, lowercase, number, and special character"
                            .to_string(),
                    )
                }
            }
            PasswordPolicy::Broad => {
                if !has_lower {
                    Err("Password must contain at least one lowercase letter".to_string())
                } else if !has_upper {
                    Err("Password must contain at least one uppercase letter".to_string())
                } else if !has_digit {
                    Err("Password must contain at least one number".to_string())
                } else if !has_special {
                    Err("Password must contain at least one special character".to_string())
                } else {
                    Ok(())
                }
            }
        }
    }
}

pub fn phone_digit_count_check() -> impl Fn(&FieldValue, &RuleContext<'_>) -> Result<(), String> {
    |value, _ctx| {
        let digits = value
            .as_text()
            .map(|text| text.chars().filter(char::is_ascii_digit).count())
            .unwrap_or_default();
        if digits < PhoneRule::MIN_DIGITS {
            Err(format!(
                "Phone number must be at least {} digits",
                PhoneRule::MIN_DIGITS
            ))
        } else if digits > PhoneRule::MAX_DIGITS {
            Err("Phone number is too long".to_string())
        } else {
            Ok(())
        }
    }
}

pub fn one_of_check(
    options: &'static [&'static str],
) -> impl Fn(&FieldValue, &RuleContext<'_>) -> Result<(), String> {
    move |value, _ctx| match value.as_text() {
        Some(choice) if options.contains(&choice) => Ok(()),
        _ => Err("Please select a valid option".to_string()),
    }
}
