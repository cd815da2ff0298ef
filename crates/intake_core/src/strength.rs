//! Display-only password strength meter. Never consulted by validation.

use serde::Serialize;

use crate::rules::PasswordPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PasswordRequirements {
    pub min_length: bool,
    pub has_lowercase: bool,
    pub has_uppercase: bool,
    pub has_number: bool,
    pub has_special: bool,
}

impl PasswordRequirements {
    pub fn check(password: &str, policy: PasswordPolicy) -> Self {
        Self {
            min_length: password.chars().count() >= PasswordPolicy::MIN_LENGTH,
            has_lowercase: password.chars().any(|c| c.is_ascii_lowercase()),
            has_uppercase: password.chars().any(|c| c.is_ascii_uppercase()),
            has_number: password.chars().any(|c| c.is_ascii_digit()),
            has_special: password.chars().any(|c| policy.is_special(c)),
        }
    }

    pub fn satisfied(&self) -> u8 {
        [
            self.min_length,
            self.has_lowercase,
            self.has_uppercase,
            self.has_number,
            self.has_special,
        ]
        .into_iter()
        .filter(|met| *met)
        .count() as u8
    }

    /// Checklist rows in display order.
    pub fn items(&self, policy: PasswordPolicy) -> Vec<(String, bool)> {
        vec![
            (
                format!("At least {} characters", PasswordPolicy::MIN_LENGTH),
                self.min_length,
            ),
            ("One uppercase letter".to_string(), self.has_uppercase),
            ("One lowercase letter".to_string(), self.has_lowercase),
            ("One number".to_string(), self.has_number),
            (
                format!("One special character ({})", policy.special_chars()),
                self.has_special,
            ),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrengthLevel {
    VeryWeak,
    Weak,
    Fair,
    Strong,
    VeryStrong,
}

impl StrengthLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            0 | 1 => StrengthLevel::VeryWeak,
            2 => StrengthLevel::Weak,
            3 => StrengthLevel::Fair,
            4 => StrengthLevel::Strong,
            _ => StrengthLevel::VeryStrong,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StrengthLevel::VeryWeak => "Very Weak",
            StrengthLevel::Weak => "Weak",
            StrengthLevel::Fair => "Fair",
            StrengthLevel::Strong => "Strong",
            StrengthLevel::VeryStrong => "Very Strong",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PasswordStrength {
    pub score: u8,
    pub level: StrengthLevel,
    pub percentage: u8,
    pub requirements: PasswordRequirements,
}

pub const MAX_STRENGTH_SCORE: u8 = 5;

pub fn password_strength(password: &str, policy: PasswordPolicy) -> PasswordStrength {
    let requirements = PasswordRequirements::check(password, policy);
    let score = requirements.satisfied();
    PasswordStrength {
        score,
        level: StrengthLevel::from_score(score),
        percentage: score * (100 / MAX_STRENGTH_SCORE),
        requirements,
    }
}
