use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

use crate::{
    registration::RulesConfig,
    rules::{PasswordPolicy, PhoneRule},
};

pub const DEFAULT_CONFIG_FILE: &str = "intake.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database_url: String,
    pub debounce_ms: u64,
    pub password_policy: PasswordPolicy,
    pub phone_rule: PhoneRule,
    pub minimum_age: u32,
    pub submit_delay_ms: u64,
    pub notice_ttl_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./data/intake.db".into(),
            debounce_ms: 300,
            password_policy: PasswordPolicy::Strict,
            phone_rule: PhoneRule::Pattern,
            minimum_age: 13,
            submit_delay_ms: 2000,
            notice_ttl_ms: 3000,
        }
    }
}

impl Settings {
    pub fn rules_config(&self) -> RulesConfig {
        RulesConfig {
            password_policy: self.password_policy,
            phone_rule: self.phone_rule,
            minimum_age: self.minimum_age,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn submit_delay(&self) -> Duration {
        Duration::from_millis(self.submit_delay_ms)
    }

    pub fn notice_ttl(&self) -> Duration {
        Duration::from_millis(self.notice_ttl_ms)
    }
}

/// Keys accepted in `intake.toml`. Anything absent keeps its default.
#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    database_url: Option<String>,
    debounce_ms: Option<u64>,
    password_policy: Option<PasswordPolicy>,
    phone_rule: Option<PhoneRule>,
    minimum_age: Option<u32>,
    submit_delay_ms: Option<u64>,
    notice_ttl_ms: Option<u64>,
}

impl FileSettings {
    fn apply(self, settings: &mut Settings) {
        if let Some(v) = self.database_url {
            settings.database_url = v;
        }
        if let Some(v) = self.debounce_ms {
            settings.debounce_ms = v;
        }
        if let Some(v) = self.password_policy {
            settings.password_policy = v;
        }
        if let Some(v) = self.phone_rule {
            settings.phone_rule = v;
        }
        if let Some(v) = self.minimum_age {
            settings.minimum_age = v;
        }
        if let Some(v) = self.submit_delay_ms {
            settings.submit_delay_ms = v;
        }
        if let Some(v) = self.notice_ttl_ms {
            settings.notice_ttl_ms = v;
        }
    }
}

/// Defaults, then `intake.toml` in the working directory, then environment.
pub fn load_settings() -> Settings {
    load_settings_from(Path::new(DEFAULT_CONFIG_FILE))
}

pub fn load_settings_from(path: &Path) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => file_cfg.apply(&mut settings),
            Err(err) => warn!(path = %path.display(), error = %err, "ignoring unreadable config file"),
        }
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = lookup("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = lookup("APP__DEBOUNCE_MS").and_then(|v| v.parse().ok()) {
        settings.debounce_ms = v;
    }
    if let Some(v) = lookup("APP__PASSWORD_POLICY") {
        match PasswordPolicy::parse(&v) {
            Some(policy) => settings.password_policy = policy,
            None => warn!(value = %v, "unknown password policy, keeping current"),
        }
    }
    if let Some(v) = lookup("APP__PHONE_RULE") {
        match PhoneRule::parse(&v) {
            Some(rule) => settings.phone_rule = rule,
            None => warn!(value = %v, "unknown phone rule, keeping current"),
        }
    }
    if let Some(v) = lookup("APP__MINIMUM_AGE").and_then(|v| v.parse().ok()) {
        settings.minimum_age = v;
    }
    if let Some(v) = lookup("APP__SUBMIT_DELAY_MS").and_then(|v| v.parse().ok()) {
        settings.submit_delay_ms = v;
    }
    if let Some(v) = lookup("APP__NOTICE_TTL_MS").and_then(|v| v.parse().ok()) {
        settings.notice_ttl_ms = v;
    }
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(parent) = sqlite_path(database_url)
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
    else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    fs::create_dir_all(&parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    (!path.is_empty()).then(|| PathBuf::from(path))
}
