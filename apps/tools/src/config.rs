use std::{fs, path::Path};

use anyhow::Context;
use chat_core::{ChatSettings, DEFAULT_GREETING, DEFAULT_SELF_NAME};
use serde::Deserialize;
use shared::protocol::UNKNOWN_LABEL;

pub const CONFIG_FILE: &str = "chat.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database_url: String,
    pub self_fallback_name: String,
    pub unknown_name_label: String,
    pub greeting: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./data/chat.db".into(),
            self_fallback_name: DEFAULT_SELF_NAME.into(),
            unknown_name_label: UNKNOWN_LABEL.into(),
            greeting: DEFAULT_GREETING.into(),
        }
    }
}

impl Settings {
    pub fn chat_settings(&self) -> ChatSettings {
        ChatSettings {
            self_fallback_name: self.self_fallback_name.clone(),
            unknown_name_label: self.unknown_name_label.clone(),
            greeting: self.greeting.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    database_url: Option<String>,
    self_fallback_name: Option<String>,
    unknown_name_label: Option<String>,
    greeting: Option<String>,
}

pub fn load_settings() -> anyhow::Result<Settings> {
    load_settings_from(Path::new(CONFIG_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then the config file if it exists, then the environment.
pub fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    if path.exists() {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read '{}'", path.display()))?;
        let file_cfg: FileSettings = toml::from_str(&raw)
            .with_context(|| format!("failed to parse '{}'", path.display()))?;
        if let Some(v) = file_cfg.database_url {
            settings.database_url = v;
        }
        if let Some(v) = file_cfg.self_fallback_name {
            settings.self_fallback_name = v;
        }
        if let Some(v) = file_cfg.unknown_name_label {
            settings.unknown_name_label = v;
        }
        if let Some(v) = file_cfg.greeting {
            settings.greeting = v;
        }
    }

    if let Some(v) = env("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = env("APP__DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = env("APP__SELF_FALLBACK_NAME") {
        settings.self_fallback_name = v;
    }
    if let Some(v) = env("APP__UNKNOWN_NAME_LABEL") {
        settings.unknown_name_label = v;
    }
    if let Some(v) = env("APP__GREETING") {
        settings.greeting = v;
    }

    Ok(settings)
}

pub fn prepare_database_url(raw_database_url: &str) -> String {
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
