use std::env;
use std::path::PathBuf;

use anyhow::Result;
use tracing::warn;

pub const DEFAULT_PORTRAIT_SIZE: u32 = 400;

#[derive(Debug, Clone)]
pub struct TextModelConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct ImageModelConfig {
    pub enabled: bool,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl ImageModelConfig {
    pub fn is_configured(&self) -> bool {
        self.enabled && !self.api_key.trim().is_empty()
    }
}

/// Session configuration. Built once in `main` and handed to every call site
/// through [`crate::state::AppState`].
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub logs_dir: PathBuf,
    pub database_url: String,
    pub text: TextModelConfig,
    pub image: ImageModelConfig,
    pub portrait_width: u32,
    pub portrait_height: u32,
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_f32(name: &str, default: f32) -> f32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<f32>().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    match env::var(name) {
        Ok(value) => match value.trim().parse::<u32>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!("Invalid {name} value '{value}'; using {default}.");
                default
            }
        },
        Err(_) => default,
    }
}

pub fn normalize_database_url(value: String) -> String {
    if value.starts_with("sqlite+aiosqlite://") {
        return value.replacen("sqlite+aiosqlite://", "sqlite://", 1);
    }
    value
}

fn clamp_temperature(value: f32) -> f32 {
    if !value.is_finite() {
        return 0.8;
    }
    value.clamp(0.0, 2.0)
}

impl Config {
    pub fn load() -> Result<Self> {
        let text = TextModelConfig {
            api_key: env_string("TEXT_API_KEY", ""),
            base_url: env_string("TEXT_BASE_URL", "https://openrouter.ai/api/v1"),
            model: env_string("TEXT_MODEL", "mistralai/mistral-nemo"),
            temperature: clamp_temperature(env_f32("TEXT_TEMPERATURE", 0.8)),
            max_tokens: env_u32("TEXT_MAX_TOKENS", 1200).max(1),
        };

        let image = ImageModelConfig {
            enabled: env_bool("ENABLE_IMAGE_GENERATION", true),
            api_key: env_string("IMAGE_API_KEY", ""),
            base_url: env_string(
                "IMAGE_BASE_URL",
                "https://generativelanguage.googleapis.com/v1beta",
            ),
            model: env_string("IMAGE_MODEL", "gemini-2.5-flash-image"),
        };

        Ok(Config {
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            logs_dir: PathBuf::from(env_string("LOGS_DIR", "logs")),
            database_url: normalize_database_url(env_string(
                "DATABASE_URL",
                "sqlite://character_studio.db",
            )),
            text,
            image,
            portrait_width: env_u32("PORTRAIT_WIDTH", DEFAULT_PORTRAIT_SIZE),
            portrait_height: env_u32("PORTRAIT_HEIGHT", DEFAULT_PORTRAIT_SIZE),
        })
    }

    /// Configuration with no credentials and an in-memory store.
    #[cfg(test)]
    pub fn offline() -> Self {
        Config {
            log_level: "info".to_string(),
            logs_dir: PathBuf::from("logs"),
            database_url: "sqlite::memory:".to_string(),
            text: TextModelConfig {
                api_key: String::new(),
                base_url: "https://openrouter.ai/api/v1".to_string(),
                model: "mistralai/mistral-nemo".to_string(),
                temperature: 0.8,
                max_tokens: 1200,
            },
            image: ImageModelConfig {
                enabled: false,
                api_key: String::new(),
                base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                model: "gemini-2.5-flash-image".to_string(),
            },
            portrait_width: DEFAULT_PORTRAIT_SIZE,
            portrait_height: DEFAULT_PORTRAIT_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_sqlite_prefix_is_normalized() {
        assert_eq!(
            normalize_database_url("sqlite+aiosqlite:///studio.db".to_string()),
            "sqlite:///studio.db"
        );
        assert_eq!(
            normalize_database_url("sqlite::memory:".to_string()),
            "sqlite::memory:"
        );
    }

    #[test]
    fn image_generation_requires_key_and_flag() {
        let mut image = Config::offline().image;
        assert!(!image.is_configured());
        image.api_key = "secret".to_string();
        assert!(!image.is_configured());
        image.enabled = true;
        assert!(image.is_configured());
        image.api_key = "   ".to_string();
        assert!(!image.is_configured());
    }

    #[test]
    fn temperature_is_clamped() {
        assert_eq!(clamp_temperature(5.0), 2.0);
        assert_eq!(clamp_temperature(-1.0), 0.0);
        assert_eq!(clamp_temperature(f32::NAN), 0.8);
    }
}
