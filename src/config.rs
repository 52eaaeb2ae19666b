//! Configuration for chatline
//!
//! Values are layered, later sources winning:
//! built-in defaults, the JSON settings file, environment variables,
//! then command-line flags (applied in `cli`).

use crate::constants::{
    DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT, DEFAULT_TEMPERATURE, DEFAULT_TOP_P,
};
use crate::conversation::ReductionPolicy;
use crate::llm::GenerationSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Errors raised while assembling the configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value {value} for {name}: {reason}")]
    InvalidSetting {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Application configuration structure
#[derive(Debug, Clone)]
pub struct Config {
    /// Model name to use (the provider is inferred from it)
    pub model: String,

    /// API key from the settings file, used by whichever provider is selected
    pub api_key: Option<String>,

    /// `OPENAI_API_KEY`; wins over `api_key` for OpenAI
    pub openai_api_key: Option<String>,

    /// `AZURE_OPENAI_API_KEY`; wins over `api_key` for Azure OpenAI
    pub azure_api_key: Option<String>,

    /// Azure OpenAI resource endpoint
    pub endpoint: Option<String>,

    /// Override for the OpenAI base URL (proxies, compatible servers)
    pub base_url: Option<String>,

    /// Azure OpenAI REST API version
    pub api_version: Option<String>,

    /// Generation settings forwarded with every request
    pub settings: GenerationSettings,

    /// How many exchanges to keep in memory
    pub reduction: ReductionPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            openai_api_key: None,
            azure_api_key: None,
            endpoint: None,
            base_url: None,
            api_version: None,
            settings: GenerationSettings {
                system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
                max_tokens: Some(DEFAULT_MAX_TOKENS),
                temperature: Some(DEFAULT_TEMPERATURE),
                top_p: Some(DEFAULT_TOP_P),
                frequency_penalty: Some(0.0),
                presence_penalty: Some(0.0),
            },
            reduction: ReductionPolicy::default(),
        }
    }

    /// Overlay values present in a settings file
    pub fn apply_settings_file(&mut self, file: SettingsFile) {
        if let Some(azure) = file.azure_openai {
            if let Some(model) = azure.model_id {
                self.model = model;
            }
            if azure.endpoint.is_some() {
                self.endpoint = azure.endpoint;
            }
            if azure.api_key.is_some() {
                self.api_key = azure.api_key;
            }
        }

        if let Some(model) = file.model {
            self.model = model;
        }
        if file.api_key.is_some() {
            self.api_key = file.api_key;
        }
        if file.endpoint.is_some() {
            self.endpoint = file.endpoint;
        }
        if file.base_url.is_some() {
            self.base_url = file.base_url;
        }
        if file.api_version.is_some() {
            self.api_version = file.api_version;
        }
        if file.system_prompt.is_some() {
            self.settings.system_prompt = file.system_prompt;
        }
        if file.max_tokens.is_some() {
            self.settings.max_tokens = file.max_tokens;
        }
        if file.temperature.is_some() {
            self.settings.temperature = file.temperature;
        }
        if file.top_p.is_some() {
            self.settings.top_p = file.top_p;
        }
        if file.frequency_penalty.is_some() {
            self.settings.frequency_penalty = file.frequency_penalty;
        }
        if file.presence_penalty.is_some() {
            self.settings.presence_penalty = file.presence_penalty;
        }
        if let Some(keep_pairs) = file.keep_pairs {
            self.reduction = ReductionPolicy::new(keep_pairs);
        }
    }

    /// Overlay values from environment variables
    ///
    /// `lookup` is `std::env::var` in production; tests pass a map.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(model) = non_empty("CHATLINE_MODEL") {
            self.model = model;
        }
        if let Some(key) = non_empty("OPENAI_API_KEY") {
            self.openai_api_key = Some(key);
        }
        if let Some(key) = non_empty("AZURE_OPENAI_API_KEY") {
            self.azure_api_key = Some(key);
        }
        if let Some(endpoint) = non_empty("AZURE_OPENAI_ENDPOINT") {
            self.endpoint = Some(endpoint);
        }
        if let Some(api_version) = non_empty("AZURE_OPENAI_API_VERSION") {
            self.api_version = Some(api_version);
        }
        if let Some(base_url) = non_empty("OPENAI_BASE_URL") {
            self.base_url = Some(base_url);
        }
    }

    /// Check generation settings against the ranges providers accept
    pub fn validate(&self) -> Result<(), ConfigError> {
        let settings = &self.settings;

        check_range("temperature", settings.temperature, 0.0, 2.0)?;
        check_range("top_p", settings.top_p, 0.0, 1.0)?;
        check_range("frequency_penalty", settings.frequency_penalty, -2.0, 2.0)?;
        check_range("presence_penalty", settings.presence_penalty, -2.0, 2.0)?;

        if settings.max_tokens == Some(0) {
            return Err(ConfigError::InvalidSetting {
                name: "max_tokens",
                value: "0".to_string(),
                reason: "must be at least 1",
            });
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                name: "model",
                value: format!("{:?}", self.model),
                reason: "must not be empty",
            });
        }

        Ok(())
    }
}

fn check_range(name: &'static str, value: Option<f32>, min: f32, max: f32) -> Result<(), ConfigError> {
    match value {
        Some(v) if !(min..=max).contains(&v) => Err(ConfigError::InvalidSetting {
            name,
            value: v.to_string(),
            reason: match name {
                "temperature" => "must be between 0 and 2",
                "top_p" => "must be between 0 and 1",
                _ => "must be between -2 and 2",
            },
        }),
        _ => Ok(()),
    }
}

/// The `AzureOpenAI` section of an `appsettings.json`-style file
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AzureOpenAISection {
    pub model_id: Option<String>,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
}

/// On-disk settings file; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsFile {
    #[serde(rename = "AzureOpenAI")]
    pub azure_openai: Option<AzureOpenAISection>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub base_url: Option<String>,
    pub api_version: Option<String>,
    pub system_prompt: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub keep_pairs: Option<usize>,
}

impl SettingsFile {
    /// Load a settings file from disk
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load a settings file if it exists
    pub fn load_optional(path: &Path) -> Result<Option<Self>, ConfigError> {
        if path.exists() {
            Self::load(path).map(Some)
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::new();
        config.validate().unwrap();
        assert_eq!(config.reduction.target_pair_count, 2);
        assert_eq!(config.settings.max_tokens, Some(1000));
        assert!(config.settings.system_prompt.is_some());
    }

    #[test]
    fn test_settings_file_overlay() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "model": "gpt-4o",
                "systemPrompt": "Be brief.",
                "maxTokens": 200,
                "temperature": 1.5,
                "keepPairs": 0
            }}"#
        )
        .unwrap();

        let mut config = Config::new();
        config.apply_settings_file(SettingsFile::load(file.path()).unwrap());

        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.settings.system_prompt.as_deref(), Some("Be brief."));
        assert_eq!(config.settings.max_tokens, Some(200));
        assert_eq!(config.settings.temperature, Some(1.5));
        assert_eq!(config.settings.top_p, Some(DEFAULT_TOP_P));
        assert_eq!(config.reduction.target_pair_count, 0);
    }

    #[test]
    fn test_appsettings_azure_section() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "AzureOpenAI": {{
                    "ModelId": "gpt-4o",
                    "Endpoint": "https://example.openai.azure.com",
                    "ApiKey": "secret"
                }}
            }}"#
        )
        .unwrap();

        let mut config = Config::new();
        config.apply_settings_file(SettingsFile::load(file.path()).unwrap());

        assert_eq!(config.model, "gpt-4o");
        assert_eq!(
            config.endpoint.as_deref(),
            Some("https://example.openai.azure.com")
        );
        assert_eq!(config.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_malformed_settings_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = SettingsFile::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("appsettings.json");

        assert!(SettingsFile::load_optional(&path).unwrap().is_none());
        assert!(matches!(
            SettingsFile::load(&path),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_env_overlay() {
        let vars: HashMap<&str, &str> = [
            ("CHATLINE_MODEL", "azure/prod"),
            ("AZURE_OPENAI_ENDPOINT", "https://env.openai.azure.com"),
            ("OPENAI_BASE_URL", "   "),
        ]
        .into_iter()
        .collect();

        let mut config = Config::new();
        config.apply_env(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.model, "azure/prod");
        assert_eq!(
            config.endpoint.as_deref(),
            Some("https://env.openai.azure.com")
        );
        assert!(config.base_url.is_none());
    }

    #[test]
    fn test_env_api_key_overrides_settings_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"apiKey": "from-file"}}"#).unwrap();

        let mut config = Config::new();
        config.apply_settings_file(SettingsFile::load(file.path()).unwrap());
        config.apply_env(|key| match key {
            "OPENAI_API_KEY" => Some("from-env".to_string()),
            "AZURE_OPENAI_API_KEY" => Some("".to_string()),
            _ => None,
        });

        assert_eq!(config.api_key.as_deref(), Some("from-file"));
        assert_eq!(config.openai_api_key.as_deref(), Some("from-env"));
        assert!(config.azure_api_key.is_none());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = Config::new();
        config.settings.temperature = Some(2.5);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSetting { name: "temperature", .. })
        ));

        let mut config = Config::new();
        config.settings.top_p = Some(-0.1);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSetting { name: "top_p", .. })
        ));

        let mut config = Config::new();
        config.settings.presence_penalty = Some(f32::NAN);
        assert!(config.validate().is_err());

        let mut config = Config::new();
        config.settings.max_tokens = Some(0);
        assert!(config.validate().is_err());

        let mut config = Config::new();
        config.settings.temperature = None;
        config.validate().unwrap();
    }
}
