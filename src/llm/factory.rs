//! LLM backend factory
//!
//! This module provides factory functions for creating LLM backends
//! based on model name inference.

use crate::config::Config;
use crate::llm::echo::EchoBackend;
use crate::llm::openai::{Endpoint, OpenAIBackend, DEFAULT_AZURE_API_VERSION};
use crate::llm::{Backend, LlmError};
use tracing::info;

/// Supported model provider types
#[derive(Debug, PartialEq, Eq)]
pub enum Provider {
    /// OpenAI's public API
    OpenAI,
    /// Azure OpenAI deployment
    Azure,
    /// Offline echo backend
    Echo,
    /// Unknown provider
    Unknown(String),
}

/// Model information after parsing
#[derive(Debug, PartialEq, Eq)]
pub struct ModelInfo {
    /// The provider to use
    pub provider: Provider,
    /// The model (or Azure deployment) name to pass to the API
    pub model_name: String,
    /// Whether the provider was spelled out as a `provider/` prefix
    pub explicit: bool,
}

/// Parse a model string which may be in either format:
/// - "gpt-4o" (provider inferred from model name)
/// - "openai/gpt-4o" (explicit provider)
/// - "azure/my-deployment" (Azure OpenAI deployment name)
/// - "echo" (offline echo backend)
pub fn parse_model_string(model_str: &str) -> ModelInfo {
    let model_str = model_str.trim();

    if let Some((provider, model)) = model_str.split_once('/') {
        let provider_type = match provider.trim().to_lowercase().as_str() {
            "openai" => Provider::OpenAI,
            "azure" | "azure-openai" => Provider::Azure,
            "echo" => Provider::Echo,
            other => Provider::Unknown(other.to_string()),
        };

        return ModelInfo {
            provider: provider_type,
            model_name: model.trim().to_string(),
            explicit: true,
        };
    }

    let provider = if model_str == "echo" {
        Provider::Echo
    } else if is_openai_model(model_str) {
        Provider::OpenAI
    } else {
        Provider::Unknown(String::new())
    };

    ModelInfo {
        provider,
        model_name: model_str.to_string(),
        explicit: false,
    }
}

/// Create an LLM backend from configuration, inferring the provider from
/// the model name.
///
/// A configured Azure endpoint claims every model that does not name its
/// provider explicitly.
pub fn create_backend(config: &Config) -> Result<Box<dyn Backend>, LlmError> {
    let mut model_info = parse_model_string(&config.model);
    if !model_info.explicit && config.endpoint.is_some() && model_info.provider != Provider::Echo
    {
        model_info.provider = Provider::Azure;
    }

    let backend: Box<dyn Backend> = match model_info.provider {
        Provider::OpenAI => {
            let api_key = resolve_openai_api_key(config)?;
            match &config.base_url {
                Some(base_url) => Box::new(OpenAIBackend::with_endpoint(
                    api_key,
                    model_info.model_name,
                    Endpoint::OpenAI {
                        base_url: base_url.clone(),
                    },
                )?),
                None => Box::new(OpenAIBackend::new(api_key, model_info.model_name)?),
            }
        }
        Provider::Azure => {
            let endpoint = config.endpoint.clone().ok_or_else(|| {
                LlmError::ConfigError(
                    "Azure OpenAI requires an endpoint (AZURE_OPENAI_ENDPOINT or \"endpoint\" in the settings file)"
                        .into(),
                )
            })?;
            let api_key = resolve_azure_api_key(config)?;
            let api_version = config
                .api_version
                .clone()
                .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string());
            Box::new(OpenAIBackend::azure(
                api_key,
                model_info.model_name,
                endpoint,
                api_version,
            )?)
        }
        Provider::Echo => Box::new(EchoBackend::new()),
        Provider::Unknown(provider) => {
            let provider_msg = if provider.is_empty() {
                format!("Unknown model '{}'. Cannot determine provider.", config.model)
            } else {
                format!(
                    "Unknown provider '{}' specified in '{}'",
                    provider, config.model
                )
            };

            return Err(LlmError::ConfigError(format!(
                "{}. Currently supporting these providers:\n\
                 - OpenAI models: 'gpt-4o', 'gpt-4o-mini', 'o3-mini', etc.\n\
                 - Azure OpenAI deployments: 'azure/<deployment>' (or any model name with an endpoint configured)\n\
                 - Offline testing: 'echo'\n\
                 - Explicit provider format: 'openai/gpt-4o', 'azure/my-deployment'",
                provider_msg
            )));
        }
    };

    info!("Using {} backend with model {}", backend.name(), backend.model());
    Ok(backend)
}

/// Determine if a model name belongs to the OpenAI family
fn is_openai_model(model: &str) -> bool {
    model.starts_with("gpt-")
        || model.starts_with("chatgpt-")
        || model.starts_with("text-")
        || ["o1", "o3", "o4"]
            .iter()
            .any(|family| model == *family || model.starts_with(&format!("{}-", family)))
}

/// Resolve the OpenAI API key; the environment wins over the settings file
fn resolve_openai_api_key(config: &Config) -> Result<String, LlmError> {
    config
        .openai_api_key
        .clone()
        .or_else(|| config.api_key.clone())
        .ok_or_else(|| LlmError::ConfigError("OPENAI_API_KEY environment variable not set".into()))
}

/// Resolve the Azure OpenAI API key; the environment wins over the settings file
fn resolve_azure_api_key(config: &Config) -> Result<String, LlmError> {
    config
        .azure_api_key
        .clone()
        .or_else(|| config.api_key.clone())
        .ok_or_else(|| {
            LlmError::ConfigError("AZURE_OPENAI_API_KEY environment variable not set".into())
        })
}
