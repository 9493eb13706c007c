//! Model availability derived from configured credentials.

use tracing::{info, warn};

use omniagent_core::config::{AppConfig, ModelConfig};
use omniagent_core::error::{OmniError, Result};

use crate::completion::ChatModel;
use crate::providers::presets;

/// Models a given OpenAI key unlocks.
const OPENAI_MODELS: &[&str] = &["gpt-3.5-turbo", "gpt-4o"];
/// Models a given Gemini key unlocks.
const GEMINI_MODELS: &[&str] = &["gemini-1.5-pro"];

/// Catalogue of usable models, built once from configuration.
pub struct ProviderRegistry {
    preferred: ModelConfig,
    available: Vec<ModelConfig>,
    fallbacks: Vec<ModelConfig>,
}

impl ProviderRegistry {
    pub fn from_config(config: &AppConfig) -> Self {
        let mut available = Vec::new();
        let template = &config.model;

        let entry = |provider: &str, model_id: &str, api_key: Option<String>, base_url: Option<String>| {
            ModelConfig {
                provider: Some(provider.to_string()),
                model_id: model_id.to_string(),
                api_key,
                base_url,
                ..template.clone()
            }
        };

        if let Some(key) = &config.providers.openai_api_key {
            for id in OPENAI_MODELS {
                available.push(entry("openai", id, Some(key.clone()), None));
            }
        }
        if let Some(key) = &config.providers.gemini_api_key {
            for id in GEMINI_MODELS {
                available.push(entry("gemini", id, Some(key.clone()), None));
            }
        }
        if let Some(base) = &config.providers.ollama_base_url {
            for id in &config.providers.ollama_models {
                available.push(entry("ollama", id, None, Some(base.clone())));
            }
        }

        // An explicitly configured model is usable when it carries its own
        // key or targets a provider that needs none.
        let explicit =
            template.api_key.is_some() || presets::is_keyless(template.provider_name());
        if explicit && !available.iter().any(|m| m.model_id == template.model_id) {
            available.insert(0, template.clone());
        }

        Self {
            preferred: template.clone(),
            available,
            fallbacks: config.fallback_models.clone(),
        }
    }

    pub fn available(&self) -> &[ModelConfig] {
        &self.available
    }

    pub fn is_available(&self, model_id: &str) -> bool {
        self.available.iter().any(|m| m.model_id == model_id)
    }

    /// The config that will serve requests: the preferred model if it is
    /// available, otherwise the first available one.
    pub fn select(&self) -> Result<ModelConfig> {
        if let Some(model) = self
            .available
            .iter()
            .find(|m| m.model_id == self.preferred.model_id)
        {
            return Ok(model.clone());
        }

        match self.available.first() {
            Some(model) => {
                warn!(
                    preferred = %self.preferred.model_id,
                    using = %model.model_id,
                    "Preferred model unavailable, using first available"
                );
                Ok(model.clone())
            }
            None => Err(OmniError::ProviderUnavailable(
                "No LLM provider is available".into(),
            )),
        }
    }

    /// Build the chat model for the selected config, wrapped in retry and
    /// fallback handling when configured.
    pub fn resolve(&self) -> Result<ChatModel> {
        let config = self.select()?;
        info!(
            model = %config.model_id,
            provider = %config.provider_name(),
            "Resolved chat model"
        );
        let client = crate::build_client(&config, &self.fallbacks);
        Ok(ChatModel::new(client, config))
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<&str> = self.available.iter().map(|m| m.model_id.as_str()).collect();
        f.debug_struct("ProviderRegistry")
            .field("preferred", &self.preferred.model_id)
            .field("available", &ids)
            .finish()
    }
}

/// Convenience for callers that only need the model.
pub fn resolve_model(config: &AppConfig) -> Result<ChatModel> {
    ProviderRegistry::from_config(config).resolve()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_credentials_is_unavailable() {
        let registry = ProviderRegistry::from_config(&AppConfig::default());
        assert!(registry.available().is_empty());
        let err = registry.select().unwrap_err();
        assert_eq!(
            err.to_string(),
            OmniError::ProviderUnavailable("No LLM provider is available".into()).to_string()
        );
    }

    #[test]
    fn test_openai_key_unlocks_models() {
        let mut config = AppConfig::default();
        config.providers.openai_api_key = Some("sk-test".into());
        let registry = ProviderRegistry::from_config(&config);
        assert!(registry.is_available("gpt-4o"));
        assert!(registry.is_available("gpt-3.5-turbo"));
        assert_eq!(registry.select().unwrap().model_id, "gpt-4o");
    }

    #[test]
    fn test_preferred_missing_uses_first_available() {
        let mut config = AppConfig::default();
        config.model.model_id = "gpt-4o".into();
        config.providers.gemini_api_key = Some("g-key".into());
        let selected = ProviderRegistry::from_config(&config).select().unwrap();
        assert_eq!(selected.model_id, "gemini-1.5-pro");
        assert_eq!(selected.provider_name(), "gemini");
    }

    #[test]
    fn test_local_models_need_no_key() {
        let mut config = AppConfig::default();
        config.model.model_id = "llama3.1".into();
        config.providers.ollama_base_url = Some("http://localhost:11434/v1".into());
        config.providers.ollama_models = vec!["llama3.1".into()];
        let selected = ProviderRegistry::from_config(&config).select().unwrap();
        assert_eq!(selected.model_id, "llama3.1");
        assert!(selected.api_key.is_none());
    }

    #[test]
    fn test_explicit_model_key_counts() {
        let mut config = AppConfig::default();
        config.model.model_id = "deepseek-chat".into();
        config.model.provider = Some("deepseek".into());
        config.model.api_key = Some("ds-key".into());
        let registry = ProviderRegistry::from_config(&config);
        assert_eq!(registry.select().unwrap().model_id, "deepseek-chat");
    }
}
