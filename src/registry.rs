//! Provider and model catalog.
//!
//! A static catalog covers the models the add-on ships with; providers that
//! expose a model-list endpoint extend it through a read-through cache that
//! is populated on first access and only invalidated by a process restart.

use crate::error::ChatError;
use std::collections::HashMap;

/// Upstream AI services the add-on can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAi,
    OpenRouter,
    MistralAi,
}

impl Provider {
    pub fn all() -> [Provider; 3] {
        [Provider::OpenAi, Provider::OpenRouter, Provider::MistralAi]
    }

    pub fn label(self) -> &'static str {
        match self {
            Provider::OpenAi => "OpenAI",
            Provider::OpenRouter => "OpenRouter",
            Provider::MistralAi => "MistralAI",
        }
    }

    pub fn base_url(self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::OpenRouter => "https://openrouter.ai/api/v1",
            Provider::MistralAi => "https://api.mistral.ai/v1",
        }
    }

    /// Environment variable consulted when no key file exists.
    pub fn env_key_var(self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::OpenRouter => "OPENROUTER_API_KEY",
            Provider::MistralAi => "MISTRAL_API_KEY",
        }
    }

    /// Whether the provider publishes a model-list endpoint worth querying.
    pub fn supports_model_listing(self) -> bool {
        matches!(self, Provider::OpenRouter)
    }
}

/// One selectable chat model. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub provider: Provider,
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub context_window: u32,
    /// Zero means the provider did not declare a separate output cap.
    pub max_output_tokens: u32,
    pub max_temperature: f64,
    pub default_temperature: f64,
    pub supports_vision: bool,
    pub is_preview: bool,
}

impl Model {
    /// Sensible starting max-tokens for the completion when the user has no
    /// remembered value: half the output cap, falling back to half the
    /// context window, never below one.
    pub fn suggested_max_tokens(&self) -> u32 {
        let half = if self.max_output_tokens > 1 {
            self.max_output_tokens / 2
        } else {
            self.context_window / 2
        };
        half.max(1)
    }

    /// Upper bound for the host's max-tokens spinner.
    pub fn max_tokens_ceiling(&self) -> u32 {
        if self.max_output_tokens > 1 {
            self.max_output_tokens
        } else {
            self.context_window
        }
    }
}

fn builtin(
    provider: Provider,
    id: &str,
    display_name: &str,
    description: &str,
    context_window: u32,
    max_output_tokens: u32,
    supports_vision: bool,
    is_preview: bool,
) -> Model {
    Model {
        provider,
        id: id.into(),
        display_name: display_name.into(),
        description: description.into(),
        context_window,
        max_output_tokens,
        max_temperature: 2.0,
        default_temperature: 1.0,
        supports_vision,
        is_preview,
    }
}

fn builtin_catalog() -> Vec<Model> {
    vec![
        builtin(
            Provider::OpenAi,
            "gpt-3.5-turbo",
            "GPT-3.5 Turbo",
            "Fast, inexpensive model for general chat",
            16_385,
            4_096,
            false,
            false,
        ),
        builtin(
            Provider::OpenAi,
            "gpt-4",
            "GPT-4",
            "High-accuracy reasoning model",
            8_192,
            4_096,
            false,
            false,
        ),
        builtin(
            Provider::OpenAi,
            "gpt-4-turbo-preview",
            "GPT-4 Turbo preview",
            "Large-context GPT-4 preview",
            128_000,
            4_096,
            false,
            true,
        ),
        builtin(
            Provider::OpenAi,
            "gpt-4-vision-preview",
            "GPT-4 Vision preview",
            "GPT-4 with image understanding",
            128_000,
            4_096,
            true,
            true,
        ),
        builtin(
            Provider::OpenAi,
            "gpt-4o",
            "GPT-4o",
            "Multimodal flagship with image understanding",
            128_000,
            4_096,
            true,
            false,
        ),
        builtin(
            Provider::MistralAi,
            "mistral-tiny",
            "Mistral Tiny",
            "Smallest Mistral chat model",
            32_000,
            0,
            false,
            false,
        ),
        builtin(
            Provider::MistralAi,
            "mistral-small",
            "Mistral Small",
            "Balanced Mistral chat model",
            32_000,
            0,
            false,
            false,
        ),
        builtin(
            Provider::MistralAi,
            "mistral-medium",
            "Mistral Medium",
            "Strongest Mistral chat model",
            32_000,
            0,
            false,
            false,
        ),
    ]
}

/// Static defaults plus dynamically fetched per-provider extensions.
pub struct ModelRegistry {
    models: Vec<Model>,
    /// Providers already queried this process, successfully or not.
    fetched: HashMap<Provider, bool>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        let models = builtin_catalog();
        debug_assert!(Self::ids_unique(&models));
        Self {
            models,
            fetched: HashMap::new(),
        }
    }

    fn ids_unique(models: &[Model]) -> bool {
        for (i, a) in models.iter().enumerate() {
            for b in &models[i + 1..] {
                if a.provider == b.provider && a.id == b.id {
                    return false;
                }
            }
        }
        true
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn find(&self, id: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.id == id)
    }

    /// Ids of every vision-capable model, for corrective error messages.
    pub fn vision_model_ids(&self) -> Vec<String> {
        self.models
            .iter()
            .filter(|m| m.supports_vision)
            .map(|m| m.id.clone())
            .collect()
    }

    pub fn already_fetched(&self, provider: Provider) -> bool {
        self.fetched.get(&provider).copied().unwrap_or(false)
    }

    /// Read-through population of the dynamic part of the catalog. Each
    /// provider is queried at most once per process; a failed fetch leaves
    /// the static catalog intact and is not retried.
    pub fn extend_from(
        &mut self,
        provider: Provider,
        fetch: impl FnOnce() -> Result<Vec<Model>, ChatError>,
    ) {
        if !provider.supports_model_listing() || self.already_fetched(provider) {
            return;
        }
        self.fetched.insert(provider, true);
        match fetch() {
            Ok(models) => {
                let mut added = 0usize;
                for model in models {
                    if model.provider == provider && self.find(&model.id).is_none() {
                        self.models.push(model);
                        added += 1;
                    }
                }
                tracing::debug!(provider = provider.label(), added, "extended model catalog");
            }
            Err(err) => {
                tracing::warn!(provider = provider.label(), %err, "model list fetch failed");
            }
        }
    }
}
