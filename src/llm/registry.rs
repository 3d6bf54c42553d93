// ABOUTME: Model registry with caller-preference selection over configured providers
// ABOUTME: Substitutes the first available model when the requested one is not configured
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Persona Insight

//! # Model Registry
//!
//! Holds every configured language-model provider in a fixed preference order.
//! Selection is by caller preference, not automatic failover: if the requested
//! model is not served by any configured provider, the first available provider's
//! default model is substituted and the pipeline proceeds. The only hard failure
//! is zero configured models, surfaced before any media work starts.

use std::sync::Arc;
use tracing::{debug, warn};

use super::{ChatMessage, ChatRequest, LlmProvider};
use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::llm::{AnthropicProvider, GeminiProvider, OpenAiProvider};

/// The outcome of model selection: which provider serves which model identifier
#[derive(Clone)]
pub struct SelectedModel {
    pub provider: Arc<dyn LlmProvider>,
    pub model_id: String,
}

impl std::fmt::Debug for SelectedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedModel")
            .field("provider", &self.provider.name())
            .field("model_id", &self.model_id)
            .finish()
    }
}

/// Registry of configured language-model providers
pub struct ModelRegistry {
    providers: Vec<Arc<dyn LlmProvider>>,
}

impl ModelRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Build the registry from startup configuration.
    ///
    /// Registration order is the fixed preference order used for substitution.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self::new();

        if let Some(key) = &config.credentials.openai_api_key {
            registry.register(Arc::new(OpenAiProvider::new(key.clone())));
        }
        if let Some(key) = &config.credentials.anthropic_api_key {
            registry.register(Arc::new(AnthropicProvider::new(key.clone())));
        }
        if let Some(key) = &config.credentials.gemini_api_key {
            registry.register(Arc::new(GeminiProvider::new(key.clone())));
        }

        registry
    }

    /// Register a provider; order of registration is preference order
    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.push(provider);
    }

    /// Number of configured providers
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether zero providers are configured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Fail fast when zero models are configured.
    ///
    /// Called at the earliest possible point of each pipeline entry so no
    /// provider or media work is wasted.
    pub fn ensure_available(&self) -> AppResult<()> {
        if self.is_empty() {
            return Err(AppError::all_models_unavailable());
        }
        Ok(())
    }

    /// Select a provider + model for the caller's preference.
    ///
    /// A requested model that no configured provider serves substitutes the first
    /// available provider's default model rather than failing.
    ///
    /// # Errors
    ///
    /// Returns `AllModelsUnavailable` when zero providers are configured.
    pub fn select(&self, requested: Option<&str>) -> AppResult<SelectedModel> {
        let first = self
            .providers
            .first()
            .ok_or_else(AppError::all_models_unavailable)?;

        if let Some(model_id) = requested {
            for provider in &self.providers {
                if provider.available_models().contains(&model_id) {
                    debug!(model = model_id, provider = provider.name(), "model selected");
                    return Ok(SelectedModel {
                        provider: Arc::clone(provider),
                        model_id: model_id.to_owned(),
                    });
                }
            }
            warn!(
                requested = model_id,
                substituted = first.default_model(),
                "requested model is not configured; substituting"
            );
        }

        Ok(SelectedModel {
            provider: Arc::clone(first),
            model_id: first.default_model().to_owned(),
        })
    }

    /// One-shot generation: system instruction + conversation turns -> text.
    ///
    /// This is the uniform model-collaborator contract every pipeline component
    /// uses; the model is stateless between calls.
    ///
    /// # Errors
    ///
    /// Returns `AllModelsUnavailable` with no providers, or the provider's error.
    pub async fn generate(
        &self,
        requested_model: Option<&str>,
        system_instruction: &str,
        turns: Vec<ChatMessage>,
    ) -> AppResult<String> {
        let selected = self.select(requested_model)?;
        let request =
            ChatRequest::with_history(system_instruction, turns).with_model(&selected.model_id);
        let response = selected.provider.complete(&request).await?;
        Ok(response.content)
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
