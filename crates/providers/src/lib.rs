//! LLM provider implementations for A2IA.
//!
//! Every backend the orchestrator talks to speaks the OpenAI chat-completions
//! dialect, so one client covers Ollama, vLLM and hosted endpoints.

pub mod openai_compat;

use std::sync::Arc;

use a2ia_config::AppConfig;
use a2ia_core::{Provider, ProviderError};

pub use openai_compat::OpenAiCompatProvider;

/// Build the configured provider.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let pc = &config.provider;
    if pc.base_url.trim().is_empty() {
        return Err(ProviderError::NotConfigured(format!(
            "provider '{}' has no base_url",
            pc.name
        )));
    }

    let api_key = pc.api_key.clone().unwrap_or_default();
    let provider = match pc.name.as_str() {
        "ollama" => OpenAiCompatProvider::ollama(Some(&pc.base_url)),
        "vllm" if api_key.is_empty() => OpenAiCompatProvider::vllm(pc.base_url.as_str()),
        name => OpenAiCompatProvider::new(name, pc.base_url.as_str(), api_key),
    }
    .with_timeout(pc.timeout_secs);

    tracing::info!(provider = %pc.name, base_url = %pc.base_url, model = %pc.model, "Provider configured");
    Ok(Arc::new(provider))
}
