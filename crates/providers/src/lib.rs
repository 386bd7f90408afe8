//! Model gateway implementations for Taskmate.
//!
//! All gateways implement the `taskmate_core::ModelGateway` trait.
//! [`build_from_config`] constructs the configured one.

pub mod openai_compat;

use std::sync::Arc;

use taskmate_config::AppConfig;
use taskmate_core::error::GatewayError;
use taskmate_core::gateway::ModelGateway;

pub use openai_compat::OpenAiCompatGateway;

/// Build the model gateway described by the `[provider]` section.
///
/// Local Ollama endpoints work without a key; everything else needs one.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn ModelGateway>, GatewayError> {
    let provider = &config.provider;
    let api_key = match (&config.api_key, provider.is_local()) {
        (Some(key), _) => key.clone(),
        (None, true) => String::from("local"),
        (None, false) => {
            return Err(GatewayError::NotConfigured(format!(
                "no API key configured for provider '{}'",
                provider.name
            )));
        }
    };

    let gateway = OpenAiCompatGateway::new(
        provider.name.clone(),
        provider.base_url.clone(),
        api_key,
        provider.model.clone(),
    )?
    .with_temperature(provider.temperature)
    .with_max_tokens(provider.max_tokens);

    tracing::info!(
        gateway = %provider.name,
        model = %provider.model,
        "Model gateway configured"
    );
    Ok(Arc::new(gateway))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_provider_requires_a_key() {
        let config = AppConfig::default();
        let err = build_from_config(&config).err().unwrap();
        assert!(matches!(err, GatewayError::NotConfigured(_)));
    }

    #[test]
    fn builds_with_key() {
        let mut config = AppConfig::default();
        config.api_key = Some("sk-test".into());
        let gateway = build_from_config(&config).unwrap();
        assert_eq!(gateway.name(), "openrouter");
    }

    #[test]
    fn local_endpoint_needs_no_key() {
        let mut config = AppConfig::default();
        config.provider.name = "ollama".into();
        config.provider.base_url = "http://localhost:11434/v1".into();
        assert!(build_from_config(&config).is_ok());
    }
}
