//! Judge API providers

pub mod openai;
pub mod traits;

pub use openai::OpenAIClient;
pub use traits::{
    CompletionRequest, CompletionResponse, LLMProvider, Message, ProviderError, ProviderResult,
};

use crate::config::Config;
use std::sync::Arc;

/// Create the judge provider from config and environment
pub fn create_judge_provider(config: &Config) -> ProviderResult<Arc<dyn LLMProvider + Send + Sync>> {
    let api_key = config
        .judge_api_key()
        .map_err(|e| ProviderError::Config(e.to_string()))?;
    Ok(Arc::new(OpenAIClient::from_config(api_key, &config.judge)))
}
