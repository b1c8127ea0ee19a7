pub mod prompt;
pub mod providers;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use crate::config::LLMConfig;
pub use prompt::{default_prompt, load_prompt};
pub use providers::GeminiProvider;

/// AI providers able to watch a video
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LLMProvider {
    Gemini,
}

/// Text produced for one video
#[derive(Debug, Clone)]
pub struct LLMResponse {
    pub content: String,
    pub tokens_used: Option<u32>,
    pub model: String,
}

/// A multimodal service that describes the steps shown in a video
#[async_trait]
pub trait VideoDescriber: Send + Sync {
    async fn describe(&self, video: &Path, prompt: &str) -> Result<LLMResponse>;
    async fn is_available(&self) -> bool;
    fn provider_type(&self) -> LLMProvider;
}

/// Create a describer based on configuration
pub fn create_describer(config: &LLMConfig) -> Result<Box<dyn VideoDescriber>> {
    match config.provider {
        LLMProvider::Gemini => Ok(Box::new(GeminiProvider::new(config.clone())?)),
    }
}
