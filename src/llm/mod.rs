//! Text-generation seam
//!
//! Every classifier, extractor, and the general-chat handler talk to the
//! model through this trait, so the orchestrator can be exercised with a
//! scripted double instead of a live endpoint.

use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

pub mod gemini;
pub use gemini::GeminiClient;

/// Trait for delegated text generation
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt` under `system_instruction`.
    ///
    /// The returned text is unstructured; callers that expect single-line
    /// JSON must tolerate anything else coming back.
    async fn generate(
        &self,
        system_instruction: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<String>;
}

/// Scripted generator for development & testing
/// Replays canned responses in order; errors once the script runs dry.
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        _system_instruction: &str,
        _prompt: &str,
        _temperature: f32,
    ) -> Result<String> {
        let mut responses = self
            .responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        responses
            .pop_front()
            .ok_or_else(|| crate::error::AgentError::LlmError("script exhausted".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_generator_replays_in_order() {
        let generator = ScriptedGenerator::new(["first", "second"]);

        let a = generator.generate("", "", 0.0).await.unwrap();
        let b = generator.generate("", "", 0.0).await.unwrap();
        assert_eq!(a, "first");
        assert_eq!(b, "second");

        assert!(generator.generate("", "", 0.0).await.is_err());
    }
}
