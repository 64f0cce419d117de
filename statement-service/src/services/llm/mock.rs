//! Scriptable mock provider for tests.

use super::{CompletionProvider, ProviderError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Mock provider returning scripted replies.
///
/// Replies are consumed front to back; the last one repeats once the
/// script is exhausted, so a single-reply mock serves any number of calls.
/// Received user prompts are recorded for assertion.
pub struct MockProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    prompts: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self::with_replies(vec![Ok(reply.into())])
    }

    pub fn failing(error: ProviderError) -> Self {
        Self::with_replies(vec![Err(error)])
    }

    pub fn with_replies(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// User prompts received so far, in call order.
    pub fn recorded_prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("mock provider poisoned").clone()
    }

    fn next_reply(&self) -> Result<String, ProviderError> {
        let mut replies = self.replies.lock().expect("mock provider poisoned");
        match replies.len() {
            0 => Err(ProviderError::NotConfigured(
                "Mock provider has no scripted replies".to_string(),
            )),
            1 => replies[0].clone(),
            _ => replies.pop_front().expect("length checked above"),
        }
    }

    fn record(&self, prompt: &str) {
        self.prompts
            .lock()
            .expect("mock provider poisoned")
            .push(prompt.to_string());
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    async fn complete(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError> {
        self.record(user_prompt);
        self.next_reply()
    }

    async fn complete_with_image(
        &self,
        _system_prompt: &str,
        _image_png_base64: &str,
    ) -> Result<String, ProviderError> {
        self.record("<page image>");
        self.next_reply()
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
