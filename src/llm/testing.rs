//! Mock provider for tests

use super::{LlmError, LlmRequest, LlmResponse, LlmService};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Mock LLM that returns queued responses, optionally after a delay
pub struct MockLlm {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    model_id: String,
    delay: Option<Duration>,
    /// Reply with the last user text when nothing is queued
    echo: bool,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlm {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            model_id: model_id.into(),
            delay: None,
            echo: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before answering every request
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Answer `echo: <last user text>` when the queue is empty
    pub fn echoing(mut self) -> Self {
        self.echo = true;
        self
    }

    pub fn queue_text(&self, text: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(LlmResponse::from_text(text)));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn last_user_text(request: &LlmRequest) -> String {
        request
            .messages
            .last()
            .and_then(|m| {
                m.content.iter().find_map(|b| match b {
                    super::ContentBlock::Text { text } => Some(text.clone()),
                    super::ContentBlock::Image { .. } => None,
                })
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmService for MockLlm {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let queued = self.responses.lock().unwrap().pop_front();
        match queued {
            Some(result) => result,
            None if self.echo => Ok(LlmResponse::from_text(format!(
                "echo: {}",
                Self::last_user_text(request)
            ))),
            None => Err(LlmError::network("No mock response queued")),
        }
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
