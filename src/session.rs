//! Conversation session
//!
//! One session owns the process's conversation. Exchanges are serialized:
//! the history lock is held from the provider call through the append and
//! the save, so concurrent `/chat` requests queue instead of racing.

use crate::codec::{decode_message, CodecError, UserMessage};
use crate::history::{HistoryStore, Role, Turn};
use crate::llm::{
    ContentBlock, LlmError, LlmMessage, LlmRequest, LlmService, MessageRole, SystemContent,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

/// Fixed per-process provider parameters
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub model: String,
    pub system_instruction: String,
    pub temperature: f32,
    pub provider_timeout: Duration,
    /// Only the last N turns are sent to the provider; `None` sends everything
    pub context_turns: Option<usize>,
}

/// A failed exchange. Displays as the reply text the client sees.
#[derive(Debug, Error)]
#[error("Error with {model}: {failure}")]
pub struct SubmitError {
    pub model: String,
    #[source]
    pub failure: SubmitFailure,
}

#[derive(Debug, Error)]
pub enum SubmitFailure {
    #[error(transparent)]
    InvalidImage(#[from] CodecError),
    #[error(transparent)]
    Provider(#[from] LlmError),
}

pub struct ChatSession {
    provider: Arc<dyn LlmService>,
    store: Arc<dyn HistoryStore>,
    settings: SessionSettings,
    history: Mutex<Vec<Turn>>,
}

impl ChatSession {
    pub fn new(
        provider: Arc<dyn LlmService>,
        store: Arc<dyn HistoryStore>,
        settings: SessionSettings,
        history: Vec<Turn>,
    ) -> Self {
        Self {
            provider,
            store,
            settings,
            history: Mutex::new(history),
        }
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    /// Run one exchange and return the model's reply.
    ///
    /// History is only touched on success, and then by exactly two turns
    /// (user, assistant) followed by one save. A failed save is logged; the
    /// in-memory history stays authoritative.
    pub async fn submit(&self, text: &str, image: Option<&str>) -> Result<String, SubmitError> {
        let message = decode_message(text, image).map_err(|e| self.fail(e))?;
        if let Some(image) = &message.image {
            tracing::info!(
                model = %self.settings.model,
                media_type = image.media_type,
                bytes = image.bytes.len(),
                "Processing image"
            );
        }

        let mut history = self.history.lock().await;
        let request = self.build_request(&history, &message);

        let response = match tokio::time::timeout(
            self.settings.provider_timeout,
            self.provider.complete(&request),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(self.fail(e)),
            Err(_) => {
                return Err(self.fail(LlmError::timeout(format!(
                    "no response within {}s",
                    self.settings.provider_timeout.as_secs_f32()
                ))))
            }
        };

        let reply = response.text();
        history.push(message.to_turn());
        history.push(Turn::assistant(reply.clone()));

        if let Err(e) = self.store.save(&history).await {
            tracing::warn!(
                error = %e,
                history_len = history.len(),
                "Failed to persist history, continuing with in-memory copy"
            );
        }

        Ok(reply)
    }

    /// Copy of the in-memory history
    #[cfg(test)]
    pub async fn snapshot(&self) -> Vec<Turn> {
        self.history.lock().await.clone()
    }

    fn fail(&self, failure: impl Into<SubmitFailure>) -> SubmitError {
        let err = SubmitError {
            model: self.settings.model.clone(),
            failure: failure.into(),
        };
        tracing::error!(error = %err, "Chat exchange failed");
        err
    }

    fn build_request(&self, history: &[Turn], message: &UserMessage) -> LlmRequest {
        let mut messages: Vec<LlmMessage> = context_window(history, self.settings.context_turns)
            .iter()
            .map(turn_to_message)
            .collect();
        messages.push(message.to_llm_message());

        LlmRequest {
            system: vec![SystemContent::new(&self.settings.system_instruction)],
            messages,
            temperature: Some(self.settings.temperature),
        }
    }
}

/// Tail of the history sent as context. Never starts on an assistant turn.
fn context_window(history: &[Turn], limit: Option<usize>) -> &[Turn] {
    let Some(limit) = limit else {
        return history;
    };
    let mut tail = &history[history.len().saturating_sub(limit)..];
    while let Some((first, rest)) = tail.split_first() {
        if first.role == Role::User {
            break;
        }
        tail = rest;
    }
    tail
}

fn turn_to_message(turn: &Turn) -> LlmMessage {
    LlmMessage {
        role: match turn.role {
            Role::User => MessageRole::User,
            Role::Assistant => MessageRole::Assistant,
        },
        content: turn
            .parts
            .iter()
            .map(|p| ContentBlock::text(p.text.clone()))
            .collect(),
    }
}
