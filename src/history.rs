//! Conversation history
//!
//! A history is an ordered list of [`Turn`]s persisted as one JSON document:
//!
//! ```json
//! [
//!   {"role": "user", "parts": [{"text": "hello"}]},
//!   {"role": "model", "parts": [{"text": "hi there"}]}
//! ]
//! ```
//!
//! Documents written by older clients may hold bare strings as parts; those
//! are upgraded on load and anything else unrecognized is dropped.

mod store;

#[cfg(test)]
pub mod testing;

pub use store::{CorruptHistoryPolicy, HistoryStore, JsonFileStore};

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

/// Text stored in place of an uploaded image. Image bytes are never persisted.
pub const IMAGE_PLACEHOLDER: &str = "[User uploaded an image]";

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    #[serde(rename = "user")]
    User,
    /// Stored as `"model"`, the name the web client and Gemini both use.
    /// `"assistant"` is accepted on load.
    #[serde(rename = "model")]
    Assistant,
}

impl Role {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "model" | "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One content fragment of a turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Part {
    pub text: String,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn image_placeholder() -> Self {
        Self::text(IMAGE_PLACEHOLDER)
    }
}

/// One message attributed to a role. `parts` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    pub fn user(parts: Vec<Part>) -> Self {
        debug_assert!(!parts.is_empty(), "a turn needs at least one part");
        Self {
            role: Role::User,
            parts,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            parts: vec![Part::text(text)],
        }
    }
}

// On-disk shapes accepted by the loader

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Turn(RawTurn),
    Other(IgnoredAny),
}

#[derive(Deserialize)]
struct RawTurn {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<RawPart>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPart {
    Bare(String),
    Object { text: String },
    Other(IgnoredAny),
}

impl RawPart {
    fn into_part(self) -> Option<Part> {
        match self {
            RawPart::Bare(text) | RawPart::Object { text } => Some(Part { text }),
            RawPart::Other(_) => None,
        }
    }
}

impl RawTurn {
    fn into_turn(self) -> Option<Turn> {
        let role = Role::parse(self.role.as_deref()?)?;
        let parts: Vec<Part> = self.parts.into_iter().filter_map(RawPart::into_part).collect();
        if parts.is_empty() {
            return None;
        }
        Some(Turn { role, parts })
    }
}

/// Parse and normalize a persisted history document.
///
/// Fails only when the document is not valid JSON or not a top-level array;
/// individual malformed turns and parts are dropped.
pub fn parse_document(bytes: &[u8]) -> Result<Vec<Turn>, serde_json::Error> {
    let entries: Vec<RawEntry> = serde_json::from_slice(bytes)?;
    Ok(entries
        .into_iter()
        .filter_map(|entry| match entry {
            RawEntry::Turn(raw) => raw.into_turn(),
            RawEntry::Other(_) => None,
        })
        .collect())
}

/// Serialize a history the way it is persisted
pub fn render_document(turns: &[Turn]) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec_pretty(turns)
}
