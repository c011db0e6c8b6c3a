//! Durable storage for the conversation history

use super::{parse_document, render_document, Turn};
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("failed to read history from {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("history at {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write history to {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// What `load` does when the persisted document cannot be read or parsed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CorruptHistoryPolicy {
    /// Log a warning and start from an empty history
    #[default]
    FailOpen,
    /// Return [`HistoryError::Read`] or [`HistoryError::Corrupt`]
    FailClosed,
}

impl FromStr for CorruptHistoryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail-open" | "open" => Ok(Self::FailOpen),
            "fail-closed" | "closed" => Ok(Self::FailClosed),
            other => Err(format!(
                "unknown policy '{other}' (expected fail-open or fail-closed)"
            )),
        }
    }
}

/// Ordered, full-rewrite storage for the conversation history
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Read the whole persisted history. A missing medium is an empty history.
    async fn load(&self) -> Result<Vec<Turn>, HistoryError>;

    /// Replace the persisted history with `turns`
    async fn save(&self, turns: &[Turn]) -> Result<(), HistoryError>;

    /// Human-readable location for logs
    fn location(&self) -> String;
}

/// History kept in a single pretty-printed JSON file
pub struct JsonFileStore {
    path: PathBuf,
    policy: CorruptHistoryPolicy,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>, policy: CorruptHistoryPolicy) -> Self {
        Self {
            path: path.into(),
            policy,
        }
    }

    /// Sibling file the document is staged in before the rename
    fn staging_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map_or_else(|| "history".into(), |n| n.to_string_lossy().into_owned());
        self.path
            .with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()))
    }

    fn write_error(&self, source: io::Error) -> HistoryError {
        HistoryError::Write {
            path: self.location(),
            source,
        }
    }
}

#[async_trait]
impl HistoryStore for JsonFileStore {
    async fn load(&self) -> Result<Vec<Turn>, HistoryError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return match self.policy {
                    CorruptHistoryPolicy::FailOpen => {
                        tracing::warn!(
                            path = %self.location(),
                            error = %source,
                            "History unreadable, starting empty"
                        );
                        Ok(Vec::new())
                    }
                    CorruptHistoryPolicy::FailClosed => Err(HistoryError::Read {
                        path: self.location(),
                        source,
                    }),
                }
            }
        };

        match parse_document(&bytes) {
            Ok(turns) => Ok(turns),
            Err(source) => match self.policy {
                CorruptHistoryPolicy::FailOpen => {
                    tracing::warn!(
                        path = %self.location(),
                        error = %source,
                        "Discarding corrupt history document"
                    );
                    Ok(Vec::new())
                }
                CorruptHistoryPolicy::FailClosed => Err(HistoryError::Corrupt {
                    path: self.location(),
                    source,
                }),
            },
        }
    }

    async fn save(&self, turns: &[Turn]) -> Result<(), HistoryError> {
        let bytes = render_document(turns).map_err(|e| self.write_error(io::Error::other(e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.write_error(e))?;
        }

        let staging = self.staging_path();
        if let Err(e) = tokio::fs::write(&staging, &bytes).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(self.write_error(e));
        }
        if let Err(e) = tokio::fs::rename(&staging, &self.path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(self.write_error(e));
        }

        tracing::debug!(path = %self.location(), turns = turns.len(), "History saved");
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{Part, Role};
    use tempfile::TempDir;

    fn sample() -> Vec<Turn> {
        vec![
            Turn::user(vec![Part::text("look"), Part::image_placeholder()]),
            Turn::assistant("a cat"),
            Turn::user(vec![Part::text("")]),
            Turn::assistant("you sent nothing"),
        ]
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_history() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.json"), CorruptHistoryPolicy::FailClosed);
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("chat_history.json"), CorruptHistoryPolicy::default());

        store.save(&sample()).await.unwrap();
        let loaded = store.load().await.unwrap();

        assert_eq!(loaded, sample());
        assert_eq!(loaded[0].role, Role::User);
        assert_eq!(loaded[0].parts[1], Part::image_placeholder());
    }

    #[tokio::test]
    async fn test_save_replaces_whole_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chat_history.json");
        let store = JsonFileStore::new(&path, CorruptHistoryPolicy::default());

        store.save(&sample()).await.unwrap();
        store.save(&[Turn::assistant("only")]).await.unwrap();

        assert_eq!(store.load().await.unwrap(), vec![Turn::assistant("only")]);
        // No staging files left behind
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        // Pretty-printed with two-space indent
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("[\n  {"));
    }

    #[tokio::test]
    async fn test_save_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(
            dir.path().join("nested/deeper/history.json"),
            CorruptHistoryPolicy::default(),
        );
        store.save(&sample()).await.unwrap();
        assert_eq!(store.load().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_corrupt_document_fail_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chat_history.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonFileStore::new(&path, CorruptHistoryPolicy::FailOpen);
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_document_fail_closed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chat_history.json");
        std::fs::write(&path, "{\"role\": \"user\"}").unwrap();

        let store = JsonFileStore::new(&path, CorruptHistoryPolicy::FailClosed);
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, HistoryError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_unreadable_medium_fail_open() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be
        let store = JsonFileStore::new(dir.path(), CorruptHistoryPolicy::FailOpen);
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_medium_fail_closed() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path(), CorruptHistoryPolicy::FailClosed);
        assert!(matches!(
            store.load().await.unwrap_err(),
            HistoryError::Read { .. }
        ));
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();

        let store = JsonFileStore::new(blocker.join("history.json"), CorruptHistoryPolicy::default());
        let err = store.save(&sample()).await.unwrap_err();
        assert!(matches!(err, HistoryError::Write { .. }));
        assert!(err.to_string().contains("blocker"));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("fail-open".parse::<CorruptHistoryPolicy>(), Ok(CorruptHistoryPolicy::FailOpen));
        assert_eq!("FAIL-CLOSED".parse::<CorruptHistoryPolicy>(), Ok(CorruptHistoryPolicy::FailClosed));
        assert!("sometimes".parse::<CorruptHistoryPolicy>().is_err());
    }
}
