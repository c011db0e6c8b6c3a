//! In-memory history store for tests

use super::store::HistoryError;
use super::{HistoryStore, Turn};
use async_trait::async_trait;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Store that keeps the last saved document in memory and counts saves
#[derive(Default)]
pub struct MemoryStore {
    turns: Mutex<Vec<Turn>>,
    saves: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn with_turns(turns: Vec<Turn>) -> Self {
        Self {
            turns: Mutex::new(turns),
            ..Self::default()
        }
    }

    /// Make every following `save` fail
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn persisted(&self) -> Vec<Turn> {
        self.turns.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn load(&self) -> Result<Vec<Turn>, HistoryError> {
        Ok(self.persisted())
    }

    async fn save(&self, turns: &[Turn]) -> Result<(), HistoryError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(HistoryError::Write {
                path: self.location(),
                source: io::Error::other("disk full"),
            });
        }
        *self.turns.lock().unwrap() = turns.to_vec();
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
