//! HTTP API
//!
//! `GET /history` and `POST /chat`, plus `GET /version`.

mod handlers;
mod types;

pub use handlers::create_router;

use crate::history::HistoryStore;
use crate::session::ChatSession;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<ChatSession>,
    pub store: Arc<dyn HistoryStore>,
}

impl AppState {
    pub fn new(session: Arc<ChatSession>, store: Arc<dyn HistoryStore>) -> Self {
        Self { session, store }
    }
}
