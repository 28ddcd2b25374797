use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::model::User;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// A live change-feed registration: one per watched table per mounted
/// student view. Dropped explicitly via watch.unsubscribe.
pub struct Subscription {
    pub id: String,
    pub table: String,
    pub student_code: String,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub session: Option<User>,
    pub subscriptions: Vec<Subscription>,
    events: Vec<serde_json::Value>,
}

impl AppState {
    pub fn new() -> Self {
        AppState {
            workspace: None,
            db: None,
            session: None,
            subscriptions: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn push_event(&mut self, event: serde_json::Value) {
        self.events.push(event);
    }

    /// Drained by the main loop after each response is written.
    pub fn take_events(&mut self) -> Vec<serde_json::Value> {
        std::mem::take(&mut self.events)
    }
}
