use std::collections::HashMap;
use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::submit::CurrentUser;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub session: Option<CurrentUser>,
    /// Staged wizard form state per flow ("new" / "existing"); cleared by a
    /// successful submission.
    pub drafts: HashMap<String, serde_json::Value>,
}

impl AppState {
    pub fn new() -> Self {
        AppState {
            workspace: None,
            db: None,
            session: None,
            drafts: HashMap::new(),
        }
    }
}
