use rusqlite::Connection;
use serde_json::json;

use super::error::err;
use super::types::AppState;
use crate::submit::{CurrentUser, SubmitError};

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<SubmitError> for HandlerErr {
    fn from(e: SubmitError) -> Self {
        HandlerErr {
            code: e.code,
            message: e.message,
            details: e.details,
        }
    }
}

pub fn bad_params(message: impl Into<String>) -> HandlerErr {
    HandlerErr {
        code: "bad_params",
        message: message.into(),
        details: None,
    }
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| bad_params(format!("missing {}", key)))
}

pub fn get_opt_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state.db.as_ref().ok_or(HandlerErr {
        code: "no_workspace",
        message: "select a workspace first".to_string(),
        details: None,
    })
}

pub fn require_session(state: &AppState) -> Result<CurrentUser, HandlerErr> {
    state.session.clone().ok_or(HandlerErr {
        code: "no_session",
        message: "set a session first".to_string(),
        details: None,
    })
}

pub fn ensure_year_tables(
    conn: &Connection,
    academic_year: &str,
) -> Result<(), HandlerErr> {
    // A malformed year is a parameter error, not an init failure.
    crate::db::year_suffix(academic_year).map_err(|e| bad_params(e.to_string()))?;
    crate::db::ensure_year_tables(conn, academic_year).map_err(|e| HandlerErr {
        code: "db_init_failed",
        message: e.to_string(),
        details: Some(json!({ "academicYear": academic_year })),
    })
}
