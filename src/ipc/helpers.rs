use crate::ipc::error::HandlerErr;
use crate::ipc::types::AppState;
use rusqlite::Connection;

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

/// Class names are stored trimmed; every lookup trims the same way.
pub fn get_class_name(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let name = get_required_str(params, key)?.trim().to_string();
    if name.is_empty() {
        return Err(HandlerErr::new("bad_params", format!("{} must not be empty", key)));
    }
    Ok(name)
}

pub fn get_optional_str<'a>(params: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn session_json(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    serde_json::to_value(state.session.view(chrono::Utc::now()))
        .map_err(|e| HandlerErr::new("internal", e.to_string()))
}
