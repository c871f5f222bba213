use crate::date_key;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_class_name, get_optional_str, get_required_str, require_db, session_json};
use crate::ipc::types::{AppState, Request};
use crate::session::{AttendanceStatus, SessionError};
use crate::store::SqliteStore;
use chrono::Utc;

fn session_open(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_name = get_class_name(params, "className")?;
    let date = date_key::date_key_or_today(get_optional_str(params, "date"))?;
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    state
        .session
        .load_from(&SqliteStore::new(conn), &class_name, &date, Utc::now())?;
    session_json(state)
}

fn session_get(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    session_json(state)
}

fn session_set_status(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let roll = get_required_str(params, "roll")?;
    let raw = get_required_str(params, "status")?;
    let status = AttendanceStatus::parse_mark(&raw).ok_or(SessionError::BadStatus(raw))?;
    // Unknown rolls are a no-op; the caller sees `changed: false`.
    let changed = state.session.set_status(&roll, status)?;
    let mut view = session_json(state)?;
    view["changed"] = serde_json::Value::Bool(changed);
    Ok(view)
}

fn session_add_student(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let roll = get_required_str(params, "roll")?;
    let name = get_required_str(params, "name")?;
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    state
        .session
        .add_student_via(&SqliteStore::new(conn), &roll, &name, Utc::now())?;
    session_json(state)
}

fn session_save(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let policy = state.settings.save_policy();
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let saved = state
        .session
        .save_via(&SqliteStore::new(conn), policy, Utc::now())?;
    let mut view = session_json(state)?;
    view["savedCount"] = serde_json::json!(saved);
    Ok(view)
}

fn session_close(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    require_db(state)?;
    state.session.close();
    session_json(state)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.open" => Some(respond(&req.id, session_open(state, &req.params))),
        "session.get" => Some(respond(&req.id, session_get(state))),
        "session.setStatus" => Some(respond(&req.id, session_set_status(state, &req.params))),
        "session.addStudent" => Some(respond(&req.id, session_add_student(state, &req.params))),
        "session.save" => Some(respond(&req.id, session_save(state))),
        "session.close" => Some(respond(&req.id, session_close(state))),
        _ => None,
    }
}
