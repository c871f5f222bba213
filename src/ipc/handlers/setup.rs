use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::require_db;
use crate::ipc::types::{AppState, Request};
use crate::settings;
use serde_json::json;

fn setup_get(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    require_db(state)?;
    Ok(json!({ "attendance": state.settings.to_json() }))
}

fn setup_update(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let Some(section) = params.get("section").and_then(|v| v.as_str()) else {
        return Err(HandlerErr::new("bad_params", "missing section"));
    };
    if section != "attendance" {
        return Err(HandlerErr::new("bad_params", "unknown section"));
    }
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::new("bad_params", "patch must be an object"));
    };

    let mut next = state.settings;
    next.apply_patch(patch)
        .map_err(|msg| HandlerErr::new("bad_params", msg))?;
    settings::store(conn, &next).map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;

    state.settings = next;
    state.session.set_notice_ttl(next.notice_ttl_ms);
    tracing::info!(require_all_marked = next.require_all_marked, notice_ttl_ms = next.notice_ttl_ms, "attendance settings updated");
    Ok(json!({ "attendance": next.to_json() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(respond(&req.id, setup_get(state))),
        "setup.update" => Some(respond(&req.id, setup_update(state, &req.params))),
        _ => None,
    }
}
