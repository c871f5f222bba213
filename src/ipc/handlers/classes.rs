use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_class_name, require_db};
use crate::ipc::types::{AppState, Request};
use crate::store::{AttendanceStore, SqliteStore};
use serde_json::json;

fn classes_list(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    // No workspace yet simply means no classes.
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "classes": [] }));
    };
    let classes = SqliteStore::new(conn).list_classes()?;
    Ok(json!({ "classes": classes }))
}

fn classes_create(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let name = get_class_name(params, "name")?;
    SqliteStore::new(conn).create_class(&name)?;
    tracing::info!(class = %name, "class created");
    Ok(json!({ "name": name }))
}

fn classes_delete(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let name = get_class_name(params, "name")?;
    SqliteStore::new(conn).delete_class(&name)?;
    state.session.invalidate_class(&name);
    tracing::info!(class = %name, "class deleted");
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(respond(&req.id, classes_list(state))),
        "classes.create" => Some(respond(&req.id, classes_create(state, &req.params))),
        "classes.delete" => Some(respond(&req.id, classes_delete(state, &req.params))),
        _ => None,
    }
}
