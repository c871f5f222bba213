use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_class_name, get_required_str, require_db};
use crate::ipc::types::{AppState, Request};
use crate::store::{AttendanceStore, SqliteStore};
use serde_json::json;

fn students_list(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_name = get_class_name(params, "className")?;
    let students = SqliteStore::new(conn).list_students(&class_name)?;
    Ok(json!({ "students": students }))
}

/// Adding to the class of the open session goes through the controller so
/// the new student is merged into the working set.
fn students_add(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_name = get_class_name(params, "className")?;
    let roll = get_required_str(params, "roll")?;
    let name = get_required_str(params, "name")?;
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let store = SqliteStore::new(conn);

    let in_session = state
        .session
        .selection()
        .is_some_and(|s| s.class_name == class_name);
    let student = if in_session {
        state
            .session
            .add_student_via(&store, &roll, &name, chrono::Utc::now())?
    } else {
        let (roll, name) = (roll.trim(), name.trim());
        if roll.is_empty() || name.is_empty() {
            return Err(HandlerErr::new("validation_failed", "roll and name are required"));
        }
        store.add_student(&class_name, roll, name)?;
        crate::session::Student {
            roll: roll.to_string(),
            name: name.to_string(),
        }
    };
    tracing::info!(class = %class_name, roll = %student.roll, "student added");
    Ok(json!({ "student": student, "mergedIntoSession": in_session }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(respond(&req.id, students_list(state, &req.params))),
        "students.add" => Some(respond(&req.id, students_add(state, &req.params))),
        _ => None,
    }
}

