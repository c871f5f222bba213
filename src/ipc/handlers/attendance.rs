use crate::date_key;
use crate::export;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_class_name, get_optional_str, get_required_str, require_db};
use crate::ipc::types::{AppState, Request};
use crate::store::{AttendanceStore, SqliteStore};
use serde_json::json;
use std::path::PathBuf;

fn attendance_get(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_name = get_class_name(params, "className")?;
    let date = date_key::date_key_or_today(get_optional_str(params, "date"))?;
    let records = SqliteStore::new(conn).fetch_attendance(&class_name, &date)?;
    Ok(json!({
        "className": class_name,
        "date": date,
        "recorded": !records.is_empty(),
        "records": records
    }))
}

fn attendance_export_csv(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_name = get_class_name(params, "className")?;
    let bytes = SqliteStore::new(conn).export_csv(&class_name)?;
    let file_name = export::csv_file_name(&class_name);

    let out_path = get_optional_str(params, "outPath").map(PathBuf::from);
    if let Some(out) = out_path.as_ref() {
        export::write_csv(out, &bytes)
            .map_err(|e| HandlerErr::new("io_failed", format!("{e:#}")))?;
        tracing::info!(class = %class_name, path = %out.display(), bytes = bytes.len(), "attendance csv exported");
    }

    Ok(json!({
        "fileName": file_name,
        "bytes": bytes.len(),
        "csv": String::from_utf8_lossy(&bytes),
        "outPath": out_path.map(|p| p.to_string_lossy().to_string())
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.get" => Some(respond(&req.id, attendance_get(state, &req.params))),
        "attendance.exportCsv" => Some(respond(&req.id, attendance_export_csv(state, &req.params))),
        _ => None,
    }
}
