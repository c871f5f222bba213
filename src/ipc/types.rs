use std::path::PathBuf;

use crate::controller::SessionController;
use crate::settings::AttendanceSettings;
use rusqlite::Connection;
use serde::Deserialize;

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
    pub settings: AttendanceSettings,
    pub session: SessionController,
}

impl Default for AppState {
    fn default() -> Self {
        let settings = AttendanceSettings::default();
        Self {
            workspace: None,
            db: None,
            settings,
            session: SessionController::new(settings.notice_ttl_ms),
        }
    }
}
