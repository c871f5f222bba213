use crate::db;
use crate::session::SavePolicy;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{Map, Value};

pub const SETTINGS_KEY: &str = "setup.attendance";
const MAX_NOTICE_TTL_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSettings {
    pub require_all_marked: bool,
    pub notice_ttl_ms: u64,
}

impl Default for AttendanceSettings {
    fn default() -> Self {
        Self {
            require_all_marked: false,
            notice_ttl_ms: 2_000,
        }
    }
}

impl AttendanceSettings {
    pub fn save_policy(&self) -> SavePolicy {
        SavePolicy {
            require_all_marked: self.require_all_marked,
        }
    }

    pub fn apply_patch(&mut self, patch: &Map<String, Value>) -> Result<(), String> {
        // Validate everything before touching self so a bad patch changes nothing.
        let mut next = *self;
        for (k, v) in patch {
            match k.as_str() {
                "requireAllMarked" => {
                    next.require_all_marked = v
                        .as_bool()
                        .ok_or_else(|| "requireAllMarked must be boolean".to_string())?;
                }
                "noticeTtlMs" => {
                    let ms = v
                        .as_u64()
                        .ok_or_else(|| "noticeTtlMs must be a non-negative integer".to_string())?;
                    if ms > MAX_NOTICE_TTL_MS {
                        return Err(format!("noticeTtlMs must be <= {}", MAX_NOTICE_TTL_MS));
                    }
                    next.notice_ttl_ms = ms;
                }
                _ => return Err(format!("unknown attendance field: {}", k)),
            }
        }
        *self = next;
        Ok(())
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

pub fn load(conn: &Connection) -> anyhow::Result<AttendanceSettings> {
    let mut current = AttendanceSettings::default();
    if let Some(saved) = db::settings_get_json(conn, SETTINGS_KEY)? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults.
            if let Err(e) = current.apply_patch(saved_obj) {
                tracing::warn!(error = %e, "ignoring stored attendance settings");
            }
        }
    }
    Ok(current)
}

pub fn store(conn: &Connection, settings: &AttendanceSettings) -> anyhow::Result<()> {
    db::settings_set_json(conn, SETTINGS_KEY, &settings.to_json())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().expect("object")
    }

    #[test]
    fn patch_updates_known_fields() {
        let mut s = AttendanceSettings::default();
        s.apply_patch(&obj(json!({ "requireAllMarked": true, "noticeTtlMs": 500 })))
            .expect("patch");
        assert!(s.save_policy().require_all_marked);
        assert_eq!(s.notice_ttl_ms, 500);
        assert_eq!(s.to_json(), json!({ "requireAllMarked": true, "noticeTtlMs": 500 }));
    }

    #[test]
    fn bad_patch_is_rejected_atomically() {
        let mut s = AttendanceSettings::default();
        let err = s
            .apply_patch(&obj(json!({ "requireAllMarked": true, "noticeTtlMs": 999_999 })))
            .expect_err("too large");
        assert!(err.contains("noticeTtlMs"));
        assert_eq!(s, AttendanceSettings::default());
        assert!(s.apply_patch(&obj(json!({ "colour": "red" }))).is_err());
        assert!(s.apply_patch(&obj(json!({ "requireAllMarked": "yes" }))).is_err());
    }

    #[test]
    fn load_merges_saved_over_defaults() {
        let conn = Connection::open_in_memory().expect("open");
        db::init_schema(&conn).expect("schema");
        assert_eq!(load(&conn).expect("load"), AttendanceSettings::default());

        db::settings_set_json(&conn, SETTINGS_KEY, &json!({ "requireAllMarked": true }))
            .expect("seed");
        let s = load(&conn).expect("load");
        assert!(s.require_all_marked);
        assert_eq!(s.notice_ttl_ms, 2_000);

        db::settings_set_json(&conn, SETTINGS_KEY, &json!({ "bogus": 1 })).expect("seed");
        assert_eq!(load(&conn).expect("load"), AttendanceSettings::default());
    }
}
