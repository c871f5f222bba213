//! Storage collaborator: the operations the session controller consumes, and a
//! SQLite implementation backing the sidecar workspace.

use crate::session::{AttendanceRecord, AttendanceStatus, SavedMark, Student};
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} already exists")]
    Conflict(String),
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Invalid(_) => "bad_params",
            Self::Db(_) => "db_query_failed",
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

pub trait AttendanceStore {
    fn list_classes(&self) -> StoreResult<Vec<String>>;
    fn create_class(&self, name: &str) -> StoreResult<()>;
    fn delete_class(&self, name: &str) -> StoreResult<()>;
    fn list_students(&self, class_name: &str) -> StoreResult<Vec<Student>>;
    fn add_student(&self, class_name: &str, roll: &str, name: &str) -> StoreResult<()>;
    /// Empty means nothing was recorded for that date yet.
    fn fetch_attendance(&self, class_name: &str, date: &str)
        -> StoreResult<Vec<AttendanceRecord>>;
    fn save_attendance(&self, class_name: &str, date: &str, records: &[SavedMark])
        -> StoreResult<()>;
    fn export_csv(&self, class_name: &str) -> StoreResult<Vec<u8>>;
}

pub struct SqliteStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn require_class(&self, name: &str) -> StoreResult<()> {
        let exists = self
            .conn
            .query_row("SELECT 1 FROM classes WHERE name = ?", [name], |r| {
                r.get::<_, i64>(0)
            })
            .optional()?
            .is_some();
        if exists {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("class {name:?}")))
        }
    }
}

fn stored_status(class_name: &str, roll: &str, raw: &str) -> AttendanceStatus {
    AttendanceStatus::parse(raw).unwrap_or_else(|| {
        tracing::warn!(class = class_name, roll, status = raw, "unknown stored status treated as unmarked");
        AttendanceStatus::Unmarked
    })
}

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

impl AttendanceStore for SqliteStore<'_> {
    fn list_classes(&self) -> StoreResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM classes ORDER BY name")?;
        let names = stmt
            .query_map([], |r| r.get::<_, String>(0))
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        Ok(names)
    }

    fn create_class(&self, name: &str) -> StoreResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Invalid("class name must not be empty".into()));
        }
        if self.require_class(name).is_ok() {
            return Err(StoreError::Conflict(format!("class {name:?}")));
        }
        self.conn.execute(
            "INSERT INTO classes(name, created_at) VALUES(?, ?)",
            (name, chrono::Utc::now().to_rfc3339()),
        )?;
        Ok(())
    }

    fn delete_class(&self, name: &str) -> StoreResult<()> {
        self.require_class(name)?;
        // No ON DELETE CASCADE: children first.
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM attendance WHERE class_name = ?", [name])?;
        tx.execute("DELETE FROM students WHERE class_name = ?", [name])?;
        tx.execute("DELETE FROM classes WHERE name = ?", [name])?;
        tx.commit()?;
        Ok(())
    }

    fn list_students(&self, class_name: &str) -> StoreResult<Vec<Student>> {
        self.require_class(class_name)?;
        let mut stmt = self.conn.prepare(
            "SELECT roll, name FROM students WHERE class_name = ? ORDER BY sort_order",
        )?;
        let students = stmt
            .query_map([class_name], |r| {
                Ok(Student {
                    roll: r.get(0)?,
                    name: r.get(1)?,
                })
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        Ok(students)
    }

    fn add_student(&self, class_name: &str, roll: &str, name: &str) -> StoreResult<()> {
        let (roll, name) = (roll.trim(), name.trim());
        if roll.is_empty() || name.is_empty() {
            return Err(StoreError::Invalid("roll and name are required".into()));
        }
        self.require_class(class_name)?;
        let taken = self
            .conn
            .query_row(
                "SELECT 1 FROM students WHERE class_name = ? AND roll = ?",
                (class_name, roll),
                |r| r.get::<_, i64>(0),
            )
            .optional()?
            .is_some();
        if taken {
            return Err(StoreError::Conflict(format!("roll {roll:?} in {class_name:?}")));
        }
        let next_order: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM students WHERE class_name = ?",
            [class_name],
            |r| r.get(0),
        )?;
        self.conn.execute(
            "INSERT INTO students(class_name, roll, name, sort_order) VALUES(?, ?, ?, ?)",
            (class_name, roll, name, next_order),
        )?;
        Ok(())
    }

    fn fetch_attendance(
        &self,
        class_name: &str,
        date: &str,
    ) -> StoreResult<Vec<AttendanceRecord>> {
        self.require_class(class_name)?;
        let mut stmt = self.conn.prepare(
            "SELECT a.roll, COALESCE(s.name, ''), a.status
             FROM attendance a
             LEFT JOIN students s ON s.class_name = a.class_name AND s.roll = a.roll
             WHERE a.class_name = ? AND a.date = ?
             ORDER BY a.position",
        )?;
        let rows = stmt
            .query_map((class_name, date), |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                ))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        Ok(rows
            .into_iter()
            .map(|(roll, name, status)| {
                let status = stored_status(class_name, &roll, &status);
                AttendanceRecord { roll, name, status }
            })
            .collect())
    }

    fn save_attendance(
        &self,
        class_name: &str,
        date: &str,
        records: &[SavedMark],
    ) -> StoreResult<()> {
        self.require_class(class_name)?;
        let mut seen = HashSet::new();
        for r in records {
            if !seen.insert(r.roll.as_str()) {
                return Err(StoreError::Invalid(format!("duplicate roll {:?}", r.roll)));
            }
        }

        // Whole-record replace keeps repeated saves of the same content idempotent.
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM attendance WHERE class_name = ? AND date = ?",
            (class_name, date),
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO attendance(class_name, date, roll, status, position)
                 VALUES(?, ?, ?, ?, ?)",
            )?;
            for (position, r) in records.iter().enumerate() {
                insert.execute((class_name, date, &r.roll, r.status.as_str(), position as i64))?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn export_csv(&self, class_name: &str) -> StoreResult<Vec<u8>> {
        self.require_class(class_name)?;
        let mut stmt = self.conn.prepare(
            "SELECT a.date, a.roll, COALESCE(s.name, ''), a.status
             FROM attendance a
             LEFT JOIN students s ON s.class_name = a.class_name AND s.roll = a.roll
             WHERE a.class_name = ?
             ORDER BY a.date, COALESCE(s.sort_order, a.position), a.roll",
        )?;
        let rows = stmt
            .query_map([class_name], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                ))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

        let mut out = String::from("date,roll,name,status\n");
        for (date, roll, name, status) in rows {
            let status = stored_status(class_name, &roll, &status);
            out.push_str(&format!(
                "{},{},{},{}\n",
                csv_quote(&date),
                csv_quote(&roll),
                csv_quote(&name),
                status.as_str()
            ));
        }
        Ok(out.into_bytes())
    }
}
