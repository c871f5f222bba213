//! Attendance reconciliation: deriving a per-date working set from the roster
//! and a possibly-empty saved record, and keeping it consistent under edits.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub roll: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AttendanceStatus {
    #[serde(rename = "P")]
    Present,
    #[serde(rename = "A")]
    Absent,
    #[default]
    #[serde(rename = "")]
    Unmarked,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "P",
            Self::Absent => "A",
            Self::Unmarked => "",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "P" => Some(Self::Present),
            "A" => Some(Self::Absent),
            "" => Some(Self::Unmarked),
            _ => None,
        }
    }

    /// Only P and A may be chosen by the user; unmarked is the initial state.
    pub fn parse_mark(s: &str) -> Option<Self> {
        match Self::parse(s.trim()) {
            Some(Self::Unmarked) | None => None,
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub roll: String,
    pub name: String,
    pub status: AttendanceStatus,
}

/// What gets persisted for one student on one date. Names stay with the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedMark {
    pub roll: String,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SavePolicy {
    pub require_all_marked: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("{0}")]
    Validation(String),
    #[error("{} student(s) not marked", .unmarked.len())]
    IncompleteMarking { unmarked: Vec<String> },
    #[error("a save is already in progress")]
    SaveInFlight,
    #[error("no attendance session is open")]
    NoSession,
    #[error("date must be YYYY-MM-DD: {0}")]
    BadDate(String),
    #[error("status must be P or A: {0:?}")]
    BadStatus(String),
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_failed",
            Self::IncompleteMarking { .. } => "incomplete_marking",
            Self::SaveInFlight => "save_in_flight",
            Self::NoSession => "no_session",
            Self::BadDate(_) => "bad_date",
            Self::BadStatus(_) => "bad_status",
        }
    }
}

pub fn initialize(roster: &[Student], saved: Vec<AttendanceRecord>) -> Vec<AttendanceRecord> {
    if !saved.is_empty() {
        return saved;
    }
    roster
        .iter()
        .map(|s| AttendanceRecord {
            roll: s.roll.clone(),
            name: s.name.clone(),
            status: AttendanceStatus::Unmarked,
        })
        .collect()
}

/// Returns true when a record was found. Unknown rolls leave the session as is.
pub fn set_status(session: &mut [AttendanceRecord], roll: &str, status: AttendanceStatus) -> bool {
    match session.iter_mut().find(|r| r.roll == roll) {
        Some(record) => {
            record.status = status;
            true
        }
        None => false,
    }
}

/// Appends the student unmarked unless the roll is already present.
pub fn merge_student(session: &mut Vec<AttendanceRecord>, student: &Student) -> bool {
    if session.iter().any(|r| r.roll == student.roll) {
        return false;
    }
    session.push(AttendanceRecord {
        roll: student.roll.clone(),
        name: student.name.clone(),
        status: AttendanceStatus::Unmarked,
    });
    true
}

pub fn prepare_save(
    session: &[AttendanceRecord],
    policy: SavePolicy,
) -> Result<Vec<SavedMark>, SessionError> {
    if policy.require_all_marked {
        let unmarked: Vec<String> = session
            .iter()
            .filter(|r| r.status == AttendanceStatus::Unmarked)
            .map(|r| r.roll.clone())
            .collect();
        if !unmarked.is_empty() {
            return Err(SessionError::IncompleteMarking { unmarked });
        }
    }
    Ok(session
        .iter()
        .map(|r| SavedMark {
            roll: r.roll.clone(),
            status: r.status,
        })
        .collect())
}

/// Roster students that have no row in a saved record. Reported, never merged.
pub fn unrecorded_rolls(roster: &[Student], session: &[AttendanceRecord]) -> Vec<String> {
    roster
        .iter()
        .filter(|s| !session.iter().any(|r| r.roll == s.roll))
        .map(|s| s.roll.clone())
        .collect()
}
