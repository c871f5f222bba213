//! Session controller: owns the working set for one (class, date) selection
//! and guards it against out-of-order collaborator responses.
//!
//! Every collaborator round trip is split into a `begin_*` step that hands out
//! a [`Ticket`] and a `complete_*` step that applies the response only if the
//! ticket still matches the current selection (and, for loads, the latest
//! load issued). Nothing is cancelled; late responses are dropped.

use crate::session::{
    self, AttendanceRecord, AttendanceStatus, SavePolicy, SavedMark, SessionError, Student,
};
use crate::store::{AttendanceStore, StoreError};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt::Display;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub class_name: String,
    pub date: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Empty,
    Loaded,
    Dirty,
    Saved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    tag: u64,
    selection: Selection,
    revision: u64,
}

#[derive(Debug)]
pub struct PendingSave {
    pub ticket: Ticket,
    pub marks: Vec<SavedMark>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NoticeLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
    pub raised_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ControllerError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Session(e) => e.code(),
            Self::Store(e) => e.code(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView<'a> {
    pub class_name: Option<&'a str>,
    pub date: Option<&'a str>,
    pub phase: Phase,
    pub saving: bool,
    pub records: &'a [AttendanceRecord],
    pub roster: &'a [Student],
    pub unrecorded_rolls: Vec<String>,
    pub notice: Option<&'a Notice>,
}

pub struct SessionController {
    selection: Option<Selection>,
    next_tag: u64,
    latest_load: u64,
    phase: Phase,
    records: Vec<AttendanceRecord>,
    roster: Vec<Student>,
    revision: u64,
    saving: Option<u64>,
    notice: Option<Notice>,
    notice_ttl: Duration,
}

impl SessionController {
    pub fn new(notice_ttl_ms: u64) -> Self {
        Self {
            selection: None,
            next_tag: 0,
            latest_load: 0,
            phase: Phase::Empty,
            records: Vec::new(),
            roster: Vec::new(),
            revision: 0,
            saving: None,
            notice: None,
            notice_ttl: ttl(notice_ttl_ms),
        }
    }

    pub fn set_notice_ttl(&mut self, notice_ttl_ms: u64) {
        self.notice_ttl = ttl(notice_ttl_ms);
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }

    pub fn roster(&self) -> &[Student] {
        &self.roster
    }

    pub fn is_saving(&self) -> bool {
        self.saving.is_some()
    }

    /// The latest notice, unless it has outlived the configured TTL.
    pub fn notice(&self, now: DateTime<Utc>) -> Option<&Notice> {
        self.notice
            .as_ref()
            .filter(|n| now.signed_duration_since(n.raised_at) < self.notice_ttl)
    }

    pub fn raise(&mut self, level: NoticeLevel, text: impl Into<String>, now: DateTime<Utc>) {
        self.notice = Some(Notice {
            level,
            text: text.into(),
            raised_at: now,
        });
    }

    pub fn view(&self, now: DateTime<Utc>) -> SessionView<'_> {
        let unrecorded_rolls = if self.phase() == Phase::Empty {
            Vec::new()
        } else {
            session::unrecorded_rolls(self.roster(), self.records())
        };
        SessionView {
            class_name: self.selection().map(|s| s.class_name.as_str()),
            date: self.selection().map(|s| s.date.as_str()),
            phase: self.phase(),
            saving: self.is_saving(),
            records: self.records(),
            roster: self.roster(),
            unrecorded_rolls,
            notice: self.notice(now),
        }
    }

    fn bump_tag(&mut self) -> u64 {
        self.next_tag += 1;
        self.next_tag
    }

    fn ticket(&mut self, selection: Selection) -> Ticket {
        Ticket {
            tag: self.bump_tag(),
            selection,
            revision: self.revision,
        }
    }

    fn is_current_selection(&self, ticket: &Ticket) -> bool {
        self.selection.as_ref() == Some(&ticket.selection)
    }

    fn open_selection(&self) -> Result<Selection, SessionError> {
        match (&self.selection, self.phase) {
            (Some(sel), phase) if phase != Phase::Empty => Ok(sel.clone()),
            _ => Err(SessionError::NoSession),
        }
    }

    fn touch(&mut self) {
        self.revision += 1;
        self.phase = Phase::Dirty;
    }

    fn reset(&mut self) {
        self.phase = Phase::Empty;
        self.records.clear();
        self.roster.clear();
        self.saving = None;
        self.revision += 1;
    }

    /// Starts loading `(class_name, date)`. A different selection empties the
    /// session right away; re-selecting the current one keeps it until the
    /// load completes.
    pub fn select(&mut self, class_name: &str, date: &str) -> Ticket {
        let selection = Selection {
            class_name: class_name.to_string(),
            date: date.to_string(),
        };
        if self.selection.as_ref() != Some(&selection) {
            self.reset();
            self.selection = Some(selection.clone());
        }
        let ticket = self.ticket(selection);
        self.latest_load = ticket.tag;
        ticket
    }

    pub fn complete_load<E: Display>(
        &mut self,
        ticket: &Ticket,
        result: Result<(Vec<Student>, Vec<AttendanceRecord>), E>,
        now: DateTime<Utc>,
    ) -> Completion {
        if ticket.tag != self.latest_load || !self.is_current_selection(ticket) {
            tracing::debug!(tag = ticket.tag, class = %ticket.selection.class_name, date = %ticket.selection.date, "discarding stale load");
            return Completion::Stale;
        }
        match result {
            Ok((roster, saved)) => {
                let from_saved = !saved.is_empty();
                self.records = session::initialize(&roster, saved);
                self.roster = roster;
                // A save still in flight keeps the busy flag until it completes.
                self.phase = Phase::Loaded;
                self.revision += 1;
                tracing::info!(
                    class = %ticket.selection.class_name,
                    date = %ticket.selection.date,
                    records = self.records.len(),
                    from_saved,
                    "attendance session loaded"
                );
            }
            Err(e) => {
                tracing::warn!(class = %ticket.selection.class_name, date = %ticket.selection.date, error = %e, "attendance load failed");
                self.raise(NoticeLevel::Error, format!("Failed to load attendance: {e}"), now);
            }
        }
        Completion::Applied
    }

    pub fn set_status(&mut self, roll: &str, status: AttendanceStatus) -> Result<bool, SessionError> {
        self.open_selection()?;
        let found = session::set_status(&mut self.records, roll, status);
        if found {
            self.touch();
        }
        Ok(found)
    }

    /// Validates the new student before any collaborator call is made.
    pub fn begin_add_student(
        &mut self,
        roll: &str,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<(Ticket, Student), SessionError> {
        let Some(selection) = self.selection.clone() else {
            self.raise(NoticeLevel::Error, "Select class first", now);
            return Err(SessionError::NoSession);
        };
        let (roll, name) = (roll.trim(), name.trim());
        if roll.is_empty() || name.is_empty() {
            let e = SessionError::Validation("roll and name are required".to_string());
            self.raise(NoticeLevel::Error, e.to_string(), now);
            return Err(e);
        }
        let student = Student {
            roll: roll.to_string(),
            name: name.to_string(),
        };
        Ok((self.ticket(selection), student))
    }

    /// Folds an acknowledged add into the working set without disturbing
    /// existing marks. A pending or failed load leaves nothing to merge into.
    pub fn complete_add_student<E: Display>(
        &mut self,
        ticket: &Ticket,
        student: &Student,
        result: Result<(), E>,
        now: DateTime<Utc>,
    ) -> Completion {
        if !self.is_current_selection(ticket) {
            tracing::debug!(tag = ticket.tag, roll = %student.roll, "discarding stale add");
            return Completion::Stale;
        }
        if let Err(e) = result {
            self.raise(NoticeLevel::Error, format!("Failed to add student: {e}"), now);
            return Completion::Applied;
        }
        if self.phase != Phase::Empty && session::merge_student(&mut self.records, student) {
            self.touch();
        }
        self.raise(NoticeLevel::Info, "Student added", now);
        Completion::Applied
    }

    /// Updates the roster view only; the working set is never replaced here.
    pub fn complete_roster_refresh<E: Display>(
        &mut self,
        ticket: &Ticket,
        result: Result<Vec<Student>, E>,
        now: DateTime<Utc>,
    ) -> Completion {
        if !self.is_current_selection(ticket) {
            return Completion::Stale;
        }
        match result {
            Ok(roster) => self.roster = roster,
            Err(e) => self.raise(NoticeLevel::Error, format!("Failed to load students: {e}"), now),
        }
        Completion::Applied
    }

    pub fn begin_save(
        &mut self,
        policy: SavePolicy,
        now: DateTime<Utc>,
    ) -> Result<PendingSave, SessionError> {
        let selection = match self.open_selection() {
            Ok(sel) => sel,
            Err(e) => {
                self.raise(NoticeLevel::Error, "Select class", now);
                return Err(e);
            }
        };
        if self.saving.is_some() {
            return Err(SessionError::SaveInFlight);
        }
        let marks = match session::prepare_save(&self.records, policy) {
            Ok(m) => m,
            Err(e) => {
                self.raise(NoticeLevel::Error, format!("Cannot save: {e}"), now);
                return Err(e);
            }
        };
        let ticket = self.ticket(selection);
        self.saving = Some(ticket.tag);
        tracing::info!(class = %ticket.selection.class_name, date = %ticket.selection.date, records = marks.len(), "saving attendance");
        Ok(PendingSave { ticket, marks })
    }

    /// A failed save keeps every edit in place for a retry.
    pub fn complete_save<E: Display>(
        &mut self,
        ticket: &Ticket,
        result: Result<(), E>,
        now: DateTime<Utc>,
    ) -> Completion {
        if self.saving != Some(ticket.tag) {
            tracing::debug!(tag = ticket.tag, "discarding stale save completion");
            return Completion::Stale;
        }
        self.saving = None;
        match result {
            Ok(()) => {
                // Edits made while the save was in flight are still unsaved.
                if self.revision == ticket.revision {
                    self.phase = Phase::Saved;
                }
                self.raise(NoticeLevel::Info, "Attendance saved", now);
                tracing::info!(class = %ticket.selection.class_name, date = %ticket.selection.date, "attendance saved");
            }
            Err(e) => {
                tracing::warn!(class = %ticket.selection.class_name, date = %ticket.selection.date, error = %e, "attendance save failed");
                self.raise(NoticeLevel::Error, format!("Failed to save attendance: {e}"), now);
            }
        }
        Completion::Applied
    }

    /// Drops the session when its class goes away.
    pub fn invalidate_class(&mut self, class_name: &str) {
        if self.selection.as_ref().map(|s| s.class_name.as_str()) == Some(class_name) {
            self.close();
        }
    }

    pub fn close(&mut self) {
        self.reset();
        self.selection = None;
        // Anything still in flight now belongs to no selection.
        self.latest_load = self.bump_tag();
    }

    /// Synchronous round trip: select, fetch roster and saved record, complete.
    pub fn load_from(
        &mut self,
        store: &dyn AttendanceStore,
        class_name: &str,
        date: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let ticket = self.select(class_name, date);
        let fetched = store
            .list_students(class_name)
            .and_then(|roster| Ok((roster, store.fetch_attendance(class_name, date)?)));
        match fetched {
            Ok(v) => {
                self.complete_load::<StoreError>(&ticket, Ok(v), now);
                Ok(())
            }
            Err(e) => {
                self.complete_load::<&StoreError>(&ticket, Err(&e), now);
                Err(e)
            }
        }
    }

    pub fn add_student_via(
        &mut self,
        store: &dyn AttendanceStore,
        roll: &str,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<Student, ControllerError> {
        let (ticket, student) = self.begin_add_student(roll, name, now)?;
        let class_name = ticket.selection.class_name.clone();
        if let Err(e) = store.add_student(&class_name, &student.roll, &student.name) {
            self.complete_add_student::<&StoreError>(&ticket, &student, Err(&e), now);
            return Err(e.into());
        }
        self.complete_add_student::<StoreError>(&ticket, &student, Ok(()), now);
        let refreshed = store.list_students(&class_name);
        self.complete_roster_refresh(&ticket, refreshed, now);
        Ok(student)
    }

    pub fn save_via(
        &mut self,
        store: &dyn AttendanceStore,
        policy: SavePolicy,
        now: DateTime<Utc>,
    ) -> Result<usize, ControllerError> {
        let pending = self.begin_save(policy, now)?;
        let sel = pending.ticket.selection.clone();
        match store.save_attendance(&sel.class_name, &sel.date, &pending.marks) {
            Ok(()) => {
                self.complete_save::<StoreError>(&pending.ticket, Ok(()), now);
                Ok(pending.marks.len())
            }
            Err(e) => {
                self.complete_save::<&StoreError>(&pending.ticket, Err(&e), now);
                Err(e.into())
            }
        }
    }
}

fn ttl(ms: u64) -> Duration {
    Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}
