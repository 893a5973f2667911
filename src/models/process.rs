// Process records and process types

//! # Process Model
//!
//! A [`Process`] is the tracked unit of work. Its `current_department` is the
//! single authoritative pointer to where it sits; the visit log lives in
//! [`HistoryEntry`](super::HistoryEntry) records.
//!
//! ## Status
//!
//! Only the lifecycle state is persisted ([`ProcessStatus`]). Whether a process
//! is overdue is always derived at read time from its history and the current
//! department's deadline, never stored next to the lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{DepartmentId, ProcessId, ProcessTypeId, UserId};

/// Persisted lifecycle state of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    /// Generated but never started; no department, no history
    NotStarted,
    /// Sitting in a non-terminal department
    InProgress,
    /// Sitting in the terminal department
    Completed,
}

impl ProcessStatus {
    /// Sort priority for list views: in progress first, completed last
    pub fn priority(&self) -> u8 {
        match self {
            ProcessStatus::InProgress => 0,
            ProcessStatus::NotStarted => 1,
            ProcessStatus::Completed => 2,
        }
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessStatus::NotStarted => "not_started",
            ProcessStatus::InProgress => "in_progress",
            ProcessStatus::Completed => "completed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    pub id: ProcessId,

    /// Human-facing unique identifier, compared with numeric-aware ordering
    pub protocol_number: String,

    pub process_type: Option<ProcessTypeId>,

    /// Where the process sits right now; `None` until started
    pub current_department: Option<DepartmentId>,

    pub status: ProcessStatus,

    pub start_date: Option<DateTime<Utc>>,

    pub expected_end_date: Option<DateTime<Utc>>,

    /// Process-level main responsible, distinct from sector responsibility
    pub responsible_user: Option<UserId>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Optimistic concurrency counter, bumped by every committed write
    #[serde(default)]
    pub version: i64,
}

impl Process {
    /// A freshly generated process: not started, no department, no responsible
    pub fn new<P: Into<String>>(protocol_number: P, process_type: Option<ProcessTypeId>) -> Self {
        let now = Utc::now();
        Process {
            id: ProcessId::new(),
            protocol_number: protocol_number.into(),
            process_type,
            current_department: None,
            status: ProcessStatus::NotStarted,
            start_date: None,
            expected_end_date: None,
            responsible_user: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn is_started(&self) -> bool {
        self.status != ProcessStatus::NotStarted
    }

    pub fn is_completed(&self) -> bool {
        self.status == ProcessStatus::Completed
    }

    pub fn is_in(&self, department: &DepartmentId) -> bool {
        self.current_department.as_ref() == Some(department)
    }

    /// Copy of this process prepared for the next committed write
    pub fn next_revision(&self, now: DateTime<Utc>) -> Process {
        let mut next = self.clone();
        next.updated_at = now;
        next.version = self.version + 1;
        next
    }
}

/// Classification label of a process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessType {
    pub id: ProcessTypeId,
    pub name: String,
    /// Inactive types are hidden from pickers but kept on historic processes
    pub active: bool,
    #[serde(default)]
    pub description: Option<String>,
}

impl ProcessType {
    pub fn new<I: Into<ProcessTypeId>, N: Into<String>>(id: I, name: N) -> Self {
        ProcessType {
            id: id.into(),
            name: name.into(),
            active: true,
            description: None,
        }
    }
}
