// Deadline evaluation - is a process overdue in its current department?

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::calendar::BusinessCalendar;
use crate::models::{current_open_entry, DepartmentId, HistoryEntry, HistoryEntryId};

/// Deadline state of the current department visit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeadlineStatus {
    /// The visit the deadline is counted from
    pub entry_id: HistoryEntryId,
    pub entry_date: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub time_limit: u32,
    pub overdue: bool,
    /// Business days left until the deadline; negative once past it
    pub remaining_business_days: i64,
    /// Business days spent in the department so far
    pub elapsed_business_days: i64,
}

/// Computes deadlines from a process's history and the current department's limit
#[derive(Debug, Clone, Copy, Default)]
pub struct DeadlineEvaluator {
    calendar: BusinessCalendar,
}

impl DeadlineEvaluator {
    pub fn new(calendar: BusinessCalendar) -> Self {
        DeadlineEvaluator { calendar }
    }

    pub fn calendar(&self) -> &BusinessCalendar {
        &self.calendar
    }

    /// Evaluate the current visit.
    ///
    /// Returns `None` when there is nothing to evaluate: no current department,
    /// no limit (`None` or `0`), no open visit for the current department, or a
    /// deadline outside the calendar's range.
    /// Such a process is never overdue.
    pub fn evaluate(
        &self,
        history: &[HistoryEntry],
        current_department: Option<&DepartmentId>,
        time_limit: Option<u32>,
        now: DateTime<Utc>,
    ) -> Option<DeadlineStatus> {
        let department = current_department?;
        let limit = time_limit.filter(|days| *days > 0)?;
        let visit = current_open_entry(history, department)?;

        let deadline = self.calendar.add_business_days(visit.entry_date, limit)?;

        Some(DeadlineStatus {
            entry_id: visit.id,
            entry_date: visit.entry_date,
            deadline,
            time_limit: limit,
            overdue: now > deadline,
            remaining_business_days: self.calendar.business_days_between(now, deadline),
            elapsed_business_days: self.calendar.business_days_between(visit.entry_date, now),
        })
    }

    pub fn is_overdue(
        &self,
        history: &[HistoryEntry],
        current_department: Option<&DepartmentId>,
        time_limit: Option<u32>,
        now: DateTime<Utc>,
    ) -> bool {
        self.evaluate(history, current_department, time_limit, now)
            .map_or(false, |status| status.overdue)
    }
}
