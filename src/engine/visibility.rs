// Visibility, filtering and ordering of process lists

//! # Visibility & Filter Policy
//!
//! List views run every process through three stages:
//! 1. **Visibility**: administrators see everything; everybody else sees a
//!    process only if they are its process-level responsible or it currently
//!    sits in one of their departments.
//! 2. **Filter**: the clauses of [`ProcessFilter`], applied in a fixed order and
//!    short-circuiting on the first failing one.
//! 3. **Sort**: status priority first (in progress, not started, completed),
//!    then protocol number in numeric-aware order ("PROC-9" before "PROC-10").

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::calendar::BusinessCalendar;
use super::query::ProcessSummary;
use crate::models::{DepartmentId, Process, ProcessStatus, ProcessTypeId, Role, User, UserId};

/// Status shown to users: the lifecycle state with overdue derived on top
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    NotStarted,
    InProgress,
    Overdue,
    Completed,
}

impl DisplayStatus {
    pub fn derive(status: ProcessStatus, overdue: bool) -> Self {
        match status {
            ProcessStatus::NotStarted => DisplayStatus::NotStarted,
            ProcessStatus::Completed => DisplayStatus::Completed,
            ProcessStatus::InProgress if overdue => DisplayStatus::Overdue,
            ProcessStatus::InProgress => DisplayStatus::InProgress,
        }
    }
}

/// Status clause of a filter; `overdue` is computed, never stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    NotStarted,
    #[serde(alias = "pending")]
    InProgress,
    Overdue,
    Completed,
}

impl StatusFilter {
    fn matches(&self, status: DisplayStatus) -> bool {
        matches!(
            (self, status),
            (StatusFilter::NotStarted, DisplayStatus::NotStarted)
                | (StatusFilter::InProgress, DisplayStatus::InProgress)
                | (StatusFilter::Overdue, DisplayStatus::Overdue)
                | (StatusFilter::Completed, DisplayStatus::Completed)
        )
    }
}

/// Who is looking at the list
#[derive(Debug, Clone)]
pub struct Viewer {
    pub user_id: UserId,
    pub role: Role,
    pub departments: HashSet<DepartmentId>,
}

impl Viewer {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn can_view(&self, process: &Process) -> bool {
        if self.is_admin() {
            return true;
        }
        if process.responsible_user.as_ref() == Some(&self.user_id) {
            return true;
        }
        process
            .current_department
            .as_ref()
            .map_or(false, |dept| self.departments.contains(dept))
    }
}

impl From<&User> for Viewer {
    fn from(user: &User) -> Self {
        Viewer {
            user_id: user.id.clone(),
            role: user.role,
            departments: user.departments.iter().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessFilter {
    #[serde(default)]
    pub exclude_completed: bool,
    pub department: Option<DepartmentId>,
    pub status: Option<StatusFilter>,
    pub process_type: Option<ProcessTypeId>,
    /// Case-insensitive substring of the protocol number
    pub search: Option<String>,
    /// Inclusive bounds on the creation date, in the calendar's local time
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Responsible for the process in any department, past or present
    pub responsible_user: Option<UserId>,
}

impl ProcessFilter {
    pub fn matches(&self, summary: &ProcessSummary, calendar: &BusinessCalendar) -> bool {
        let process = &summary.process;

        if self.exclude_completed && process.is_completed() {
            return false;
        }

        if let Some(department) = &self.department {
            if !process.is_in(department) {
                return false;
            }
        }

        if let Some(status) = &self.status {
            if !status.matches(summary.display_status) {
                return false;
            }
        }

        if let Some(process_type) = &self.process_type {
            if process.process_type.as_ref() != Some(process_type) {
                return false;
            }
        }

        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            if !process.protocol_number.to_lowercase().contains(&needle) {
                return false;
            }
        }

        if let Some(start) = self.start_date {
            let (from, _) = calendar.day_bounds(start);
            if process.created_at < from {
                return false;
            }
        }

        if let Some(end) = self.end_date {
            let (_, until) = calendar.day_bounds(end);
            if process.created_at >= until {
                return false;
            }
        }

        if let Some(user) = &self.responsible_user {
            if !summary.is_responsible(user) {
                return false;
            }
        }

        true
    }
}

/// Compare strings treating digit runs as numbers: "PROC-9" < "PROC-10"
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = chunks(a);
    let mut right = chunks(b);

    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = compare_chunk(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn chunks(s: &str) -> impl Iterator<Item = &str> {
    let mut rest = s;
    std::iter::from_fn(move || {
        let first = rest.chars().next()?;
        let digit = first.is_ascii_digit();
        let end = rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() != digit)
            .map_or(rest.len(), |(i, _)| i);
        let (chunk, tail) = rest.split_at(end);
        rest = tail;
        Some(chunk)
    })
}

fn compare_chunk(x: &str, y: &str) -> Ordering {
    let x_digits = x.starts_with(|c: char| c.is_ascii_digit());
    let y_digits = y.starts_with(|c: char| c.is_ascii_digit());

    match (x_digits, y_digits) {
        (true, true) => {
            let xs = x.trim_start_matches('0');
            let ys = y.trim_start_matches('0');
            xs.len().cmp(&ys.len()).then_with(|| xs.cmp(ys))
        }
        (false, false) => x.to_lowercase().cmp(&y.to_lowercase()),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
    }
}

/// List-view order: status priority, then protocol number
pub fn sort_summaries(summaries: &mut [ProcessSummary]) {
    summaries.sort_by(|a, b| {
        a.process
            .status
            .priority()
            .cmp(&b.process.status.priority())
            .then_with(|| natural_cmp(&a.process.protocol_number, &b.process.protocol_number))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn summary(protocol: &str, status: ProcessStatus, dept: Option<&str>) -> ProcessSummary {
        let mut process = Process::new(protocol, None);
        process.status = status;
        process.current_department = dept.map(DepartmentId::from);
        ProcessSummary {
            display_status: DisplayStatus::derive(status, false),
            department_name: None,
            deadline: None,
            sector_responsible: None,
            responsibles: BTreeMap::new(),
            process,
        }
    }

    fn member(id: &str, departments: &[&str]) -> Viewer {
        Viewer {
            user_id: UserId::from(id),
            role: Role::Member,
            departments: departments.iter().map(|d| DepartmentId::from(*d)).collect(),
        }
    }

    #[test]
    fn test_member_sees_only_own_departments_or_own_processes() {
        let viewer = member("ana", &["3"]);
        let in_five = summary("1", ProcessStatus::InProgress, Some("5")).process;
        let in_three = summary("2", ProcessStatus::InProgress, Some("3")).process;

        assert!(!viewer.can_view(&in_five));
        assert!(viewer.can_view(&in_three));

        let mut owned = in_five.clone();
        owned.responsible_user = Some(UserId::from("ana"));
        assert!(viewer.can_view(&owned));

        let admin = Viewer {
            role: Role::Admin,
            ..member("root", &[])
        };
        assert!(admin.can_view(&in_five));
    }

    #[test]
    fn test_not_started_process_is_hidden_from_members() {
        let viewer = member("ana", &["1"]);
        let generated = summary("100", ProcessStatus::NotStarted, None).process;
        assert!(!viewer.can_view(&generated));
    }

    #[test]
    fn test_department_and_exclude_completed() {
        let cal = BusinessCalendar::default();
        let p1 = summary("1", ProcessStatus::InProgress, Some("2"));
        let p2 = summary("2", ProcessStatus::Completed, Some("2"));
        let p3 = summary("3", ProcessStatus::InProgress, Some("4"));

        let filter = ProcessFilter {
            department: Some(DepartmentId::from("2")),
            exclude_completed: true,
            ..Default::default()
        };

        let kept: Vec<&str> = [&p1, &p2, &p3]
            .into_iter()
            .filter(|s| filter.matches(s, &cal))
            .map(|s| s.process.protocol_number.as_str())
            .collect();
        assert_eq!(kept, vec!["1"]);
    }

    #[test]
    fn test_overdue_is_a_derived_status() {
        let cal = BusinessCalendar::default();
        let mut late = summary("1", ProcessStatus::InProgress, Some("2"));
        late.display_status = DisplayStatus::derive(ProcessStatus::InProgress, true);
        let on_time = summary("2", ProcessStatus::InProgress, Some("2"));

        let overdue = ProcessFilter {
            status: Some(StatusFilter::Overdue),
            ..Default::default()
        };
        assert!(overdue.matches(&late, &cal));
        assert!(!overdue.matches(&on_time, &cal));

        let pending = ProcessFilter {
            status: Some(StatusFilter::InProgress),
            ..Default::default()
        };
        assert!(pending.matches(&on_time, &cal));
        assert!(!pending.matches(&late, &cal));
    }

    #[test]
    fn test_search_is_case_insensitive_substring() {
        let cal = BusinessCalendar::default();
        let s = summary("PROC-0042", ProcessStatus::NotStarted, None);
        let filter = |q: &str| ProcessFilter {
            search: Some(q.to_string()),
            ..Default::default()
        };
        assert!(filter("proc-00").matches(&s, &cal));
        assert!(filter("42").matches(&s, &cal));
        assert!(!filter("43").matches(&s, &cal));
        assert!(filter("   ").matches(&s, &cal));
    }

    #[test]
    fn test_date_range_is_inclusive_of_end_day() {
        let cal = BusinessCalendar::default();
        let mut s = summary("1", ProcessStatus::NotStarted, None);
        s.process.created_at = Utc.with_ymd_and_hms(2024, 3, 5, 23, 59, 0).unwrap();

        let day = |d: u32| NaiveDate::from_ymd_opt(2024, 3, d).unwrap();
        let range = |from: u32, to: u32| ProcessFilter {
            start_date: Some(day(from)),
            end_date: Some(day(to)),
            ..Default::default()
        };

        assert!(range(5, 5).matches(&s, &cal));
        assert!(range(1, 5).matches(&s, &cal));
        assert!(!range(1, 4).matches(&s, &cal));
        assert!(!range(6, 9).matches(&s, &cal));
    }

    #[test]
    fn test_responsible_in_any_department() {
        let cal = BusinessCalendar::default();
        let mut s = summary("1", ProcessStatus::InProgress, Some("3"));
        s.responsibles.insert(DepartmentId::from("1"), UserId::from("ana"));

        let filter = |u: &str| ProcessFilter {
            responsible_user: Some(UserId::from(u)),
            ..Default::default()
        };
        assert!(filter("ana").matches(&s, &cal));
        assert!(!filter("bia").matches(&s, &cal));

        s.process.responsible_user = Some(UserId::from("bia"));
        assert!(filter("bia").matches(&s, &cal));
    }

    #[test]
    fn test_natural_ordering() {
        assert_eq!(natural_cmp("PROC-9", "PROC-10"), Ordering::Less);
        assert_eq!(natural_cmp("100", "99"), Ordering::Greater);
        assert_eq!(natural_cmp("a2b", "a2b"), Ordering::Equal);
        assert_eq!(natural_cmp("proc-1", "PROC-2"), Ordering::Less);
        // Equal numerically, tie broken on the raw text
        assert_eq!(natural_cmp("007", "7"), Ordering::Less);
    }

    #[test]
    fn test_sort_by_status_priority_then_protocol() {
        let mut list = vec![
            summary("PROC-10", ProcessStatus::Completed, Some("9")),
            summary("PROC-10", ProcessStatus::InProgress, Some("2")),
            summary("PROC-9", ProcessStatus::InProgress, Some("2")),
            summary("PROC-1", ProcessStatus::NotStarted, None),
        ];
        sort_summaries(&mut list);

        let order: Vec<(String, ProcessStatus)> = list
            .iter()
            .map(|s| (s.process.protocol_number.clone(), s.process.status))
            .collect();
        assert_eq!(
            order,
            vec![
                ("PROC-9".to_string(), ProcessStatus::InProgress),
                ("PROC-10".to_string(), ProcessStatus::InProgress),
                ("PROC-1".to_string(), ProcessStatus::NotStarted),
                ("PROC-10".to_string(), ProcessStatus::Completed),
            ]
        );
    }
}
