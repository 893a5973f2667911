// History entries - the visit log of a process

//! # History Entries
//!
//! Each [`HistoryEntry`] records one visit of a process to a department: when
//! it entered, when it left (`None` while the visit is open), who moved it and
//! who answered for it there. Entries are only ever appended or closed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{DepartmentId, HistoryEntryId, ProcessId, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: HistoryEntryId,
    pub process_id: ProcessId,
    pub department_id: DepartmentId,
    pub entry_date: DateTime<Utc>,
    pub exit_date: Option<DateTime<Utc>>,
    /// Acting user, for audit
    pub user_id: Option<UserId>,
    /// User accountable for the process during this visit
    #[serde(default)]
    pub responsible_at_sector: Option<UserId>,
}

impl HistoryEntry {
    /// Open a new visit
    pub fn open(
        process_id: ProcessId,
        department_id: DepartmentId,
        entry_date: DateTime<Utc>,
        user_id: Option<UserId>,
    ) -> Self {
        HistoryEntry {
            id: HistoryEntryId::new(),
            process_id,
            department_id,
            entry_date,
            exit_date: None,
            user_id,
            responsible_at_sector: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.exit_date.is_none()
    }
}

/// The open visit for `department` with the latest entry date.
///
/// Two open entries for the same department are a data anomaly left behind by
/// interrupted transitions; the latest one wins, ties broken by id so the pick
/// is deterministic.
pub fn current_open_entry<'a>(
    history: &'a [HistoryEntry],
    department: &DepartmentId,
) -> Option<&'a HistoryEntry> {
    history
        .iter()
        .filter(|entry| entry.is_open() && &entry.department_id == department)
        .max_by(|a, b| a.entry_date.cmp(&b.entry_date).then_with(|| a.id.cmp(&b.id)))
}

/// All open visits of a process, regardless of department
pub fn open_entries(history: &[HistoryEntry]) -> impl Iterator<Item = &HistoryEntry> {
    history.iter().filter(|entry| entry.is_open())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn entry(dept: &str, entered: DateTime<Utc>, exited: Option<DateTime<Utc>>) -> HistoryEntry {
        let mut e = HistoryEntry::open(ProcessId::new(), DepartmentId::from(dept), entered, None);
        e.exit_date = exited;
        e
    }

    #[test]
    fn test_current_open_entry_ignores_closed_and_other_departments() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let history = vec![
            entry("1", t0, Some(t0 + Duration::days(1))),
            entry("2", t0 + Duration::days(1), None),
            entry("1", t0 + Duration::days(2), Some(t0 + Duration::days(3))),
        ];

        let open = current_open_entry(&history, &DepartmentId::from("2")).unwrap();
        assert_eq!(open.entry_date, t0 + Duration::days(1));
        assert!(current_open_entry(&history, &DepartmentId::from("1")).is_none());
        assert_eq!(open_entries(&history).count(), 1);
    }

    #[test]
    fn test_current_open_entry_picks_latest_of_duplicates() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        let older = entry("2", t0, None);
        let newer = entry("2", t0 + Duration::hours(3), None);
        let history = vec![newer.clone(), older.clone()];

        let picked = current_open_entry(&history, &DepartmentId::from("2")).unwrap();
        assert_eq!(picked.id, newer.id);

        let reversed = vec![older, newer.clone()];
        let picked = current_open_entry(&reversed, &DepartmentId::from("2")).unwrap();
        assert_eq!(picked.id, newer.id);
    }
}
