// Storage abstraction for the process tracker
// This defines the interface for persisting departments, processes and their history

//! # Storage Abstraction Layer
//!
//! The storage layer follows the **Repository Pattern**:
//! - **ProcessStorage trait**: every query and write the engine needs
//! - **InMemoryStorage**: default implementation for development and tests
//! - **PostgresStorage** (see `postgres.rs`): relational backend
//!
//! ## Atomic transitions
//!
//! Moving a process touches four tables: the process row, the history log,
//! responsibility assignments and (after the fact) notifications. The engine
//! packs the first three into one [`TransitionPlan`] and the storage applies it
//! with [`ProcessStorage::commit_transition`] as a single unit. The plan carries
//! the process version it was computed from; if the stored version moved on in
//! the meantime the commit is rejected with `ConcurrentModification`, so two
//! clients advancing the same process can never both succeed.
//!
//! ## Thread Safety
//!
//! The in-memory backend keeps all tables behind one `tokio::sync::RwLock`, so a
//! plan is applied while holding the write guard and no reader can observe half
//! of it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::models::{
    DepartmentId, Department, HistoryEntry, HistoryEntryId, Notification, Process, ProcessId,
    ProcessType, ProcessTypeId, ResponsibilityAssignment, User, UserId,
};
use crate::{Result, TrackerError};

/// Everything one workflow transition writes, applied all-or-nothing
#[derive(Debug, Clone)]
pub struct TransitionPlan {
    /// New process state; its `version` must be `expected_version + 1`
    pub process: Process,
    pub expected_version: i64,
    /// Open entries to close with `closed_at`
    pub close_entries: Vec<HistoryEntryId>,
    pub closed_at: DateTime<Utc>,
    pub open_entry: HistoryEntry,
    /// Departments whose assignment for this process is dropped
    pub clear_assignments: Vec<DepartmentId>,
    /// Assignment created for the entered department
    pub assign: Option<ResponsibilityAssignment>,
}

/// Result of trying to claim a department visit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The claim was stored (or the user already held it)
    Claimed(ResponsibilityAssignment),
    /// Another user holds the visit
    HeldBy(ResponsibilityAssignment),
}

#[async_trait::async_trait]
pub trait ProcessStorage: Send + Sync {
    // Departments

    async fn list_departments(&self) -> Result<Vec<Department>>;

    async fn get_department(&self, id: &DepartmentId) -> Result<Option<Department>>;

    /// Insert or replace
    async fn save_department(&self, department: Department) -> Result<Department>;

    async fn delete_department(&self, id: &DepartmentId) -> Result<bool>;

    /// Exchange the `order` of two departments in one write
    async fn swap_department_order(&self, a: &DepartmentId, b: &DepartmentId) -> Result<()>;

    // Process types

    async fn list_process_types(&self) -> Result<Vec<ProcessType>>;

    async fn get_process_type(&self, id: &ProcessTypeId) -> Result<Option<ProcessType>>;

    async fn save_process_type(&self, process_type: ProcessType) -> Result<ProcessType>;

    // Users

    async fn list_users(&self) -> Result<Vec<User>>;

    async fn get_user(&self, id: &UserId) -> Result<Option<User>>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn save_user(&self, user: User) -> Result<User>;

    async fn delete_user(&self, id: &UserId) -> Result<bool>;

    // Processes

    /// Insert a batch; fails without inserting anything if a protocol number is taken
    async fn create_processes(&self, processes: Vec<Process>) -> Result<Vec<Process>>;

    async fn get_process(&self, id: &ProcessId) -> Result<Option<Process>>;

    async fn list_processes(&self) -> Result<Vec<Process>>;

    /// Replace a process if the stored version equals `process.version - 1`
    async fn update_process(&self, process: Process) -> Result<Process>;

    async fn commit_transition(&self, plan: TransitionPlan) -> Result<()>;

    // History

    async fn list_history(&self, process_id: &ProcessId) -> Result<Vec<HistoryEntry>>;

    async fn list_history_for(&self, process_ids: &[ProcessId]) -> Result<Vec<HistoryEntry>>;

    /// Restart the clock of an open visit
    async fn renew_history_entry(
        &self,
        entry_id: &HistoryEntryId,
        entry_date: DateTime<Utc>,
    ) -> Result<Option<HistoryEntry>>;

    // Responsibility

    async fn get_assignment(
        &self,
        process_id: &ProcessId,
        department_id: &DepartmentId,
    ) -> Result<Option<ResponsibilityAssignment>>;

    async fn list_assignments_for(
        &self,
        process_ids: &[ProcessId],
    ) -> Result<Vec<ResponsibilityAssignment>>;

    /// Store the assignment unless another user already holds the visit.
    /// Also records the user as `responsible_at_sector` on the open entry.
    async fn claim_assignment(&self, assignment: ResponsibilityAssignment) -> Result<ClaimOutcome>;

    // Notifications

    async fn create_notifications(&self, notifications: Vec<Notification>) -> Result<()>;

    async fn list_notifications(&self, user_id: &UserId) -> Result<Vec<Notification>>;

    /// Mark a user's pending notifications for a process as responded; returns the count
    async fn mark_notifications_responded(
        &self,
        user_id: &UserId,
        process_id: &ProcessId,
    ) -> Result<usize>;

    // Cascade delete steps, set-based over many processes

    async fn delete_history_for(&self, process_ids: &[ProcessId]) -> Result<usize>;

    async fn delete_assignments_for(&self, process_ids: &[ProcessId]) -> Result<usize>;

    async fn delete_notifications_for(&self, process_ids: &[ProcessId]) -> Result<usize>;

    async fn delete_process(&self, id: &ProcessId) -> Result<bool>;
}

#[derive(Default)]
struct Tables {
    departments: HashMap<DepartmentId, Department>,
    process_types: HashMap<ProcessTypeId, ProcessType>,
    users: HashMap<UserId, User>,
    processes: HashMap<ProcessId, Process>,
    history: Vec<HistoryEntry>,
    assignments: HashMap<(ProcessId, DepartmentId), ResponsibilityAssignment>,
    notifications: Vec<Notification>,
}

impl Tables {
    fn check_version(&self, process: &Process) -> Result<()> {
        let stored = self
            .processes
            .get(&process.id)
            .ok_or_else(|| TrackerError::not_found("Process", process.id))?;

        if stored.version + 1 != process.version {
            return Err(TrackerError::ConcurrentModification {
                process: process.protocol_number.clone(),
            });
        }
        Ok(())
    }
}

/// In-memory storage implementation for development and testing
///
/// - **Not persistent**: data is lost when the process restarts
/// - **Not distributed**: one server instance only
#[derive(Default)]
pub struct InMemoryStorage {
    tables: RwLock<Tables>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ProcessStorage for InMemoryStorage {
    async fn list_departments(&self) -> Result<Vec<Department>> {
        let tables = self.tables.read().await;
        Ok(tables.departments.values().cloned().collect())
    }

    async fn get_department(&self, id: &DepartmentId) -> Result<Option<Department>> {
        let tables = self.tables.read().await;
        Ok(tables.departments.get(id).cloned())
    }

    async fn save_department(&self, department: Department) -> Result<Department> {
        let mut tables = self.tables.write().await;
        tables
            .departments
            .insert(department.id.clone(), department.clone());
        Ok(department)
    }

    async fn delete_department(&self, id: &DepartmentId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables.departments.remove(id).is_some())
    }

    async fn swap_department_order(&self, a: &DepartmentId, b: &DepartmentId) -> Result<()> {
        let mut tables = self.tables.write().await;
        let order_a = tables
            .departments
            .get(a)
            .map(|d| d.order)
            .ok_or_else(|| TrackerError::not_found("Department", a))?;
        let order_b = tables
            .departments
            .get(b)
            .map(|d| d.order)
            .ok_or_else(|| TrackerError::not_found("Department", b))?;

        if let Some(dept) = tables.departments.get_mut(a) {
            dept.order = order_b;
        }
        if let Some(dept) = tables.departments.get_mut(b) {
            dept.order = order_a;
        }
        Ok(())
    }

    async fn list_process_types(&self) -> Result<Vec<ProcessType>> {
        let tables = self.tables.read().await;
        Ok(tables.process_types.values().cloned().collect())
    }

    async fn get_process_type(&self, id: &ProcessTypeId) -> Result<Option<ProcessType>> {
        let tables = self.tables.read().await;
        Ok(tables.process_types.get(id).cloned())
    }

    async fn save_process_type(&self, process_type: ProcessType) -> Result<ProcessType> {
        let mut tables = self.tables.write().await;
        tables
            .process_types
            .insert(process_type.id.clone(), process_type.clone());
        Ok(process_type)
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().cloned().collect())
    }

    async fn get_user(&self, id: &UserId) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn save_user(&self, user: User) -> Result<User> {
        let mut tables = self.tables.write().await;
        tables.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn delete_user(&self, id: &UserId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables.users.remove(id).is_some())
    }

    async fn create_processes(&self, processes: Vec<Process>) -> Result<Vec<Process>> {
        let mut tables = self.tables.write().await;

        for process in &processes {
            if tables
                .processes
                .values()
                .any(|p| p.protocol_number == process.protocol_number)
            {
                return Err(TrackerError::ValidationFailed(format!(
                    "protocol number {} already exists",
                    process.protocol_number
                )));
            }
        }

        for process in &processes {
            tables.processes.insert(process.id, process.clone());
        }
        Ok(processes)
    }

    async fn get_process(&self, id: &ProcessId) -> Result<Option<Process>> {
        let tables = self.tables.read().await;
        Ok(tables.processes.get(id).cloned())
    }

    async fn list_processes(&self) -> Result<Vec<Process>> {
        let tables = self.tables.read().await;
        Ok(tables.processes.values().cloned().collect())
    }

    async fn update_process(&self, process: Process) -> Result<Process> {
        let mut tables = self.tables.write().await;
        tables.check_version(&process)?;
        tables.processes.insert(process.id, process.clone());
        Ok(process)
    }

    async fn commit_transition(&self, plan: TransitionPlan) -> Result<()> {
        let mut tables = self.tables.write().await;

        if plan.process.version != plan.expected_version + 1 {
            return Err(TrackerError::ValidationFailed(
                "transition plan carries an inconsistent version".to_string(),
            ));
        }
        tables.check_version(&plan.process)?;

        let process_id = plan.process.id;
        for entry in tables.history.iter_mut() {
            if entry.process_id == process_id
                && entry.is_open()
                && plan.close_entries.contains(&entry.id)
            {
                entry.exit_date = Some(plan.closed_at);
            }
        }

        let mut open_entry = plan.open_entry;
        if let Some(assignment) = &plan.assign {
            open_entry.responsible_at_sector = Some(assignment.user_id.clone());
        }
        tables.history.push(open_entry);

        for department in &plan.clear_assignments {
            tables.assignments.remove(&(process_id, department.clone()));
        }
        if let Some(assignment) = plan.assign {
            tables.assignments.insert(
                (process_id, assignment.department_id.clone()),
                assignment,
            );
        }

        tables.processes.insert(process_id, plan.process);
        Ok(())
    }

    async fn list_history(&self, process_id: &ProcessId) -> Result<Vec<HistoryEntry>> {
        let tables = self.tables.read().await;
        let mut entries: Vec<HistoryEntry> = tables
            .history
            .iter()
            .filter(|e| &e.process_id == process_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.entry_date.cmp(&b.entry_date));
        Ok(entries)
    }

    async fn list_history_for(&self, process_ids: &[ProcessId]) -> Result<Vec<HistoryEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .history
            .iter()
            .filter(|e| process_ids.contains(&e.process_id))
            .cloned()
            .collect())
    }

    async fn renew_history_entry(
        &self,
        entry_id: &HistoryEntryId,
        entry_date: DateTime<Utc>,
    ) -> Result<Option<HistoryEntry>> {
        let mut tables = self.tables.write().await;
        let entry = tables
            .history
            .iter_mut()
            .find(|e| &e.id == entry_id && e.is_open());

        Ok(entry.map(|e| {
            e.entry_date = entry_date;
            e.clone()
        }))
    }

    async fn get_assignment(
        &self,
        process_id: &ProcessId,
        department_id: &DepartmentId,
    ) -> Result<Option<ResponsibilityAssignment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .assignments
            .get(&(*process_id, department_id.clone()))
            .cloned())
    }

    async fn list_assignments_for(
        &self,
        process_ids: &[ProcessId],
    ) -> Result<Vec<ResponsibilityAssignment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .assignments
            .values()
            .filter(|a| process_ids.contains(&a.process_id))
            .cloned()
            .collect())
    }

    async fn claim_assignment(&self, assignment: ResponsibilityAssignment) -> Result<ClaimOutcome> {
        let mut tables = self.tables.write().await;
        let key = (assignment.process_id, assignment.department_id.clone());

        if let Some(existing) = tables.assignments.get(&key) {
            if existing.user_id != assignment.user_id {
                return Ok(ClaimOutcome::HeldBy(existing.clone()));
            }
            return Ok(ClaimOutcome::Claimed(existing.clone()));
        }

        if let Some(entry) = tables
            .history
            .iter_mut()
            .filter(|e| {
                e.process_id == assignment.process_id
                    && e.department_id == assignment.department_id
                    && e.is_open()
            })
            .max_by(|a, b| a.entry_date.cmp(&b.entry_date))
        {
            entry.responsible_at_sector = Some(assignment.user_id.clone());
        }

        tables.assignments.insert(key, assignment.clone());
        Ok(ClaimOutcome::Claimed(assignment))
    }

    async fn create_notifications(&self, notifications: Vec<Notification>) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.notifications.extend(notifications);
        Ok(())
    }

    async fn list_notifications(&self, user_id: &UserId) -> Result<Vec<Notification>> {
        let tables = self.tables.read().await;
        let mut notifications: Vec<Notification> = tables
            .notifications
            .iter()
            .filter(|n| &n.user_id == user_id)
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }

    async fn mark_notifications_responded(
        &self,
        user_id: &UserId,
        process_id: &ProcessId,
    ) -> Result<usize> {
        let mut tables = self.tables.write().await;
        let mut count = 0;
        for notification in tables.notifications.iter_mut() {
            if &notification.user_id == user_id
                && &notification.process_id == process_id
                && !notification.responded
            {
                notification.responded = true;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete_history_for(&self, process_ids: &[ProcessId]) -> Result<usize> {
        let mut tables = self.tables.write().await;
        let before = tables.history.len();
        tables.history.retain(|e| !process_ids.contains(&e.process_id));
        Ok(before - tables.history.len())
    }

    async fn delete_assignments_for(&self, process_ids: &[ProcessId]) -> Result<usize> {
        let mut tables = self.tables.write().await;
        let before = tables.assignments.len();
        tables
            .assignments
            .retain(|(process_id, _), _| !process_ids.contains(process_id));
        Ok(before - tables.assignments.len())
    }

    async fn delete_notifications_for(&self, process_ids: &[ProcessId]) -> Result<usize> {
        let mut tables = self.tables.write().await;
        let before = tables.notifications.len();
        tables
            .notifications
            .retain(|n| !process_ids.contains(&n.process_id));
        Ok(before - tables.notifications.len())
    }

    async fn delete_process(&self, id: &ProcessId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables.processes.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_for(process: &Process, dept: &str, close: Vec<HistoryEntryId>) -> TransitionPlan {
        let now = Utc::now();
        let mut next = process.next_revision(now);
        next.current_department = Some(DepartmentId::from(dept));
        TransitionPlan {
            expected_version: process.version,
            open_entry: HistoryEntry::open(process.id, DepartmentId::from(dept), now, None),
            process: next,
            close_entries: close,
            closed_at: now,
            clear_assignments: vec![],
            assign: None,
        }
    }

    #[tokio::test]
    async fn test_create_processes_rejects_duplicate_protocols() {
        let storage = InMemoryStorage::new();
        storage
            .create_processes(vec![Process::new("100", None)])
            .await
            .unwrap();

        let result = storage
            .create_processes(vec![Process::new("101", None), Process::new("100", None)])
            .await;
        assert!(matches!(result, Err(TrackerError::ValidationFailed(_))));
        assert_eq!(storage.list_processes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_plan_is_rejected() {
        let storage = InMemoryStorage::new();
        let process = Process::new("100", None);
        storage.create_processes(vec![process.clone()]).await.unwrap();

        let first = plan_for(&process, "1", vec![]);
        let second = plan_for(&process, "2", vec![]);

        storage.commit_transition(first).await.unwrap();
        let result = storage.commit_transition(second).await;
        assert!(matches!(result, Err(TrackerError::ConcurrentModification { .. })));

        let history = storage.list_history(&process.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].department_id.as_str(), "1");
    }

    #[tokio::test]
    async fn test_commit_closes_listed_entries_and_records_assignment() {
        let storage = InMemoryStorage::new();
        let process = Process::new("100", None);
        storage.create_processes(vec![process.clone()]).await.unwrap();

        let first = plan_for(&process, "1", vec![]);
        let first_entry = first.open_entry.id;
        let started = first.process.clone();
        storage.commit_transition(first).await.unwrap();

        let mut second = plan_for(&started, "2", vec![first_entry]);
        second.assign = Some(ResponsibilityAssignment::new(
            process.id,
            DepartmentId::from("2"),
            UserId::from("ana"),
        ));
        storage.commit_transition(second).await.unwrap();

        let history = storage.list_history(&process.id).await.unwrap();
        assert_eq!(history.iter().filter(|e| e.is_open()).count(), 1);
        let open = history.iter().find(|e| e.is_open()).unwrap();
        assert_eq!(open.department_id.as_str(), "2");
        assert_eq!(open.responsible_at_sector, Some(UserId::from("ana")));

        let stored = storage.get_process(&process.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_claim_assignment_is_exclusive() {
        let storage = InMemoryStorage::new();
        let process = ProcessId::new();
        let dept = DepartmentId::from("1");

        let ana = ResponsibilityAssignment::new(process, dept.clone(), UserId::from("ana"));
        let bia = ResponsibilityAssignment::new(process, dept.clone(), UserId::from("bia"));

        assert!(matches!(
            storage.claim_assignment(ana.clone()).await.unwrap(),
            ClaimOutcome::Claimed(_)
        ));
        match storage.claim_assignment(bia).await.unwrap() {
            ClaimOutcome::HeldBy(holder) => assert_eq!(holder.user_id, UserId::from("ana")),
            other => panic!("expected HeldBy, got {:?}", other),
        }
        assert!(matches!(
            storage.claim_assignment(ana).await.unwrap(),
            ClaimOutcome::Claimed(_)
        ));
    }

    #[tokio::test]
    async fn test_swap_department_order() {
        let storage = InMemoryStorage::new();
        storage.save_department(Department::new("1", "A", 1)).await.unwrap();
        storage.save_department(Department::new("2", "B", 2)).await.unwrap();

        storage
            .swap_department_order(&"1".into(), &"2".into())
            .await
            .unwrap();

        assert_eq!(storage.get_department(&"1".into()).await.unwrap().unwrap().order, 2);
        assert_eq!(storage.get_department(&"2".into()).await.unwrap().unwrap().order, 1);
        assert!(storage
            .swap_department_order(&"1".into(), &"9".into())
            .await
            .is_err());
    }
}
