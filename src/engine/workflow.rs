// Workflow transition engine - moves processes along the department chain

//! # Workflow Engine
//!
//! State machine per process:
//!
//! ```text
//! NotStarted --start--> [d1] --advance--> [d2] --advance--> ... --> [terminal] (Completed)
//!                         ^                 |
//!                         +-----return------+
//! ```
//!
//! Every transition is computed from one snapshot of the process and its
//! history and committed as a single [`TransitionPlan`]. The plan closes every
//! open visit, opens the visit for the entered department and resets the
//! responsibility assignments involved. Storage rejects the plan if the process
//! changed since the snapshot, so concurrent transitions on the same process
//! are serialized: one wins, the other gets `ConcurrentModification` and
//! nothing is half-applied.
//!
//! Notifications go out only after the commit succeeded.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use super::cache::TtlCache;
use super::calendar::BusinessCalendar;
use super::deadline::DeadlineEvaluator;
use super::events::{ChangeKind, EventBus, Table};
use super::notifications::{NotificationSink, StorageNotificationSink};
use super::registry::DepartmentRegistry;
use super::responsibility::ResponsibilityTracker;
use super::storage::{ProcessStorage, TransitionPlan};
use crate::models::{
    open_entries, Department, HistoryEntry, HistoryEntryId, Process, ProcessId, ProcessStatus,
    ProcessTypeId, ResponsibilityAssignment, User, UserId,
};
use crate::{Result, TrackerError};

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub calendar: BusinessCalendar,
    /// Lifetime of cached registry and responsibility lookups
    pub cache_ttl: Duration,
    /// Upper bound for one bulk generation
    pub max_generate: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            calendar: BusinessCalendar::default(),
            cache_ttl: Duration::from_secs(60),
            max_generate: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Back,
}

pub struct WorkflowEngine {
    pub(crate) storage: Arc<dyn ProcessStorage>,
    pub(crate) config: EngineConfig,
    pub(crate) events: EventBus,
    pub(crate) registry_cache: TtlCache<(), Arc<DepartmentRegistry>>,
    notifier: Arc<dyn NotificationSink>,
    responsibility: Arc<ResponsibilityTracker>,
}

impl WorkflowEngine {
    pub fn new(storage: Arc<dyn ProcessStorage>, config: EngineConfig) -> Self {
        let events = EventBus::default();
        let notifier = Arc::new(StorageNotificationSink::new(storage.clone(), events.clone()));
        let responsibility = Arc::new(ResponsibilityTracker::new(
            storage.clone(),
            events.clone(),
            config.cache_ttl,
        ));

        Self {
            registry_cache: TtlCache::new(config.cache_ttl),
            storage,
            config,
            events,
            notifier,
            responsibility,
        }
    }

    /// Replace the default storage-backed notification sink
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn storage(&self) -> &Arc<dyn ProcessStorage> {
        &self.storage
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn responsibility(&self) -> &Arc<ResponsibilityTracker> {
        &self.responsibility
    }

    pub fn calendar(&self) -> &BusinessCalendar {
        &self.config.calendar
    }

    pub fn deadlines(&self) -> DeadlineEvaluator {
        DeadlineEvaluator::new(self.config.calendar)
    }

    /// The department chain, cached until a department write invalidates it
    pub async fn departments(&self) -> Result<Arc<DepartmentRegistry>> {
        if let Some(registry) = self.registry_cache.get(&()) {
            return Ok(registry);
        }
        let registry = Arc::new(DepartmentRegistry::new(self.storage.list_departments().await?));
        self.registry_cache.insert((), registry.clone());
        Ok(registry)
    }

    pub(crate) fn invalidate_departments(&self) {
        self.registry_cache.invalidate(&());
    }

    pub async fn get_process(&self, process_id: &ProcessId) -> Result<Process> {
        self.storage
            .get_process(process_id)
            .await?
            .ok_or_else(|| TrackerError::not_found("Process", process_id))
    }

    /// Create `count` not-started processes numbered `start, start+1, ...`
    pub async fn generate(
        &self,
        start: u64,
        count: u32,
        process_type: Option<ProcessTypeId>,
    ) -> Result<Vec<Process>> {
        if count == 0 {
            return Err(TrackerError::ValidationFailed(
                "at least one process must be generated".to_string(),
            ));
        }
        if count > self.config.max_generate {
            return Err(TrackerError::ValidationFailed(format!(
                "at most {} processes can be generated at once",
                self.config.max_generate
            )));
        }
        let end = start.checked_add(u64::from(count)).ok_or_else(|| {
            TrackerError::ValidationFailed("protocol range overflows".to_string())
        })?;

        if let Some(type_id) = &process_type {
            self.require_active_type(type_id).await?;
        }

        let processes: Vec<Process> = (start..end)
            .map(|number| Process::new(number.to_string(), process_type.clone()))
            .collect();

        let created = self.storage.create_processes(processes).await.map_err(|e| {
            warn!(start, count, error = %e, "process generation failed");
            e
        })?;

        info!(start, count, "generated processes");
        for process in &created {
            self.events.emit(Table::Processes, ChangeKind::Inserted, process.id);
        }
        Ok(created)
    }

    /// Put a process into the first department and make `actor` responsible
    pub async fn start(&self, process_id: &ProcessId, actor: &User) -> Result<Process> {
        let result = self.start_inner(process_id, actor).await;
        log_outcome("start", process_id, &result);
        result
    }

    async fn start_inner(&self, process_id: &ProcessId, actor: &User) -> Result<Process> {
        let process = self.get_process(process_id).await?;
        if process.is_started() {
            return Err(TrackerError::ValidationFailed(format!(
                "process {} has already been started",
                process.protocol_number
            )));
        }
        if process.process_type.is_none() {
            return Err(TrackerError::ValidationFailed(format!(
                "process {} needs a process type before it can be started",
                process.protocol_number
            )));
        }

        let registry = self.departments().await?;
        registry.validate()?;
        let first = registry
            .first()
            .ok_or_else(|| TrackerError::ValidationFailed("no departments are configured".to_string()))?;

        let history = self.storage.list_history(process_id).await?;
        let now = Utc::now();

        let mut next = process.next_revision(now);
        next.current_department = Some(first.id.clone());
        next.status = status_in(first);
        next.start_date = Some(now);
        next.expected_end_date = first
            .deadline_days()
            .and_then(|days| self.config.calendar.add_business_days(now, days));
        next.responsible_user = Some(actor.id.clone());

        let plan = TransitionPlan {
            expected_version: process.version,
            close_entries: open_entries(&history).map(|e| e.id).collect(),
            closed_at: now,
            open_entry: HistoryEntry::open(process.id, first.id.clone(), now, Some(actor.id.clone())),
            clear_assignments: vec![first.id.clone()],
            assign: Some(ResponsibilityAssignment {
                process_id: process.id,
                department_id: first.id.clone(),
                user_id: actor.id.clone(),
                assigned_at: now,
            }),
            process: next.clone(),
        };

        self.commit(plan).await?;
        self.events
            .emit(Table::Responsibilities, ChangeKind::Inserted, process.id);

        info!(
            process = %next.protocol_number,
            department = %first.name,
            user = %actor.id,
            "process started"
        );
        Ok(next)
    }

    /// Move a process to the next department
    pub async fn advance(&self, process_id: &ProcessId, actor: &User) -> Result<Process> {
        let result = self.transition(process_id, actor, Direction::Forward).await;
        log_outcome("advance", process_id, &result);
        result
    }

    /// Send a process back to the previous department
    pub async fn return_to_previous(&self, process_id: &ProcessId, actor: &User) -> Result<Process> {
        let result = self.transition(process_id, actor, Direction::Back).await;
        log_outcome("return", process_id, &result);
        result
    }

    async fn transition(
        &self,
        process_id: &ProcessId,
        actor: &User,
        direction: Direction,
    ) -> Result<Process> {
        let process = self.get_process(process_id).await?;
        let current = match (&process.current_department, process.is_started()) {
            (Some(current), true) => current.clone(),
            _ => {
                return Err(TrackerError::ValidationFailed(format!(
                    "process {} has not been started",
                    process.protocol_number
                )))
            }
        };

        let registry = self.departments().await?;
        let target = match direction {
            Direction::Forward => registry.next(&current).ok_or(TrackerError::NoNextDepartment)?,
            Direction::Back => registry
                .previous(&current)
                .ok_or(TrackerError::NoPreviousDepartment)?,
        };

        let history = self.storage.list_history(process_id).await?;
        let now = Utc::now();

        let mut next = process.next_revision(now);
        next.current_department = Some(target.id.clone());
        next.status = status_in(target);

        let plan = TransitionPlan {
            expected_version: process.version,
            close_entries: open_entries(&history).map(|e| e.id).collect(),
            closed_at: now,
            open_entry: HistoryEntry::open(process.id, target.id.clone(), now, Some(actor.id.clone())),
            // The vacated visit's assignment goes, and so does any stale one
            // left on the entered department from an earlier visit
            clear_assignments: vec![current.clone(), target.id.clone()],
            assign: None,
            process: next.clone(),
        };

        self.commit(plan).await?;
        self.events
            .emit(Table::Responsibilities, ChangeKind::Deleted, process.id);

        let verb = match direction {
            Direction::Forward => "forwarded to",
            Direction::Back => "returned to",
        };
        info!(
            process = %next.protocol_number,
            from = %current,
            to = %target.name,
            user = %actor.id,
            "process {}", verb
        );

        let message = format!("Process {} was {} {}", next.protocol_number, verb, target.name);
        self.notify_department(target, &next, &message).await;

        Ok(next)
    }

    /// Restart the deadline clock of the current visit
    pub async fn renew_deadline(
        &self,
        process_id: &ProcessId,
        entry_id: &HistoryEntryId,
        actor: &User,
    ) -> Result<HistoryEntry> {
        let result = self.renew_deadline_inner(process_id, entry_id, actor).await;
        log_outcome("renew_deadline", process_id, &result);
        result
    }

    async fn renew_deadline_inner(
        &self,
        process_id: &ProcessId,
        entry_id: &HistoryEntryId,
        actor: &User,
    ) -> Result<HistoryEntry> {
        let process = self.get_process(process_id).await?;
        let history = self.storage.list_history(process_id).await?;

        let entry = history
            .iter()
            .find(|e| &e.id == entry_id)
            .ok_or_else(|| TrackerError::not_found("History entry", entry_id))?;

        if !entry.is_open() || !process.is_in(&entry.department_id) {
            return Err(TrackerError::ValidationFailed(
                "only the open visit of the current department can be renewed".to_string(),
            ));
        }

        let renewed = self
            .storage
            .renew_history_entry(entry_id, Utc::now())
            .await?
            .ok_or_else(|| TrackerError::not_found("History entry", entry_id))?;

        info!(
            process = %process.protocol_number,
            entry = %entry_id,
            user = %actor.id,
            "deadline renewed"
        );
        self.events.emit(Table::History, ChangeKind::Updated, entry_id);
        Ok(renewed)
    }

    /// Take responsibility for the process in its current department
    pub async fn accept(&self, process_id: &ProcessId, actor: &User) -> Result<ResponsibilityAssignment> {
        let process = self.get_process(process_id).await?;
        let department = process.current_department.ok_or_else(|| {
            TrackerError::ValidationFailed("a process that was not started cannot be accepted".to_string())
        })?;
        let result = self.responsibility.accept(process_id, &department, actor).await;
        log_outcome("accept", process_id, &result);
        result
    }

    /// Assign or replace the process type; not allowed once completed
    pub async fn set_process_type(&self, process_id: &ProcessId, type_id: &ProcessTypeId) -> Result<Process> {
        self.require_active_type(type_id).await?;
        let process = self.get_process(process_id).await?;
        if process.is_completed() {
            return Err(TrackerError::ValidationFailed(format!(
                "process {} is completed",
                process.protocol_number
            )));
        }

        let mut next = process.next_revision(Utc::now());
        next.process_type = Some(type_id.clone());
        let updated = self.storage.update_process(next).await?;
        self.events.emit(Table::Processes, ChangeKind::Updated, updated.id);
        Ok(updated)
    }

    /// Set or clear the process-level responsible
    pub async fn set_responsible(&self, process_id: &ProcessId, user: Option<&UserId>) -> Result<Process> {
        if let Some(user_id) = user {
            self.storage
                .get_user(user_id)
                .await?
                .ok_or_else(|| TrackerError::not_found("User", user_id))?;
        }

        let process = self.get_process(process_id).await?;
        let mut next = process.next_revision(Utc::now());
        next.responsible_user = user.cloned();
        let updated = self.storage.update_process(next).await?;
        self.events.emit(Table::Processes, ChangeKind::Updated, updated.id);
        Ok(updated)
    }

    /// Delete a process with its history, assignments and notifications.
    ///
    /// Children go first; if any step fails the process record is left in
    /// place so no history is orphaned, and the call can simply be retried.
    pub async fn delete(&self, process_id: &ProcessId) -> Result<()> {
        let result = self.delete_inner(process_id).await;
        log_outcome("delete", process_id, &result);
        result
    }

    async fn delete_inner(&self, process_id: &ProcessId) -> Result<()> {
        self.get_process(process_id).await?;
        let ids = std::slice::from_ref(process_id);

        self.delete_children(ids).await?;
        self.storage
            .delete_process(process_id)
            .await
            .map_err(|e| cascade("process", e))?;

        self.responsibility.invalidate_process(process_id);
        self.events.emit(Table::Processes, ChangeKind::Deleted, process_id);
        info!(process = %process_id, "process deleted");
        Ok(())
    }

    /// Delete many processes; child rows are removed in one set-based pass.
    /// Returns how many process records were removed.
    pub async fn delete_many(&self, process_ids: &[ProcessId]) -> Result<usize> {
        if process_ids.is_empty() {
            return Ok(0);
        }

        self.delete_children(process_ids).await.map_err(|e| {
            error!(count = process_ids.len(), error = %e, "bulk delete failed");
            e
        })?;

        let mut removed = 0;
        for process_id in process_ids {
            let deleted = self
                .storage
                .delete_process(process_id)
                .await
                .map_err(|e| cascade("process", e))?;
            if deleted {
                removed += 1;
                self.responsibility.invalidate_process(process_id);
                self.events.emit(Table::Processes, ChangeKind::Deleted, process_id);
            }
        }

        info!(requested = process_ids.len(), removed, "processes deleted");
        Ok(removed)
    }

    async fn delete_children(&self, process_ids: &[ProcessId]) -> Result<()> {
        self.storage
            .delete_history_for(process_ids)
            .await
            .map_err(|e| cascade("history", e))?;
        self.storage
            .delete_assignments_for(process_ids)
            .await
            .map_err(|e| cascade("responsibility assignments", e))?;
        self.storage
            .delete_notifications_for(process_ids)
            .await
            .map_err(|e| cascade("notifications", e))?;
        Ok(())
    }

    pub(crate) async fn require_active_type(&self, type_id: &ProcessTypeId) -> Result<()> {
        let process_type = self
            .storage
            .get_process_type(type_id)
            .await?
            .ok_or_else(|| TrackerError::not_found("Process type", type_id))?;
        if !process_type.active {
            return Err(TrackerError::ValidationFailed(format!(
                "process type '{}' is inactive",
                process_type.name
            )));
        }
        Ok(())
    }

    async fn commit(&self, plan: TransitionPlan) -> Result<()> {
        let process_id = plan.process.id;
        self.storage.commit_transition(plan).await?;
        self.responsibility.invalidate_process(&process_id);
        self.events.emit(Table::History, ChangeKind::Inserted, process_id);
        self.events.emit(Table::Processes, ChangeKind::Updated, process_id);
        Ok(())
    }

    // Runs after the commit; failures are logged, never returned
    async fn notify_department(&self, department: &Department, process: &Process, message: &str) {
        let recipients: Vec<UserId> = match self.storage.list_users().await {
            Ok(users) => users
                .into_iter()
                .filter(|u| u.active && u.works_in(&department.id))
                .map(|u| u.id)
                .collect(),
            Err(e) => {
                error!(process = %process.protocol_number, error = %e, "could not load notification recipients");
                return;
            }
        };

        if let Err(e) = self.notifier.notify(&recipients, process.id, message).await {
            error!(
                process = %process.protocol_number,
                department = %department.id,
                error = %e,
                "notification dispatch failed"
            );
        }
    }
}

fn status_in(department: &Department) -> ProcessStatus {
    if department.is_terminal {
        ProcessStatus::Completed
    } else {
        ProcessStatus::InProgress
    }
}

fn cascade(stage: &'static str, source: TrackerError) -> TrackerError {
    TrackerError::CascadeDelete {
        stage,
        source: Box::new(source),
    }
}

fn log_outcome<T>(operation: &str, process_id: &ProcessId, result: &Result<T>) {
    if let Err(e) = result {
        if e.is_warning() {
            warn!(operation, process = %process_id, "{}", e);
        } else {
            error!(operation, process = %process_id, error = %e, "operation failed");
        }
    }
}
