// Responsibility tracking - who answers for a process in each department

//! # Responsibility Tracker
//!
//! Two kinds of responsibility exist side by side:
//! - the **process-level** responsible (`Process::responsible_user`), set when
//!   the process is started and editable afterwards;
//! - the **sector** responsible, one per (process, department) visit, held in
//!   [`ResponsibilityAssignment`] records.
//!
//! At most one user holds a visit. Claiming is atomic in storage, so two users
//! pressing "accept" at the same time cannot both win. Sector lookups go
//! through a TTL cache that every mutating path invalidates.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use super::cache::TtlCache;
use super::events::{ChangeKind, EventBus, Table};
use super::storage::{ClaimOutcome, ProcessStorage};
use crate::models::{DepartmentId, ProcessId, ResponsibilityAssignment, User, UserId};
use crate::{Result, TrackerError};

type SectorKey = (ProcessId, DepartmentId);

pub struct ResponsibilityTracker {
    storage: Arc<dyn ProcessStorage>,
    events: EventBus,
    cache: TtlCache<SectorKey, Option<UserId>>,
}

impl ResponsibilityTracker {
    pub fn new(storage: Arc<dyn ProcessStorage>, events: EventBus, ttl: Duration) -> Self {
        Self {
            storage,
            events,
            cache: TtlCache::new(ttl),
        }
    }

    pub async fn process_responsible(&self, process_id: &ProcessId) -> Result<Option<UserId>> {
        let process = self
            .storage
            .get_process(process_id)
            .await?
            .ok_or_else(|| TrackerError::not_found("Process", process_id))?;
        Ok(process.responsible_user)
    }

    pub async fn sector_responsible(
        &self,
        process_id: &ProcessId,
        department_id: &DepartmentId,
    ) -> Result<Option<UserId>> {
        let key = (*process_id, department_id.clone());
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        let holder = self
            .storage
            .get_assignment(process_id, department_id)
            .await?
            .map(|a| a.user_id);
        self.cache.insert(key, holder.clone());
        Ok(holder)
    }

    /// Gates whether the "accept" action is offered
    pub async fn has_sector_responsible(
        &self,
        process_id: &ProcessId,
        department_id: &DepartmentId,
    ) -> Result<bool> {
        Ok(self
            .sector_responsible(process_id, department_id)
            .await?
            .is_some())
    }

    /// Take responsibility for the process's visit to `department_id`.
    ///
    /// Fails with `AlreadyAssigned` when another user holds the visit. Accepting
    /// a visit one already holds succeeds without changes.
    pub async fn accept(
        &self,
        process_id: &ProcessId,
        department_id: &DepartmentId,
        acting: &User,
    ) -> Result<ResponsibilityAssignment> {
        let process = self
            .storage
            .get_process(process_id)
            .await?
            .ok_or_else(|| TrackerError::not_found("Process", process_id))?;

        if !process.is_in(department_id) {
            return Err(TrackerError::ValidationFailed(format!(
                "process {} is not in department {}",
                process.protocol_number, department_id
            )));
        }

        if !acting.is_admin() && !acting.works_in(department_id) {
            return Err(TrackerError::Forbidden(format!(
                "{} does not work in department {}",
                acting.email, department_id
            )));
        }

        let claim = ResponsibilityAssignment::new(*process_id, department_id.clone(), acting.id.clone());
        let assignment = match self.storage.claim_assignment(claim).await? {
            ClaimOutcome::Claimed(assignment) => assignment,
            ClaimOutcome::HeldBy(holder) => {
                warn!(
                    process = %process.protocol_number,
                    department = %department_id,
                    holder = %holder.user_id,
                    "accept refused, visit already assigned"
                );
                self.cache
                    .insert((*process_id, department_id.clone()), Some(holder.user_id.clone()));
                return Err(TrackerError::AlreadyAssigned {
                    user: holder.user_id.to_string(),
                });
            }
        };

        self.cache.invalidate(&(*process_id, department_id.clone()));

        // The claim is committed; a failure here only leaves notifications pending
        let responded = match self
            .storage
            .mark_notifications_responded(&acting.id, process_id)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                error!(
                    process = %process.protocol_number,
                    user = %acting.id,
                    error = %e,
                    "could not mark notifications responded"
                );
                0
            }
        };

        info!(
            process = %process.protocol_number,
            department = %department_id,
            user = %acting.id,
            responded,
            "process accepted"
        );
        self.events
            .emit(Table::Responsibilities, ChangeKind::Inserted, process_id);
        if responded > 0 {
            self.events
                .emit(Table::Notifications, ChangeKind::Updated, process_id);
        }

        Ok(assignment)
    }

    /// Fill the cache for one process across several departments in one round trip
    pub async fn preload(&self, process_id: &ProcessId, department_ids: &[DepartmentId]) -> Result<()> {
        let assignments = self
            .storage
            .list_assignments_for(std::slice::from_ref(process_id))
            .await?;

        for department in department_ids {
            let holder = assignments
                .iter()
                .find(|a| &a.department_id == department)
                .map(|a| a.user_id.clone());
            self.cache.insert((*process_id, department.clone()), holder);
        }
        Ok(())
    }

    /// Fetch the assignments of many processes in one round trip
    pub async fn batch_load(
        &self,
        process_ids: &[ProcessId],
    ) -> Result<HashMap<SectorKey, UserId>> {
        let assignments = self.storage.list_assignments_for(process_ids).await?;

        let mut loaded = HashMap::with_capacity(assignments.len());
        for assignment in assignments {
            let key = (assignment.process_id, assignment.department_id);
            self.cache.insert(key.clone(), Some(assignment.user_id.clone()));
            loaded.insert(key, assignment.user_id);
        }
        Ok(loaded)
    }

    /// Drop every cached entry for a process; called after each write that touches it
    pub fn invalidate_process(&self, process_id: &ProcessId) {
        self.cache.invalidate_where(|(p, _)| p == process_id);
    }
}
