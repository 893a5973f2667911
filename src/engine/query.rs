// Read side - list, detail and dashboard views over processes

//! # Query Service
//!
//! Builds [`ProcessSummary`] rows for list views. All histories and
//! assignments of the listed processes are fetched in one batch each, so a
//! list costs a fixed number of storage round trips regardless of its length.
//! The derived display status (including overdue) is computed here, at read
//! time, and never written back.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::deadline::DeadlineStatus;
use super::registry::DepartmentRegistry;
use super::visibility::{sort_summaries, DisplayStatus, ProcessFilter, Viewer};
use super::workflow::WorkflowEngine;
use crate::models::{DepartmentId, HistoryEntry, Process, ProcessId, UserId};
use crate::{Result, TrackerError};

/// One row of a process list
#[derive(Debug, Clone, Serialize)]
pub struct ProcessSummary {
    pub process: Process,
    pub department_name: Option<String>,
    pub display_status: DisplayStatus,
    pub deadline: Option<DeadlineStatus>,
    /// Holder of the current department visit
    pub sector_responsible: Option<UserId>,
    /// Sector responsibles per department, past visits included
    pub responsibles: BTreeMap<DepartmentId, UserId>,
}

impl ProcessSummary {
    pub fn is_overdue(&self) -> bool {
        self.display_status == DisplayStatus::Overdue
    }

    /// Responsible at process level or in any department visit
    pub fn is_responsible(&self, user: &UserId) -> bool {
        self.process.responsible_user.as_ref() == Some(user)
            || self.sector_responsible.as_ref() == Some(user)
            || self.responsibles.values().any(|u| u == user)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessDetail {
    #[serde(flatten)]
    pub summary: ProcessSummary,
    /// Visits ascending by entry date
    pub history: Vec<HistoryEntry>,
    pub next_department: Option<String>,
    pub previous_department: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepartmentLoad {
    pub department_id: DepartmentId,
    pub name: String,
    pub active: usize,
    pub overdue: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total: usize,
    pub not_started: usize,
    pub in_progress: usize,
    pub overdue: usize,
    pub completed: usize,
    pub by_department: Vec<DepartmentLoad>,
}

pub struct ProcessQueryService<'a> {
    engine: &'a WorkflowEngine,
}

impl<'a> ProcessQueryService<'a> {
    pub fn new(engine: &'a WorkflowEngine) -> Self {
        Self { engine }
    }

    /// Visible processes matching `filter`, in list order
    pub async fn list(&self, viewer: &Viewer, filter: &ProcessFilter) -> Result<Vec<ProcessSummary>> {
        self.list_at(viewer, filter, Utc::now()).await
    }

    pub async fn list_at(
        &self,
        viewer: &Viewer,
        filter: &ProcessFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProcessSummary>> {
        let visible: Vec<Process> = self
            .engine
            .storage
            .list_processes()
            .await?
            .into_iter()
            .filter(|p| viewer.can_view(p))
            .collect();

        let calendar = self.engine.calendar();
        let mut summaries: Vec<ProcessSummary> = self
            .summarize(visible, now)
            .await?
            .into_iter()
            .filter(|s| filter.matches(s, calendar))
            .collect();

        sort_summaries(&mut summaries);
        Ok(summaries)
    }

    pub async fn detail(&self, viewer: &Viewer, process_id: &ProcessId) -> Result<ProcessDetail> {
        let process = self.engine.get_process(process_id).await?;
        if !viewer.can_view(&process) {
            return Err(TrackerError::Forbidden(format!(
                "process {} is not visible to {}",
                process.protocol_number, viewer.user_id
            )));
        }

        let registry = self.engine.departments().await?;
        let (next_department, previous_department) = match &process.current_department {
            Some(current) if process.is_started() => (
                registry.next(current).map(|d| d.name.clone()),
                registry.previous(current).map(|d| d.name.clone()),
            ),
            _ => (None, None),
        };

        let mut summaries = self.summarize(vec![process], Utc::now()).await?;
        let summary = summaries
            .pop()
            .ok_or_else(|| TrackerError::not_found("Process", process_id))?;
        let history = self.engine.storage.list_history(process_id).await?;

        Ok(ProcessDetail {
            summary,
            history,
            next_department,
            previous_department,
        })
    }

    /// Counts over the processes `viewer` can see
    pub async fn dashboard(&self, viewer: &Viewer) -> Result<DashboardStats> {
        let summaries = self.list(viewer, &ProcessFilter::default()).await?;
        let registry = self.engine.departments().await?;
        Ok(tally(&summaries, &registry))
    }

    /// Summaries for an already loaded set of processes, in input order
    pub async fn summarize(&self, processes: Vec<Process>, now: DateTime<Utc>) -> Result<Vec<ProcessSummary>> {
        if processes.is_empty() {
            return Ok(Vec::new());
        }

        let registry = self.engine.departments().await?;
        let ids: Vec<ProcessId> = processes.iter().map(|p| p.id).collect();

        let mut histories: HashMap<ProcessId, Vec<HistoryEntry>> = HashMap::new();
        for entry in self.engine.storage.list_history_for(&ids).await? {
            histories.entry(entry.process_id).or_default().push(entry);
        }
        let assignments = self.engine.responsibility().batch_load(&ids).await?;
        let evaluator = self.engine.deadlines();

        let summaries = processes
            .into_iter()
            .map(|process| {
                let mut history = histories.remove(&process.id).unwrap_or_default();
                history.sort_by(|a, b| a.entry_date.cmp(&b.entry_date));

                let department = process
                    .current_department
                    .as_ref()
                    .and_then(|id| registry.get(id));
                let deadline = evaluator.evaluate(
                    &history,
                    process.current_department.as_ref(),
                    department.and_then(|d| d.time_limit),
                    now,
                );
                let overdue = deadline.as_ref().map_or(false, |d| d.overdue);

                let mut responsibles = BTreeMap::new();
                for entry in &history {
                    if let Some(user) = &entry.responsible_at_sector {
                        responsibles.insert(entry.department_id.clone(), user.clone());
                    }
                }
                for ((pid, dept), user) in &assignments {
                    if pid == &process.id {
                        responsibles.insert(dept.clone(), user.clone());
                    }
                }

                let sector_responsible = process
                    .current_department
                    .as_ref()
                    .and_then(|dept| assignments.get(&(process.id, dept.clone())))
                    .cloned();

                ProcessSummary {
                    department_name: department.map(|d| d.name.clone()),
                    display_status: DisplayStatus::derive(process.status, overdue),
                    deadline,
                    sector_responsible,
                    responsibles,
                    process,
                }
            })
            .collect();

        Ok(summaries)
    }
}

fn tally(summaries: &[ProcessSummary], registry: &DepartmentRegistry) -> DashboardStats {
    let mut stats = DashboardStats {
        total: summaries.len(),
        by_department: registry
            .list_ordered()
            .iter()
            .map(|d| DepartmentLoad {
                department_id: d.id.clone(),
                name: d.name.clone(),
                active: 0,
                overdue: 0,
            })
            .collect(),
        ..Default::default()
    };

    for summary in summaries {
        match summary.display_status {
            DisplayStatus::NotStarted => stats.not_started += 1,
            DisplayStatus::InProgress => stats.in_progress += 1,
            DisplayStatus::Overdue => stats.overdue += 1,
            DisplayStatus::Completed => stats.completed += 1,
        }

        if let Some(current) = &summary.process.current_department {
            if let Some(load) = stats
                .by_department
                .iter_mut()
                .find(|l| &l.department_id == current)
            {
                load.active += 1;
                if summary.is_overdue() {
                    load.overdue += 1;
                }
            }
        }
    }

    stats
}

impl WorkflowEngine {
    pub fn query(&self) -> ProcessQueryService<'_> {
        ProcessQueryService::new(self)
    }
}
