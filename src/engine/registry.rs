// Department registry - ordered lookups over the workflow chain

//! # Department Registry
//!
//! The workflow is a simple linear chain: departments sorted by `order`.
//! The registry answers the questions the transition engine asks:
//! which department comes first, which comes after or before the current
//! one, and which one is terminal.
//!
//! Lookups never fail. An empty registry or an unknown department id yields
//! `None`, which callers treat as "no valid transition".

use crate::models::{Department, DepartmentId};
use crate::{Result, TrackerError};

#[derive(Debug, Clone, Default)]
pub struct DepartmentRegistry {
    // Sorted ascending by order
    departments: Vec<Department>,
}

impl DepartmentRegistry {
    pub fn new(mut departments: Vec<Department>) -> Self {
        departments.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        DepartmentRegistry { departments }
    }

    /// All departments ascending by order
    pub fn list_ordered(&self) -> &[Department] {
        &self.departments
    }

    /// Working departments: everything except the terminal one
    pub fn list_ordered_excluding_terminal(&self) -> Vec<&Department> {
        self.departments.iter().filter(|d| !d.is_terminal).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.departments.is_empty()
    }

    pub fn get(&self, id: &DepartmentId) -> Option<&Department> {
        self.departments.iter().find(|d| &d.id == id)
    }

    pub fn first(&self) -> Option<&Department> {
        self.departments.first()
    }

    pub fn terminal(&self) -> Option<&Department> {
        self.departments.iter().find(|d| d.is_terminal)
    }

    /// Department with the smallest order strictly greater than the current one
    pub fn next(&self, current: &DepartmentId) -> Option<&Department> {
        let current = self.get(current)?;
        if current.is_terminal {
            return None;
        }
        self.departments.iter().find(|d| d.order > current.order)
    }

    /// Department with the largest order strictly smaller than the current one
    pub fn previous(&self, current: &DepartmentId) -> Option<&Department> {
        let current = self.get(current)?;
        self.departments
            .iter()
            .rev()
            .find(|d| d.order < current.order)
    }

    pub fn is_first(&self, id: &DepartmentId) -> bool {
        self.first().map_or(false, |d| &d.id == id)
    }

    pub fn is_terminal(&self, id: &DepartmentId) -> bool {
        self.get(id).map_or(false, |d| d.is_terminal)
    }

    /// Check the chain can run a workflow: non-empty, unique orders,
    /// exactly one terminal department and it comes last
    pub fn validate(&self) -> Result<()> {
        if self.departments.is_empty() {
            return Err(TrackerError::ValidationFailed(
                "no departments are configured".to_string(),
            ));
        }

        for pair in self.departments.windows(2) {
            if pair[0].order == pair[1].order {
                return Err(TrackerError::ValidationFailed(format!(
                    "departments '{}' and '{}' share order {}",
                    pair[0].name, pair[1].name, pair[0].order
                )));
            }
        }

        match self.departments.iter().filter(|d| d.is_terminal).count() {
            1 => self.check_terminal_last(),
            0 => Err(TrackerError::ValidationFailed(
                "no terminal department is configured".to_string(),
            )),
            n => Err(TrackerError::ValidationFailed(format!(
                "{} departments are marked terminal, expected exactly one",
                n
            ))),
        }
    }

    /// A terminal department must hold the highest order; chains without
    /// one pass this check
    pub fn check_terminal_last(&self) -> Result<()> {
        let last = match self.departments.last() {
            Some(last) => last,
            None => return Ok(()),
        };
        match self
            .departments
            .iter()
            .find(|d| d.is_terminal && d.order < last.order)
        {
            Some(terminal) => Err(TrackerError::ValidationFailed(format!(
                "terminal department '{}' must come after '{}'",
                terminal.name, last.name
            ))),
            None => Ok(()),
        }
    }

    /// The neighbour to swap orders with when moving `id` up (towards the start)
    pub fn swap_target_up(&self, id: &DepartmentId) -> Option<&Department> {
        self.previous(id)
    }

    /// The neighbour to swap orders with when moving `id` down (towards the end)
    pub fn swap_target_down(&self, id: &DepartmentId) -> Option<&Department> {
        let current = self.get(id)?;
        self.departments.iter().find(|d| d.order > current.order)
    }
}
