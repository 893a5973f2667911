// Department definitions - the stages of the workflow

//! # Department Model
//!
//! A department ("setor") is one stage in the linear workflow. Departments are
//! ordered by `order`; a process always moves to the neighbour with the next
//! larger or next smaller order. Exactly one department is the terminal stage,
//! and reaching it completes the process.

use serde::{Deserialize, Serialize};

use super::ids::DepartmentId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,

    /// Display name
    pub name: String,

    /// Position in the workflow chain; unique, gaps tolerated
    pub order: i32,

    /// Business days a process may stay here; `None` or `Some(0)` means no deadline
    #[serde(default)]
    pub time_limit: Option<u32>,

    /// Reaching this department completes the process
    #[serde(default)]
    pub is_terminal: bool,
}

impl Department {
    pub fn new<I: Into<DepartmentId>, N: Into<String>>(id: I, name: N, order: i32) -> Self {
        Department {
            id: id.into(),
            name: name.into(),
            order,
            time_limit: None,
            is_terminal: false,
        }
    }

    pub fn with_time_limit(mut self, days: u32) -> Self {
        self.time_limit = Some(days);
        self
    }

    pub fn terminal(mut self) -> Self {
        self.is_terminal = true;
        self
    }

    /// The deadline in business days, if this department has one
    pub fn deadline_days(&self) -> Option<u32> {
        self.time_limit.filter(|days| *days > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_limit_means_no_deadline() {
        let dept = Department::new("1", "Protocolo", 1).with_time_limit(0);
        assert_eq!(dept.deadline_days(), None);

        let dept = Department::new("2", "Registro", 2).with_time_limit(5);
        assert_eq!(dept.deadline_days(), Some(5));

        assert_eq!(Department::new("3", "Arquivo", 3).deadline_days(), None);
    }
}
