// Process Tracker - department workflow engine
// Tracks processes as they move through an ordered chain of departments

//! # Process Tracker Library
//!
//! This is the library crate behind the process tracking server. A **process**
//! (identified by a protocol number) moves through an ordered sequence of
//! **departments**. Every visit to a department is logged as a history entry,
//! every department may carry a business-day deadline, and users take
//! responsibility for a process while it sits in their department.
//!
//! ## Core Components
//!
//! ### Domain Models
//! - [`Department`]: A stage in the workflow, with order and day limit
//! - [`Process`]: The tracked unit of work
//! - [`HistoryEntry`]: One visit of a process to a department
//! - [`ResponsibilityAssignment`]: Who answers for a process in a department
//!
//! ### Engine
//! - [`WorkflowEngine`]: start / advance / return / delete, committed atomically
//! - [`DepartmentRegistry`]: ordered department lookups (next, previous, first, terminal)
//! - [`DeadlineEvaluator`]: business-day deadlines and overdue detection
//! - [`ResponsibilityTracker`]: sector responsibility with a read-through cache
//! - [`ProcessQueryService`]: visibility, filtering and sorting for list views
//!
//! ### Storage
//! - [`ProcessStorage`]: the persistence trait
//! - [`InMemoryStorage`]: default backend for development and tests
//! - [`PostgresStorage`]: PostgreSQL backend
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use process_tracker::{InMemoryStorage, WorkflowEngine, EngineConfig};
//!
//! # async fn demo() -> process_tracker::Result<()> {
//! let storage = Arc::new(InMemoryStorage::default());
//! let engine = WorkflowEngine::new(storage, EngineConfig::default());
//! let departments = engine.departments().await?;
//! println!("{} departments configured", departments.list_ordered().len());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod engine;
pub mod models;

// Re-export commonly used types
pub use models::{
    Department, DepartmentId, HistoryEntry, HistoryEntryId, Notification, Process, ProcessId,
    ProcessStatus, ProcessType, ProcessTypeId, ResponsibilityAssignment, Role, User, UserId,
};

pub use engine::{
    calendar::BusinessCalendar,
    deadline::{DeadlineEvaluator, DeadlineStatus},
    events::{ChangeEvent, ChangeKind, EventBus, Table},
    notifications::{NotificationSink, StorageNotificationSink},
    postgres::PostgresStorage,
    query::{DashboardStats, ProcessDetail, ProcessQueryService, ProcessSummary},
    registry::DepartmentRegistry,
    responsibility::ResponsibilityTracker,
    storage::{InMemoryStorage, ProcessStorage},
    visibility::{DisplayStatus, ProcessFilter, StatusFilter, Viewer},
    workflow::{EngineConfig, WorkflowEngine},
};

pub use api::{ApiServer, ApiServerBuilder, ApiServerConfig};

use thiserror::Error;

/// Error type for every engine, storage and API operation
///
/// ## Rust Learning Notes:
///
/// ### The `thiserror` Crate
/// - `#[derive(Error)]` implements `std::error::Error`
/// - `#[error("...")]` provides the `Display` message
/// - `#[from]` generates `From` conversions so `?` works across error types
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Input rejected before any state was mutated
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// The process already sits in the last department of the chain
    #[error("No next department: the process is already at the end of the workflow")]
    NoNextDepartment,

    /// The process sits in the first department of the chain
    #[error("No previous department: the process is already in the first department")]
    NoPreviousDepartment,

    /// Somebody else already answers for this process in this department
    #[error("Process is already assigned to {user}")]
    AlreadyAssigned { user: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Another writer changed the process between read and commit
    #[error("Process {process} was modified concurrently, reload and retry")]
    ConcurrentModification { process: String },

    /// A cascade delete stopped part way; the process record is left in place
    #[error("Cascade delete failed while removing {stage}: {source}")]
    CascadeDelete {
        stage: &'static str,
        #[source]
        source: Box<TrackerError>,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),
}

impl TrackerError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        TrackerError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Expected workflow boundaries that are reported as warnings, not failures
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            TrackerError::NoNextDepartment
                | TrackerError::NoPreviousDepartment
                | TrackerError::AlreadyAssigned { .. }
        )
    }
}

/// Type alias for Results that use our error type
pub type Result<T> = std::result::Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_errors_are_warnings() {
        assert!(TrackerError::NoNextDepartment.is_warning());
        assert!(TrackerError::NoPreviousDepartment.is_warning());
        assert!(TrackerError::AlreadyAssigned {
            user: "ana@cartorio.test".into()
        }
        .is_warning());
        assert!(!TrackerError::ValidationFailed("missing type".into()).is_warning());
        assert!(!TrackerError::not_found("Process", "42").is_warning());
    }

    #[test]
    fn test_not_found_message() {
        let err = TrackerError::not_found("Department", "7");
        assert_eq!(err.to_string(), "Department not found: 7");
    }
}
