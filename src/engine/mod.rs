// Process tracker engine
// This contains the workflow core, persistence and read side

//! # Engine Module
//!
//! The engine is the layer between the domain models and the outside world
//! (the REST API and the admin CLI).
//!
//! ## Architecture Overview
//!
//! - **Domain Models**: plain data (in `models/`)
//! - **Engine Layer**: transitions, deadlines, responsibility, queries (this module)
//! - **API Layer**: axum handlers over the engine (in `api/`)
//!
//! ## Engine Components
//!
//! ### Workflow Engine (`workflow` module)
//! - Start, advance and return processes along the department chain
//! - Commits each transition as one atomic plan with a version check
//! - Dispatches notifications after commit
//!
//! ### Storage Engine (`storage`, `postgres` modules)
//! - `ProcessStorage` trait with in-memory and PostgreSQL implementations
//!
//! ### Read Side (`query`, `visibility`, `deadline` modules)
//! - Derived display status, filters, ordering, dashboard counts

/// Business-day arithmetic in a fixed UTC offset
pub mod calendar;

/// Expiring key/value cache shared by registry and responsibility lookups
pub mod cache;

/// Overdue evaluation of the current department visit
pub mod deadline;

/// Department, process type and user administration
pub mod directory;

/// Change feed published after committed writes
pub mod events;

/// Outbound notification sink
pub mod notifications;

/// PostgreSQL storage backend
///
/// Contains:
/// - `PostgresStorage` on a sqlx connection pool
/// - Transactional transition commits with optimistic version checks
/// - Status vocabulary adapter for the persisted legacy strings
pub mod postgres;

/// List, detail and dashboard read models
pub mod query;

/// Ordered department chain lookups
pub mod registry;

/// Sector and process-level responsibility
pub mod responsibility;

/// Storage abstraction layer
///
/// Contains:
/// - Storage trait definition
/// - In-memory storage implementation
/// - Transition plans applied all-or-nothing
pub mod storage;

/// Visibility rule, filters and list ordering
pub mod visibility;

/// Workflow transition engine
pub mod workflow;

pub use calendar::BusinessCalendar;
pub use deadline::{DeadlineEvaluator, DeadlineStatus};
pub use events::{ChangeEvent, ChangeKind, EventBus, Table};
pub use notifications::{NotificationSink, StorageNotificationSink};
pub use postgres::PostgresStorage;
pub use query::{DashboardStats, ProcessDetail, ProcessQueryService, ProcessSummary};
pub use registry::DepartmentRegistry;
pub use responsibility::ResponsibilityTracker;
pub use storage::{InMemoryStorage, ProcessStorage, TransitionPlan};
pub use visibility::{DisplayStatus, ProcessFilter, StatusFilter, Viewer};
pub use workflow::{EngineConfig, WorkflowEngine};
