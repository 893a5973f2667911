// Core domain models for the process tracker
// Plain data: no storage or engine logic lives here

//! # Domain Models Module
//!
//! The records the engine reads and writes:
//! - [`Department`]: ordered workflow stage
//! - [`ProcessType`]: classification label
//! - [`Process`]: tracked unit of work
//! - [`HistoryEntry`]: one department visit
//! - [`ResponsibilityAssignment`]: sector responsibility
//! - [`User`] and [`Notification`]

pub mod department;
pub mod history;
pub mod ids;
pub mod process;
pub mod user;

pub use department::Department;
pub use history::{current_open_entry, open_entries, HistoryEntry};
pub use ids::{DepartmentId, HistoryEntryId, NotificationId, ProcessId, ProcessTypeId, UserId};
pub use process::{Process, ProcessStatus, ProcessType};
pub use user::{Notification, ResponsibilityAssignment, Role, User};
