// Users, roles, responsibility assignments and notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{DepartmentId, NotificationId, ProcessId, UserId};

/// Single authoritative role of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    #[default]
    Member,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Member => write!(f, "member"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "member" | "user" => Ok(Role::Member),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub role: Role,
    /// Departments this user works in
    #[serde(default)]
    pub departments: Vec<DepartmentId>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl User {
    pub fn new<I: Into<UserId>, E: Into<String>, N: Into<String>>(id: I, email: E, name: N) -> Self {
        User {
            id: id.into(),
            email: email.into(),
            name: name.into(),
            role: Role::Member,
            departments: Vec::new(),
            active: true,
        }
    }

    pub fn admin(mut self) -> Self {
        self.role = Role::Admin;
        self
    }

    pub fn in_departments<I: IntoIterator<Item = D>, D: Into<DepartmentId>>(mut self, ids: I) -> Self {
        self.departments = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn works_in(&self, department: &DepartmentId) -> bool {
        self.departments.contains(department)
    }
}

/// The user answering for a process while it sits in one department
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsibilityAssignment {
    pub process_id: ProcessId,
    pub department_id: DepartmentId,
    pub user_id: UserId,
    pub assigned_at: DateTime<Utc>,
}

impl ResponsibilityAssignment {
    pub fn new(process_id: ProcessId, department_id: DepartmentId, user_id: UserId) -> Self {
        ResponsibilityAssignment {
            process_id,
            department_id,
            user_id,
            assigned_at: Utc::now(),
        }
    }
}

/// Message left for a user about a process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub process_id: ProcessId,
    pub message: String,
    pub created_at: DateTime<Utc>,
    /// Set once the user acted on it (accepted the process)
    pub responded: bool,
}

impl Notification {
    pub fn new<M: Into<String>>(user_id: UserId, process_id: ProcessId, message: M) -> Self {
        Notification {
            id: NotificationId::new(),
            user_id,
            process_id,
            message: message.into(),
            created_at: Utc::now(),
            responded: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("user".parse::<Role>().unwrap(), Role::Member);
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn test_user_department_membership() {
        let user = User::new("u1", "ana@cartorio.test", "Ana").in_departments(["3"]);
        assert!(user.works_in(&DepartmentId::from("3")));
        assert!(!user.works_in(&DepartmentId::from("5")));
        assert!(!user.is_admin());
        assert!(user.clone().admin().is_admin());
    }
}
