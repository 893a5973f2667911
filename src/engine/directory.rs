// Administration of departments, process types and users

//! Reference-data writes. Department writes invalidate the cached registry so
//! the next transition sees the new chain; every write publishes a change event.

use std::sync::Arc;

use tracing::info;

use super::calendar::MAX_BUSINESS_DAYS;
use super::events::{ChangeKind, Table};
use super::registry::DepartmentRegistry;
use super::workflow::WorkflowEngine;
use crate::models::{Department, DepartmentId, ProcessType, ProcessTypeId, Role, User, UserId};
use crate::{Result, TrackerError};

/// Chain used when an empty store is seeded
pub fn default_departments() -> Vec<Department> {
    vec![
        Department::new("1", "Protocolo", 1).with_time_limit(1),
        Department::new("2", "Análise", 2).with_time_limit(5),
        Department::new("3", "Registro", 3).with_time_limit(5),
        Department::new("4", "Conferência", 4).with_time_limit(2),
        Department::new("5", "Entrega", 5).with_time_limit(3),
        Department::new("6", "Concluído", 6).terminal(),
    ]
}

impl WorkflowEngine {
    pub async fn create_department(&self, department: Department) -> Result<Department> {
        validate_department(&department)?;
        if self.storage.get_department(&department.id).await?.is_some() {
            return Err(TrackerError::ValidationFailed(format!(
                "department {} already exists",
                department.id
            )));
        }

        let registry = self.departments().await?;
        check_chain_conflicts(&registry, &department)?;

        let saved = self.storage.save_department(department).await?;
        self.department_changed(&saved.id, ChangeKind::Inserted);
        info!(department = %saved.id, name = %saved.name, order = saved.order, "department created");
        Ok(saved)
    }

    pub async fn update_department(&self, department: Department) -> Result<Department> {
        validate_department(&department)?;
        self.storage
            .get_department(&department.id)
            .await?
            .ok_or_else(|| TrackerError::not_found("Department", &department.id))?;

        let registry = self.departments().await?;
        check_chain_conflicts(&registry, &department)?;

        let saved = self.storage.save_department(department).await?;
        self.department_changed(&saved.id, ChangeKind::Updated);
        Ok(saved)
    }

    /// Refused while any process sits in the department
    pub async fn delete_department(&self, id: &DepartmentId) -> Result<()> {
        let occupied = self
            .storage
            .list_processes()
            .await?
            .iter()
            .filter(|p| p.is_in(id))
            .count();
        if occupied > 0 {
            return Err(TrackerError::ValidationFailed(format!(
                "department {} still holds {} process(es)",
                id, occupied
            )));
        }

        if !self.storage.delete_department(id).await? {
            return Err(TrackerError::not_found("Department", id));
        }
        self.department_changed(id, ChangeKind::Deleted);
        info!(department = %id, "department deleted");
        Ok(())
    }

    /// Swap order with the preceding department
    pub async fn move_department_up(&self, id: &DepartmentId) -> Result<Arc<DepartmentRegistry>> {
        let registry = self.departments().await?;
        let current = registry
            .get(id)
            .ok_or_else(|| TrackerError::not_found("Department", id))?;
        let target = registry.swap_target_up(id).ok_or_else(|| {
            TrackerError::ValidationFailed(format!("department {} is already first", current.name))
        })?;
        if current.is_terminal || target.is_terminal {
            return Err(TrackerError::ValidationFailed(
                "the terminal department stays last".to_string(),
            ));
        }

        self.storage.swap_department_order(id, &target.id).await?;
        self.department_changed(id, ChangeKind::Updated);
        self.departments().await
    }

    /// Swap order with the following department
    pub async fn move_department_down(&self, id: &DepartmentId) -> Result<Arc<DepartmentRegistry>> {
        let registry = self.departments().await?;
        let current = registry
            .get(id)
            .ok_or_else(|| TrackerError::not_found("Department", id))?;
        let target = registry.swap_target_down(id).ok_or_else(|| {
            TrackerError::ValidationFailed(format!("department {} is already last", current.name))
        })?;
        if current.is_terminal || target.is_terminal {
            return Err(TrackerError::ValidationFailed(
                "the terminal department stays last".to_string(),
            ));
        }

        self.storage.swap_department_order(id, &target.id).await?;
        self.department_changed(id, ChangeKind::Updated);
        self.departments().await
    }

    /// Seed [`default_departments`] into an empty store; returns whether it did
    pub async fn seed_default_departments(&self) -> Result<bool> {
        if !self.storage.list_departments().await?.is_empty() {
            return Ok(false);
        }
        for department in default_departments() {
            self.storage.save_department(department).await?;
        }
        self.invalidate_departments();
        self.events.emit(Table::Departments, ChangeKind::Inserted, "seed");
        info!("seeded default departments");
        Ok(true)
    }

    fn department_changed(&self, id: &DepartmentId, kind: ChangeKind) {
        self.invalidate_departments();
        self.events.emit(Table::Departments, kind, id);
    }

    /// Process types by name; inactive ones only when asked for
    pub async fn list_process_types(&self, include_inactive: bool) -> Result<Vec<ProcessType>> {
        let mut types: Vec<ProcessType> = self
            .storage
            .list_process_types()
            .await?
            .into_iter()
            .filter(|t| include_inactive || t.active)
            .collect();
        types.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(types)
    }

    pub async fn create_process_type(&self, process_type: ProcessType) -> Result<ProcessType> {
        if process_type.id.as_str().trim().is_empty() || process_type.name.trim().is_empty() {
            return Err(TrackerError::ValidationFailed(
                "process type needs an id and a name".to_string(),
            ));
        }
        if self.storage.get_process_type(&process_type.id).await?.is_some() {
            return Err(TrackerError::ValidationFailed(format!(
                "process type {} already exists",
                process_type.id
            )));
        }

        let saved = self.storage.save_process_type(process_type).await?;
        self.events.emit(Table::ProcessTypes, ChangeKind::Inserted, &saved.id);
        Ok(saved)
    }

    pub async fn update_process_type(&self, process_type: ProcessType) -> Result<ProcessType> {
        if process_type.name.trim().is_empty() {
            return Err(TrackerError::ValidationFailed(
                "process type needs a name".to_string(),
            ));
        }
        self.storage
            .get_process_type(&process_type.id)
            .await?
            .ok_or_else(|| TrackerError::not_found("Process type", &process_type.id))?;

        let saved = self.storage.save_process_type(process_type).await?;
        self.events.emit(Table::ProcessTypes, ChangeKind::Updated, &saved.id);
        Ok(saved)
    }

    /// Soft delete; processes keep their type
    pub async fn deactivate_process_type(&self, id: &ProcessTypeId) -> Result<ProcessType> {
        let mut process_type = self
            .storage
            .get_process_type(id)
            .await?
            .ok_or_else(|| TrackerError::not_found("Process type", id))?;
        process_type.active = false;

        let saved = self.storage.save_process_type(process_type).await?;
        self.events.emit(Table::ProcessTypes, ChangeKind::Updated, id);
        info!(process_type = %id, "process type deactivated");
        Ok(saved)
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let mut users = self.storage.list_users().await?;
        users.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(users)
    }

    pub async fn get_user(&self, id: &UserId) -> Result<User> {
        self.storage
            .get_user(id)
            .await?
            .ok_or_else(|| TrackerError::not_found("User", id))
    }

    pub async fn create_user(&self, user: User) -> Result<User> {
        self.validate_user(&user).await?;
        if self.storage.get_user(&user.id).await?.is_some() {
            return Err(TrackerError::ValidationFailed(format!(
                "user {} already exists",
                user.id
            )));
        }

        let saved = self.storage.save_user(user).await?;
        self.events.emit(Table::Users, ChangeKind::Inserted, &saved.id);
        info!(user = %saved.id, role = %saved.role, "user created");
        Ok(saved)
    }

    pub async fn update_user(&self, user: User) -> Result<User> {
        self.get_user(&user.id).await?;
        self.validate_user(&user).await?;

        let saved = self.storage.save_user(user).await?;
        self.events.emit(Table::Users, ChangeKind::Updated, &saved.id);
        Ok(saved)
    }

    pub async fn delete_user(&self, id: &UserId) -> Result<()> {
        if !self.storage.delete_user(id).await? {
            return Err(TrackerError::not_found("User", id));
        }
        self.events.emit(Table::Users, ChangeKind::Deleted, id);
        info!(user = %id, "user deleted");
        Ok(())
    }

    /// Make sure the configured administrator exists and holds the admin role
    pub async fn ensure_admin(&self, email: &str, name: &str) -> Result<User> {
        match self.storage.get_user_by_email(email).await? {
            Some(user) if user.is_admin() => Ok(user),
            Some(mut user) => {
                user.role = Role::Admin;
                let saved = self.storage.save_user(user).await?;
                info!(email, "existing user promoted to admin");
                Ok(saved)
            }
            None => {
                let admin = User::new(email, email, name).admin();
                let saved = self.storage.save_user(admin).await?;
                self.events.emit(Table::Users, ChangeKind::Inserted, &saved.id);
                info!(email, "bootstrap admin created");
                Ok(saved)
            }
        }
    }

    async fn validate_user(&self, user: &User) -> Result<()> {
        if user.id.as_str().trim().is_empty() || !user.email.contains('@') {
            return Err(TrackerError::ValidationFailed(
                "user needs an id and a valid email".to_string(),
            ));
        }
        if let Some(other) = self.storage.get_user_by_email(&user.email).await? {
            if other.id != user.id {
                return Err(TrackerError::ValidationFailed(format!(
                    "email {} is already in use",
                    user.email
                )));
            }
        }

        let registry = self.departments().await?;
        if let Some(unknown) = user.departments.iter().find(|d| registry.get(d).is_none()) {
            return Err(TrackerError::not_found("Department", unknown));
        }
        Ok(())
    }
}

fn validate_department(department: &Department) -> Result<()> {
    if department.id.as_str().trim().is_empty() || department.name.trim().is_empty() {
        return Err(TrackerError::ValidationFailed(
            "department needs an id and a name".to_string(),
        ));
    }
    if let Some(days) = department.time_limit.filter(|days| *days > MAX_BUSINESS_DAYS) {
        return Err(TrackerError::ValidationFailed(format!(
            "time limit of {} business days exceeds the maximum of {}",
            days, MAX_BUSINESS_DAYS
        )));
    }
    Ok(())
}

// Orders stay unique, at most one department is terminal and it stays last
fn check_chain_conflicts(registry: &DepartmentRegistry, department: &Department) -> Result<()> {
    for other in registry.list_ordered().iter().filter(|d| d.id != department.id) {
        if other.order == department.order {
            return Err(TrackerError::ValidationFailed(format!(
                "order {} is already used by '{}'",
                department.order, other.name
            )));
        }
        if department.is_terminal && other.is_terminal {
            return Err(TrackerError::ValidationFailed(format!(
                "'{}' is already the terminal department",
                other.name
            )));
        }
    }

    let mut chain: Vec<Department> = registry
        .list_ordered()
        .iter()
        .filter(|d| d.id != department.id)
        .cloned()
        .collect();
    chain.push(department.clone());
    DepartmentRegistry::new(chain).check_terminal_last()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::storage::{InMemoryStorage, ProcessStorage};
    use crate::engine::workflow::EngineConfig;

    fn engine() -> WorkflowEngine {
        let storage: Arc<dyn ProcessStorage> = Arc::new(InMemoryStorage::new());
        WorkflowEngine::new(storage, EngineConfig::default())
    }

    #[tokio::test]
    async fn test_seed_only_into_empty_store() {
        let engine = engine();
        assert!(engine.seed_default_departments().await.unwrap());
        assert!(!engine.seed_default_departments().await.unwrap());

        let registry = engine.departments().await.unwrap();
        assert!(registry.validate().is_ok());
        assert_eq!(registry.list_ordered().len(), 6);
    }

    #[tokio::test]
    async fn test_create_department_checks_order_and_terminal() {
        let engine = engine();
        engine.seed_default_departments().await.unwrap();

        assert!(matches!(
            engine.create_department(Department::new("7", "Arquivo", 3)).await,
            Err(TrackerError::ValidationFailed(_))
        ));
        assert!(matches!(
            engine
                .create_department(Department::new("7", "Arquivo", 7).terminal())
                .await,
            Err(TrackerError::ValidationFailed(_))
        ));

        // Nothing may follow the terminal department
        assert!(matches!(
            engine.create_department(Department::new("7", "Arquivo", 7)).await,
            Err(TrackerError::ValidationFailed(_))
        ));

        engine
            .create_department(Department::new("7", "Digitalização", 0))
            .await
            .unwrap();
        let registry = engine.departments().await.unwrap();
        assert_eq!(registry.list_ordered().len(), 7);
        assert_eq!(registry.first().unwrap().id.as_str(), "7");
        assert!(registry.validate().is_ok());
    }

    #[tokio::test]
    async fn test_update_cannot_move_terminal_before_working_departments() {
        let engine = engine();
        engine.seed_default_departments().await.unwrap();

        let result = engine
            .update_department(Department::new("6", "Concluído", 0).terminal())
            .await;
        assert!(matches!(result, Err(TrackerError::ValidationFailed(_))));

        // A working department cannot be pushed past the terminal either
        let result = engine
            .update_department(Department::new("2", "Análise", 9).with_time_limit(5))
            .await;
        assert!(matches!(result, Err(TrackerError::ValidationFailed(_))));

        let registry = engine.departments().await.unwrap();
        assert!(registry.validate().is_ok());
        assert!(registry.is_terminal(&registry.list_ordered()[5].id));

        engine
            .update_department(Department::new("6", "Arquivado", 60).terminal())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_time_limit_is_bounded() {
        let engine = engine();
        engine.seed_default_departments().await.unwrap();

        let result = engine
            .update_department(Department::new("1", "Protocolo", 1).with_time_limit(u32::MAX))
            .await;
        assert!(matches!(result, Err(TrackerError::ValidationFailed(_))));

        engine
            .update_department(
                Department::new("1", "Protocolo", 1).with_time_limit(MAX_BUSINESS_DAYS),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_move_up_and_down_swap_neighbours() {
        let engine = engine();
        engine.seed_default_departments().await.unwrap();

        let registry = engine.move_department_up(&"3".into()).await.unwrap();
        let ids: Vec<&str> = registry.list_ordered().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3", "2", "4", "5", "6"]);

        let registry = engine.move_department_down(&"3".into()).await.unwrap();
        let ids: Vec<&str> = registry.list_ordered().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4", "5", "6"]);

        assert!(engine.move_department_up(&"1".into()).await.is_err());
        assert!(engine.move_department_down(&"5".into()).await.is_err());
        assert!(engine.move_department_up(&"6".into()).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_department_refused_while_occupied() {
        let engine = engine();
        engine.seed_default_departments().await.unwrap();
        engine
            .create_process_type(ProcessType::new("escritura", "Escritura"))
            .await
            .unwrap();
        let admin = engine.ensure_admin("root@cartorio.test", "Root").await.unwrap();
        let created = engine.generate(1, 1, Some("escritura".into())).await.unwrap();
        engine.start(&created[0].id, &admin).await.unwrap();

        assert!(matches!(
            engine.delete_department(&"1".into()).await,
            Err(TrackerError::ValidationFailed(_))
        ));
        engine.delete_department(&"2".into()).await.unwrap();
        assert!(matches!(
            engine.delete_department(&"2".into()).await,
            Err(TrackerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_deactivated_type_is_hidden_and_unusable() {
        let engine = engine();
        engine
            .create_process_type(ProcessType::new("escritura", "Escritura"))
            .await
            .unwrap();
        engine.deactivate_process_type(&"escritura".into()).await.unwrap();

        assert!(engine.list_process_types(false).await.unwrap().is_empty());
        assert_eq!(engine.list_process_types(true).await.unwrap().len(), 1);
        assert!(matches!(
            engine.generate(1, 1, Some("escritura".into())).await,
            Err(TrackerError::ValidationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_user_email_is_unique() {
        let engine = engine();
        engine.seed_default_departments().await.unwrap();
        engine
            .create_user(User::new("ana", "ana@cartorio.test", "Ana").in_departments(["1"]))
            .await
            .unwrap();

        assert!(matches!(
            engine
                .create_user(User::new("ana2", "ANA@cartorio.test", "Ana 2"))
                .await,
            Err(TrackerError::ValidationFailed(_))
        ));
        assert!(matches!(
            engine
                .create_user(User::new("bia", "bia@cartorio.test", "Bia").in_departments(["99"]))
                .await,
            Err(TrackerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_ensure_admin_promotes_existing_user() {
        let engine = engine();
        engine
            .create_user(User::new("ana", "ana@cartorio.test", "Ana"))
            .await
            .unwrap();

        let admin = engine.ensure_admin("ana@cartorio.test", "Ana").await.unwrap();
        assert_eq!(admin.id, UserId::from("ana"));
        assert!(admin.is_admin());

        let created = engine.ensure_admin("root@cartorio.test", "Root").await.unwrap();
        assert!(created.is_admin());
        assert_eq!(engine.list_users().await.unwrap().len(), 2);
    }
}
