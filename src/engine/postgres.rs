// PostgreSQL storage backend
// Implements ProcessStorage on a sqlx connection pool

//! # PostgreSQL Storage
//!
//! Tables keep the column names of the deployed schema (`numero_protocolo`,
//! `data_entrada`, `data_saida`, `setor_id`, ...); see `migrations/`.
//!
//! ## Transitions
//!
//! [`ProcessStorage::commit_transition`] runs in one transaction. The process
//! row is updated with `WHERE version = expected`; zero affected rows means
//! another writer got there first, the transaction is rolled back and the
//! caller receives `ConcurrentModification`.
//!
//! ## Status vocabulary
//!
//! Status is persisted with the legacy Portuguese labels. Reads also accept
//! the English names and the old persisted "overdue" label, which maps to
//! in-progress since overdue is derived, never stored.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use super::storage::{ClaimOutcome, ProcessStorage, TransitionPlan};
use crate::models::{
    Department, DepartmentId, HistoryEntry, HistoryEntryId, Notification, NotificationId, Process,
    ProcessId, ProcessStatus, ProcessType, ProcessTypeId, ResponsibilityAssignment, User, UserId,
};
use crate::{Result, TrackerError};

const NOT_STARTED: &str = "Não iniciado";
const IN_PROGRESS: &str = "Em andamento";
const COMPLETED: &str = "Concluído";

pub fn status_to_db(status: ProcessStatus) -> &'static str {
    match status {
        ProcessStatus::NotStarted => NOT_STARTED,
        ProcessStatus::InProgress => IN_PROGRESS,
        ProcessStatus::Completed => COMPLETED,
    }
}

pub fn status_from_db(value: &str) -> Result<ProcessStatus> {
    let normalized = value.trim().to_lowercase();
    match normalized.as_str() {
        "não iniciado" | "nao iniciado" | "not_started" | "not started" => {
            Ok(ProcessStatus::NotStarted)
        }
        "em andamento" | "in_progress" | "pending" | "overdue" | "atrasado" => {
            Ok(ProcessStatus::InProgress)
        }
        "concluído" | "concluido" | "completed" => Ok(ProcessStatus::Completed),
        _ => Err(TrackerError::ValidationFailed(format!(
            "unknown process status '{}'",
            value
        ))),
    }
}

#[derive(Debug, FromRow)]
struct DepartmentRow {
    id: String,
    nome: String,
    ordem: i32,
    prazo_dias: Option<i32>,
    is_final: bool,
}

impl From<DepartmentRow> for Department {
    fn from(row: DepartmentRow) -> Self {
        Department {
            id: DepartmentId(row.id),
            name: row.nome,
            order: row.ordem,
            time_limit: row.prazo_dias.and_then(|d| u32::try_from(d).ok()),
            is_terminal: row.is_final,
        }
    }
}

#[derive(Debug, FromRow)]
struct ProcessTypeRow {
    id: String,
    nome: String,
    ativo: bool,
    descricao: Option<String>,
}

impl From<ProcessTypeRow> for ProcessType {
    fn from(row: ProcessTypeRow) -> Self {
        ProcessType {
            id: ProcessTypeId(row.id),
            name: row.nome,
            active: row.ativo,
            description: row.descricao,
        }
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: String,
    email: String,
    nome: String,
    papel: String,
    setores: Vec<String>,
    ativo: bool,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: UserId(row.id),
            email: row.email,
            name: row.nome,
            role: row.papel.parse().unwrap_or_default(),
            departments: row.setores.into_iter().map(DepartmentId).collect(),
            active: row.ativo,
        }
    }
}

#[derive(Debug, FromRow)]
struct ProcessRow {
    id: Uuid,
    numero_protocolo: String,
    tipo_processo_id: Option<String>,
    setor_atual: Option<String>,
    status: String,
    data_inicio: Option<DateTime<Utc>>,
    data_fim_prevista: Option<DateTime<Utc>>,
    usuario_responsavel: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<ProcessRow> for Process {
    type Error = TrackerError;

    fn try_from(row: ProcessRow) -> Result<Self> {
        Ok(Process {
            id: ProcessId(row.id),
            protocol_number: row.numero_protocolo,
            process_type: row.tipo_processo_id.map(ProcessTypeId),
            current_department: row.setor_atual.map(DepartmentId),
            status: status_from_db(&row.status)?,
            start_date: row.data_inicio,
            expected_end_date: row.data_fim_prevista,
            responsible_user: row.usuario_responsavel.map(UserId),
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
        })
    }
}

#[derive(Debug, FromRow)]
struct HistoryRow {
    id: Uuid,
    processo_id: Uuid,
    setor_id: String,
    data_entrada: DateTime<Utc>,
    data_saida: Option<DateTime<Utc>>,
    usuario_id: Option<String>,
    responsavel_setor: Option<String>,
}

impl From<HistoryRow> for HistoryEntry {
    fn from(row: HistoryRow) -> Self {
        HistoryEntry {
            id: HistoryEntryId(row.id),
            process_id: ProcessId(row.processo_id),
            department_id: DepartmentId(row.setor_id),
            entry_date: row.data_entrada,
            exit_date: row.data_saida,
            user_id: row.usuario_id.map(UserId),
            responsible_at_sector: row.responsavel_setor.map(UserId),
        }
    }
}

#[derive(Debug, FromRow)]
struct AssignmentRow {
    processo_id: Uuid,
    setor_id: String,
    usuario_id: String,
    assigned_at: DateTime<Utc>,
}

impl From<AssignmentRow> for ResponsibilityAssignment {
    fn from(row: AssignmentRow) -> Self {
        ResponsibilityAssignment {
            process_id: ProcessId(row.processo_id),
            department_id: DepartmentId(row.setor_id),
            user_id: UserId(row.usuario_id),
            assigned_at: row.assigned_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct NotificationRow {
    id: Uuid,
    usuario_id: String,
    processo_id: Uuid,
    mensagem: String,
    created_at: DateTime<Utc>,
    respondida: bool,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Notification {
            id: NotificationId(row.id),
            user_id: UserId(row.usuario_id),
            process_id: ProcessId(row.processo_id),
            message: row.mensagem,
            created_at: row.created_at,
            responded: row.respondida,
        }
    }
}

const PROCESS_COLUMNS: &str = "id, numero_protocolo, tipo_processo_id, setor_atual, status, \
     data_inicio, data_fim_prevista, usuario_responsavel, created_at, updated_at, version";

const HISTORY_COLUMNS: &str =
    "id, processo_id, setor_id, data_entrada, data_saida, usuario_id, responsavel_setor";

fn uuids(ids: &[ProcessId]) -> Vec<Uuid> {
    ids.iter().map(|id| id.0).collect()
}

/// PostgreSQL-backed [`ProcessStorage`]
#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        info!(max_connections, "connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    /// Apply pending migrations from `migrations/`
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // Zero rows from a versioned update: distinguish a missing row from a lost race
    async fn version_conflict(
        tx: &mut Transaction<'_, Postgres>,
        process: &Process,
    ) -> TrackerError {
        let exists: std::result::Result<Option<(Uuid,)>, sqlx::Error> =
            sqlx::query_as("SELECT id FROM processos WHERE id = $1")
                .bind(process.id.0)
                .fetch_optional(&mut **tx)
                .await;

        match exists {
            Ok(Some(_)) => TrackerError::ConcurrentModification {
                process: process.protocol_number.clone(),
            },
            Ok(None) => TrackerError::not_found("Process", process.id),
            Err(e) => e.into(),
        }
    }

    async fn write_process(tx: &mut Transaction<'_, Postgres>, process: &Process) -> Result<()> {
        let result = sqlx::query(
            "UPDATE processos SET tipo_processo_id = $2, setor_atual = $3, status = $4, \
             data_inicio = $5, data_fim_prevista = $6, usuario_responsavel = $7, \
             updated_at = $8, version = $9 \
             WHERE id = $1 AND version = $10",
        )
        .bind(process.id.0)
        .bind(process.process_type.as_ref().map(|t| t.as_str()))
        .bind(process.current_department.as_ref().map(|d| d.as_str()))
        .bind(status_to_db(process.status))
        .bind(process.start_date)
        .bind(process.expected_end_date)
        .bind(process.responsible_user.as_ref().map(|u| u.as_str()))
        .bind(process.updated_at)
        .bind(process.version)
        .bind(process.version - 1)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Self::version_conflict(tx, process).await);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProcessStorage for PostgresStorage {
    async fn list_departments(&self) -> Result<Vec<Department>> {
        let rows: Vec<DepartmentRow> =
            sqlx::query_as("SELECT id, nome, ordem, prazo_dias, is_final FROM setores ORDER BY ordem, id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Department::from).collect())
    }

    async fn get_department(&self, id: &DepartmentId) -> Result<Option<Department>> {
        let row: Option<DepartmentRow> =
            sqlx::query_as("SELECT id, nome, ordem, prazo_dias, is_final FROM setores WHERE id = $1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Department::from))
    }

    async fn save_department(&self, department: Department) -> Result<Department> {
        sqlx::query(
            "INSERT INTO setores (id, nome, ordem, prazo_dias, is_final) VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO UPDATE SET nome = $2, ordem = $3, prazo_dias = $4, is_final = $5",
        )
        .bind(department.id.as_str())
        .bind(&department.name)
        .bind(department.order)
        .bind(department.time_limit.and_then(|d| i32::try_from(d).ok()))
        .bind(department.is_terminal)
        .execute(&self.pool)
        .await?;
        Ok(department)
    }

    async fn delete_department(&self, id: &DepartmentId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM setores WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn swap_department_order(&self, a: &DepartmentId, b: &DepartmentId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let orders: Vec<(String, i32)> =
            sqlx::query_as("SELECT id, ordem FROM setores WHERE id = $1 OR id = $2 FOR UPDATE")
                .bind(a.as_str())
                .bind(b.as_str())
                .fetch_all(&mut *tx)
                .await?;

        let order_of = |id: &DepartmentId| {
            orders
                .iter()
                .find(|(row_id, _)| row_id == id.as_str())
                .map(|(_, order)| *order)
                .ok_or_else(|| TrackerError::not_found("Department", id))
        };
        let (order_a, order_b) = (order_of(a)?, order_of(b)?);

        for (id, order) in [(a, order_b), (b, order_a)] {
            sqlx::query("UPDATE setores SET ordem = $2 WHERE id = $1")
                .bind(id.as_str())
                .bind(order)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_process_types(&self) -> Result<Vec<ProcessType>> {
        let rows: Vec<ProcessTypeRow> =
            sqlx::query_as("SELECT id, nome, ativo, descricao FROM tipos_processo ORDER BY nome")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(ProcessType::from).collect())
    }

    async fn get_process_type(&self, id: &ProcessTypeId) -> Result<Option<ProcessType>> {
        let row: Option<ProcessTypeRow> =
            sqlx::query_as("SELECT id, nome, ativo, descricao FROM tipos_processo WHERE id = $1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(ProcessType::from))
    }

    async fn save_process_type(&self, process_type: ProcessType) -> Result<ProcessType> {
        sqlx::query(
            "INSERT INTO tipos_processo (id, nome, ativo, descricao) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (id) DO UPDATE SET nome = $2, ativo = $3, descricao = $4",
        )
        .bind(process_type.id.as_str())
        .bind(&process_type.name)
        .bind(process_type.active)
        .bind(&process_type.description)
        .execute(&self.pool)
        .await?;
        Ok(process_type)
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let rows: Vec<UserRow> =
            sqlx::query_as("SELECT id, email, nome, papel, setores, ativo FROM usuarios ORDER BY nome")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn get_user(&self, id: &UserId) -> Result<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, email, nome, papel, setores, ativo FROM usuarios WHERE id = $1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, nome, papel, setores, ativo FROM usuarios WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn save_user(&self, user: User) -> Result<User> {
        let departments: Vec<String> = user.departments.iter().map(|d| d.0.clone()).collect();
        sqlx::query(
            "INSERT INTO usuarios (id, email, nome, papel, setores, ativo) VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (id) DO UPDATE SET email = $2, nome = $3, papel = $4, setores = $5, ativo = $6",
        )
        .bind(user.id.as_str())
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.role.to_string())
        .bind(&departments)
        .bind(user.active)
        .execute(&self.pool)
        .await?;
        Ok(user)
    }

    async fn delete_user(&self, id: &UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM usuarios WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_processes(&self, processes: Vec<Process>) -> Result<Vec<Process>> {
        let mut tx = self.pool.begin().await?;

        let protocols: Vec<String> = processes.iter().map(|p| p.protocol_number.clone()).collect();
        let taken: Vec<(String,)> = sqlx::query_as(
            "SELECT numero_protocolo FROM processos WHERE numero_protocolo = ANY($1) LIMIT 1",
        )
        .bind(&protocols)
        .fetch_all(&mut *tx)
        .await?;
        if let Some((protocol,)) = taken.into_iter().next() {
            return Err(TrackerError::ValidationFailed(format!(
                "protocol number {} already exists",
                protocol
            )));
        }

        for process in &processes {
            sqlx::query(
                "INSERT INTO processos (id, numero_protocolo, tipo_processo_id, setor_atual, status, \
                 data_inicio, data_fim_prevista, usuario_responsavel, created_at, updated_at, version) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            )
            .bind(process.id.0)
            .bind(&process.protocol_number)
            .bind(process.process_type.as_ref().map(|t| t.as_str()))
            .bind(process.current_department.as_ref().map(|d| d.as_str()))
            .bind(status_to_db(process.status))
            .bind(process.start_date)
            .bind(process.expected_end_date)
            .bind(process.responsible_user.as_ref().map(|u| u.as_str()))
            .bind(process.created_at)
            .bind(process.updated_at)
            .bind(process.version)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(count = processes.len(), "processes inserted");
        Ok(processes)
    }

    async fn get_process(&self, id: &ProcessId) -> Result<Option<Process>> {
        let row: Option<ProcessRow> =
            sqlx::query_as(&format!("SELECT {} FROM processos WHERE id = $1", PROCESS_COLUMNS))
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Process::try_from).transpose()
    }

    async fn list_processes(&self) -> Result<Vec<Process>> {
        let rows: Vec<ProcessRow> =
            sqlx::query_as(&format!("SELECT {} FROM processos", PROCESS_COLUMNS))
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(Process::try_from).collect()
    }

    async fn update_process(&self, process: Process) -> Result<Process> {
        let mut tx = self.pool.begin().await?;
        Self::write_process(&mut tx, &process).await?;
        tx.commit().await?;
        Ok(process)
    }

    async fn commit_transition(&self, plan: TransitionPlan) -> Result<()> {
        if plan.process.version != plan.expected_version + 1 {
            return Err(TrackerError::ValidationFailed(
                "transition plan carries an inconsistent version".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        let process_id = plan.process.id.0;

        Self::write_process(&mut tx, &plan.process).await?;

        if !plan.close_entries.is_empty() {
            let ids: Vec<Uuid> = plan.close_entries.iter().map(|e| e.0).collect();
            sqlx::query(
                "UPDATE processo_historico SET data_saida = $3 \
                 WHERE processo_id = $1 AND id = ANY($2) AND data_saida IS NULL",
            )
            .bind(process_id)
            .bind(&ids)
            .bind(plan.closed_at)
            .execute(&mut *tx)
            .await?;
        }

        let entry = &plan.open_entry;
        let responsible = plan
            .assign
            .as_ref()
            .map(|a| a.user_id.as_str())
            .or(entry.responsible_at_sector.as_ref().map(|u| u.as_str()));
        sqlx::query(&format!(
            "INSERT INTO processo_historico ({}) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            HISTORY_COLUMNS
        ))
        .bind(entry.id.0)
        .bind(process_id)
        .bind(entry.department_id.as_str())
        .bind(entry.entry_date)
        .bind(entry.exit_date)
        .bind(entry.user_id.as_ref().map(|u| u.as_str()))
        .bind(responsible)
        .execute(&mut *tx)
        .await?;

        if !plan.clear_assignments.is_empty() {
            let departments: Vec<String> =
                plan.clear_assignments.iter().map(|d| d.0.clone()).collect();
            sqlx::query("DELETE FROM setor_responsaveis WHERE processo_id = $1 AND setor_id = ANY($2)")
                .bind(process_id)
                .bind(&departments)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(assignment) = &plan.assign {
            sqlx::query(
                "INSERT INTO setor_responsaveis (processo_id, setor_id, usuario_id, assigned_at) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(process_id)
            .bind(assignment.department_id.as_str())
            .bind(assignment.user_id.as_str())
            .bind(assignment.assigned_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_history(&self, process_id: &ProcessId) -> Result<Vec<HistoryEntry>> {
        let rows: Vec<HistoryRow> = sqlx::query_as(&format!(
            "SELECT {} FROM processo_historico WHERE processo_id = $1 ORDER BY data_entrada",
            HISTORY_COLUMNS
        ))
        .bind(process_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(HistoryEntry::from).collect())
    }

    async fn list_history_for(&self, process_ids: &[ProcessId]) -> Result<Vec<HistoryEntry>> {
        let rows: Vec<HistoryRow> = sqlx::query_as(&format!(
            "SELECT {} FROM processo_historico WHERE processo_id = ANY($1) ORDER BY data_entrada",
            HISTORY_COLUMNS
        ))
        .bind(uuids(process_ids))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(HistoryEntry::from).collect())
    }

    async fn renew_history_entry(
        &self,
        entry_id: &HistoryEntryId,
        entry_date: DateTime<Utc>,
    ) -> Result<Option<HistoryEntry>> {
        let row: Option<HistoryRow> = sqlx::query_as(&format!(
            "UPDATE processo_historico SET data_entrada = $2 \
             WHERE id = $1 AND data_saida IS NULL RETURNING {}",
            HISTORY_COLUMNS
        ))
        .bind(entry_id.0)
        .bind(entry_date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(HistoryEntry::from))
    }

    async fn get_assignment(
        &self,
        process_id: &ProcessId,
        department_id: &DepartmentId,
    ) -> Result<Option<ResponsibilityAssignment>> {
        let row: Option<AssignmentRow> = sqlx::query_as(
            "SELECT processo_id, setor_id, usuario_id, assigned_at FROM setor_responsaveis \
             WHERE processo_id = $1 AND setor_id = $2",
        )
        .bind(process_id.0)
        .bind(department_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ResponsibilityAssignment::from))
    }

    async fn list_assignments_for(
        &self,
        process_ids: &[ProcessId],
    ) -> Result<Vec<ResponsibilityAssignment>> {
        let rows: Vec<AssignmentRow> = sqlx::query_as(
            "SELECT processo_id, setor_id, usuario_id, assigned_at FROM setor_responsaveis \
             WHERE processo_id = ANY($1)",
        )
        .bind(uuids(process_ids))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ResponsibilityAssignment::from).collect())
    }

    async fn claim_assignment(&self, assignment: ResponsibilityAssignment) -> Result<ClaimOutcome> {
        let mut tx = self.pool.begin().await?;

        let inserted: Option<AssignmentRow> = sqlx::query_as(
            "INSERT INTO setor_responsaveis (processo_id, setor_id, usuario_id, assigned_at) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (processo_id, setor_id) DO NOTHING \
             RETURNING processo_id, setor_id, usuario_id, assigned_at",
        )
        .bind(assignment.process_id.0)
        .bind(assignment.department_id.as_str())
        .bind(assignment.user_id.as_str())
        .bind(assignment.assigned_at)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match inserted {
            Some(row) => {
                sqlx::query(
                    "UPDATE processo_historico SET responsavel_setor = $3 WHERE id = ( \
                     SELECT id FROM processo_historico \
                     WHERE processo_id = $1 AND setor_id = $2 AND data_saida IS NULL \
                     ORDER BY data_entrada DESC LIMIT 1)",
                )
                .bind(assignment.process_id.0)
                .bind(assignment.department_id.as_str())
                .bind(assignment.user_id.as_str())
                .execute(&mut *tx)
                .await?;
                ClaimOutcome::Claimed(row.into())
            }
            None => {
                let existing: AssignmentRow = sqlx::query_as(
                    "SELECT processo_id, setor_id, usuario_id, assigned_at FROM setor_responsaveis \
                     WHERE processo_id = $1 AND setor_id = $2",
                )
                .bind(assignment.process_id.0)
                .bind(assignment.department_id.as_str())
                .fetch_one(&mut *tx)
                .await?;
                let existing = ResponsibilityAssignment::from(existing);
                if existing.user_id == assignment.user_id {
                    ClaimOutcome::Claimed(existing)
                } else {
                    ClaimOutcome::HeldBy(existing)
                }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn create_notifications(&self, notifications: Vec<Notification>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for notification in &notifications {
            sqlx::query(
                "INSERT INTO notificacoes (id, usuario_id, processo_id, mensagem, created_at, respondida) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(notification.id.0)
            .bind(notification.user_id.as_str())
            .bind(notification.process_id.0)
            .bind(&notification.message)
            .bind(notification.created_at)
            .bind(notification.responded)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_notifications(&self, user_id: &UserId) -> Result<Vec<Notification>> {
        let rows: Vec<NotificationRow> = sqlx::query_as(
            "SELECT id, usuario_id, processo_id, mensagem, created_at, respondida FROM notificacoes \
             WHERE usuario_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Notification::from).collect())
    }

    async fn mark_notifications_responded(
        &self,
        user_id: &UserId,
        process_id: &ProcessId,
    ) -> Result<usize> {
        let result = sqlx::query(
            "UPDATE notificacoes SET respondida = TRUE \
             WHERE usuario_id = $1 AND processo_id = $2 AND respondida = FALSE",
        )
        .bind(user_id.as_str())
        .bind(process_id.0)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn delete_history_for(&self, process_ids: &[ProcessId]) -> Result<usize> {
        let result = sqlx::query("DELETE FROM processo_historico WHERE processo_id = ANY($1)")
            .bind(uuids(process_ids))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn delete_assignments_for(&self, process_ids: &[ProcessId]) -> Result<usize> {
        let result = sqlx::query("DELETE FROM setor_responsaveis WHERE processo_id = ANY($1)")
            .bind(uuids(process_ids))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn delete_notifications_for(&self, process_ids: &[ProcessId]) -> Result<usize> {
        let result = sqlx::query("DELETE FROM notificacoes WHERE processo_id = ANY($1)")
            .bind(uuids(process_ids))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn delete_process(&self, id: &ProcessId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM processos WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[test]
    fn test_status_round_trips_through_legacy_labels() {
        for status in [
            ProcessStatus::NotStarted,
            ProcessStatus::InProgress,
            ProcessStatus::Completed,
        ] {
            assert_eq!(status_from_db(status_to_db(status)).unwrap(), status);
        }
    }

    #[test]
    fn test_english_aliases_and_legacy_overdue() {
        assert_eq!(status_from_db("pending").unwrap(), ProcessStatus::InProgress);
        assert_eq!(status_from_db("not_started").unwrap(), ProcessStatus::NotStarted);
        assert_eq!(status_from_db("completed").unwrap(), ProcessStatus::Completed);
        assert_eq!(status_from_db("Atrasado").unwrap(), ProcessStatus::InProgress);
        assert_eq!(status_from_db("overdue").unwrap(), ProcessStatus::InProgress);
        assert_eq!(status_from_db(" Concluido ").unwrap(), ProcessStatus::Completed);
        assert!(status_from_db("arquivado").is_err());
    }

    #[test]
    fn test_department_row_drops_negative_limit() {
        let department = Department::from(DepartmentRow {
            id: "2".into(),
            nome: "Análise".into(),
            ordem: 2,
            prazo_dias: Some(-1),
            is_final: false,
        });
        assert_eq!(department.time_limit, None);
        assert_eq!(department.order, 2);
    }

    #[test]
    fn test_unknown_role_reads_as_member() {
        let user = User::from(UserRow {
            id: "ana".into(),
            email: "ana@cartorio.test".into(),
            nome: "Ana".into(),
            papel: "superuser".into(),
            setores: vec!["1".into()],
            ativo: true,
        });
        assert_eq!(user.role, Role::Member);
        assert!(user.works_in(&"1".into()));
    }
}
