// REST API handlers
// Thin adapters from HTTP requests to WorkflowEngine operations

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Sse,
    },
    Json,
};
use futures::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use super::auth::{ActingUser, AdminUser};
use super::types::{
    create_error_response, DeleteProcessesRequest, DeleteProcessesResponse, DepartmentRequest,
    ErrorResponse, GenerateRequest, ListProcessTypesQuery, ProcessTypeRequest,
    SetProcessTypeRequest, SetResponsibleRequest, UserRequest,
};
use crate::engine::{
    DashboardStats, DepartmentRegistry, ProcessDetail, ProcessFilter, ProcessSummary, Viewer,
    WorkflowEngine,
};
use crate::models::{
    Department, DepartmentId, HistoryEntry, HistoryEntryId, Notification, Process, ProcessId,
    ProcessType, ProcessTypeId, ResponsibilityAssignment, User, UserId,
};

type ApiResult<T> = Result<T, ErrorResponse>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<WorkflowEngine>,
}

impl AppState {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self { engine }
    }

    /// Members act on processes they can see; a not-yet-started process is
    /// open to the members of the first department
    async fn ensure_can_act(&self, user: &User, process_id: &ProcessId) -> ApiResult<Process> {
        let process = self.engine.get_process(process_id).await?;
        if Viewer::from(user).can_view(&process) {
            return Ok(process);
        }

        if !process.is_started() {
            let registry = self.engine.departments().await?;
            if registry.first().map_or(false, |first| user.works_in(&first.id)) {
                return Ok(process);
            }
        }

        Err(create_error_response(
            format!("process {} is not available to {}", process.protocol_number, user.email),
            "permission_error",
            "error",
        ))
    }
}

fn ordered(registry: &DepartmentRegistry) -> Vec<Department> {
    registry.list_ordered().to_vec()
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "process-tracker",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /departments
pub async fn list_departments(
    State(state): State<AppState>,
    _user: ActingUser,
) -> ApiResult<Json<Vec<Department>>> {
    let registry = state.engine.departments().await?;
    Ok(Json(ordered(&registry)))
}

/// POST /departments
pub async fn create_department(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(request): Json<DepartmentRequest>,
) -> ApiResult<(StatusCode, Json<Department>)> {
    let id = request.id.clone().ok_or_else(|| {
        create_error_response("department id is required".to_string(), "validation_error", "error")
    })?;
    let department = state
        .engine
        .create_department(request.into_department(id))
        .await?;
    info!(admin = %admin.id, department = %department.id, "department created via API");
    Ok((StatusCode::CREATED, Json(department)))
}

/// PUT /departments/:id
pub async fn update_department(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<DepartmentId>,
    Json(request): Json<DepartmentRequest>,
) -> ApiResult<Json<Department>> {
    let department = state
        .engine
        .update_department(request.into_department(id))
        .await?;
    Ok(Json(department))
}

/// DELETE /departments/:id
pub async fn delete_department(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<DepartmentId>,
) -> ApiResult<StatusCode> {
    state.engine.delete_department(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /departments/:id/move-up
pub async fn move_department_up(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<DepartmentId>,
) -> ApiResult<Json<Vec<Department>>> {
    let registry = state.engine.move_department_up(&id).await?;
    Ok(Json(ordered(&registry)))
}

/// POST /departments/:id/move-down
pub async fn move_department_down(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<DepartmentId>,
) -> ApiResult<Json<Vec<Department>>> {
    let registry = state.engine.move_department_down(&id).await?;
    Ok(Json(ordered(&registry)))
}

/// GET /process-types
pub async fn list_process_types(
    State(state): State<AppState>,
    _user: ActingUser,
    Query(query): Query<ListProcessTypesQuery>,
) -> ApiResult<Json<Vec<ProcessType>>> {
    let types = state.engine.list_process_types(query.include_inactive).await?;
    Ok(Json(types))
}

/// POST /process-types
pub async fn create_process_type(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(request): Json<ProcessTypeRequest>,
) -> ApiResult<(StatusCode, Json<ProcessType>)> {
    let id = request.id.clone().ok_or_else(|| {
        create_error_response("process type id is required".to_string(), "validation_error", "error")
    })?;
    let created = state
        .engine
        .create_process_type(request.into_process_type(id))
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /process-types/:id
pub async fn update_process_type(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<ProcessTypeId>,
    Json(request): Json<ProcessTypeRequest>,
) -> ApiResult<Json<ProcessType>> {
    let updated = state
        .engine
        .update_process_type(request.into_process_type(id))
        .await?;
    Ok(Json(updated))
}

/// POST /process-types/:id/deactivate
pub async fn deactivate_process_type(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<ProcessTypeId>,
) -> ApiResult<Json<ProcessType>> {
    Ok(Json(state.engine.deactivate_process_type(&id).await?))
}

/// GET /users
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(state.engine.list_users().await?))
}

/// POST /users
pub async fn create_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(request): Json<UserRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let user = state.engine.create_user(request.into_user(None)).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// PUT /users/:id
pub async fn update_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<UserId>,
    Json(request): Json<UserRequest>,
) -> ApiResult<Json<User>> {
    let user = state.engine.update_user(request.into_user(Some(id))).await?;
    Ok(Json(user))
}

/// DELETE /users/:id
pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<UserId>,
) -> ApiResult<StatusCode> {
    if admin.id == id {
        return Err(create_error_response(
            "administrators cannot delete themselves".to_string(),
            "validation_error",
            "error",
        ));
    }
    state.engine.delete_user(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /processes
pub async fn list_processes(
    State(state): State<AppState>,
    user: ActingUser,
    Query(filter): Query<ProcessFilter>,
) -> ApiResult<Json<Vec<ProcessSummary>>> {
    let summaries = state.engine.query().list(&user.viewer(), &filter).await?;
    Ok(Json(summaries))
}

/// POST /processes/generate
pub async fn generate_processes(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(request): Json<GenerateRequest>,
) -> ApiResult<(StatusCode, Json<Vec<Process>>)> {
    let created = state
        .engine
        .generate(request.start, request.count, request.process_type)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// POST /processes/delete
pub async fn delete_processes(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(request): Json<DeleteProcessesRequest>,
) -> ApiResult<Json<DeleteProcessesResponse>> {
    let deleted = state.engine.delete_many(&request.ids).await?;
    Ok(Json(DeleteProcessesResponse { deleted }))
}

/// GET /processes/:id
pub async fn get_process(
    State(state): State<AppState>,
    user: ActingUser,
    Path(id): Path<ProcessId>,
) -> ApiResult<Json<ProcessDetail>> {
    let detail = state.engine.query().detail(&user.viewer(), &id).await?;
    Ok(Json(detail))
}

/// DELETE /processes/:id
pub async fn delete_process(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<ProcessId>,
) -> ApiResult<StatusCode> {
    state.engine.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /processes/:id/start
pub async fn start_process(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    Path(id): Path<ProcessId>,
) -> ApiResult<Json<Process>> {
    state.ensure_can_act(&user, &id).await?;
    Ok(Json(state.engine.start(&id, &user).await?))
}

/// POST /processes/:id/advance
pub async fn advance_process(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    Path(id): Path<ProcessId>,
) -> ApiResult<Json<Process>> {
    state.ensure_can_act(&user, &id).await?;
    Ok(Json(state.engine.advance(&id, &user).await?))
}

/// POST /processes/:id/return
pub async fn return_process(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    Path(id): Path<ProcessId>,
) -> ApiResult<Json<Process>> {
    state.ensure_can_act(&user, &id).await?;
    Ok(Json(state.engine.return_to_previous(&id, &user).await?))
}

/// POST /processes/:id/accept
pub async fn accept_process(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    Path(id): Path<ProcessId>,
) -> ApiResult<Json<ResponsibilityAssignment>> {
    Ok(Json(state.engine.accept(&id, &user).await?))
}

/// PUT /processes/:id/type
pub async fn set_process_type(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    Path(id): Path<ProcessId>,
    Json(request): Json<SetProcessTypeRequest>,
) -> ApiResult<Json<Process>> {
    state.ensure_can_act(&user, &id).await?;
    Ok(Json(state.engine.set_process_type(&id, &request.process_type).await?))
}

/// PUT /processes/:id/responsible
pub async fn set_responsible(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    Path(id): Path<ProcessId>,
    Json(request): Json<SetResponsibleRequest>,
) -> ApiResult<Json<Process>> {
    state.ensure_can_act(&user, &id).await?;
    Ok(Json(
        state
            .engine
            .set_responsible(&id, request.user_id.as_ref())
            .await?,
    ))
}

/// POST /processes/:id/history/:entry_id/renew
pub async fn renew_deadline(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    Path((id, entry_id)): Path<(ProcessId, HistoryEntryId)>,
) -> ApiResult<Json<HistoryEntry>> {
    state.ensure_can_act(&user, &id).await?;
    Ok(Json(state.engine.renew_deadline(&id, &entry_id, &user).await?))
}

/// GET /dashboard
pub async fn dashboard(
    State(state): State<AppState>,
    user: ActingUser,
) -> ApiResult<Json<DashboardStats>> {
    Ok(Json(state.engine.query().dashboard(&user.viewer()).await?))
}

/// GET /notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
) -> ApiResult<Json<Vec<Notification>>> {
    let notifications = state.engine.storage().list_notifications(&user.id).await?;
    Ok(Json(notifications))
}

/// GET /events - change feed as Server-Sent Events
pub async fn change_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.engine.events().subscribe();

    // Lagged receivers drop the missed events
    let stream = BroadcastStream::new(receiver).filter_map(|message| async move {
        match message {
            Ok(change) => Event::default().event("change").json_data(&change).ok().map(Ok),
            Err(_) => None,
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Error handler for invalid routes
pub async fn not_found() -> impl IntoResponse {
    create_error_response("Not found".to_string(), "not_found_error", "error")
}
