// REST API request and response types
// This module defines the JSON bodies exchanged with the process tracker API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::models::{
    Department, DepartmentId, ProcessId, ProcessType, ProcessTypeId, Role, User, UserId,
};
use crate::TrackerError;

/// Body for creating or replacing a department; `id` comes from the path on update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentRequest {
    #[serde(default)]
    pub id: Option<DepartmentId>,
    pub name: String,
    pub order: i32,
    #[serde(default)]
    pub time_limit: Option<u32>,
    #[serde(default)]
    pub is_terminal: bool,
}

impl DepartmentRequest {
    pub fn into_department(self, id: DepartmentId) -> Department {
        Department {
            id,
            name: self.name,
            order: self.order,
            time_limit: self.time_limit,
            is_terminal: self.is_terminal,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessTypeRequest {
    #[serde(default)]
    pub id: Option<ProcessTypeId>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl ProcessTypeRequest {
    pub fn into_process_type(self, id: ProcessTypeId) -> ProcessType {
        ProcessType {
            id,
            name: self.name,
            active: self.active,
            description: self.description,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRequest {
    /// Defaults to the email address
    #[serde(default)]
    pub id: Option<UserId>,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub departments: Vec<DepartmentId>,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl UserRequest {
    pub fn into_user(self, id: Option<UserId>) -> User {
        let id = id
            .or(self.id)
            .unwrap_or_else(|| UserId::new(self.email.clone()));
        User {
            id,
            email: self.email,
            name: self.name,
            role: self.role,
            departments: self.departments,
            active: self.active,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListProcessTypesQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub start: u64,
    pub count: u32,
    #[serde(default)]
    pub process_type: Option<ProcessTypeId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteProcessesRequest {
    pub ids: Vec<ProcessId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteProcessesResponse {
    pub deleted: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetProcessTypeRequest {
    pub process_type: ProcessTypeId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetResponsibleRequest {
    pub user_id: Option<UserId>,
}

/// Error response format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,

    #[serde(rename = "type")]
    pub error_type: String,

    /// "warning" for expected workflow boundaries, "error" otherwise
    pub level: String,
}

pub fn create_error_response(message: String, error_type: &str, level: &str) -> ErrorResponse {
    ErrorResponse {
        error: ErrorDetail {
            message,
            error_type: error_type.to_string(),
            level: level.to_string(),
        },
    }
}

impl From<TrackerError> for ErrorResponse {
    fn from(err: TrackerError) -> Self {
        let level = if err.is_warning() { "warning" } else { "error" };
        let error_type = match &err {
            TrackerError::ValidationFailed(_) => "validation_error",
            TrackerError::NoNextDepartment | TrackerError::NoPreviousDepartment => {
                "workflow_boundary"
            }
            TrackerError::AlreadyAssigned { .. } | TrackerError::ConcurrentModification { .. } => {
                "conflict"
            }
            TrackerError::NotFound { .. } => "not_found_error",
            TrackerError::Forbidden(_) => "permission_error",
            TrackerError::CascadeDelete { .. }
            | TrackerError::Storage(_)
            | TrackerError::Database(_)
            | TrackerError::Migration(_)
            | TrackerError::Serialization(_)
            | TrackerError::Config(_) => "internal_error",
        };
        create_error_response(err.to_string(), error_type, level)
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = match self.error.error_type.as_str() {
            "validation_error" => StatusCode::UNPROCESSABLE_ENTITY,
            "workflow_boundary" | "conflict" => StatusCode::CONFLICT,
            "not_found_error" => StatusCode::NOT_FOUND,
            "permission_error" => StatusCode::FORBIDDEN,
            "authentication_error" => StatusCode::UNAUTHORIZED,
            "invalid_request_error" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_errors_are_conflict_warnings() {
        let response = ErrorResponse::from(TrackerError::NoNextDepartment);
        assert_eq!(response.error.level, "warning");
        assert_eq!(response.clone().into_response().status(), StatusCode::CONFLICT);

        let response = ErrorResponse::from(TrackerError::ConcurrentModification {
            process: "100".into(),
        });
        assert_eq!(response.error.level, "error");
        assert_eq!(response.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (TrackerError::ValidationFailed("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (TrackerError::not_found("Process", "1"), StatusCode::NOT_FOUND),
            (TrackerError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (
                TrackerError::Storage(anyhow::anyhow!("disk full")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ErrorResponse::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn test_error_body_shape() {
        let body = serde_json::to_value(ErrorResponse::from(TrackerError::AlreadyAssigned {
            user: "ana".into(),
        }))
        .unwrap();
        assert_eq!(body["error"]["type"], "conflict");
        assert_eq!(body["error"]["level"], "warning");
        assert!(body["error"]["message"].as_str().unwrap().contains("ana"));
    }

    #[test]
    fn test_user_request_defaults_id_to_email() {
        let request: UserRequest =
            serde_json::from_str(r#"{"email": "ana@cartorio.test", "name": "Ana"}"#).unwrap();
        let user = request.into_user(None);
        assert_eq!(user.id, UserId::from("ana@cartorio.test"));
        assert_eq!(user.role, Role::Member);
        assert!(user.active);
    }
}
