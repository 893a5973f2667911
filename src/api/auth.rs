// Acting-user extraction
// Resolves the x-user-id header against the user store

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::debug;

use super::handlers::AppState;
use super::types::{create_error_response, ErrorResponse};
use crate::engine::Viewer;
use crate::models::{User, UserId};

pub const USER_HEADER: &str = "x-user-id";

/// The authenticated user behind a request
#[derive(Debug, Clone)]
pub struct ActingUser(pub User);

impl ActingUser {
    pub fn viewer(&self) -> Viewer {
        Viewer::from(&self.0)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for ActingUser {
    type Rejection = ErrorResponse;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| unauthenticated("missing x-user-id header"))?;

        let user = state
            .engine
            .storage()
            .get_user(&UserId::from(user_id))
            .await
            .map_err(ErrorResponse::from)?
            .filter(|user| user.active)
            .ok_or_else(|| unauthenticated("unknown or inactive user"))?;

        debug!(user = %user.id, "request authenticated");
        Ok(ActingUser(user))
    }
}

/// An acting user holding the admin role
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ErrorResponse;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let ActingUser(user) = ActingUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(create_error_response(
                format!("{} is not an administrator", user.email),
                "permission_error",
                "error",
            ));
        }
        Ok(AdminUser(user))
    }
}

fn unauthenticated(message: &str) -> ErrorResponse {
    create_error_response(message.to_string(), "authentication_error", "error")
}
