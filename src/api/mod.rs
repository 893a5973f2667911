// REST API module
// Exposes the workflow engine over HTTP with axum

pub mod auth;
pub mod handlers;
pub mod types;

#[cfg(test)]
mod handlers_tests;

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::config::AppConfig;
use crate::engine::WorkflowEngine;
use handlers::*;

/// API server configuration
#[derive(Clone, Debug)]
pub struct ApiServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_enabled: bool,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            port: 4000,
            host: "0.0.0.0".to_string(),
            cors_enabled: true,
        }
    }
}

impl From<&AppConfig> for ApiServerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            port: config.server.port,
            host: config.server.host.clone(),
            cors_enabled: config.server.cors_enabled,
        }
    }
}

/// Process tracker HTTP server
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(engine: Arc<WorkflowEngine>, config: ApiServerConfig) -> Self {
        Self {
            config,
            state: AppState::new(engine),
        }
    }

    /// Create the Axum router with all routes
    pub fn create_router(&self) -> Router {
        let api_router = Router::new()
            .route("/health", get(health_check))
            // Departments
            .route("/departments", get(list_departments).post(create_department))
            .route(
                "/departments/:id",
                put(update_department).delete(delete_department),
            )
            .route("/departments/:id/move-up", post(move_department_up))
            .route("/departments/:id/move-down", post(move_department_down))
            // Process types
            .route(
                "/process-types",
                get(list_process_types).post(create_process_type),
            )
            .route("/process-types/:id", put(update_process_type))
            .route(
                "/process-types/:id/deactivate",
                post(deactivate_process_type),
            )
            // Users
            .route("/users", get(list_users).post(create_user))
            .route("/users/:id", put(update_user).delete(delete_user))
            // Processes
            .route("/processes", get(list_processes))
            .route("/processes/generate", post(generate_processes))
            .route("/processes/delete", post(delete_processes))
            .route("/processes/:id", get(get_process).delete(delete_process))
            .route("/processes/:id/start", post(start_process))
            .route("/processes/:id/advance", post(advance_process))
            .route("/processes/:id/return", post(return_process))
            .route("/processes/:id/accept", post(accept_process))
            .route("/processes/:id/type", put(set_process_type))
            .route("/processes/:id/responsible", put(set_responsible))
            .route(
                "/processes/:id/history/:entry_id/renew",
                post(renew_deadline),
            )
            // Views
            .route("/dashboard", get(dashboard))
            .route("/notifications", get(list_notifications))
            .route("/events", get(change_events))
            .fallback(not_found)
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http());

        if self.config.cors_enabled {
            api_router.layer(CorsLayer::permissive())
        } else {
            api_router
        }
    }

    /// Run the server
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let app = self.create_router();
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!(address = %addr, cors = self.config.cors_enabled, "process tracker API starting");

        axum::Server::bind(&addr.parse()?)
            .serve(app.into_make_service())
            .await?;

        Ok(())
    }
}

/// Builder pattern for the API server
pub struct ApiServerBuilder {
    config: ApiServerConfig,
    engine: Arc<WorkflowEngine>,
}

impl ApiServerBuilder {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self {
            config: ApiServerConfig::default(),
            engine,
        }
    }

    pub fn with_config(mut self, config: ApiServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> ApiServer {
        ApiServer::new(self.engine, self.config)
    }
}
