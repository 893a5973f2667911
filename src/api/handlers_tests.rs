// HTTP-level tests driving the router directly

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::{ApiServer, ApiServerConfig};
use crate::engine::{EngineConfig, InMemoryStorage, WorkflowEngine};
use crate::models::{ProcessType, User};

const ADMIN: &str = "admin@cartorio.test";

async fn app() -> Router {
    let engine = WorkflowEngine::new(Arc::new(InMemoryStorage::new()), EngineConfig::default());
    engine.seed_default_departments().await.unwrap();
    engine.ensure_admin(ADMIN, "Admin").await.unwrap();
    engine
        .create_process_type(ProcessType::new("escritura", "Escritura"))
        .await
        .unwrap();
    engine
        .create_user(User::new("ana", "ana@cartorio.test", "Ana").in_departments(["1", "2"]))
        .await
        .unwrap();
    engine
        .create_user(User::new("bia", "bia@cartorio.test", "Bia").in_departments(["1"]))
        .await
        .unwrap();

    ApiServer::new(Arc::new(engine), ApiServerConfig::default()).create_router()
}

async fn send(app: &Router, method: Method, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        request = request.header("x-user-id", user);
    }
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn generate(app: &Router, start: u64, count: u32) -> Vec<Value> {
    let (status, body) = send(
        app,
        Method::POST,
        "/processes/generate",
        Some(ADMIN),
        Some(json!({"start": start, "count": count, "process_type": "escritura"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body.as_array().unwrap().clone()
}

fn id_of(process: &Value) -> String {
    process["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_check() {
    let app = app().await;
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_requests_need_a_known_user() {
    let app = app().await;

    let (status, body) = send(&app, Method::GET, "/processes", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["type"], "authentication_error");

    let (status, _) = send(&app, Method::GET, "/processes", Some("nobody"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_only_routes_reject_members() {
    let app = app().await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/processes/generate",
        Some("ana"),
        Some(json!({"start": 1, "count": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["type"], "permission_error");
}

#[tokio::test]
async fn test_departments_are_listed_in_order() {
    let app = app().await;
    let (status, body) = send(&app, Method::GET, "/departments", Some("ana"), None).await;
    assert_eq!(status, StatusCode::OK);

    let orders: Vec<i64> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["order"].as_i64().unwrap())
        .collect();
    assert_eq!(orders, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(body[5]["is_terminal"], true);
}

#[tokio::test]
async fn test_generate_validates_count() {
    let app = app().await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/processes/generate",
        Some(ADMIN),
        Some(json!({"start": 1, "count": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["type"], "validation_error");
}

#[tokio::test]
async fn test_start_and_advance_through_api() {
    let app = app().await;
    let processes = generate(&app, 100, 2).await;
    let id = id_of(&processes[0]);

    // Not started processes are open to the first department's members
    let (status, body) = send(&app, Method::POST, &format!("/processes/{}/start", id), Some("ana"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "in_progress");
    assert_eq!(body["current_department"], "1");
    assert_eq!(body["responsible_user"], "ana");

    let (status, body) = send(&app, Method::POST, &format!("/processes/{}/advance", id), Some("ana"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_department"], "2");

    let (status, body) = send(&app, Method::GET, &format!("/processes/{}", id), Some("ana"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["department_name"], "Análise");
    assert_eq!(body["next_department"], "Registro");
    assert_eq!(body["previous_department"], "Protocolo");
    let history = body["history"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(
        history.iter().filter(|e| e["exit_date"].is_null()).count(),
        1
    );
}

#[tokio::test]
async fn test_members_cannot_act_outside_their_departments() {
    let app = app().await;
    let id = id_of(&generate(&app, 200, 1).await[0]);

    send(&app, Method::POST, &format!("/processes/{}/start", id), Some("ana"), None).await;
    send(&app, Method::POST, &format!("/processes/{}/advance", id), Some("ana"), None).await;

    // Bia only works in department 1 and the process now sits in 2
    let (status, _) = send(&app, Method::POST, &format!("/processes/{}/advance", id), Some("bia"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, Method::GET, &format!("/processes/{}", id), Some("bia"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, Method::GET, "/processes", Some("bia"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_return_from_first_department_is_a_warning() {
    let app = app().await;
    let id = id_of(&generate(&app, 300, 1).await[0]);
    send(&app, Method::POST, &format!("/processes/{}/start", id), Some("ana"), None).await;

    let (status, body) = send(&app, Method::POST, &format!("/processes/{}/return", id), Some("ana"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["type"], "workflow_boundary");
    assert_eq!(body["error"]["level"], "warning");
}

#[tokio::test]
async fn test_accept_conflicts_with_existing_holder() {
    let app = app().await;
    let id = id_of(&generate(&app, 400, 1).await[0]);
    send(&app, Method::POST, &format!("/processes/{}/start", id), Some("ana"), None).await;

    let (status, body) = send(&app, Method::POST, &format!("/processes/{}/accept", id), Some("bia"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["type"], "conflict");
    assert!(body["error"]["message"].as_str().unwrap().contains("ana"));
}

#[tokio::test]
async fn test_list_filters_by_status() {
    let app = app().await;
    let processes = generate(&app, 500, 3).await;
    send(&app, Method::POST, &format!("/processes/{}/start", id_of(&processes[1])), Some(ADMIN), None).await;

    let (status, body) = send(&app, Method::GET, "/processes?status=not_started", Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::OK);
    let protocols: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["process"]["protocol_number"].as_str().unwrap())
        .collect();
    assert_eq!(protocols, vec!["500", "502"]);

    let (_, body) = send(&app, Method::GET, "/processes?status=pending", Some(ADMIN), None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_many_and_dashboard() {
    let app = app().await;
    let processes = generate(&app, 600, 3).await;
    let ids: Vec<String> = processes.iter().map(id_of).collect();

    let (status, body) = send(
        &app,
        Method::POST,
        "/processes/delete",
        Some(ADMIN),
        Some(json!({"ids": [ids[0], ids[1]]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 2);

    let (status, body) = send(&app, Method::GET, "/dashboard", Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["not_started"], 1);
}

#[tokio::test]
async fn test_advance_notifies_entered_department() {
    let app = app().await;
    let id = id_of(&generate(&app, 700, 1).await[0]);
    send(&app, Method::POST, &format!("/processes/{}/start", id), Some(ADMIN), None).await;
    send(&app, Method::POST, &format!("/processes/{}/advance", id), Some(ADMIN), None).await;

    let (status, body) = send(&app, Method::GET, "/notifications", Some("ana"), None).await;
    assert_eq!(status, StatusCode::OK);
    let notifications = body.as_array().unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["message"], "Process 700 was forwarded to Análise");

    let (_, body) = send(&app, Method::GET, "/notifications", Some("bia"), None).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_route() {
    let app = app().await;
    let (status, body) = send(&app, Method::GET, "/nope", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "not_found_error");
}
