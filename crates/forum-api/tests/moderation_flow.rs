use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use forum_api::{AppStateInner, router};
use forum_core::{accounts, admins, store};
use forum_db::Database;

const SECRET: &str = "test-secret";

fn setup() -> (Router, Arc<Database>) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    admins::ensure(&db, "admin", "admin-password").unwrap();
    let state = Arc::new(AppStateInner::new(
        db.clone(),
        SECRET,
        chrono::Duration::hours(1),
        200,
    ));
    (router(state), db)
}

async fn call(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn register(app: &Router, username: &str, handle: &str) -> (StatusCode, Value) {
    call(
        app,
        "POST",
        "/auth/register",
        None,
        Some(json!({
            "last_name": "Martin",
            "first_name": "Alice",
            "handle": handle,
            "username": username,
            "password": "password123",
        })),
    )
    .await
}

async fn admin_token(app: &Router) -> String {
    let (status, body) = call(
        app,
        "POST",
        "/admin/login",
        None,
        Some(json!({ "username": "admin", "password": "admin-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

async fn student_login(app: &Router, username: &str) -> (StatusCode, Value) {
    call(
        app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "username": username, "password": "password123" })),
    )
    .await
}

#[tokio::test]
async fn registration_rejects_duplicates_and_weak_passwords() {
    let (app, _db) = setup();

    let (status, body) = register(&app, "alice", "Ali").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "inactive");

    let (status, _) = register(&app, "alice", "Other").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = register(&app, "bob", "Ali").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = call(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(json!({
            "last_name": "B", "first_name": "B", "handle": "Bee",
            "username": "bob", "password": "short",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("password"));
}

#[tokio::test]
async fn two_stage_gating() {
    let (app, _db) = setup();
    register(&app, "alice", "Ali").await;
    let admin = admin_token(&app).await;

    let (status, _) = student_login(&app, "alice").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(&app, "GET", "/admin/pending_accounts", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["username"], "alice");

    let (status, _) = call(
        &app,
        "POST",
        "/admin/approve",
        Some(&admin),
        Some(json!({ "username": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);

    let (status, _) = call(
        &app,
        "POST",
        "/admin/activate",
        Some(&admin),
        Some(json!({ "username": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, "GET", "/admin/unapproved_accounts", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["username"], "alice");

    let (status, _) = call(
        &app,
        "POST",
        "/admin/approve",
        Some(&admin),
        Some(json!({ "username": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(
        &app,
        "POST",
        "/admin/activate",
        Some(&admin),
        Some(json!({ "username": "nobody" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = student_login(&app, "alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["account"]["approved"], true);
    assert!(body["token"].as_str().is_some());
}

#[tokio::test]
async fn routes_enforce_roles() {
    let (app, _db) = setup();
    register(&app, "alice", "Ali").await;
    let admin = admin_token(&app).await;
    call(&app, "POST", "/admin/activate", Some(&admin), Some(json!({ "username": "alice" }))).await;
    let (_, body) = student_login(&app, "alice").await;
    let student = body["token"].as_str().unwrap().to_string();

    let (status, _) = call(&app, "GET", "/admin/stats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app, "GET", "/admin/stats", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app, "GET", "/admin/stats", Some(&student), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, "GET", "/messages", Some(&admin), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(&app, "GET", "/admin/stats", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_accounts"], 1);
    assert_eq!(body["active_accounts"], 1);
    assert_eq!(body["approved_accounts"], 0);
}

#[tokio::test]
async fn moderation_of_pending_messages() {
    let (app, db) = setup();
    register(&app, "alice", "Ali").await;
    let admin = admin_token(&app).await;
    call(&app, "POST", "/admin/activate", Some(&admin), Some(json!({ "username": "alice" }))).await;
    let (_, body) = student_login(&app, "alice").await;
    let student = body["token"].as_str().unwrap().to_string();

    let alice = accounts::get(&db, "alice").unwrap();
    let kept = store::append(&db, &alice, None, None, "hello forum", false).unwrap();
    let dropped = store::append(&db, &alice, None, None, "spam", false).unwrap();

    let (status, body) = call(&app, "GET", "/messages", Some(&student), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 0);

    let (status, body) = call(&app, "GET", "/admin/pending_messages", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
    assert_eq!(body[0]["sender_first_name"], "Alice");

    let (status, _) = call(&app, "POST", "/admin/validate_message", Some(&admin), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        "POST",
        "/admin/validate_message",
        Some(&admin),
        Some(json!({ "message_id": kept.id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(
        &app,
        "POST",
        "/admin/validate_message",
        Some(&admin),
        Some(json!({ "message_id": kept.id })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(
        &app,
        "POST",
        "/admin/reject_message",
        Some(&admin),
        Some(json!({ "message_id": dropped.id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(
        &app,
        "POST",
        "/admin/reject_message",
        Some(&admin),
        Some(json!({ "message_id": dropped.id })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&app, "GET", "/messages", Some(&student), None).await;
    assert_eq!(status, StatusCode::OK);
    let feed = body.as_array().unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0]["content"], "hello forum");
    assert!(feed[0]["validated_by"].is_string());

    let (_, body) = call(&app, "GET", "/admin/messages?limit=10", Some(&admin), None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn login_and_logout_are_audited() {
    let (app, _db) = setup();
    register(&app, "alice", "Ali").await;
    let admin = admin_token(&app).await;
    call(&app, "POST", "/admin/activate", Some(&admin), Some(json!({ "username": "alice" }))).await;

    let (_, body) = student_login(&app, "alice").await;
    let student = body["token"].as_str().unwrap().to_string();
    let session_id = body["session_id"].clone();

    let (status, _) = call(&app, "POST", "/auth/logout", Some(&student), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        &app,
        "GET",
        "/admin/login_history?username=alice",
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let history = body.as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["action"], "LOGOUT");
    assert_eq!(history[1]["action"], "LOGIN");
    assert_eq!(history[0]["session_id"], session_id);
    assert_eq!(history[1]["session_id"], session_id);
}
