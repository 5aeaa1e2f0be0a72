//! Integration tests for the device-facing polling and result endpoints.
//!
//! These tests require a running PostgreSQL instance. Set TEST_DATABASE_URL
//! or use the default local test database.

mod common;

use axum::http::{Method, StatusCode};
use common::{
    create_test_app, create_test_device, get_request, json_request, json_request_with_auth,
    operator_token, parse_response_body, run_migrations, test_config, unique_device_no,
    unique_merchant_id,
};
use serde_json::json;
use tower::ServiceExt;

async fn dispatch_one(
    app: &axum::Router,
    device_no: &str,
    command_type: &str,
    priority: i32,
) -> String {
    let token = operator_token(1, "superadmin", None);
    let response = app
        .clone()
        .oneshot(json_request_with_auth(
            Method::POST,
            "/api/commands/dispatch",
            json!({
                "device_ids": [device_no],
                "command_type": command_type,
                "priority": priority
            }),
            &token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    parse_response_body(response).await["batch_id"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_poll_unknown_device_returns_404() {
    let pool = common::create_test_pool().await;
    run_migrations(&pool).await;
    let app = create_test_app(test_config(), pool.clone());

    let response = app
        .oneshot(get_request("/api/devices/D-MISSING/commands/pending"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_poll_marks_sent_and_repolls_idempotently() {
    let pool = common::create_test_pool().await;
    run_migrations(&pool).await;
    let app = create_test_app(test_config(), pool.clone());

    let device_no = unique_device_no();
    let device_id = create_test_device(&pool, &device_no, unique_merchant_id()).await;
    dispatch_one(&app, &device_no, "open_door", 0).await;

    // First poll delivers the command and flips it to sent.
    let response = app
        .clone()
        .oneshot(get_request(&format!(
            "/api/devices/{}/commands/pending",
            device_no
        )))
        .await
        .unwrap();
    let first = parse_response_body(response).await;
    assert_eq!(first.as_array().unwrap().len(), 1);
    let command_id = first[0]["command_id"].as_str().unwrap().to_string();

    let (status, attempts): (String, i32) = sqlx::query_as(
        "SELECT status, attempt_count FROM commands WHERE command_id = $1",
    )
    .bind(&command_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(status, "sent");
    assert_eq!(attempts, 1);

    // Polling again without a result report returns the same command and
    // does not count another delivery attempt.
    let response = app
        .clone()
        .oneshot(get_request(&format!(
            "/api/devices/{}/commands/pending",
            device_no
        )))
        .await
        .unwrap();
    let second = parse_response_body(response).await;
    assert_eq!(second.as_array().unwrap().len(), 1);
    assert_eq!(second[0]["command_id"], command_id.as_str());

    let (_, attempts): (String, i32) = sqlx::query_as(
        "SELECT status, attempt_count FROM commands WHERE command_id = $1",
    )
    .bind(&command_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(attempts, 1);

    // Polling updates device presence.
    let (last_seen,): (Option<chrono::DateTime<chrono::Utc>>,) =
        sqlx::query_as("SELECT last_seen FROM devices WHERE id = $1")
            .bind(device_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(last_seen.is_some());
}

#[tokio::test]
async fn test_poll_orders_by_priority_then_age() {
    let pool = common::create_test_pool().await;
    run_migrations(&pool).await;
    let app = create_test_app(test_config(), pool.clone());

    let device_no = unique_device_no();
    create_test_device(&pool, &device_no, unique_merchant_id()).await;

    dispatch_one(&app, &device_no, "sync_menu", 0).await;
    dispatch_one(&app, &device_no, "open_door", 5).await;

    let response = app
        .oneshot(get_request(&format!(
            "/api/devices/{}/commands/pending",
            device_no
        )))
        .await
        .unwrap();
    let commands = parse_response_body(response).await;
    assert_eq!(commands.as_array().unwrap().len(), 2);
    assert_eq!(commands[0]["type"], "open_door");
    assert_eq!(commands[1]["type"], "sync_menu");
}

#[tokio::test]
async fn test_report_result_for_unknown_command_is_audited_not_rejected() {
    let pool = common::create_test_pool().await;
    run_migrations(&pool).await;
    let app = create_test_app(test_config(), pool.clone());

    let device_no = unique_device_no();
    let device_id = create_test_device(&pool, &device_no, unique_merchant_id()).await;

    let response = app
        .oneshot(json_request(
            Method::POST,
            &format!("/api/devices/{}/command_result", device_no),
            json!({"command_id": "cmd-never-issued", "status": "success"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["ok"], true);

    // The orphaned outcome still lands in the audit log.
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM command_results WHERE command_id = 'cmd-never-issued' AND device_id = $1",
    )
    .bind(device_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_duplicate_result_keeps_first_outcome() {
    let pool = common::create_test_pool().await;
    run_migrations(&pool).await;
    let app = create_test_app(test_config(), pool.clone());

    let device_no = unique_device_no();
    create_test_device(&pool, &device_no, unique_merchant_id()).await;
    dispatch_one(&app, &device_no, "reboot", 0).await;

    let response = app
        .clone()
        .oneshot(get_request(&format!(
            "/api/devices/{}/commands/pending",
            device_no
        )))
        .await
        .unwrap();
    let commands = parse_response_body(response).await;
    let command_id = commands[0]["command_id"].as_str().unwrap().to_string();

    for status in ["success", "fail"] {
        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                &format!("/api/devices/{}/command_result", device_no),
                json!({"command_id": command_id, "status": status}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    // The second (contradictory) report did not overwrite the first.
    let (status,): (String,) =
        sqlx::query_as("SELECT status FROM commands WHERE command_id = $1")
            .bind(&command_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(status, "success");

    // Both reports were audited.
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM command_results WHERE command_id = $1")
            .bind(&command_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn test_report_result_rejects_invalid_status() {
    let pool = common::create_test_pool().await;
    run_migrations(&pool).await;
    let app = create_test_app(test_config(), pool.clone());

    let device_no = unique_device_no();
    create_test_device(&pool, &device_no, unique_merchant_id()).await;

    let response = app
        .oneshot(json_request(
            Method::POST,
            &format!("/api/devices/{}/command_result", device_no),
            json!({"command_id": "cmd-x", "status": "pending"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_report_result_unknown_device_returns_404() {
    let pool = common::create_test_pool().await;
    run_migrations(&pool).await;
    let app = create_test_app(test_config(), pool.clone());

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/devices/D-MISSING/command_result",
            json!({"command_id": "cmd-x", "status": "success"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
