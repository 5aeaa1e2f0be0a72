//! Integration tests for operator device read endpoints.
//!
//! These tests require a running PostgreSQL instance. Set TEST_DATABASE_URL
//! or use the default local test database.

mod common;

use axum::http::{Method, StatusCode};
use common::{
    create_test_app, create_test_device, get_request_with_auth, json_request_with_auth,
    operator_token, parse_response_body, run_migrations, test_config, unique_device_no,
    unique_merchant_id,
};
use serde_json::json;
use tower::ServiceExt;

#[tokio::test]
async fn test_list_devices_is_merchant_scoped() {
    let pool = common::create_test_pool().await;
    run_migrations(&pool).await;
    let app = create_test_app(test_config(), pool.clone());

    let merchant_id = unique_merchant_id();
    let mine = unique_device_no();
    let theirs = unique_device_no();
    create_test_device(&pool, &mine, merchant_id).await;
    create_test_device(&pool, &theirs, unique_merchant_id()).await;

    let token = operator_token(5, "merchant_admin", Some(merchant_id));
    let response = app
        .oneshot(get_request_with_auth("/api/devices?per_page=100", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;

    let device_nos: Vec<&str> = body["devices"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["device_no"].as_str().unwrap())
        .collect();
    assert!(device_nos.contains(&mine.as_str()));
    assert!(!device_nos.contains(&theirs.as_str()));
    assert_eq!(body["total"], 1);
}

#[tokio::test]
async fn test_list_devices_search_filter() {
    let pool = common::create_test_pool().await;
    run_migrations(&pool).await;
    let app = create_test_app(test_config(), pool.clone());

    let merchant_id = unique_merchant_id();
    let device_no = unique_device_no();
    create_test_device(&pool, &device_no, merchant_id).await;

    let token = operator_token(5, "merchant_admin", Some(merchant_id));
    let response = app
        .oneshot(get_request_with_auth(
            &format!("/api/devices?search={}", &device_no[1..8]),
            &token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["devices"][0]["device_no"], device_no.as_str());
}

#[tokio::test]
async fn test_device_detail_reports_active_commands() {
    let pool = common::create_test_pool().await;
    run_migrations(&pool).await;
    let app = create_test_app(test_config(), pool.clone());

    let merchant_id = unique_merchant_id();
    let device_no = unique_device_no();
    create_test_device(&pool, &device_no, merchant_id).await;

    let token = operator_token(1, "superadmin", None);
    let response = app
        .clone()
        .oneshot(json_request_with_auth(
            Method::POST,
            "/api/commands/dispatch",
            json!({"device_ids": [device_no], "command_type": "make_product"}),
            &token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get_request_with_auth(
            &format!("/api/devices/{}", device_no),
            &token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["device"]["device_no"], device_no.as_str());
    assert_eq!(body["active_commands"], 1);
}

#[tokio::test]
async fn test_device_detail_outside_scope_is_not_found() {
    let pool = common::create_test_pool().await;
    run_migrations(&pool).await;
    let app = create_test_app(test_config(), pool.clone());

    let device_no = unique_device_no();
    create_test_device(&pool, &device_no, unique_merchant_id()).await;

    let token = operator_token(6, "merchant_admin", Some(unique_merchant_id()));
    let response = app
        .oneshot(get_request_with_auth(
            &format!("/api/devices/{}", device_no),
            &token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
