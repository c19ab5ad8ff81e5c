use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::integration::common::{DEV_SERVER_URL, TestApp, body_json, setup_test_app};

async fn post_sql(app: &TestApp, cookie: &str, path: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .router
        .clone()
        .oneshot(
            Request::post(path)
                .header("cookie", cookie)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

async fn execute(app: &TestApp, cookie: &str, body: Value) -> (StatusCode, Value) {
    post_sql(app, cookie, "/api/v1/sql/execute", body).await
}

async fn get_json(app: &TestApp, cookie: &str, path: &str) -> (StatusCode, Value) {
    let response = app
        .router
        .clone()
        .oneshot(
            Request::get(path)
                .header("cookie", cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

#[tokio::test]
async fn health_returns_200() {
    let app = setup_test_app().await;

    let response = app
        .router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["database"], "ok");
}

#[tokio::test]
async fn unauthenticated_request_returns_401() {
    let app = setup_test_app().await;

    let response = app
        .router
        .oneshot(
            Request::post("/api/v1/sql/execute")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"query": "SELECT 1"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["error"], "unauthorized");
}

#[tokio::test]
async fn unknown_session_returns_401() {
    let app = setup_test_app().await;

    let (status, _) = get_json(&app, "PLAYGROUND_SESSION=not-a-session", "/api/v1/sql/schema").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn execute_select_returns_rows() {
    let app = setup_test_app().await;
    let cookie = app.login_as("alice").await;

    let (status, json) = execute(
        &app,
        &cookie,
        json!({"query": "SELECT id, username FROM users ORDER BY id"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["message"], "Query executed successfully by user: alice");
    assert_eq!(json["rowsAffected"], 5);
    assert_eq!(json["truncated"], false);
    assert_eq!(json["data"].as_array().unwrap().len(), 5);
    assert_eq!(json["data"][0]["username"], "alice");
    assert_eq!(json["columns"][0]["name"], "id");
    assert_eq!(json["columns"][0]["type"], "INTEGER");
    assert!(json["executionTime"].is_u64());
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn execute_binds_indexed_parameters() {
    let app = setup_test_app().await;
    let cookie = app.login_as("alice").await;

    let (status, json) = execute(
        &app,
        &cookie,
        json!({
            "query": "SELECT username FROM users WHERE id > ? ORDER BY id",
            "parameters": {"1": 3}
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"], json!([{"username": "dave"}, {"username": "eve"}]));
}

#[tokio::test]
async fn execute_applies_limit() {
    let app = setup_test_app().await;
    let cookie = app.login_as("alice").await;

    let (status, json) = execute(
        &app,
        &cookie,
        json!({"query": "SELECT * FROM orders", "limit": 2}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"].as_array().unwrap().len(), 2);
    assert_eq!(json["rowsAffected"], 2);
    assert_eq!(json["truncated"], true);
}

#[tokio::test]
async fn forbidden_statements_never_run() {
    let app = setup_test_app().await;
    let cookie = app.login_as("alice").await;

    for query in [
        "ATTACH DATABASE 'other.db' AS other",
        "PRAGMA writable_schema = ON",
        "DELETE FROM users; DELETE FROM orders",
        "SELECT load_extension('evil')",
        "SELECT 1 trigger, 2 begin; ATTACH DATABASE 'other.db' AS other",
        "SELECT 1 AS trigger, 2 AS begin; BEGIN",
    ] {
        let (status, json) = execute(&app, &cookie, json!({ "query": query })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{query}");
        assert_eq!(json["success"], false);
        assert_eq!(json["errorCode"], "SQL002", "{query}");
    }

    let (_, json) = execute(&app, &cookie, json!({"query": "SELECT COUNT(*) AS n FROM users"})).await;
    assert_eq!(json["data"][0]["n"], 5);
}

#[tokio::test]
async fn schema_changes_report_no_rows() {
    let app = setup_test_app().await;
    let cookie = app.login_as("alice").await;

    let (_, json) = execute(&app, &cookie, json!({"query": "DELETE FROM orders WHERE id = 1"})).await;
    assert_eq!(json["rowsAffected"], 1);

    for query in ["CREATE TABLE notes (body TEXT)", "DROP TABLE notes"] {
        let (status, json) = execute(&app, &cookie, json!({ "query": query })).await;
        assert_eq!(status, StatusCode::OK, "{query}");
        assert_eq!(json["rowsAffected"], 0, "{query}");
    }
}

#[tokio::test]
async fn sql_errors_carry_codes() {
    let app = setup_test_app().await;
    let cookie = app.login_as("alice").await;

    let (status, json) = execute(&app, &cookie, json!({"query": "SELECT FROM users"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["errorCode"], "SQL001");

    let (status, json) = execute(
        &app,
        &cookie,
        json!({"query": "SELECT * FROM users WHERE id = ?", "parameters": [1, 2]}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["errorCode"], "SQL003");

    let (status, json) = execute(
        &app,
        &cookie,
        json!({"query": "INSERT INTO users (id, username) VALUES (1, 'dup')"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["errorCode"], "SQL005");
}

#[tokio::test]
async fn runaway_query_returns_408() {
    let app = setup_test_app().await;
    let cookie = app.login_as("alice").await;

    let (status, json) = execute(
        &app,
        &cookie,
        json!({
            "query": "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) SELECT max(x) FROM c",
            "timeout": 1
        }),
    )
    .await;

    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(json["success"], false);
    assert_eq!(json["errorCode"], "SQL004");
}

#[tokio::test]
async fn invalid_request_returns_validation_error() {
    let app = setup_test_app().await;
    let cookie = app.login_as("alice").await;

    let (status, json) = execute(&app, &cookie, json!({"query": "   "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");

    let (status, json) = execute(&app, &cookie, json!({"query": "SELECT 1", "limit": 0})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");

    // Rejected requests are not part of the history.
    let (_, json) = get_json(&app, &cookie, "/api/v1/sql/history").await;
    assert_eq!(json["total"], 0);
}

#[tokio::test]
async fn malformed_json_is_rejected() {
    let app = setup_test_app().await;
    let cookie = app.login_as("alice").await;

    let response = app
        .router
        .oneshot(
            Request::post("/api/v1/sql/execute")
                .header("cookie", cookie)
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let app = setup_test_app().await;
    let cookie = app.login_as("alice").await;
    let body = serde_json::to_vec(&json!({"query": "x".repeat(70 * 1024)})).unwrap();

    let response = app
        .router
        .oneshot(
            Request::post("/api/v1/sql/execute")
                .header("cookie", cookie)
                .header("content-type", "application/json")
                .header("content-length", body.len())
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn validate_reports_without_executing() {
    let app = setup_test_app().await;
    let cookie = app.login_as("alice").await;

    let (status, json) = post_sql(
        &app,
        &cookie,
        "/api/v1/sql/validate",
        json!({"query": "DELETE FROM users"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["message"], "Query syntax is valid");

    let (status, json) = post_sql(
        &app,
        &cookie,
        "/api/v1/sql/validate",
        json!({"query": "SELECT * FROM missing_table"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], false);
    assert_eq!(json["errorCode"], "SQL001");

    let (_, json) = execute(&app, &cookie, json!({"query": "SELECT COUNT(*) AS n FROM users"})).await;
    assert_eq!(json["data"][0]["n"], 5);
}

#[tokio::test]
async fn history_is_per_user_and_newest_first() {
    let app = setup_test_app().await;
    let alice = app.login_as("alice").await;
    let bob = app.login_as("bob").await;

    execute(&app, &alice, json!({"query": "SELECT 1"})).await;
    execute(&app, &alice, json!({"query": "SELECT * FROM nowhere"})).await;
    execute(&app, &bob, json!({"query": "SELECT 2"})).await;

    let (status, json) = get_json(&app, &alice, "/api/v1/sql/history").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 2);

    let queries = json["queries"].as_array().unwrap();
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0]["query"], "SELECT * FROM nowhere");
    assert_eq!(queries[0]["success"], false);
    assert_eq!(queries[0]["errorCode"], "SQL001");
    assert_eq!(queries[1]["query"], "SELECT 1");
    assert_eq!(queries[1]["success"], true);

    let (_, json) = get_json(&app, &alice, "/api/v1/sql/history?limit=1").await;
    assert_eq!(json["queries"].as_array().unwrap().len(), 1);
    assert_eq!(json["total"], 2);

    let (_, json) = get_json(&app, &bob, "/api/v1/sql/history").await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["queries"][0]["query"], "SELECT 2");
}

#[tokio::test]
async fn schema_describes_sandbox() {
    let app = setup_test_app().await;
    let cookie = app.login_as("alice").await;

    let (status, json) = get_json(&app, &cookie, "/api/v1/sql/schema").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["user"], "alice");
    assert_eq!(json["message"], "Database schema information for user: alice");

    let names: Vec<&str> = json["tables"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["orders", "products", "users"]);
    assert_eq!(json["tables"][2]["type"], "table");
}

#[tokio::test]
async fn sandboxes_are_isolated_and_resettable() {
    let app = setup_test_app().await;
    let alice = app.login_as("alice").await;
    let bob = app.login_as("bob").await;

    let (_, json) = execute(&app, &alice, json!({"query": "DELETE FROM orders"})).await;
    assert_eq!(json["rowsAffected"], 7);

    let count = json!({"query": "SELECT COUNT(*) AS n FROM orders"});
    let (_, json) = execute(&app, &alice, count.clone()).await;
    assert_eq!(json["data"][0]["n"], 0);
    let (_, json) = execute(&app, &bob, count.clone()).await;
    assert_eq!(json["data"][0]["n"], 7);

    let response = app
        .router
        .clone()
        .oneshot(
            Request::post("/api/v1/sql/reset")
                .header("cookie", &alice)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let (_, json) = execute(&app, &alice, count).await;
    assert_eq!(json["data"][0]["n"], 7);
}

#[tokio::test]
async fn openapi_document_is_public() {
    let app = setup_test_app().await;

    let response = app
        .router
        .oneshot(
            Request::get("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["info"]["title"], "SQL Playground API");
    assert_eq!(json["info"]["version"], "1.0.0");
    assert_eq!(json["servers"][0]["url"], DEV_SERVER_URL);
    assert_eq!(json["components"]["securitySchemes"]["GitHubOAuth"]["type"], "oauth2");
    assert_eq!(json["components"]["securitySchemes"]["bearer"]["scheme"], "bearer");
    assert!(json["paths"]["/api/v1/sql/execute"]["post"].is_object());
}
