use axum::body::Body;
use axum::http::{Request, StatusCode};
use httpmock::prelude::*;
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::integration::common::{TestApp, body_json, setup_test_app};

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

fn repository_json(id: u64, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "full_name": format!("alice/{name}"),
        "html_url": format!("https://github.com/alice/{name}"),
        "description": "SQL Playground Repository",
        "private": false,
        "default_branch": "main"
    })
}

fn contents_json(path: &str) -> Value {
    json!({
        "content": {
            "path": path,
            "sha": "blob-sha",
            "html_url": format!("https://github.com/alice/sql-queries/blob/main/{path}")
        },
        "commit": {"sha": "commit-sha"}
    })
}

#[tokio::test]
async fn lists_repositories_with_user_token() {
    let app = setup_test_app().await;
    let cookie = app.login_as("alice").await;
    let mock = app
        .github
        .mock_async(|when, then| {
            when.method(GET)
                .path("/user/repos")
                .header("authorization", "Bearer gho_alice");
            then.status(200)
                .json_body(json!([repository_json(1, "sql-queries")]));
        })
        .await;

    let (status, json) = send(
        &app,
        Request::get("/api/v1/auth/repositories")
            .header("cookie", &cookie)
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json[0]["full_name"], "alice/sql-queries");
    mock.assert_async().await;
}

#[tokio::test]
async fn creates_repository() {
    let app = setup_test_app().await;
    let cookie = app.login_as("alice").await;
    let mock = app
        .github
        .mock_async(|when, then| {
            when.method(POST).path("/user/repos").json_body(json!({
                "name": "queries",
                "description": "Saved reports",
                "private": false,
                "auto_init": true
            }));
            then.status(201).json_body(repository_json(9, "queries"));
        })
        .await;

    let (status, json) = send(
        &app,
        Request::post("/api/v1/auth/repositories?name=queries&description=Saved%20reports")
            .header("cookie", &cookie)
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["id"], 9);
    mock.assert_async().await;
}

#[tokio::test]
async fn invalid_repository_name_never_reaches_github() {
    let app = setup_test_app().await;
    let cookie = app.login_as("alice").await;
    let mock = app
        .github
        .mock_async(|when, then| {
            when.method(POST).path("/user/repos");
            then.status(201).json_body(repository_json(9, "x"));
        })
        .await;

    let (status, json) = send(
        &app,
        Request::post("/api/v1/auth/repositories?name=bad%20name")
            .header("cookie", &cookie)
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");
    assert_eq!(mock.hits_async().await, 0);
}

#[tokio::test]
async fn commits_file_with_default_message() {
    let app = setup_test_app().await;
    let cookie = app.login_as("alice").await;
    app.github
        .mock_async(|when, then| {
            when.method(GET).path("/repos/alice/sql-queries/contents/q/top.sql");
            then.status(404).json_body(json!({"message": "Not Found"}));
        })
        .await;
    let put = app
        .github
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/repos/alice/sql-queries/contents/q/top.sql")
                .header("authorization", "Bearer gho_alice")
                .json_body(json!({
                    "message": "Add file from SQL Playground",
                    "content": "U0VMRUNUIDE=",
                    "branch": "main"
                }));
            then.status(201).json_body(contents_json("q/top.sql"));
        })
        .await;

    let (status, json) = send(
        &app,
        Request::post("/api/v1/auth/repositories/alice/sql-queries/files?path=q/top.sql&content=SELECT%201")
            .header("cookie", &cookie)
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["path"], "q/top.sql");
    assert_eq!(json["commit_sha"], "commit-sha");
    put.assert_async().await;
}

#[tokio::test]
async fn saves_query_to_own_repository() {
    let app = setup_test_app().await;
    let cookie = app.login_as("alice").await;
    app.github
        .mock_async(|when, then| {
            when.method(GET)
                .path("/repos/alice/sql-queries/contents/reports/top.sql");
            then.status(404).json_body(json!({"message": "Not Found"}));
        })
        .await;
    let put = app
        .github
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/repos/alice/sql-queries/contents/reports/top.sql")
                .json_body_partial(
                    r#"{"message": "Add SQL query from playground: reports/top.sql", "branch": "main"}"#,
                );
            then.status(201).json_body(contents_json("reports/top.sql"));
        })
        .await;

    let (status, json) = send(
        &app,
        Request::post("/api/v1/sql/save-to-git?repository=sql-queries&fileName=reports/top.sql")
            .header("cookie", &cookie)
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::to_vec(&json!({"query": "SELECT * FROM users", "limit": 10}))
                    .unwrap(),
            ))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["path"], "reports/top.sql");
    assert_eq!(json["sha"], "blob-sha");
    put.assert_async().await;
}

#[tokio::test]
async fn github_not_found_passes_through() {
    let app = setup_test_app().await;
    let cookie = app.login_as("alice").await;
    app.github
        .mock_async(|when, then| {
            when.path_contains("/repos/alice/missing/contents/");
            then.status(404).json_body(json!({"message": "Not Found"}));
        })
        .await;

    let (status, json) = send(
        &app,
        Request::post("/api/v1/sql/save-to-git?repository=missing")
            .header("cookie", &cookie)
            .header("content-type", "application/json")
            .body(Body::from(r#"{"query": "SELECT 1"}"#))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "github_error");
}

#[tokio::test]
async fn github_outage_is_bad_gateway() {
    let app = setup_test_app().await;
    let cookie = app.login_as("alice").await;
    app.github
        .mock_async(|when, then| {
            when.method(GET).path("/user/repos");
            then.status(500).json_body(json!({"message": "Server Error"}));
        })
        .await;

    let (status, json) = send(
        &app,
        Request::get("/api/v1/auth/repositories")
            .header("cookie", &cookie)
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["message"], "GitHub API error (HTTP 500): Server Error");
}
