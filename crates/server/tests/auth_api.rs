mod common;

use axum::http::StatusCode;
use common::{spawn_app, PASSWORD};
use serde_json::json;

#[tokio::test]
async fn health_check() {
    let app = spawn_app().await;
    let res = app.get("/health", None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(&res.bytes[..], b"OK");
    assert!(res.headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn register_login_and_me() {
    let app = spawn_app().await;
    let (token, id) = app.register("Ada Lovelace", "Ada@Example.com", "student").await;

    let me = app.get("/api/auth/me", Some(&token)).await;
    assert_eq!(me.status, StatusCode::OK);
    let body = me.json();
    assert_eq!(body["data"]["id"], id.as_str());
    assert_eq!(body["data"]["email"], "ada@example.com");
    assert!(body["data"].get("password_hash").is_none());

    let login = app
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "ada@example.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(login.status, StatusCode::OK);
    assert_eq!(login.json()["user"]["role"], "student");
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let app = spawn_app().await;
    app.register("Ada", "ada@example.com", "student").await;

    let res = app
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "ada@example.com", "password": "not-it" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.json()["success"], false);
}

#[tokio::test]
async fn duplicate_email_is_rejected() {
    let app = spawn_app().await;
    app.register("Ada", "ada@example.com", "student").await;

    let res = app
        .post(
            "/api/auth/register",
            None,
            json!({ "name": "Other", "email": " ADA@example.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_cannot_self_register() {
    let app = spawn_app().await;
    let res = app
        .post(
            "/api/auth/register",
            None,
            json!({ "name": "Mallory", "email": "m@example.com", "password": PASSWORD, "role": "admin" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn missing_or_bad_token_is_401_not_403() {
    let app = spawn_app().await;

    let res = app.get("/api/auth/me", None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = app.get("/api/enrollments/my-courses", Some("garbage")).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    // Authenticated but lacking the role
    let (token, _) = app.register("Sam", "sam@example.com", "student").await;
    let res = app.get("/api/admin/pending-enrollments", Some(&token)).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn profile_and_password_updates() {
    let app = spawn_app().await;
    let (token, _) = app.register("Ada", "ada@example.com", "student").await;
    app.register("Bob", "bob@example.com", "student").await;

    let taken = app
        .put("/api/users/profile", Some(&token), json!({ "email": "bob@example.com" }))
        .await;
    assert_eq!(taken.status, StatusCode::BAD_REQUEST);

    let renamed = app
        .put("/api/users/profile", Some(&token), json!({ "name": "Ada King" }))
        .await;
    assert_eq!(renamed.status, StatusCode::OK);
    assert_eq!(renamed.json()["data"]["name"], "Ada King");

    let wrong = app
        .put(
            "/api/users/password",
            Some(&token),
            json!({ "current_password": "nope", "new_password": "another-secret" }),
        )
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);

    let changed = app
        .put(
            "/api/users/password",
            Some(&token),
            json!({ "current_password": PASSWORD, "new_password": "another-secret" }),
        )
        .await;
    assert_eq!(changed.status, StatusCode::OK);

    let login = app
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "ada@example.com", "password": "another-secret" }),
        )
        .await;
    assert_eq!(login.status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_api_route_is_json_404() {
    let app = spawn_app().await;
    let res = app.get("/api/nothing-here", None).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.json()["success"], false);
}
