#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body, Bytes},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use courseware_server::{
    app,
    config::Config,
    db::Database,
    services::mailer::{Email, MailError, Mailer, MailerState},
    AppState,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

pub const ADMIN_EMAIL: &str = "admin@academy.test";
pub const ADMIN_PASSWORD: &str = "admin-password";
pub const PASSWORD: &str = "secret123";

/// Keeps every message instead of delivering it.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<Email>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

/// Rejects every message, like a mail provider that is down.
pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _email: Email) -> Result<(), MailError> {
        Err(MailError::Rejected(reqwest::StatusCode::BAD_GATEWAY))
    }
}

pub struct TestApp {
    pub router: Router,
    pub db: Database,
    pub outbox: Arc<RecordingMailer>,
}

pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub bytes: Bytes,
}

impl Response {
    pub fn json(&self) -> Value {
        if self.bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&self.bytes).unwrap()
        }
    }
}

fn test_config() -> Config {
    Config {
        frontend_url: "http://academy.test".to_string(),
        ..Config::default()
    }
}

pub async fn spawn_app() -> TestApp {
    let outbox = Arc::new(RecordingMailer::default());
    build(test_config(), outbox.clone(), outbox).await
}

pub async fn spawn_app_with_mailer(mailer: MailerState) -> TestApp {
    build(test_config(), mailer, Arc::new(RecordingMailer::default())).await
}

/// App backed by a real database file, for tests that need several
/// connections writing at once.
pub async fn spawn_app_on_disk(path: &Path) -> TestApp {
    let config = Config {
        database_url: format!("sqlite://{}?mode=rwc", path.display()),
        ..test_config()
    };
    let outbox = Arc::new(RecordingMailer::default());
    build(config, outbox.clone(), outbox).await
}

/// A fresh database path under the system temp dir, removed on drop.
pub struct TempDb(pub PathBuf);

impl TempDb {
    pub fn new() -> Self {
        Self(std::env::temp_dir().join(format!("courseware-{}.db", Uuid::new_v4())))
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", self.0.display()));
        }
    }
}

async fn build(config: Config, mailer: MailerState, outbox: Arc<RecordingMailer>) -> TestApp {
    let db = Database::connect(&config.database_url).await.unwrap();
    db.run_migrations().await.unwrap();
    db.ensure_admin(ADMIN_EMAIL, ADMIN_PASSWORD).await.unwrap();

    let state = AppState {
        db: db.clone(),
        config,
        mailer,
    };

    TestApp {
        router: app(state),
        db,
        outbox,
    }
}

impl TestApp {
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        call(self.router.clone(), request(method, uri, token, body)).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Response {
        self.send(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> Response {
        self.send(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> Response {
        self.send(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> Response {
        self.send(Method::DELETE, uri, token, None).await
    }

    /// Registers an account and returns `(token, user id)`.
    pub async fn register(&self, name: &str, email: &str, role: &str) -> (String, String) {
        let res = self
            .post(
                "/api/auth/register",
                None,
                json!({ "name": name, "email": email, "password": PASSWORD, "role": role }),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "{:?}", res.json());
        let body = res.json();
        (
            body["token"].as_str().unwrap().to_string(),
            body["user"]["id"].as_str().unwrap().to_string(),
        )
    }

    pub async fn admin_token(&self) -> String {
        let res = self
            .post(
                "/api/auth/login",
                None,
                json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD }),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK);
        res.json()["token"].as_str().unwrap().to_string()
    }

    pub async fn create_course(&self, token: &str, title: &str, price: i64) -> String {
        let res = self
            .post(
                "/api/courses",
                Some(token),
                json!({
                    "title": title,
                    "description": "Hands-on introduction",
                    "price": price,
                    "category": "Data Science",
                    "is_published": true,
                }),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "{:?}", res.json());
        res.json()["data"]["id"].as_str().unwrap().to_string()
    }

    pub async fn create_module(&self, token: &str, course_id: &str, title: &str) -> String {
        let res = self
            .post(
                &format!("/api/courses/{course_id}/modules"),
                Some(token),
                json!({ "title": title }),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "{:?}", res.json());
        res.json()["data"]["id"].as_str().unwrap().to_string()
    }

    pub async fn create_lesson(&self, token: &str, module_id: &str, body: Value) -> String {
        let res = self
            .post(&format!("/api/modules/{module_id}/lessons"), Some(token), body)
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "{:?}", res.json());
        res.json()["data"]["id"].as_str().unwrap().to_string()
    }

    pub async fn count(&self, sql: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(sql)
            .fetch_one(&self.db.pool)
            .await
            .unwrap()
    }
}

pub fn request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Drives one request through an owned router, so callers can run it on a
/// spawned task.
pub async fn call(router: Router, request: Request<Body>) -> Response {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    Response {
        status,
        headers,
        bytes,
    }
}

pub fn video(title: &str) -> Value {
    json!({ "title": title, "type": "video", "video_url": "https://video.test/1", "duration": 300 })
}
