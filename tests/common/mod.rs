#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use rusqlite::params;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use wishd::config::Config;
use wishd::db;
use wishd::enrichment::EnrichmentQueue;
use wishd::state::{AppState, DbPool};

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub pool: DbPool,
    _temp_dir: TempDir,
}

pub fn test_config(temp_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.database.path = Some(temp_dir.path().join("test.db"));
    config.storage.path = Some(temp_dir.path().join("uploads"));
    config
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_enrichment(None)
    }

    pub fn with_enrichment(queue: Option<EnrichmentQueue>) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);
        let pool = db::create_pool(&config.db_path()).expect("Failed to create test database");
        db::run_migrations(&pool).expect("Failed to run migrations");

        for user in ["alice", "bob", "carol"] {
            insert_user(&pool, user);
        }

        let state = AppState::new(pool.clone(), config, queue);
        Self {
            router: wishd::routes::app(state.clone()),
            state,
            pool,
            _temp_dir: temp_dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::Null)
        };
        (status, payload)
    }

    pub async fn get(&self, uri: &str, user: Option<&str>) -> (StatusCode, Value) {
        self.send(request("GET", uri, user, Body::empty())).await
    }

    pub async fn delete(&self, uri: &str, user: Option<&str>) -> (StatusCode, Value) {
        self.send(request("DELETE", uri, user, Body::empty())).await
    }

    pub async fn post_json(&self, uri: &str, user: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(json_request("POST", uri, user, body)).await
    }

    pub async fn put_json(&self, uri: &str, user: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(json_request("PUT", uri, user, body)).await
    }

    pub async fn delete_json(
        &self,
        uri: &str,
        user: Option<&str>,
        body: Value,
    ) -> (StatusCode, Value) {
        self.send(json_request("DELETE", uri, user, body)).await
    }

    /// Create a wish through the API and return its id.
    pub async fn create_wish(&self, user: &str, body: Value) -> String {
        let (status, wish) = self.post_json("/wishes", Some(user), body).await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {}", wish);
        wish["id"].as_str().unwrap().to_string()
    }
}

pub fn insert_user(pool: &DbPool, id: &str) {
    let conn = pool.get().unwrap();
    conn.execute(
        "INSERT INTO users (id, username, name) VALUES (?1, ?1, ?2)",
        params![id, format!("User {}", id)],
    )
    .unwrap();
}

pub fn request(method: &str, uri: &str, user: Option<&str>, body: Body) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(body).unwrap()
}

pub fn json_request(method: &str, uri: &str, user: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub const BOUNDARY: &str = "wishd-test-boundary";

/// A multipart body with a `photo` file part followed by plain text parts.
pub fn multipart_body(file_name: &str, data: &[u8], fields: &[(&str, &str)]) -> Body {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"photo\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
            BOUNDARY, file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(b"\r\n");

    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    Body::from(body)
}

pub fn multipart_request(uri: &str, user: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-user-id", user)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(body)
        .unwrap()
}
