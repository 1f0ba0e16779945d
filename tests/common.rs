//! Shared helpers for router-level tests.
//!
//! [`TestApp`] builds the full router over an in-memory database and blob
//! store and drives it with `tower::ServiceExt::oneshot`; no socket is bound.

#![allow(dead_code)]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use burnshare::config::{HeaderConfig, MailConfig, RateLimitConfig};
use burnshare::daemon::http::{AppState, router};
use burnshare::daemon::services::blob::BlobStore;
use burnshare::daemon::services::db::SqliteRepository;
use burnshare::daemon::services::geo::{GeoTable, NoLocator, SharedLocator};
use burnshare::daemon::services::notify::{LogNotifier, Mailer};
use burnshare::lifecycle::LifecycleManager;
use burnshare::policy::AccessPolicy;
use burnshare::reliability::RateLimiter;

pub const BOUNDARY: &str = "burnshare-test-boundary";

pub struct TestAppBuilder {
    max_upload_bytes: usize,
    rate_limit: Option<RateLimitConfig>,
    geo_table: Option<String>,
    blocked_agents: Vec<String>,
}

impl TestAppBuilder {
    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    pub fn rate_limit(mut self, rps: f64, burst: u32) -> Self {
        self.rate_limit = Some(RateLimitConfig {
            rps,
            burst,
            ..RateLimitConfig::default()
        });
        self
    }

    pub fn geo_table(mut self, toml: &str) -> Self {
        self.geo_table = Some(toml.to_string());
        self
    }

    pub fn block_agent(mut self, pattern: &str) -> Self {
        self.blocked_agents.push(pattern.to_string());
        self
    }

    pub fn build(self) -> TestApp {
        let repo = Arc::new(SqliteRepository::memory().expect("in-memory database"));
        let mailer = Mailer::new(&MailConfig::default(), Arc::new(LogNotifier))
            .expect("default templates parse");
        let manager = LifecycleManager::new(repo, BlobStore::memory(), mailer)
            .with_policy(AccessPolicy::new(self.blocked_agents));

        let locator: SharedLocator = match self.geo_table {
            Some(table) => Arc::new(GeoTable::parse(&table).expect("valid geo table")),
            None => Arc::new(NoLocator),
        };
        let limiter = self.rate_limit.map(|config| {
            Arc::new(RateLimiter::from_config(&config).expect("valid rate limit"))
        });

        let state = Arc::new(AppState {
            manager,
            limiter,
            locator,
            headers: HeaderConfig {
                trust_forwarded_for: true,
                ..HeaderConfig::default()
            },
            max_upload_bytes: self.max_upload_bytes,
            max_upload_mib: 25,
        });

        TestApp {
            router: router(state, Duration::from_secs(30)),
        }
    }
}

pub struct TestApp {
    router: Router,
}

impl TestApp {
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder {
            max_upload_bytes: 1024 * 1024,
            rate_limit: None,
            geo_table: None,
            blocked_agents: Vec::new(),
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn get(&self, path: &str) -> Response<Body> {
        self.send(Request::get(path).body(Body::empty()).unwrap())
            .await
    }

    /// Upload `data` with extra text fields; returns the raw response.
    pub async fn upload(&self, data: &[u8], fields: &[(&str, &str)]) -> Response<Body> {
        self.send(
            Request::post("/api/v1/files")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(multipart_body(Some(data), fields)))
                .unwrap(),
        )
        .await
    }

    /// Upload and return `(fileId, ownerToken)`, asserting success.
    pub async fn upload_ok(&self, data: &[u8], fields: &[(&str, &str)]) -> (String, String) {
        let resp = self.upload(data, fields).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = json(resp).await;
        (
            body["fileId"].as_str().unwrap().to_string(),
            body["ownerToken"].as_str().unwrap().to_string(),
        )
    }

    pub async fn download_from(&self, file_id: &str, ip: &str) -> Response<Body> {
        self.send(
            Request::get(format!("/api/v1/files/{file_id}"))
                .header("x-forwarded-for", ip)
                .header("user-agent", "Mozilla/5.0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn validate(&self, file_id: &str, owner_token: &str) -> serde_json::Value {
        let payload = serde_json::json!([{ "fileId": file_id, "ownerToken": owner_token }]);
        let resp = self
            .send(
                Request::post("/api/v1/files/validate")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        json(resp).await["fileInfo"][file_id].clone()
    }
}

pub fn multipart_body(file: Option<&[u8]>, fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(data) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"notes.txt\"\r\nContent-Type: text/plain\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn bytes(resp: Response<Body>) -> Vec<u8> {
    to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body")
        .to_vec()
}

pub async fn json(resp: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&bytes(resp).await).expect("JSON body")
}

pub async fn message(resp: Response<Body>) -> String {
    json(resp).await["message"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}
