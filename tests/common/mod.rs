#![allow(dead_code)]

use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use kennel_api::api;
use kennel_api::auth::{Identity, TokenService};
use kennel_api::config::AppConfig;
use kennel_api::database::Store;
use kennel_api::state::AppState;
use kennel_api::storage::MemoryStorage;

pub const SECRET: &str = "kennel-test-secret";
pub const ROOT_ID: &str = "root";

/// The whole router over a fresh memory store, driven in-process
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Store,
    pub storage: Arc<MemoryStorage>,
    tokens: TokenService,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestResponse {
    pub fn data(&self) -> &Value {
        &self.body["data"]
    }

    pub fn message(&self) -> &str {
        self.body["message"].as_str().unwrap_or_default()
    }
}

impl TestApp {
    /// Fresh app with a superuser breeder `root` already in the store
    pub async fn new() -> Self {
        let store = Store::memory();
        let storage = Arc::new(MemoryStorage::new());
        let tokens = TokenService::new(SECRET, None).expect("test secret");
        let state = AppState::new(store.clone(), storage.clone(), tokens.clone());
        let router = api::router(state.clone(), &AppConfig::development());

        let app = Self {
            router,
            state,
            store,
            storage,
            tokens,
        };
        let root = Identity {
            id: ROOT_ID.to_string(),
            superuser: true,
        };
        app.state
            .services
            .breeders
            .create(
                json!({
                    "id": ROOT_ID,
                    "firstname": "Root",
                    "lastname": "User",
                    "email": "root@kennel.test",
                    "password": "rootpass",
                    "superuser": true
                }),
                Some(&root),
            )
            .await
            .expect("seed superuser");
        app
    }

    pub fn token(&self, id: &str, superuser: bool) -> String {
        self.tokens
            .issue(&Identity {
                id: id.to_string(),
                superuser,
            })
            .expect("issue token")
    }

    pub fn root_token(&self) -> String {
        self.token(ROOT_ID, true)
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).expect("encode body")))
                .expect("build request"),
            None => builder.body(Body::empty()).expect("build request"),
        };
        self.dispatch(request).await
    }

    pub async fn dispatch(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        TestResponse { status, body }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.send(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.send(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(Method::DELETE, uri, token, None).await
    }

    pub async fn restore(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(Method::POST, &format!("{}/restore", uri), token, None)
            .await
    }

    /// Register a regular breeder through the public endpoint; returns its token
    pub async fn breeder(&self, id: &str, email: &str) -> String {
        let res = self
            .post(
                "/breeders",
                None,
                json!({
                    "id": id,
                    "firstname": "Fred",
                    "lastname": "Astaire",
                    "email": email,
                    "password": "tophat"
                }),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "register {}: {:?}", id, res.body);
        self.token(id, false)
    }

    pub async fn dog(&self, token: &str, body: Value) -> Value {
        let res = self.post("/dogs", Some(token), body).await;
        assert_eq!(res.status, StatusCode::CREATED, "create dog: {:?}", res.body);
        res.data().clone()
    }

    pub async fn litter(&self, token: &str, body: Value) -> Value {
        let res = self.post("/litters", Some(token), body).await;
        assert_eq!(res.status, StatusCode::CREATED, "create litter: {:?}", res.body);
        res.data().clone()
    }

    /// Multipart upload with an `image` file part plus plain text fields
    pub async fn upload(
        &self,
        breeder_id: &str,
        token: &str,
        file_name: &str,
        fields: &[(&str, &str)],
    ) -> TestResponse {
        let boundary = "kennel-test-boundary";
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{file_name}\"\r\nContent-Type: image/png\r\n\r\nnot-really-a-png\r\n--{boundary}--\r\n"
        ));

        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/images/upload/{}", breeder_id))
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .expect("build request");
        self.dispatch(request).await
    }
}

/// Sorted string values of a JSON array
pub fn ids(value: &Value) -> Vec<String> {
    let mut ids: Vec<String> = value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().or_else(|| item["id"].as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    ids.sort();
    ids
}

/// The built `kennel-api` binary on a free port, over the memory store
pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    child: Child,
}

impl TestServer {
    pub fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let child = Command::new(env!("CARGO_BIN_EXE_kennel-api"))
            .args(["--store", "memory", "--port", &port.to_string()])
            .env("APP_ENV", "development")
            .env("JWT_SECRET", SECRET)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .context("failed to spawn server binary")?;

        Ok(Self {
            port,
            base_url,
            child,
        })
    }

    pub async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status() == reqwest::StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!(
            "server did not become ready on {} within {:?}",
            self.base_url,
            timeout
        )
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
