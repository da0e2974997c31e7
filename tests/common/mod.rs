//! Common test utilities for E2E tests

#![allow(dead_code)]

use serde_json::Value;
use tempfile::TempDir;
use threadline::data::{NewUser, User};
use threadline::{AppState, config};
use tokio::net::TcpListener;

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        // Temporary directory for the database and uploaded media
        let temp_dir = TempDir::new().unwrap();

        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
            },
            database: config::DatabaseConfig {
                path: temp_dir.path().join("test.db"),
            },
            storage: config::StorageConfig {
                backend: config::StorageBackend::Local,
                local: config::LocalStorageConfig {
                    root: temp_dir.path().join("uploads"),
                    public_path: "/uploads".to_string(),
                },
                r2: config::R2StorageConfig::default(),
            },
            pagination: config::PaginationConfig::default(),
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };
        config.validate().unwrap();
        threadline::metrics::init_metrics();

        // Initialize app state
        let state = AppState::new(config).await.unwrap();

        // Create HTTP client
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = threadline::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait a bit for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Self {
            addr: addr_str,
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Provision a user and a bearer token for it
    pub async fn create_user(&self, username: &str) -> (User, String) {
        let user = self
            .state
            .db
            .insert_user(&NewUser {
                username: username.to_string(),
                email: format!("{}@example.com", username),
                display_name: Some(format!("{} display", username)),
            })
            .await
            .unwrap();

        let token = threadline::auth::generate_access_token();
        self.state
            .db
            .insert_access_token(user.id, &token)
            .await
            .unwrap();

        (user, token)
    }

    /// POST a JSON body as `token`, returning status and parsed body
    pub async fn post_json(&self, token: &str, path: &str, body: Value) -> (u16, Value) {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    /// GET `path`, optionally authenticated
    pub async fn get_json(&self, token: Option<&str>, path: &str) -> (u16, Value) {
        let mut request = self.client.get(self.url(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    /// Create a thread as `token` and return its id
    pub async fn create_thread(&self, token: &str, content: &str, parent_id: Option<i64>) -> i64 {
        let (status, body) = self
            .post_json(
                token,
                "/api/threads",
                serde_json::json!({ "content": content, "parentId": parent_id }),
            )
            .await;
        assert_eq!(status, 201, "create thread failed: {}", body);
        body["id"].as_i64().unwrap()
    }
}
