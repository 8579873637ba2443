use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client};
use tempfile::TempDir;
use tokio::net::TcpListener;

use signature_service::api::create_router;
use signature_service::blob::MemoryBlobStore;
use signature_service::directory::{InMemoryUserDirectory, User};
use signature_service::notify::{Notifier, RequestNotice};
use signature_service::types::{RequestId, UserId};
use signature_service::{ApiResult, AppState, Config};

/// Notifier that remembers what it was asked to send
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(UserId, RequestId)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, recipient: &UserId, notice: &RequestNotice) -> ApiResult<()> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.clone(), notice.request_id));
        Ok(())
    }
}

impl RecordingNotifier {
    pub async fn wait_for(&self, count: usize) -> Vec<(UserId, RequestId)> {
        for _ in 0..100 {
            let sent = self.sent.lock().unwrap().clone();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.sent.lock().unwrap().clone()
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<AppState>,
    pub notifier: Arc<RecordingNotifier>,
    _dir: TempDir,
}

impl TestServer {
    pub fn client(&self, email: &str) -> TestClient {
        TestClient::new(format!("http://{}", self.addr)).as_user(email)
    }

    pub fn anonymous(&self) -> TestClient {
        TestClient::new(format!("http://{}", self.addr))
    }
}

pub fn user(id: &str) -> User {
    User {
        id: id.into(),
        email: email(id),
        first_name: id.to_string(),
        last_name: "Example".into(),
    }
}

pub fn email(id: &str) -> String {
    format!("{id}@example.com")
}

/// Start a server with users alice, bob, carol and dave
pub async fn start_test_server() -> TestServer {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        upload_dir: dir.path().join("uploads"),
        users_file: dir.path().join("users.json"),
        host: "127.0.0.1".into(),
        port: 0,
        max_upload_bytes: 64 * 1024,
        ..Config::default()
    };

    let directory = Arc::new(InMemoryUserDirectory::with_users(
        ["alice", "bob", "carol", "dave"].map(user),
    ));
    let notifier = Arc::new(RecordingNotifier::default());
    let state = AppState::new(
        config,
        directory,
        Arc::new(MemoryBlobStore::new()),
        notifier.clone(),
    );
    let app = create_router(Arc::clone(&state));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });

    // Wait for server to be ready
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        addr,
        state,
        notifier,
        _dir: dir,
    }
}

/// Test client for API calls
pub struct TestClient {
    pub base_url: String,
    pub client: Client,
    pub principal: Option<String>,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: Client::new(),
            principal: None,
        }
    }

    pub fn as_user(mut self, email: &str) -> Self {
        self.principal = Some(email.to_string());
        self
    }

    fn with_principal(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.principal {
            Some(ref p) => req.header("X-Authenticated-User", p),
            None => req,
        }
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        let req = self.client.get(format!("{}{}", self.base_url, path));
        self.with_principal(req)
            .send()
            .await
            .expect("Failed to send request")
    }

    pub async fn post<T: serde::Serialize>(&self, path: &str, body: &T) -> reqwest::Response {
        let req = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body);
        self.with_principal(req)
            .send()
            .await
            .expect("Failed to send request")
    }

    /// Upload a signed file for `request_id`
    pub async fn sign(&self, request_id: &str, file_name: &str, content: &[u8]) -> reqwest::Response {
        let part = multipart::Part::bytes(content.to_vec())
            .file_name(file_name.to_string())
            .mime_str("application/pdf")
            .expect("Invalid mime type");
        let form = multipart::Form::new().part("file", part);
        let req = self
            .client
            .post(format!(
                "{}/v1/api/sign/sign-by-user?requestId={}",
                self.base_url, request_id
            ))
            .multipart(form);
        self.with_principal(req)
            .send()
            .await
            .expect("Failed to send request")
    }
}

/// Create payload with one signature position per recipient
pub fn create_body(recipients: &[&str]) -> serde_json::Value {
    let recipients: Vec<serde_json::Value> = recipients
        .iter()
        .map(|id| {
            serde_json::json!({
                "userId": id,
                "signed": false,
                "signaturePositions": [{ "page": 1, "x": 100.5, "y": 220.0 }],
            })
        })
        .collect();

    serde_json::json!({
        "title": "Employment contract",
        "templateId": "tpl-employment",
        "emailSubject": "Please sign your contract",
        "emailMessage": "Welcome to the team",
        "recipients": recipients,
    })
}
