//! Application state for the signature request service
//!
//! `AppState` is the lifecycle engine: it resolves callers, runs the create
//! and sign flows against the request store, and owns persistence of that
//! store to disk.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::interval;
use uuid::Uuid;

use crate::auth::{validate_create_request, validate_upload};
use crate::blob::{download_name, BlobStore, ContentHint, LocalBlobStore};
use crate::config::Config;
use crate::directory::{InMemoryUserDirectory, UserDirectory};
use crate::error::{ApiError, ApiResult};
use crate::notify::{self, LogNotifier, Notifier, RequestNotice};
use crate::store::RequestStore;
use crate::types::*;

/// Global application state
pub struct AppState {
    /// All signature requests
    pub requests: RequestStore,
    /// Principal and user lookup
    pub directory: Arc<dyn UserDirectory>,
    /// Signed file storage
    pub blobs: Arc<dyn BlobStore>,
    /// Recipient notifications
    pub notifier: Arc<dyn Notifier>,
    /// Configuration
    pub config: Config,
    /// Start time for uptime calculation
    pub start_time: Instant,
    /// Persistence dirty flag
    dirty: AtomicBool,
    /// Notify for immediate save
    persist_notify: Notify,
    /// Shutdown flag
    shutdown: AtomicBool,
    /// Last persist time
    pub last_persist: std::sync::RwLock<Option<DateTime<Utc>>>,
}

impl AppState {
    pub fn new(
        config: Config,
        directory: Arc<dyn UserDirectory>,
        blobs: Arc<dyn BlobStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        Arc::new(Self {
            requests: RequestStore::new(),
            directory,
            blobs,
            notifier,
            config,
            start_time: Instant::now(),
            dirty: AtomicBool::new(false),
            persist_notify: Notify::new(),
            shutdown: AtomicBool::new(false),
            last_persist: std::sync::RwLock::new(None),
        })
    }

    /// Wire up the default collaborators: users file, local disk uploads,
    /// log-only notifications
    pub async fn from_config(config: Config) -> anyhow::Result<Arc<Self>> {
        let directory: Arc<dyn UserDirectory> =
            Arc::new(InMemoryUserDirectory::load_from_file(&config.users_file).await?);
        let blobs = Arc::new(LocalBlobStore::new(config.upload_dir.clone()));
        let swept = blobs.sweep_partial().await?;
        if swept > 0 {
            tracing::info!("Removed {} unfinished uploads from {:?}", swept, config.upload_dir);
        }
        let notifier = Arc::new(LogNotifier::new(Arc::clone(&directory)));
        Ok(Self::new(config, directory, blobs, notifier))
    }

    /// Load state from disk
    pub async fn load_from_disk(self: &Arc<Self>) -> anyhow::Result<()> {
        let path = self.config.state_file_path();

        if path.exists() {
            let json = tokio::fs::read_to_string(&path).await?;
            let snapshot: StateSnapshot = serde_json::from_str(&json)?;
            self.requests.restore(snapshot.requests);

            tracing::info!(
                "Loaded state: {} signature requests (saved at {})",
                self.requests.len(),
                snapshot.saved_at
            );
        } else {
            tracing::info!("No existing state file, starting fresh");
        }

        Ok(())
    }

    /// Start background persistence worker
    pub fn spawn_persister(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let state = Arc::clone(self);
        let persist_interval = state.config.persist_interval;

        tokio::spawn(async move {
            let mut ticker = interval(persist_interval);

            loop {
                if state.shutdown.load(Ordering::SeqCst) {
                    tracing::info!("Persister shutting down, final save...");
                    if let Err(e) = state.save_to_disk().await {
                        tracing::error!("Failed final persist: {}", e);
                    }
                    break;
                }

                tokio::select! {
                    _ = ticker.tick() => {
                        if state.dirty.swap(false, Ordering::SeqCst) {
                            if let Err(e) = state.save_to_disk().await {
                                state.mark_dirty();
                                tracing::error!("Failed to persist state: {}", e);
                            }
                        }
                    }
                    _ = state.persist_notify.notified() => {
                        state.dirty.store(false, Ordering::SeqCst);
                        if let Err(e) = state.save_to_disk().await {
                            state.mark_dirty();
                            tracing::error!("Failed to persist state: {}", e);
                        }
                    }
                }
            }
        })
    }

    /// Signal shutdown
    pub fn signal_shutdown(&self) {
        tracing::info!("Shutdown signaled");
        self.shutdown.store(true, Ordering::SeqCst);
        self.persist_notify.notify_one();
    }

    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Save state to disk
    pub async fn save_to_disk(&self) -> anyhow::Result<()> {
        let snapshot = StateSnapshot {
            requests: self.requests.snapshot(),
            saved_at: Utc::now(),
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::create_dir_all(&self.config.data_dir).await?;

        let path = self.config.state_file_path();
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, &json).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        if let Ok(mut last) = self.last_persist.write() {
            *last = Some(snapshot.saved_at);
        }
        tracing::info!("State persisted: {} requests", snapshot.requests.len());
        Ok(())
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Run a collaborator call under the configured I/O timeout
    async fn bounded<T>(
        &self,
        what: &str,
        fut: impl Future<Output = ApiResult<T>>,
    ) -> ApiResult<T> {
        tokio::time::timeout(self.config.io_timeout, fut)
            .await
            .map_err(|_| ApiError::Timeout(format!("{what} did not respond in time")))?
    }

    /// Resolve the caller principal to a user id
    pub async fn resolve_caller(&self, principal: &str) -> ApiResult<UserId> {
        self.bounded("user directory", self.directory.resolve(principal))
            .await
    }

    // ============ Signature Request Operations ============

    /// Create a signature request and notify its recipients
    pub async fn create_request(
        &self,
        principal: &str,
        req: CreateSignatureRequest,
    ) -> ApiResult<SignatureRequestView> {
        let sender_id = self.resolve_caller(principal).await?;

        validate_create_request(&req).map_err(ApiError::bad_request)?;

        for recipient in &req.recipients {
            self.bounded("user directory", self.directory.lookup(&recipient.user_id))
                .await?;
        }

        let request = SignatureRequest::create(Uuid::new_v4(), sender_id.clone(), req, Utc::now())?;
        self.requests.save(request.clone());
        self.mark_dirty();

        tracing::info!(
            "Created signature request {} by {} for {} recipients",
            request.id,
            sender_id,
            request.recipients.len()
        );

        let sender_name = self
            .bounded("user directory", self.directory.lookup(&sender_id))
            .await
            .map(|user| user.display_name())
            .unwrap_or_else(|_| sender_id.clone());
        let notice = RequestNotice::new(&request, sender_name, &self.config.frontend_url);
        notify::dispatch(
            Arc::clone(&self.notifier),
            request.recipients.iter().map(|r| r.user_id.clone()).collect(),
            notice,
            self.config.io_timeout,
        );

        Ok(SignatureRequestView::from(&request))
    }

    /// Record a signature by the caller on `request_id`.
    ///
    /// Identity, existence, membership and duplicate-sign checks all run
    /// on an unlocked copy before the file is stored, so rejected callers
    /// never wait on another signer's upload. The request's lock is only
    /// taken after the upload, to re-check the gates and save; any failure
    /// leaves the request untouched.
    pub async fn sign_request(
        &self,
        principal: &str,
        request_id: RequestId,
        upload: Upload,
    ) -> ApiResult<SignatureRequestView> {
        let user_id = self.resolve_caller(principal).await?;

        let current = self.get(&request_id)?;
        current
            .check_can_sign(&user_id)
            .inspect_err(|e| self.log_rejected_sign(request_id, &user_id, e))?;

        validate_upload(&upload, self.config.max_upload_bytes).map_err(ApiError::bad_request)?;

        let hint = ContentHint {
            file_name: upload.file_name,
        };
        let locator = self
            .bounded("blob store", self.blobs.store(upload.bytes, &hint))
            .await?;

        let _guard = self
            .requests
            .lock(&request_id)
            .await
            .ok_or_else(|| ApiError::request_not_found(request_id))?;
        let mut request = self.get(&request_id)?;

        // Another sign action may have landed during the upload
        let idx = request.check_can_sign(&user_id).inspect_err(|e| {
            tracing::warn!("Discarding upload {} for request {}", locator, request_id);
            self.log_rejected_sign(request_id, &user_id, e);
        })?;

        let version = request.record_signature(idx, locator, Utc::now())?.version;
        self.requests.save(request.clone());
        self.mark_dirty();

        tracing::info!(
            "Request {} signed by {} (version {}, status {:?})",
            request_id,
            user_id,
            version,
            request.status
        );

        Ok(SignatureRequestView::from(&request))
    }

    fn log_rejected_sign(&self, request_id: RequestId, user_id: &str, error: &ApiError) {
        tracing::warn!(
            "Rejected sign of request {} by {}: {}",
            request_id,
            user_id,
            error
        );
    }

    /// Highest-numbered PDF version of a request
    pub fn latest_version(&self, request_id: &RequestId) -> ApiResult<PdfVersionView> {
        let request = self.get(request_id)?;
        let latest = request.latest_version()?;
        Ok(PdfVersionView::from(latest))
    }

    /// Bytes and download name of the latest PDF version
    pub async fn download_latest(&self, request_id: &RequestId) -> ApiResult<(String, Bytes)> {
        let latest = self.latest_version(request_id)?;
        let bytes = self
            .bounded("blob store", self.blobs.fetch(&latest.file_url))
            .await?;
        Ok((download_name(&latest.file_url), bytes))
    }

    /// Requests sent by the caller
    pub async fn list_owned(
        &self,
        principal: &str,
        status: Option<RequestStatus>,
    ) -> ApiResult<Vec<SignatureRequestView>> {
        let user_id = self.resolve_caller(principal).await?;
        Ok(project(self.requests.list_by_sender(&user_id), status))
    }

    /// Requests where the caller is a recipient
    pub async fn list_received(
        &self,
        principal: &str,
        status: Option<RequestStatus>,
    ) -> ApiResult<Vec<SignatureRequestView>> {
        let user_id = self.resolve_caller(principal).await?;
        Ok(project(self.requests.list_by_recipient(&user_id), status))
    }

    /// Any request by id
    pub fn get_request(&self, request_id: &RequestId) -> ApiResult<SignatureRequestView> {
        self.get(request_id).map(|r| SignatureRequestView::from(&r))
    }

    fn get(&self, request_id: &RequestId) -> ApiResult<SignatureRequest> {
        self.requests
            .get(request_id)
            .ok_or_else(|| ApiError::request_not_found(request_id))
    }

    /// Dashboard counts for the caller
    pub async fn summary(&self, principal: &str) -> ApiResult<RequestSummary> {
        let user_id = self.resolve_caller(principal).await?;
        let mut summary = RequestSummary::default();

        for request in self.requests.list_by_sender(&user_id) {
            summary.owned.add(request.status);
        }
        for request in self.requests.list_by_recipient(&user_id) {
            match request.status {
                RequestStatus::Pending => summary.received.pending += 1,
                RequestStatus::Approved => summary.received.approved += 1,
            }
            if request.is_awaiting(&user_id) {
                summary.received.awaiting_my_signature += 1;
            }
        }

        Ok(summary)
    }

    /// Get health info
    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "healthy".into(),
            version: self.config.version.clone(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            requests_count: self.requests.len(),
            last_persist: self.last_persist.read().ok().and_then(|t| *t),
        }
    }

    /// Get public stats
    pub fn stats(&self) -> StatsResponse {
        let counts = self.requests.status_counts();
        StatsResponse {
            total_requests: self.requests.len(),
            pending_requests: counts.pending,
            approved_requests: counts.approved,
            total_pdf_versions: self.requests.total_versions(),
        }
    }
}

fn project(
    requests: Vec<SignatureRequest>,
    status: Option<RequestStatus>,
) -> Vec<SignatureRequestView> {
    requests
        .iter()
        .filter(|r| status.map_or(true, |s| r.status == s))
        .map(SignatureRequestView::from)
        .collect()
}

#[derive(Serialize, Deserialize)]
struct StateSnapshot {
    requests: Vec<SignatureRequest>,
    saved_at: DateTime<Utc>,
}
