//! Recipient notifications
//!
//! Notifications are best effort: they are dispatched on a detached task
//! after a request has been stored, and a failed delivery is logged and
//! otherwise ignored.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::directory::UserDirectory;
use crate::error::{ApiError, ApiResult};
use crate::types::{RequestId, SignatureRequest, UserId};

/// What a recipient is told about a new request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestNotice {
    pub request_id: RequestId,
    pub title: String,
    pub sender_name: String,
    pub subject: String,
    pub message: String,
    /// Where the recipient goes to sign
    pub link: String,
}

impl RequestNotice {
    pub fn new(request: &SignatureRequest, sender_name: String, frontend_url: &str) -> Self {
        Self {
            request_id: request.id,
            title: request.title.clone(),
            sender_name,
            subject: request.email_subject.clone(),
            message: request.email_message.clone(),
            link: format!("{}/received/{}", frontend_url.trim_end_matches('/'), request.id),
        }
    }

    /// Plain-text body
    pub fn body(&self, recipient_name: &str) -> String {
        format!(
            "Hi {recipient_name},\n\n\
             {} has requested you to sign a document.\n\n\
             Title: {}\n\
             Message: {}\n\n\
             Open the document to sign it: {}\n",
            self.sender_name, self.title, self.message, self.link
        )
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: &UserId, notice: &RequestNotice) -> ApiResult<()>;
}

/// Writes notifications to the log instead of sending them
pub struct LogNotifier {
    directory: Arc<dyn UserDirectory>,
}

impl LogNotifier {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, recipient: &UserId, notice: &RequestNotice) -> ApiResult<()> {
        let user = self.directory.lookup(recipient).await?;
        tracing::info!(
            to = %user.email,
            subject = %notice.subject,
            request_id = %notice.request_id,
            "Signature request notification\n{}",
            notice.body(&user.display_name())
        );
        Ok(())
    }
}

/// Notify every recipient on a detached task.
///
/// Each delivery is bounded by `timeout`; failures are logged and dropped.
pub fn dispatch(
    notifier: Arc<dyn Notifier>,
    recipients: Vec<UserId>,
    notice: RequestNotice,
    timeout: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        for recipient in recipients {
            let result = tokio::time::timeout(timeout, notifier.notify(&recipient, &notice))
                .await
                .unwrap_or_else(|_| Err(ApiError::Timeout("notification".into())));

            match result {
                Ok(()) => tracing::debug!(
                    "Notified {} about request {}",
                    recipient,
                    notice.request_id
                ),
                Err(e) => tracing::warn!(
                    "Failed to notify {} about request {}: {}",
                    recipient,
                    notice.request_id,
                    e
                ),
            }
        }
    })
}
