//! Core types for the signature request service
//!
//! `SignatureRequest` is the single canonical representation of a request.
//! The `*View` types are its wire projections (camelCase JSON) and are built
//! only through the `From` mappings below.

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque user identifier handed out by the user directory
pub type UserId = String;

/// Signature request identifier (UUID v4)
pub type RequestId = Uuid;

// ============ Signature Request Types ============

/// Aggregate status of a request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RequestStatus {
    /// At least one recipient has not signed yet
    Pending,
    /// Every recipient has signed
    Approved,
}

/// Where a recipient is expected to place a signature on the source document
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SignaturePosition {
    /// 1-based PDF page number
    pub page: u32,
    pub x: f32,
    pub y: f32,
}

/// A party obligated to sign a request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recipient {
    pub user_id: UserId,
    /// Set exactly once, by the recipient's sign action
    pub signed: bool,
    pub signature_positions: Vec<SignaturePosition>,
}

/// Who produced a PDF version, and when
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignedBy {
    pub user_id: UserId,
    pub signed_at: DateTime<Utc>,
}

/// Snapshot of the document after one sign action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PdfVersion {
    /// 1-based, always equal to the position in `pdf_versions` plus one
    pub version: u32,
    /// Locator returned by the blob store
    pub file_url: String,
    pub signed_by: SignedBy,
}

/// Signature request aggregate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignatureRequest {
    pub id: RequestId,
    pub sender_id: UserId,
    pub title: String,
    pub email_subject: String,
    pub email_message: String,
    pub template_id: String,
    pub status: RequestStatus,
    /// Fixed at creation, in the order the caller supplied them
    pub recipients: Vec<Recipient>,
    /// Append-only, ordered by version
    pub pdf_versions: Vec<PdfVersion>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// File received for a sign action
#[derive(Debug, Clone)]
pub struct Upload {
    /// Client-side file name, if one was sent
    pub file_name: Option<String>,
    pub bytes: Bytes,
}

// ============ API Request Types ============

/// Create request payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSignatureRequest {
    pub title: String,
    pub recipients: Vec<RecipientInput>,
    pub template_id: String,
    #[serde(default)]
    pub email_subject: String,
    #[serde(default)]
    pub email_message: String,
}

/// Recipient entry in a create payload
///
/// Any `signed` flag sent by the client is ignored; recipients always
/// start unsigned.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientInput {
    pub user_id: UserId,
    #[serde(default)]
    pub signature_positions: Vec<SignaturePosition>,
}

/// Listing query params
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<RequestStatus>,
}

// ============ Response Types ============

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stable machine-readable failure category
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
            hint: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: impl Into<String>, code: &'static str, hint: Option<&str>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            code: Some(code),
            hint: hint.map(str::to_string),
        }
    }
}

/// Signature request as returned to clients
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureRequestView {
    pub id: RequestId,
    pub sender_id: UserId,
    pub title: String,
    pub status: RequestStatus,
    pub recipients: Vec<RecipientView>,
    pub email_subject: String,
    pub email_message: String,
    pub template_id: String,
    pub pdf_versions: Vec<PdfVersionView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientView {
    pub user_id: UserId,
    pub signed: bool,
    pub signature_positions: Vec<SignaturePosition>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfVersionView {
    pub version: u32,
    pub file_url: String,
    pub signed_by: SignedByView,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedByView {
    pub user_id: UserId,
    pub signed_at: DateTime<Utc>,
}

impl From<&SignatureRequest> for SignatureRequestView {
    fn from(r: &SignatureRequest) -> Self {
        Self {
            id: r.id,
            sender_id: r.sender_id.clone(),
            title: r.title.clone(),
            status: r.status,
            recipients: r.recipients.iter().map(RecipientView::from).collect(),
            email_subject: r.email_subject.clone(),
            email_message: r.email_message.clone(),
            template_id: r.template_id.clone(),
            pdf_versions: r.pdf_versions.iter().map(PdfVersionView::from).collect(),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

impl From<&Recipient> for RecipientView {
    fn from(r: &Recipient) -> Self {
        Self {
            user_id: r.user_id.clone(),
            signed: r.signed,
            signature_positions: r.signature_positions.clone(),
        }
    }
}

impl From<&PdfVersion> for PdfVersionView {
    fn from(v: &PdfVersion) -> Self {
        Self {
            version: v.version,
            file_url: v.file_url.clone(),
            signed_by: SignedByView {
                user_id: v.signed_by.user_id.clone(),
                signed_at: v.signed_by.signed_at,
            },
        }
    }
}

/// Pending/approved counts
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub pending: usize,
    pub approved: usize,
}

impl StatusCounts {
    pub fn add(&mut self, status: RequestStatus) {
        match status {
            RequestStatus::Pending => self.pending += 1,
            RequestStatus::Approved => self.approved += 1,
        }
    }
}

/// Counts for the caller's received requests
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedCounts {
    pub pending: usize,
    pub approved: usize,
    /// Requests where the caller still has to sign
    pub awaiting_my_signature: usize,
}

/// Per-caller dashboard summary
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequestSummary {
    pub owned: StatusCounts,
    pub received: ReceivedCounts,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub requests_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_persist: Option<DateTime<Utc>>,
}

/// Public stats response
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_requests: usize,
    pub pending_requests: usize,
    pub approved_requests: usize,
    pub total_pdf_versions: usize,
}
