//! Caller identity and input validation
//!
//! The service sits behind an authentication gateway which forwards the
//! authenticated user's email in the `X-Authenticated-User` header. That
//! principal is passed explicitly into every state operation and resolved
//! against the user directory there.

use axum::http::HeaderMap;

use crate::error::{ApiError, ApiResult};
use crate::types::{CreateSignatureRequest, SignaturePosition, Upload};

pub const PRINCIPAL_HEADER: &str = "x-authenticated-user";

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_SUBJECT_LEN: usize = 200;
pub const MAX_MESSAGE_LEN: usize = 5000;
pub const MAX_RECIPIENTS: usize = 50;
pub const MAX_POSITIONS_PER_RECIPIENT: usize = 100;

/// Read the caller principal from request headers
pub fn extract_principal(headers: &HeaderMap) -> ApiResult<String> {
    headers
        .get(PRINCIPAL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::identity_not_found("Missing caller identity"))
}

// ============ Validation Functions ============

/// Validate request title
pub fn validate_title(title: &str) -> Result<(), &'static str> {
    if title.trim().is_empty() {
        return Err("Title cannot be empty");
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err("Title must be at most 200 characters");
    }
    Ok(())
}

/// Validate template reference
pub fn validate_template_id(template_id: &str) -> Result<(), &'static str> {
    if template_id.trim().is_empty() {
        return Err("Template id cannot be empty");
    }
    Ok(())
}

/// Validate email subject and message
pub fn validate_email_fields(subject: &str, message: &str) -> Result<(), &'static str> {
    if subject.chars().count() > MAX_SUBJECT_LEN {
        return Err("Email subject must be at most 200 characters");
    }
    if message.chars().count() > MAX_MESSAGE_LEN {
        return Err("Email message must be at most 5000 characters");
    }
    Ok(())
}

/// Validate a signature position
pub fn validate_position(position: &SignaturePosition) -> Result<(), &'static str> {
    if position.page == 0 {
        return Err("Signature page numbers start at 1");
    }
    if !position.x.is_finite() || !position.y.is_finite() {
        return Err("Signature coordinates must be finite numbers");
    }
    if position.x < 0.0 || position.y < 0.0 {
        return Err("Signature coordinates cannot be negative");
    }
    Ok(())
}

/// Validate the recipient list: non-empty, bounded, unique ids, valid positions
pub fn validate_recipients(req: &CreateSignatureRequest) -> Result<(), &'static str> {
    if req.recipients.is_empty() {
        return Err("At least one recipient is required");
    }
    if req.recipients.len() > MAX_RECIPIENTS {
        return Err("At most 50 recipients are allowed");
    }

    for (i, recipient) in req.recipients.iter().enumerate() {
        if recipient.user_id.trim().is_empty() {
            return Err("Recipient user id cannot be empty");
        }
        if req.recipients[..i]
            .iter()
            .any(|r| r.user_id == recipient.user_id)
        {
            return Err("Each recipient may appear only once");
        }
        if recipient.signature_positions.len() > MAX_POSITIONS_PER_RECIPIENT {
            return Err("At most 100 signature positions per recipient");
        }
        for position in &recipient.signature_positions {
            validate_position(position)?;
        }
    }
    Ok(())
}

/// Validate a whole create payload
pub fn validate_create_request(req: &CreateSignatureRequest) -> Result<(), &'static str> {
    validate_title(&req.title)?;
    validate_template_id(&req.template_id)?;
    validate_email_fields(&req.email_subject, &req.email_message)?;
    validate_recipients(req)
}

/// Validate an uploaded file
pub fn validate_upload(upload: &Upload, max_bytes: usize) -> Result<(), &'static str> {
    if upload.bytes.is_empty() {
        return Err("Uploaded file is empty");
    }
    if upload.bytes.len() > max_bytes {
        return Err("Uploaded file is too large");
    }
    Ok(())
}
