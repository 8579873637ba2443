//! Signature request lifecycle
//!
//! State transitions of a [`SignatureRequest`]. A request is created with all
//! of its recipients and no PDF versions; afterwards it only changes through
//! sign actions, each of which appends exactly one version and flips exactly
//! one recipient to signed.
//!
//! Everything here is synchronous and free of I/O so the rules can be checked
//! without any collaborator. Orchestration (identity lookup, blob upload,
//! persistence) lives in [`crate::state`].

use chrono::{DateTime, Utc};

use crate::error::{ApiError, ApiResult};
use crate::types::{
    CreateSignatureRequest, PdfVersion, Recipient, RequestId, RequestStatus, SignatureRequest,
    SignedBy, UserId,
};

impl SignatureRequest {
    /// Build a new pending request from a create payload.
    ///
    /// Rejects a payload without recipients; every other field is taken as
    /// given (validation of lengths and positions happens at the API edge).
    pub fn create(
        id: RequestId,
        sender_id: UserId,
        req: CreateSignatureRequest,
        now: DateTime<Utc>,
    ) -> ApiResult<Self> {
        if req.recipients.is_empty() {
            return Err(ApiError::bad_request(
                "A signature request needs at least one recipient",
            ));
        }

        let recipients = req
            .recipients
            .into_iter()
            .map(|r| Recipient {
                user_id: r.user_id,
                signed: false,
                signature_positions: r.signature_positions,
            })
            .collect();

        Ok(Self {
            id,
            sender_id,
            title: req.title,
            email_subject: req.email_subject,
            email_message: req.email_message,
            template_id: req.template_id,
            status: RequestStatus::Pending,
            recipients,
            pdf_versions: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Index of the first recipient entry for `user_id`
    pub fn recipient_index(&self, user_id: &str) -> Option<usize> {
        self.recipients.iter().position(|r| r.user_id == user_id)
    }

    pub fn is_recipient(&self, user_id: &str) -> bool {
        self.recipient_index(user_id).is_some()
    }

    /// True if `user_id` is a recipient who has not signed yet
    pub fn is_awaiting(&self, user_id: &str) -> bool {
        self.recipient_index(user_id)
            .is_some_and(|i| !self.recipients[i].signed)
    }

    /// Membership and duplicate-sign gates, in that order.
    ///
    /// Returns the index of the recipient entry the signature will be
    /// recorded against.
    pub fn check_can_sign(&self, user_id: &str) -> ApiResult<usize> {
        let idx = self
            .recipient_index(user_id)
            .ok_or(ApiError::NotAuthorized)?;

        if self.recipients[idx].signed || self.status == RequestStatus::Approved {
            return Err(ApiError::AlreadySigned);
        }

        Ok(idx)
    }

    /// Number the next appended version will carry
    pub fn next_version(&self) -> u32 {
        self.pdf_versions.len() as u32 + 1
    }

    /// Record a sign action by the recipient at `idx`.
    ///
    /// Appends the new version, marks the recipient signed and recomputes the
    /// aggregate status. Gates are re-checked so the request is untouched on
    /// error.
    pub fn record_signature(
        &mut self,
        idx: usize,
        file_url: String,
        now: DateTime<Utc>,
    ) -> ApiResult<&PdfVersion> {
        let user_id = self
            .recipients
            .get(idx)
            .map(|r| r.user_id.clone())
            .ok_or(ApiError::NotAuthorized)?;
        self.check_can_sign(&user_id)?;

        let version = self.next_version();
        self.pdf_versions.push(PdfVersion {
            version,
            file_url,
            signed_by: SignedBy {
                user_id,
                signed_at: now,
            },
        });
        self.recipients[idx].signed = true;
        self.recompute_status();
        self.updated_at = now;

        Ok(&self.pdf_versions[self.pdf_versions.len() - 1])
    }

    pub fn all_signed(&self) -> bool {
        self.recipients.iter().all(|r| r.signed)
    }

    /// Approved iff every recipient has signed
    pub fn recompute_status(&mut self) {
        self.status = if self.all_signed() {
            RequestStatus::Approved
        } else {
            RequestStatus::Pending
        };
    }

    /// Tail of the version list
    pub fn latest_version(&self) -> ApiResult<&PdfVersion> {
        self.pdf_versions.last().ok_or(ApiError::NoVersionsAvailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RecipientInput, SignaturePosition};
    use proptest::prelude::*;
    use uuid::Uuid;

    fn payload(recipients: &[&str]) -> CreateSignatureRequest {
        CreateSignatureRequest {
            title: "Lease agreement".into(),
            recipients: recipients
                .iter()
                .map(|id| RecipientInput {
                    user_id: id.to_string(),
                    signature_positions: vec![SignaturePosition {
                        page: 1,
                        x: 120.0,
                        y: 540.5,
                    }],
                })
                .collect(),
            template_id: "tpl-1".into(),
            email_subject: "Please sign".into(),
            email_message: "Sign by Friday".into(),
        }
    }

    fn request(recipients: &[&str]) -> SignatureRequest {
        SignatureRequest::create(Uuid::new_v4(), "sender".into(), payload(recipients), Utc::now())
            .unwrap()
    }

    fn sign(req: &mut SignatureRequest, user: &str) -> ApiResult<u32> {
        let idx = req.check_can_sign(user)?;
        let url = format!("memory://{}-{}", user, req.next_version());
        req.record_signature(idx, url, Utc::now()).map(|v| v.version)
    }

    #[test]
    fn test_create_starts_pending_and_unsigned() {
        let req = request(&["u1", "u2"]);
        assert_eq!(req.status, RequestStatus::Pending);
        assert!(req.pdf_versions.is_empty());
        assert_eq!(req.recipients.len(), 2);
        assert!(req.recipients.iter().all(|r| !r.signed));
        assert_eq!(req.recipients[0].user_id, "u1");
        assert_eq!(req.recipients[1].signature_positions[0].page, 1);
        assert_eq!(req.created_at, req.updated_at);
    }

    #[test]
    fn test_create_rejects_empty_recipients() {
        let err = SignatureRequest::create(Uuid::new_v4(), "s".into(), payload(&[]), Utc::now())
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_sign_flow() {
        let mut req = request(&["u1", "u2"]);

        assert_eq!(sign(&mut req, "u1").unwrap(), 1);
        assert!(req.recipients[0].signed);
        assert_eq!(req.status, RequestStatus::Pending);
        assert_eq!(req.pdf_versions[0].signed_by.user_id, "u1");

        assert!(matches!(sign(&mut req, "u1"), Err(ApiError::AlreadySigned)));
        assert_eq!(req.pdf_versions.len(), 1);

        assert_eq!(sign(&mut req, "u2").unwrap(), 2);
        assert_eq!(req.status, RequestStatus::Approved);
        assert_eq!(req.latest_version().unwrap().version, 2);
    }

    #[test]
    fn test_non_recipient_cannot_sign() {
        let mut req = request(&["u1"]);
        let before = req.clone();
        assert!(matches!(sign(&mut req, "u3"), Err(ApiError::NotAuthorized)));
        assert_eq!(req, before);
    }

    #[test]
    fn test_record_signature_rechecks_gates() {
        let mut req = request(&["u1"]);
        req.record_signature(0, "a".into(), Utc::now()).unwrap();
        let before = req.clone();
        assert!(matches!(
            req.record_signature(0, "b".into(), Utc::now()),
            Err(ApiError::AlreadySigned)
        ));
        assert!(matches!(
            req.record_signature(7, "c".into(), Utc::now()),
            Err(ApiError::NotAuthorized)
        ));
        assert_eq!(req, before);
    }

    #[test]
    fn test_latest_version_without_signatures() {
        let req = request(&["u1"]);
        assert!(matches!(
            req.latest_version(),
            Err(ApiError::NoVersionsAvailable)
        ));
    }

    #[test]
    fn test_duplicate_recipient_first_entry_wins() {
        let mut req = request(&["u1", "u1"]);
        assert_eq!(req.check_can_sign("u1").unwrap(), 0);
        sign(&mut req, "u1").unwrap();
        assert!(req.recipients[0].signed);
        assert!(!req.recipients[1].signed);
        assert!(matches!(sign(&mut req, "u1"), Err(ApiError::AlreadySigned)));
        assert_eq!(req.status, RequestStatus::Pending);
    }

    #[test]
    fn test_is_awaiting() {
        let mut req = request(&["u1", "u2"]);
        assert!(req.is_awaiting("u1"));
        sign(&mut req, "u1").unwrap();
        assert!(!req.is_awaiting("u1"));
        assert!(req.is_awaiting("u2"));
        assert!(!req.is_awaiting("u9"));
    }

    proptest! {
        // Arbitrary interleavings of sign attempts by recipients and strangers.
        #[test]
        fn prop_sign_sequence_invariants(
            n in 1usize..6,
            attempts in proptest::collection::vec(0usize..8, 0..24),
        ) {
            let ids: Vec<String> = (0..n).map(|i| format!("u{i}")).collect();
            let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
            let mut req = request(&refs);
            let mut succeeded: Vec<String> = Vec::new();

            for a in attempts {
                let user = format!("u{a}");
                let before = req.clone();
                match sign(&mut req, &user) {
                    Ok(v) => {
                        prop_assert!(a < n);
                        prop_assert!(!succeeded.contains(&user));
                        prop_assert_eq!(v as usize, succeeded.len() + 1);
                        succeeded.push(user);
                    }
                    Err(ApiError::AlreadySigned) => {
                        prop_assert!(succeeded.contains(&user));
                        prop_assert_eq!(&req, &before);
                    }
                    Err(ApiError::NotAuthorized) => {
                        prop_assert!(a >= n);
                        prop_assert_eq!(&req, &before);
                    }
                    Err(e) => prop_assert!(false, "unexpected error {e}"),
                }

                for (i, v) in req.pdf_versions.iter().enumerate() {
                    prop_assert_eq!(v.version as usize, i + 1);
                    prop_assert_eq!(&v.signed_by.user_id, &succeeded[i]);
                }
                prop_assert_eq!(
                    req.status == RequestStatus::Approved,
                    req.recipients.iter().all(|r| r.signed)
                );
                match req.latest_version() {
                    Ok(latest) => prop_assert_eq!(latest, req.pdf_versions.last().unwrap()),
                    Err(_) => prop_assert!(req.pdf_versions.is_empty()),
                }
            }
        }
    }
}
