//! Receipt validation.
//!
//! Decides whether an incoming purchase notification is trustworthy enough
//! to grant entitlement. The contract is deliberately stable (inputs are the
//! receipt payload, product id, transaction id, user id, and store
//! environment; the output is a verdict), so the orchestrator and the
//! entitlement gateway never depend on which strategy backs it. A stronger
//! deployment substitutes a server-backed implementation behind the same
//! trait.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::catalog::Catalog;
use crate::error::{Result, TollgateError};
use crate::store::StoreEnvironment;

/// Inputs to receipt validation.
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub user_id: String,
    pub product_id: String,
    pub transaction_id: String,
    pub receipt_data: String,
    pub environment: StoreEnvironment,
}

/// Outcome of receipt validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptVerdict {
    /// Whether the notification should be trusted.
    pub valid: bool,
    /// Transaction id confirmed by the validator, when it has one.
    pub transaction_id: Option<String>,
}

impl ReceiptVerdict {
    /// An accepting verdict for the given transaction.
    #[must_use]
    pub fn accept(transaction_id: impl Into<String>) -> Self {
        Self {
            valid: true,
            transaction_id: Some(transaction_id.into()),
        }
    }

    /// A rejecting verdict.
    #[must_use]
    pub fn reject() -> Self {
        Self {
            valid: false,
            transaction_id: None,
        }
    }
}

/// Strategy for deciding whether a purchase notification is trustworthy.
///
/// A rejection is a normal `Ok` verdict; `Err` means the validator itself
/// could not run (the configured [`crate::config::FallbackPolicy`] decides
/// what happens then).
#[async_trait]
pub trait ReceiptValidator: Send + Sync {
    async fn validate(&self, request: ValidationRequest) -> Result<ReceiptVerdict>;
}

/// Minimal local validation: shape checks only.
///
/// Accepts a notification when it carries a non-empty transaction id, a
/// product id present in the configured catalog, and (for production
/// receipts) a non-empty opaque receipt payload.
#[derive(Clone)]
pub struct StructuralValidator {
    catalog: Catalog,
}

impl StructuralValidator {
    /// Create a validator over the configured catalog.
    #[must_use]
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl ReceiptValidator for StructuralValidator {
    async fn validate(&self, request: ValidationRequest) -> Result<ReceiptVerdict> {
        if request.transaction_id.trim().is_empty() {
            tracing::debug!(
                target: "tollgate::validate",
                "Rejecting notification with empty transaction id"
            );
            return Ok(ReceiptVerdict::reject());
        }

        if !self.catalog.contains(&request.product_id) {
            tracing::debug!(
                target: "tollgate::validate",
                product_id = %request.product_id,
                "Rejecting notification for unrecognized product"
            );
            return Ok(ReceiptVerdict::reject());
        }

        if request.environment == StoreEnvironment::Production
            && request.receipt_data.trim().is_empty()
        {
            tracing::debug!(
                target: "tollgate::validate",
                transaction_id = %request.transaction_id,
                "Rejecting production notification with empty receipt"
            );
            return Ok(ReceiptVerdict::reject());
        }

        Ok(ReceiptVerdict::accept(request.transaction_id))
    }
}

type HmacSha256 = Hmac<Sha256>;

/// Receipt payload version prefix understood by [`SignedReceiptValidator`].
const SIGNED_RECEIPT_PREFIX: &str = "v1:";

/// Structural checks plus an HMAC-SHA256 signature over the transaction and
/// product ids, verified in constant time.
///
/// Expects receipts of the form `v1:<hex signature>`. The shared secret is
/// held in a [`SecretString`] so it never appears in debug output.
pub struct SignedReceiptValidator {
    structural: StructuralValidator,
    secret: SecretString,
}

impl SignedReceiptValidator {
    /// Create a validator with the shared signing secret.
    #[must_use]
    pub fn new(catalog: Catalog, secret: impl Into<SecretString>) -> Self {
        Self {
            structural: StructuralValidator::new(catalog),
            secret: secret.into(),
        }
    }

    fn verify(&self, request: &ValidationRequest) -> Result<bool> {
        let Some(signature_hex) = request.receipt_data.strip_prefix(SIGNED_RECEIPT_PREFIX) else {
            return Ok(false);
        };

        let expected = compute_signature(
            self.secret.expose_secret(),
            &signed_payload(&request.transaction_id, &request.product_id),
        )?;

        let expected_bytes = hex::decode(&expected)
            .map_err(|_| TollgateError::Unknown("Signature encoding error".to_string()))?;
        let provided_bytes = match hex::decode(signature_hex) {
            Ok(bytes) => bytes,
            Err(_) => return Ok(false),
        };

        Ok(expected_bytes.ct_eq(&provided_bytes).unwrap_u8() == 1)
    }
}

#[async_trait]
impl ReceiptValidator for SignedReceiptValidator {
    async fn validate(&self, request: ValidationRequest) -> Result<ReceiptVerdict> {
        let verdict = self.structural.validate(request.clone()).await?;
        if !verdict.valid {
            return Ok(verdict);
        }

        if self.verify(&request)? {
            Ok(ReceiptVerdict::accept(request.transaction_id))
        } else {
            tracing::debug!(
                target: "tollgate::validate",
                transaction_id = %request.transaction_id,
                "Receipt signature did not verify"
            );
            Ok(ReceiptVerdict::reject())
        }
    }
}

fn signed_payload(transaction_id: &str, product_id: &str) -> String {
    format!("{}.{}", transaction_id, product_id)
}

/// Compute the HMAC-SHA256 signature, hex-encoded.
fn compute_signature(secret: &str, payload: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| TollgateError::Unknown("HMAC error".to_string()))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Produce a signed receipt payload for a transaction.
///
/// Counterpart to [`SignedReceiptValidator`]; used by sandbox tooling and
/// tests to mint receipts the validator will accept.
pub fn sign_receipt(secret: &str, transaction_id: &str, product_id: &str) -> Result<String> {
    let signature = compute_signature(secret, &signed_payload(transaction_id, product_id))?;
    Ok(format!("{}{}", SIGNED_RECEIPT_PREFIX, signature))
}
