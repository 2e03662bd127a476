//! The closed error taxonomy surfaced to callers.
//!
//! Purchase flows fail in a small number of ways that the UI must be able to
//! distinguish (retry, neutral dismissal, or a support-contact prompt).
//! Callers never see raw store or storage error strings; everything opaque is
//! folded into [`TollgateError::Unknown`].

/// Convenience result type used throughout the crate.
pub type Result<T> = std::result::Result<T, TollgateError>;

/// The main error type for purchase and entitlement operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TollgateError {
    /// Catalog or product identifier is malformed. Fatal, never retried.
    #[error("Configuration invalid: {0}")]
    ConfigurationInvalid(String),

    /// A bounded operation exceeded its deadline.
    #[error("Connection timed out during {operation}")]
    ConnectionTimeout { operation: String },

    /// The store adapter is not ready and an on-demand retry did not help.
    #[error("Payment system unavailable")]
    PaymentSystemUnavailable,

    /// The user dismissed the purchase sheet. Terminal, not an error state.
    #[error("Purchase cancelled")]
    UserCancelled,

    /// The store reports the product cannot be purchased right now.
    #[error("Product unavailable: {0}")]
    ProductUnavailable(String),

    /// The purchase notification was not trustworthy enough to grant
    /// entitlement. The durable write was withheld.
    #[error("Receipt validation failed")]
    ValidationFailed { transaction_id: Option<String> },

    /// The store confirmed payment but the entitlement write failed.
    /// The pending transaction is still finalized; reconciliation on the
    /// next restore pass is expected to repair the record.
    #[error("Entitlement write failed: {0}")]
    DurableWriteFailed(String),

    /// Catch-all for unrecognized failures. Retryable once.
    #[error("Purchase failed: {0}")]
    Unknown(String),
}

impl TollgateError {
    /// Check whether this error is worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. }
                | Self::PaymentSystemUnavailable
                | Self::ProductUnavailable(_)
                | Self::Unknown(_)
        )
    }

    /// Check whether this outcome is terminal (no retry, no error surface).
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::UserCancelled)
    }

    /// Whether the UI should offer a retry action for this error.
    #[must_use]
    pub fn offers_retry(&self) -> bool {
        self.is_retryable()
    }

    /// Whether the UI should offer a support-contact action instead of retry.
    #[must_use]
    pub fn offers_support_contact(&self) -> bool {
        matches!(self, Self::ConfigurationInvalid(_))
    }

    /// Short, classified copy for the user. Never exposes internal detail.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::ConfigurationInvalid(_) => {
                "Purchases are misconfigured. Please contact support."
            }
            Self::ConnectionTimeout { .. } => {
                "The store took too long to respond. Please try again."
            }
            Self::PaymentSystemUnavailable => {
                "Purchases are temporarily unavailable. Please try again later."
            }
            Self::UserCancelled => "Purchase cancelled.",
            Self::ProductUnavailable(_) => {
                "That product isn't available right now. Please try again shortly."
            }
            Self::ValidationFailed { .. } => "We couldn't verify your purchase.",
            Self::DurableWriteFailed(_) => {
                "Your purchase went through but we hit a snag updating your account. \
                 It will be repaired automatically."
            }
            Self::Unknown(_) => "Purchase failed. Please try again.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(TollgateError::ConnectionTimeout {
            operation: "store connect".to_string()
        }
        .is_retryable());
        assert!(TollgateError::PaymentSystemUnavailable.is_retryable());
        assert!(TollgateError::Unknown("boom".to_string()).is_retryable());

        assert!(!TollgateError::ConfigurationInvalid("bad id".to_string()).is_retryable());
        assert!(!TollgateError::UserCancelled.is_retryable());
        assert!(!TollgateError::ValidationFailed {
            transaction_id: None
        }
        .is_retryable());
    }

    #[test]
    fn test_cancelled_is_terminal_not_retryable() {
        let err = TollgateError::UserCancelled;
        assert!(err.is_terminal());
        assert!(!err.offers_retry());
        assert!(!err.offers_support_contact());
    }

    #[test]
    fn test_configuration_offers_support_contact() {
        let err = TollgateError::ConfigurationInvalid("unknown product".to_string());
        assert!(err.offers_support_contact());
        assert!(!err.offers_retry());
    }

    #[test]
    fn test_user_message_never_contains_internals() {
        let err = TollgateError::Unknown("ERR_STORE_0x7f connection reset".to_string());
        assert!(!err.user_message().contains("0x7f"));
    }
}
