use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{Cents, ListingId, TransactionId};

#[derive(Debug, Clone, Error)]
pub enum PaymentProcessorError {
    #[error("Could not reach the payment processor. {0}")]
    Unavailable(String),
    #[error("The payment processor rejected the request ({status}). {message}")]
    Rejected { status: u16, message: String },
    #[error("The payment processor response could not be understood. {0}")]
    InvalidResponse(String),
}

/// The processor's handle for an in-progress charge. The client secret is passed to the buyer's device to complete the
/// payment and is never persisted by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub intent_id: String,
    pub client_secret: String,
}

/// Context attached to a payment intent so that processor-side records can be traced back to the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMetadata {
    pub transaction_id: TransactionId,
    pub listing_id: ListingId,
    pub buyer_id: String,
    pub seller_id: String,
}

impl PaymentMetadata {
    pub fn pairs(&self) -> [(&'static str, &str); 4] {
        [
            ("transaction_id", self.transaction_id.as_str()),
            ("listing_id", self.listing_id.as_str()),
            ("buyer_id", self.buyer_id.as_str()),
            ("seller_id", self.seller_id.as_str()),
        ]
    }
}

/// The processor-reported state of a payment intent. Only `Succeeded` allows a transaction to become `paid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentIntentStatus {
    Succeeded,
    Processing,
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    RequiresCapture,
    Canceled,
    Unknown(String),
}

impl PaymentIntentStatus {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl From<&str> for PaymentIntentStatus {
    fn from(value: &str) -> Self {
        match value {
            "succeeded" => Self::Succeeded,
            "processing" => Self::Processing,
            "requires_payment_method" => Self::RequiresPaymentMethod,
            "requires_confirmation" => Self::RequiresConfirmation,
            "requires_action" => Self::RequiresAction,
            "requires_capture" => Self::RequiresCapture,
            "canceled" => Self::Canceled,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl Display for PaymentIntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Succeeded => "succeeded",
            Self::Processing => "processing",
            Self::RequiresPaymentMethod => "requires_payment_method",
            Self::RequiresConfirmation => "requires_confirmation",
            Self::RequiresAction => "requires_action",
            Self::RequiresCapture => "requires_capture",
            Self::Canceled => "canceled",
            Self::Unknown(s) => s.as_str(),
        };
        f.write_str(s)
    }
}

/// An external payment processor.
///
/// Amounts are always integer minor units. Implementations must report what the processor says and never infer
/// success; the transaction flow only advances to `paid` on an explicit [`PaymentIntentStatus::Succeeded`].
#[allow(async_fn_in_trait)]
pub trait PaymentProcessor {
    async fn create_payment_intent(
        &self,
        amount: Cents,
        currency: &str,
        metadata: &PaymentMetadata,
    ) -> Result<PaymentIntent, PaymentProcessorError>;

    async fn payment_intent_status(&self, intent_id: &str) -> Result<PaymentIntentStatus, PaymentProcessorError>;
}
