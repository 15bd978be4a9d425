use thiserror::Error;

use crate::{
    db_types::{Cents, DisputeId, DisputeStatus, ListingId, ListingStatus, TransactionId, TransactionStatus},
    helpers::{FeeError, GeoError},
    traits::{PaymentIntentStatus, PaymentProcessorError},
};

/// The error taxonomy callers branch on. The HTTP layer maps these to status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input. Recoverable by the caller.
    Validation,
    NotFound,
    /// The record is not in a state that allows the request. The caller's view is stale.
    InvalidTransition,
    /// The request collides with existing state (an open dispute, a higher bid).
    Conflict,
    /// A collaborator failed or gave an ambiguous answer. Safe to retry.
    ExternalService,
    Internal,
}

#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("{0}")]
    InvalidAmount(#[from] FeeError),
    #[error("Invalid {field}: {message}")]
    ValidationError { field: String, message: String },
    #[error("Invalid location. {0}")]
    InvalidLocation(#[from] GeoError),
    #[error("Transaction {0} does not exist")]
    TransactionNotFound(TransactionId),
    #[error("Listing {0} does not exist")]
    ListingNotFound(ListingId),
    #[error("Dispute {0} does not exist")]
    DisputeNotFound(DisputeId),
    #[error("Cannot move transaction from {from} to {to}")]
    InvalidTransition { from: TransactionStatus, to: TransactionStatus },
    #[error("Cannot {operation} while the transaction is {status}")]
    OperationNotAllowed { status: TransactionStatus, operation: &'static str },
    #[error("Cannot move dispute from {from} to {to}")]
    InvalidDisputeTransition { from: DisputeStatus, to: DisputeStatus },
    #[error("Cannot {operation} while the dispute is {status}")]
    DisputeOperationNotAllowed { status: DisputeStatus, operation: &'static str },
    #[error("Dispute {1} is already open for transaction {0}")]
    DisputeAlreadyOpen(TransactionId, DisputeId),
    #[error("User {0} is not a party to transaction {1}")]
    NotAParty(String, TransactionId),
    #[error("Listing {0} is {1}")]
    ListingNotActive(ListingId, ListingStatus),
    #[error("There is no running auction for listing {0}")]
    AuctionNotRunning(ListingId),
    #[error("A bid of {amount} is too low. The minimum acceptable bid is {minimum}")]
    BidTooLow { amount: Cents, minimum: Cents },
    #[error("Payment for transaction {0} has not been confirmed by the processor (status: {1})")]
    PaymentNotConfirmed(TransactionId, PaymentIntentStatus),
    #[error("Payment processor error. {0}")]
    ExternalServiceError(#[from] PaymentProcessorError),
}

impl From<sqlx::Error> for SettlementError {
    fn from(e: sqlx::Error) -> Self {
        SettlementError::DatabaseError(e.to_string())
    }
}

impl SettlementError {
    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::ValidationError { field: field.into(), message: message.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DatabaseError(_) => ErrorKind::Internal,
            Self::InvalidAmount(_) | Self::ValidationError { .. } | Self::InvalidLocation(_) | Self::NotAParty(..) => {
                ErrorKind::Validation
            },
            Self::TransactionNotFound(_) | Self::ListingNotFound(_) | Self::DisputeNotFound(_) => ErrorKind::NotFound,
            Self::InvalidTransition { .. } |
            Self::OperationNotAllowed { .. } |
            Self::InvalidDisputeTransition { .. } |
            Self::DisputeOperationNotAllowed { .. } |
            Self::ListingNotActive(..) |
            Self::AuctionNotRunning(_) => ErrorKind::InvalidTransition,
            Self::DisputeAlreadyOpen(..) | Self::BidTooLow { .. } => ErrorKind::Conflict,
            Self::PaymentNotConfirmed(..) | Self::ExternalServiceError(_) => ErrorKind::ExternalService,
        }
    }
}
