use {
    crate::{
        domain::auction::Phase,
        infra::{blockchain::TxError, fhe},
    },
    thiserror::Error,
};

/// Failure of a user initiated action. None of these are fatal; they are
/// reported to the user who may retry.
#[derive(Debug, Error)]
pub enum BidError {
    /// Rejected before any side effect.
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    /// Reading the allowance or approving the settlement contract failed.
    #[error("allowance error: {0}")]
    Allowance(String),
    #[error("encryption error: {0}")]
    Encryption(#[from] fhe::Error),
    /// The transaction failed or reverted. Carries the contract's revert
    /// reason as is when one was returned.
    #[error("submission error: {0}")]
    Submission(String),
    /// The signer refused the request. Not a fault.
    #[error("request declined in wallet")]
    UserDeclined,
}

impl BidError {
    /// Maps a failed approval.
    pub(super) fn allowance(err: TxError) -> Self {
        match err {
            TxError::Declined => Self::UserDeclined,
            err => Self::Allowance(err.to_string()),
        }
    }

    /// Maps a failed settlement contract transaction.
    pub(super) fn submission(err: TxError) -> Self {
        match err {
            TxError::Declined => Self::UserDeclined,
            TxError::Reverted {
                reason: Some(reason),
                ..
            } => Self::Submission(reason),
            err => Self::Submission(err.to_string()),
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Precondition(_) => "precondition",
            Self::Allowance(_) => "allowance",
            Self::Encryption(_) => "encryption",
            Self::Submission(_) => "submission",
            Self::UserDeclined => "declined",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("another action is still in progress")]
    ActionInProgress,
    #[error("no wallet connected")]
    WalletNotConnected,
    #[error("encryption provider is not ready ({0})")]
    EncryptionNotReady(fhe::Status),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("auction state has not been loaded yet")]
    AuctionUnknown,
    #[error("auction prices are already finalized")]
    AlreadyFinalized,
    #[error("claiming is not open, the auction is in the {0} phase")]
    NotClaiming(Phase),
    #[error("allocation was already claimed")]
    AlreadyClaimed,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("enter a bid price")]
    MissingPrice,
    #[error("enter a bid quantity")]
    MissingQuantity,
    #[error("invalid bid price {0:?}, expected a positive number")]
    InvalidPrice(String),
    #[error("invalid bid quantity {0:?}, expected a positive whole number")]
    InvalidQuantity(String),
    #[error("bid amount out of range")]
    OutOfRange,
}

/// A poll returned data that contradicts what was read before.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StaleReadError {
    #[error("auction end changed from {previous} to {current}")]
    AuctionEndChanged { previous: u64, current: u64 },
    #[error("claim start changed from {previous} to {current}")]
    ClaimStartChanged { previous: u64, current: u64 },
    #[error("prices reported finalized before are no longer finalized")]
    Unfinalized,
}
