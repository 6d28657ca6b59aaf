use alloy::{
    contract::Error as ContractError,
    providers::PendingTransactionError,
    rpc::json_rpc::ErrorPayload,
    sol_types::decode_revert_reason,
    transports::{RpcError, TransportError},
};

/// JSON-RPC error code used by wallets and external signers when the user
/// rejects a request (EIP-1193).
pub const USER_REJECTED_REQUEST: i64 = 4001;

/// Message fragments external signers (clef, frame, browser bridges) use when
/// a signing request was refused rather than failed.
const REJECTION_MESSAGES: &[&str] = &["user denied", "user rejected", "request denied"];

/// Access to the JSON-RPC layer of errors returned while sending a
/// transaction or waiting for its receipt.
pub trait RpcErrorExt {
    fn transport_error(&self) -> Option<&TransportError>;

    /// The human readable revert reason supplied by the contract, verbatim.
    fn revert_reason(&self) -> Option<String> {
        match self.transport_error()? {
            RpcError::ErrorResp(payload) => payload_revert_reason(payload),
            _ => None,
        }
    }

    /// Whether the signer refused to sign, as opposed to the transaction
    /// failing.
    fn is_user_rejection(&self) -> bool {
        match self.transport_error() {
            Some(RpcError::ErrorResp(payload)) => is_rejection_payload(payload),
            _ => false,
        }
    }
}

impl RpcErrorExt for ContractError {
    fn transport_error(&self) -> Option<&TransportError> {
        match self {
            ContractError::TransportError(err) => Some(err),
            _ => None,
        }
    }
}

impl RpcErrorExt for PendingTransactionError {
    fn transport_error(&self) -> Option<&TransportError> {
        match self {
            PendingTransactionError::TransportError(err) => Some(err),
            _ => None,
        }
    }
}

fn payload_revert_reason(payload: &ErrorPayload) -> Option<String> {
    if let Some(reason) = payload
        .as_revert_data()
        .and_then(|data| decode_revert_reason(&data))
    {
        return Some(reason);
    }
    // Nodes that don't return revert data still put the reason in the message.
    payload
        .message
        .strip_prefix("execution reverted: ")
        .map(str::to_owned)
}

fn is_rejection_payload(payload: &ErrorPayload) -> bool {
    if payload.code == USER_REJECTED_REQUEST {
        return true;
    }
    let message = payload.message.to_lowercase();
    REJECTION_MESSAGES
        .iter()
        .any(|fragment| message.contains(fragment))
}
