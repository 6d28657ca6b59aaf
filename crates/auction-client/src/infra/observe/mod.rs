//! This module implements the observability for the auction client. It
//! exposes functions which represent events that are meaningful to the
//! system. These functions are called when the corresponding events occur.
//! They log the event and update the metrics, if the event is worth
//! measuring.

use {
    crate::{
        domain::{
            bid::BidRequest,
            client::Action,
            error::{BidError, StaleReadError},
        },
        infra::{blockchain::TxReceipt, fhe, poller::Family},
    },
    alloy::primitives::U256,
    std::time::Duration,
    url::Url,
};

pub mod metrics;

/// Setup the observability. The config configures the tracing subscriber.
pub fn init(config: &observe::Config) {
    observe::tracing::initialize(config);
    metrics::init();
}

/// Observe that a refresh cycle of a data family is starting.
pub fn polling(family: Family) {
    tracing::trace!(%family, "polling");
}

/// Observe that a data family is refreshed out of cycle.
pub fn refresh_triggered(family: Family) {
    tracing::debug!(%family, "refresh triggered");
}

/// Observe a failed refresh cycle. The previously published value stays.
pub fn poll_failed(family: Family, err: &anyhow::Error) {
    tracing::warn!(%family, ?err, "failed to refresh");
    metrics::get()
        .poll_failures
        .with_label_values(&[family.as_str()])
        .inc();
}

/// Observe a snapshot that contradicts the previous one.
pub fn stale_read(err: &StaleReadError) {
    tracing::warn!(%err, "stale auction read, forcing a refresh");
    metrics::get().stale_reads.inc();
}

pub fn encryption_initializing(endpoint: &Url, chain_id: u64) {
    tracing::info!(%endpoint, chain_id, "initializing encryption provider");
}

pub fn encryption_ready() {
    tracing::info!("encryption provider ready");
}

pub fn encryption_failed(err: &fhe::Error, retry_in: Duration) {
    tracing::warn!(?err, ?retry_in, "encryption provider initialization failed");
}

/// Observe that the bid submission protocol is starting.
pub fn submitting_bid(bid: &BidRequest) {
    tracing::info!(
        price = %bid.price,
        quantity = bid.quantity,
        total_cost = %bid.total_cost,
        "submitting bid"
    );
}

pub fn approval_requested(allowance: &U256, amount: &U256) {
    tracing::info!(%allowance, %amount, "allowance too low, requesting approval");
}

pub fn encrypting_quantity() {
    tracing::debug!("encrypting bid quantity");
}

/// Observe a confirmed bid, and the index its quantity is remembered under.
pub fn bid_placed(receipt: &TxReceipt, index: Option<u64>) {
    tracing::info!(hash = ?receipt.hash, block = ?receipt.block_number, ?index, "bid placed");
}

/// Observe that the new bid's index could not be determined, so its quantity
/// will show as unknown.
pub fn bid_index_unknown(err: &anyhow::Error) {
    tracing::warn!(?err, "failed to read bid count after placing bid");
}

/// Observe that cached bid quantities were dropped.
pub fn ledger_invalidated(cancelled: u64) {
    tracing::debug!(cancelled, "cached bid quantities invalidated");
}

/// Observe the outcome of a user action.
pub fn action(action: Action, result: &Result<TxReceipt, BidError>) {
    let label = match result {
        Ok(receipt) => {
            tracing::info!(%action, hash = ?receipt.hash, gas_used = receipt.gas_used, "action confirmed");
            "success"
        }
        Err(BidError::Precondition(err)) => {
            tracing::info!(%action, %err, "action rejected");
            "precondition"
        }
        Err(BidError::UserDeclined) => {
            tracing::info!(%action, "action declined in wallet");
            "declined"
        }
        Err(err) => {
            tracing::warn!(%action, ?err, "action failed");
            err.kind()
        }
    };
    metrics::get()
        .actions
        .with_label_values(&[action.as_str(), label])
        .inc();
}
