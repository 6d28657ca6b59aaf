pub mod auction;
pub mod bid;
pub mod client;
pub mod error;
mod lifecycle;
mod submission;

pub use {
    auction::{AuctionSnapshot, Phase},
    bid::{BidLedger, PendingBidIntent},
    client::{Action, Client},
    error::BidError,
};
