use crate::{
    domain,
    infra::{blockchain, fhe, poller},
};

pub mod file;

/// Everything the client needs besides the CLI arguments.
#[derive(Debug, Clone)]
pub struct Config {
    pub contracts: blockchain::Addresses,
    pub encryption: fhe::Config,
    pub intervals: poller::Intervals,
    pub client: domain::client::Config,
    /// Gas limit for bid placement. Verifying the encryption proof makes
    /// estimates unreliable.
    pub place_bid_gas_limit: u64,
}
