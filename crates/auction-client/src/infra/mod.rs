pub mod blockchain;
pub mod cli;
pub mod config;
pub mod fhe;
pub mod observe;
pub mod poller;
pub mod session;
pub mod time;

pub use {config::Config, poller::Poller};
