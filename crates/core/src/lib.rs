pub mod account;
pub mod client;
pub mod config;
pub mod contract;
pub mod error;
pub mod funder;
pub mod metrics;
pub mod monitor;
pub mod nonce;
pub mod transport;

#[cfg(test)]
mod test_utils;

pub type Result<T> = std::result::Result<T, error::Error>;

pub use account::{Account, KeyPair};
pub use client::{ChainClient, Receipt, Transaction};
pub use config::ClientOptions;
pub use contract::{ContractHandle, TxnOptions, TxnOutcome};
pub use error::Error;
pub use nonce::NonceTracker;
pub use transport::RpcTransport;

pub use alloy;
