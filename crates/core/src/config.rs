//! Client configuration.
//!
//! Options are accepted as a JSON or TOML document. Unknown keys are rejected.

use crate::error::ConfigError;
use alloy::{consensus::TxType, transports::http::reqwest::Url};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_RECEIPT_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
pub const DEFAULT_DEPLOY_GAS_LIMIT: u64 = 1_500_000;

/// Transaction envelope used when the caller does not pin fee fields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxTypeOption {
    #[default]
    Legacy,
    Eip1559,
}

impl From<TxTypeOption> for TxType {
    fn from(value: TxTypeOption) -> Self {
        match value {
            TxTypeOption::Legacy => TxType::Legacy,
            TxTypeOption::Eip1559 => TxType::Eip1559,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClientOptions {
    /// RPC endpoint. Defaults to [`DEFAULT_RPC_URL`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Hex-encoded signing key, with or without `0x`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,

    /// BIP-39 phrase; the key at `m/44'/60'/0'/0/0` is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mnemonic: Option<String>,

    /// Chain id for replay protection. Queried from the node when absent.
    #[serde(
        default,
        rename = "chainID",
        alias = "chainId",
        skip_serializing_if = "Option::is_none"
    )]
    pub chain_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_gas_limit: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_type: Option<TxTypeOption>,
}

impl ClientOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn with_private_key(self, key: impl Into<String>) -> Self {
        Self {
            private_key: Some(key.into()),
            ..self
        }
    }

    pub fn with_mnemonic(self, phrase: impl Into<String>) -> Self {
        Self {
            mnemonic: Some(phrase.into()),
            ..self
        }
    }

    pub fn with_chain_id(self, chain_id: u64) -> Self {
        Self {
            chain_id: Some(chain_id),
            ..self
        }
    }

    pub fn with_tx_type(self, tx_type: TxTypeOption) -> Self {
        Self {
            tx_type: Some(tx_type),
            ..self
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Reads options from a `.json` or `.toml` file, chosen by extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_toml(&contents),
        }
    }

    /// Overlays every option that is set in `other` on top of `self`.
    pub fn merge(self, other: ClientOptions) -> Self {
        Self {
            url: other.url.or(self.url),
            private_key: other.private_key.or(self.private_key),
            mnemonic: other.mnemonic.or(self.mnemonic),
            chain_id: other.chain_id.or(self.chain_id),
            request_timeout_ms: other.request_timeout_ms.or(self.request_timeout_ms),
            receipt_timeout_ms: other.receipt_timeout_ms.or(self.receipt_timeout_ms),
            poll_interval_ms: other.poll_interval_ms.or(self.poll_interval_ms),
            deploy_gas_limit: other.deploy_gas_limit.or(self.deploy_gas_limit),
            tx_type: other.tx_type.or(self.tx_type),
        }
    }

    pub fn rpc_url(&self) -> Result<Url, ConfigError> {
        let raw = self.url.as_deref().unwrap_or(DEFAULT_RPC_URL);
        Url::parse(raw).map_err(|_| ConfigError::InvalidUrl(raw.to_owned()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(
            self.request_timeout_ms
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
        )
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_millis(
            self.receipt_timeout_ms
                .unwrap_or(DEFAULT_RECEIPT_TIMEOUT_MS),
        )
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS))
    }

    pub fn deploy_gas_limit(&self) -> u64 {
        self.deploy_gas_limit.unwrap_or(DEFAULT_DEPLOY_GAS_LIMIT)
    }

    pub fn tx_type(&self) -> TxType {
        self.tx_type.unwrap_or_default().into()
    }
}
