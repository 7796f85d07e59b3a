use crate::{account::Account, error::ConfigError, Result};
use alloy::{primitives::Address, signers::local::PrivateKeySigner, transports::http::reqwest::Url};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{path::Path, str::FromStr};
use tracing::debug;

/// A pre-funded account handed to a worker.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct FundedAccount {
    pub address: Address,
    pub private_key: String,
}

impl FundedAccount {
    /// Signing account for this entry. Fails if the key does not belong to `address`.
    pub fn account(&self) -> std::result::Result<Account, ConfigError> {
        let account = Account::from_private_key(&self.private_key)?;
        if account.address() != Some(self.address) {
            return Err(ConfigError::InvalidPrivateKey(format!(
                "key does not match address {}",
                self.address
            )));
        }
        Ok(account)
    }
}

impl From<&PrivateKeySigner> for FundedAccount {
    fn from(signer: &PrivateKeySigner) -> Self {
        Self {
            address: signer.address(),
            private_key: alloy::hex::encode_prefixed(signer.to_bytes()),
        }
    }
}

/// Provides accounts that already hold enough balance for a run.
#[async_trait]
pub trait AccountFunder {
    async fn fund_test_accounts(&self, source: Address, url: &Url) -> Result<Vec<FundedAccount>>;
}

/// Hands out a fixed list of accounts funded ahead of time.
#[derive(Clone, Debug, Default)]
pub struct StaticAccounts {
    accounts: Vec<FundedAccount>,
}

impl StaticAccounts {
    pub fn new(accounts: Vec<FundedAccount>) -> Self {
        Self { accounts }
    }

    /// Reads a JSON array of `{"address", "private_key"}` objects.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let accounts: Vec<FundedAccount> =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        for acct in &accounts {
            acct.account()?;
        }
        Ok(Self::new(accounts))
    }

    pub fn from_private_keys(keys: &[impl AsRef<str>]) -> Result<Self> {
        let accounts = keys
            .iter()
            .map(|key| {
                PrivateKeySigner::from_str(key.as_ref().trim())
                    .map(|signer| FundedAccount::from(&signer))
                    .map_err(|e| ConfigError::InvalidPrivateKey(e.to_string()))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self::new(accounts))
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl AccountFunder for StaticAccounts {
    async fn fund_test_accounts(&self, source: Address, url: &Url) -> Result<Vec<FundedAccount>> {
        debug!(
            "using {} pre-funded accounts (source {source}, endpoint {url})",
            self.accounts.len()
        );
        Ok(self.accounts.clone())
    }
}
