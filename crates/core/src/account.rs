use crate::{
    config::ClientOptions,
    error::{ConfigError, SigningErrorKind},
};
use alloy::{
    network::EthereumWallet,
    primitives::Address,
    signers::local::{coins_bip39::English, MnemonicBuilder, PrivateKeySigner},
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Signing identity of a client. Immutable once built.
#[derive(Clone, Debug)]
pub enum Account {
    /// Signs locally with the given key.
    Signer(PrivateKeySigner),
    /// No key material; submissions rely on node-managed accounts.
    ReadOnly,
}

impl Account {
    /// Builds the account described by `opts`. Exactly one of `privateKey` / `mnemonic` may be set.
    pub fn from_options(opts: &ClientOptions) -> Result<Self, ConfigError> {
        match (&opts.private_key, &opts.mnemonic) {
            (Some(_), Some(_)) => Err(ConfigError::ConflictingCredentials),
            (Some(key), None) => Self::from_private_key(key),
            (None, Some(phrase)) => Self::from_mnemonic(phrase),
            (None, None) => Ok(Self::ReadOnly),
        }
    }

    pub fn from_private_key(key: &str) -> Result<Self, ConfigError> {
        PrivateKeySigner::from_str(key.trim())
            .map(Self::Signer)
            .map_err(|e| ConfigError::InvalidPrivateKey(e.to_string()))
    }

    /// Derives the first account (`m/44'/60'/0'/0/0`) of a BIP-39 phrase.
    pub fn from_mnemonic(phrase: &str) -> Result<Self, ConfigError> {
        let signer = MnemonicBuilder::<English>::default()
            .phrase(phrase.trim())
            .index(0)
            .and_then(|b| b.build())
            .map_err(|e| ConfigError::InvalidMnemonic(e.to_string()))?;
        Ok(Self::Signer(signer))
    }

    pub fn address(&self) -> Option<Address> {
        match self {
            Self::Signer(signer) => Some(signer.address()),
            Self::ReadOnly => None,
        }
    }

    pub fn signer(&self) -> Option<&PrivateKeySigner> {
        match self {
            Self::Signer(signer) => Some(signer),
            Self::ReadOnly => None,
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::ReadOnly)
    }

    pub(crate) fn wallet(&self) -> Result<EthereumWallet, SigningErrorKind> {
        self.signer()
            .map(|s| EthereumWallet::from(s.to_owned()))
            .ok_or(SigningErrorKind::NoCredential)
    }
}

impl From<PrivateKeySigner> for Account {
    fn from(signer: PrivateKeySigner) -> Self {
        Self::Signer(signer)
    }
}

/// A freshly generated key, hex-encoded without a `0x` prefix.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct KeyPair {
    pub private_key: String,
    pub address: Address,
}

impl KeyPair {
    pub fn generate() -> Self {
        let signer = PrivateKeySigner::random();
        Self {
            private_key: alloy::hex::encode(signer.to_bytes()),
            address: signer.address(),
        }
    }
}
