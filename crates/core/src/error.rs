use crate::client::Receipt;
use alloy::{
    dyn_abi,
    network::{Ethereum, TransactionBuilderError},
    primitives::TxHash,
    transports::{RpcError, TransportErrorKind},
};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("network error calling {method}: {source}")]
    Network {
        method: String,
        params: String,
        #[source]
        source: NetworkErrorKind,
    },

    #[error("rpc error calling {method} (code {code}): {message}")]
    Rpc {
        method: String,
        params: String,
        code: i64,
        message: String,
    },

    #[error("timed out after {elapsed:?} waiting for {what}")]
    Timeout { what: String, elapsed: Duration },

    #[error("signing error: {0}")]
    Signing(#[from] SigningErrorKind),

    #[error(
        "contract deployment failed in block {} (tx {})",
        .receipt.block_number,
        .receipt.transaction_hash
    )]
    Deployment { receipt: Box<Receipt> },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("abi error: {0}")]
    Abi(#[from] AbiErrorKind),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("privateKey and mnemonic are mutually exclusive")]
    ConflictingCredentials,

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("invalid rpc url '{0}'")]
    InvalidUrl(String),

    #[error("failed to parse options: {0}")]
    Parse(String),

    #[error("io error")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum NetworkErrorKind {
    #[error("request timed out after {0:?}")]
    RequestTimeout(Duration),

    #[error("transport failure: {0}")]
    Transport(RpcError<TransportErrorKind>),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Error)]
pub enum SigningErrorKind {
    #[error("no signing credential configured and the node exposes no unlocked accounts")]
    NoCredential,

    #[error("failed to build signed transaction")]
    Build(#[from] Box<TransactionBuilderError<Ethereum>>),
}

#[derive(Debug, Error)]
pub enum AbiErrorKind {
    #[error("failed to parse abi: {0}")]
    Parse(String),

    #[error("failed to decode bytecode: {0}")]
    Bytecode(String),

    #[error("method '{0}' not found in abi")]
    MethodNotFound(String),

    #[error("method '{method}' takes {expected} args, got {got}")]
    ArgCount {
        method: String,
        expected: usize,
        got: usize,
    },

    #[error("abi has no constructor, but {0} constructor args were given")]
    NoConstructor(usize),

    #[error("failed to coerce arg '{arg}' to {ty}: {reason}")]
    Coerce {
        arg: String,
        ty: String,
        reason: String,
    },

    #[error("failed to encode/decode")]
    DynAbi(#[from] dyn_abi::Error),
}

/// Common node rejections that callers may want to branch on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RpcErrorKind {
    NonceTooLow,
    InsufficientFunds,
    TxAlreadyKnown,
    ReplacementTransactionUnderpriced,
    ExecutionReverted,
    MethodNotFound,
    Other,
}

impl std::fmt::Display for RpcErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use RpcErrorKind::*;
        match self {
            NonceTooLow => write!(f, "Nonce too low. Another sender may be using the same private key."),
            InsufficientFunds => write!(f, "Insufficient funds for transaction."),
            TxAlreadyKnown => write!(f, "Transaction already known. You may be using the same private key as another worker."),
            ReplacementTransactionUnderpriced => {
                write!(f, "Replacement transaction underpriced. You may have to wait, or replace the currently-pending transactions manually.")
            }
            ExecutionReverted => write!(f, "Execution reverted."),
            MethodNotFound => write!(f, "Method not supported by this node."),
            Other => write!(f, "Unclassified rpc error."),
        }
    }
}

impl Error {
    pub fn network(
        method: impl Into<String>,
        params: impl Into<String>,
        source: NetworkErrorKind,
    ) -> Self {
        Self::Network {
            method: method.into(),
            params: params.into(),
            source,
        }
    }

    pub fn timeout(what: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            elapsed,
        }
    }

    pub fn tx_timeout(hash: &TxHash, elapsed: Duration) -> Self {
        Self::timeout(format!("receipt of {hash}"), elapsed)
    }

    /// Classifies a node-side rejection. Returns `None` for errors that did not come from the node.
    pub fn rpc_kind(&self) -> Option<RpcErrorKind> {
        let Self::Rpc { code, message, .. } = self else {
            return None;
        };
        let msg = message.to_lowercase();
        let kind = if *code == -32601 || msg.contains("method not found") {
            RpcErrorKind::MethodNotFound
        } else if msg.contains("nonce too low") {
            RpcErrorKind::NonceTooLow
        } else if msg.contains("insufficient funds") {
            RpcErrorKind::InsufficientFunds
        } else if msg.contains("already known") {
            RpcErrorKind::TxAlreadyKnown
        } else if msg.contains("replacement transaction underpriced") {
            RpcErrorKind::ReplacementTransactionUnderpriced
        } else if msg.contains("revert") {
            RpcErrorKind::ExecutionReverted
        } else {
            RpcErrorKind::Other
        };
        Some(kind)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<TransactionBuilderError<Ethereum>> for Error {
    fn from(e: TransactionBuilderError<Ethereum>) -> Self {
        Self::Signing(SigningErrorKind::Build(Box::new(e)))
    }
}

impl From<dyn_abi::Error> for Error {
    fn from(e: dyn_abi::Error) -> Self {
        Self::Abi(e.into())
    }
}
