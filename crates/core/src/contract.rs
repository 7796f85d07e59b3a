use crate::{
    client::{ChainClient, Receipt, Transaction},
    error::AbiErrorKind,
    Result,
};
use alloy::{
    dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt, Specifier},
    json_abi::{Function, JsonAbi, Param},
    primitives::{Address, Bytes, TxHash, U256},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Parses a JSON ABI. Accepts either the bare array or a build artifact with an `abi` key.
pub fn parse_abi(json: &str) -> Result<JsonAbi> {
    if let Ok(abi) = serde_json::from_str::<JsonAbi>(json) {
        return Ok(abi);
    }
    let artifact: serde_json::Value =
        serde_json::from_str(json).map_err(|e| AbiErrorKind::Parse(e.to_string()))?;
    let abi = artifact
        .get("abi")
        .ok_or_else(|| AbiErrorKind::Parse("expected an abi array or an object with `abi`".into()))?;
    Ok(serde_json::from_value(abi.to_owned()).map_err(|e| AbiErrorKind::Parse(e.to_string()))?)
}

/// Decodes hex bytecode, with or without `0x` and surrounding whitespace.
pub fn decode_bytecode(code: &str) -> Result<Bytes> {
    Ok(alloy::hex::decode(code.trim())
        .map(Bytes::from)
        .map_err(|e| AbiErrorKind::Bytecode(e.to_string()))?)
}

/// Coerces string args into typed values according to `params`.
fn coerce_args(method: &str, params: &[Param], args: &[impl AsRef<str>]) -> Result<Vec<DynSolValue>> {
    if params.len() != args.len() {
        return Err(AbiErrorKind::ArgCount {
            method: method.to_owned(),
            expected: params.len(),
            got: args.len(),
        }
        .into());
    }
    params
        .iter()
        .zip(args)
        .map(|(param, arg)| -> Result<DynSolValue> {
            let ty = param.resolve()?;
            ty.coerce_str(arg.as_ref()).map_err(|e| {
                AbiErrorKind::Coerce {
                    arg: arg.as_ref().to_owned(),
                    ty: ty.sol_type_name().into_owned(),
                    reason: e.to_string(),
                }
                .into()
            })
        })
        .collect()
}

/// ABI-encodes constructor args (no selector). Empty when there are no args.
pub fn encode_constructor(abi: &JsonAbi, args: &[impl AsRef<str>]) -> Result<Vec<u8>> {
    match &abi.constructor {
        Some(ctor) => {
            let values = coerce_args("constructor", &ctor.inputs, args)?;
            Ok(ctor.abi_encode_input(&values)?)
        }
        None if args.is_empty() => Ok(vec![]),
        None => Err(AbiErrorKind::NoConstructor(args.len()).into()),
    }
}

/// Per-call overrides for [`ContractHandle::txn`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TxnOptions {
    pub value: U256,
    pub gas_price: Option<u128>,
    pub gas_limit: Option<u64>,
    pub nonce: Option<u64>,
    /// Wait for the receipt before returning.
    pub wait: bool,
}

impl TxnOptions {
    pub fn waiting() -> Self {
        Self {
            wait: true,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TxnOutcome {
    pub transaction_hash: TxHash,
    /// Only known once the receipt has been waited for.
    pub gas_used: Option<u64>,
    pub receipt: Option<Receipt>,
}

/// A deployed contract bound to a [`ChainClient`].
#[derive(Clone, Debug)]
pub struct ContractHandle {
    client: ChainClient,
    address: Address,
    abi: Arc<JsonAbi>,
}

impl ContractHandle {
    pub fn new(client: ChainClient, address: Address, abi: JsonAbi) -> Self {
        Self {
            client,
            address,
            abi: Arc::new(abi),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn abi(&self) -> &JsonAbi {
        &self.abi
    }

    /// Finds `method`, picking the overload whose arity matches.
    fn function(&self, method: &str, argc: usize) -> Result<&Function> {
        let overloads = self
            .abi
            .function(method)
            .ok_or_else(|| AbiErrorKind::MethodNotFound(method.to_owned()))?;
        overloads
            .iter()
            .find(|f| f.inputs.len() == argc)
            .ok_or_else(|| {
                AbiErrorKind::ArgCount {
                    method: method.to_owned(),
                    expected: overloads[0].inputs.len(),
                    got: argc,
                }
                .into()
            })
    }

    /// Selector followed by the ABI-encoded args.
    pub fn encode_call(&self, method: &str, args: &[impl AsRef<str>]) -> Result<Bytes> {
        let func = self.function(method, args.len())?;
        let values = coerce_args(method, &func.inputs, args)?;
        Ok(func.abi_encode_input(&values)?.into())
    }

    /// Executes `method` read-only against the latest state and decodes its outputs.
    pub async fn call(&self, method: &str, args: &[impl AsRef<str>]) -> Result<Vec<DynSolValue>> {
        let func = self.function(method, args.len())?;
        let data = self.encode_call(method, args)?;
        let out = self.client.eth_call(self.address, data).await?;
        Ok(func.abi_decode_output(&out)?)
    }

    /// Sends `method` as a transaction through the client's nonce-tracked submission path.
    pub async fn txn(
        &self,
        method: &str,
        opts: TxnOptions,
        args: &[impl AsRef<str>],
    ) -> Result<TxnOutcome> {
        let data = self.encode_call(method, args)?;
        let tx = Transaction {
            to: Some(self.address),
            value: opts.value,
            input: data,
            gas_limit: opts.gas_limit,
            gas_price: opts.gas_price,
            nonce: opts.nonce,
            ..Default::default()
        };
        let transaction_hash = self.client.send_transaction(tx).await?;
        debug!("{method} sent to {}: {transaction_hash}", self.address);
        if !opts.wait {
            return Ok(TxnOutcome {
                transaction_hash,
                gas_used: None,
                receipt: None,
            });
        }
        let receipt = self.client.wait_for_receipt(transaction_hash).await?;
        Ok(TxnOutcome {
            transaction_hash,
            gas_used: Some(receipt.gas_used),
            receipt: Some(receipt),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ClientOptions,
        error::Error,
        test_utils::{spawn_anvil, ANVIL_KEYS, STORAGE_ABI, STORAGE_BIN},
        transport::tests::mocked,
    };
    use alloy::{hex::ToHexExt, transports::mock::Asserter};

    const CTOR_ABI: &str = r#"[
        {"type":"constructor","stateMutability":"nonpayable","inputs":[
            {"name":"owner","type":"address"},{"name":"supply","type":"uint256"}]}
    ]"#;

    async fn offline_handle() -> ContractHandle {
        // no request is sent: chain id is configured and nothing below performs I/O
        let client = ChainClient::connect(ClientOptions::new("http://127.0.0.1:1").with_chain_id(1))
            .await
            .unwrap();
        client
            .new_contract(Address::with_last_byte(9), STORAGE_ABI)
            .unwrap()
    }

    #[tokio::test]
    async fn encodes_set_call() {
        let handle = offline_handle().await;
        let calldata = handle.encode_call("set", &["0x12345678"]).unwrap();
        assert_eq!(
            calldata.encode_hex(),
            "60fe47b10000000000000000000000000000000000000000000000000000000012345678"
        );
    }

    #[tokio::test]
    async fn unknown_method_and_bad_arity_are_abi_errors() {
        let handle = offline_handle().await;
        assert!(matches!(
            handle.encode_call("nope", &[] as &[&str]),
            Err(Error::Abi(AbiErrorKind::MethodNotFound(_)))
        ));
        assert!(matches!(
            handle.encode_call("set", &["1", "2"]),
            Err(Error::Abi(AbiErrorKind::ArgCount { expected: 1, got: 2, .. }))
        ));
        assert!(matches!(
            handle.encode_call("set", &["not a number"]),
            Err(Error::Abi(AbiErrorKind::Coerce { .. }))
        ));
    }

    #[tokio::test]
    async fn call_decodes_outputs() {
        let asserter = Asserter::new();
        asserter.push_success(&format!("0x{:064x}", 42));
        let client = ChainClient::with_transport(
            ClientOptions::default().with_chain_id(1),
            mocked(&asserter),
        )
        .await
        .unwrap();
        let storage = client
            .new_contract(Address::with_last_byte(9), STORAGE_ABI)
            .unwrap();
        let got = storage.call("get", &[] as &[&str]).await.unwrap();
        assert_eq!(got, vec![DynSolValue::Uint(U256::from(42), 256)]);
    }

    #[test]
    fn parses_artifact_with_abi_key() {
        let artifact = format!(r#"{{"contractName":"Storage","abi":{STORAGE_ABI}}}"#);
        let abi = parse_abi(&artifact).unwrap();
        assert!(abi.function("get").is_some());
        assert!(parse_abi("{\"bytecode\":\"0x\"}").is_err());
    }

    #[test]
    fn encodes_constructor_args() {
        let abi = parse_abi(CTOR_ABI).unwrap();
        let encoded = encode_constructor(
            &abi,
            &["0x00000000000000000000000000000000000000ff", "1000"],
        )
        .unwrap();
        assert_eq!(encoded.len(), 64);
        assert_eq!(encoded[31], 0xff);
        assert_eq!(&encoded[62..], &[0x03, 0xe8]);

        let no_ctor = parse_abi(STORAGE_ABI).unwrap();
        assert!(encode_constructor(&no_ctor, &[] as &[&str]).unwrap().is_empty());
        assert!(matches!(
            encode_constructor(&no_ctor, &["1"]),
            Err(Error::Abi(AbiErrorKind::NoConstructor(1)))
        ));
    }

    #[test]
    fn decodes_prefixed_and_bare_bytecode() {
        assert_eq!(decode_bytecode("0x6000").unwrap().to_vec(), vec![0x60, 0x00]);
        assert_eq!(decode_bytecode("6000\n").unwrap().to_vec(), vec![0x60, 0x00]);
        assert!(decode_bytecode("0xzz").is_err());
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let anvil = spawn_anvil();
        let client = ChainClient::connect(
            ClientOptions::new(anvil.endpoint()).with_private_key(ANVIL_KEYS[8]),
        )
        .await
        .unwrap();
        let receipt = client
            .deploy_contract(STORAGE_ABI, STORAGE_BIN, &[] as &[&str])
            .await
            .unwrap();
        let storage = client
            .new_contract(receipt.contract_address.unwrap(), STORAGE_ABI)
            .unwrap();

        let outcome = storage
            .txn("set", TxnOptions::waiting(), &["42"])
            .await
            .unwrap();
        let set_receipt = outcome.receipt.unwrap();
        assert!(set_receipt.status);
        assert_eq!(outcome.gas_used, Some(set_receipt.gas_used));

        let got = storage.call("get", &[] as &[&str]).await.unwrap();
        assert_eq!(got, vec![DynSolValue::Uint(U256::from(42), 256)]);
    }

    #[tokio::test]
    async fn txn_without_wait_returns_hash_only() {
        let anvil = spawn_anvil();
        let client = ChainClient::connect(
            ClientOptions::new(anvil.endpoint()).with_private_key(ANVIL_KEYS[9]),
        )
        .await
        .unwrap();
        let receipt = client
            .deploy_contract(STORAGE_ABI, STORAGE_BIN, &[] as &[&str])
            .await
            .unwrap();
        let storage = client
            .new_contract(receipt.contract_address.unwrap(), STORAGE_ABI)
            .unwrap();
        let outcome = storage
            .txn(
                "set",
                TxnOptions {
                    gas_limit: Some(100_000),
                    ..Default::default()
                },
                &["7"],
            )
            .await
            .unwrap();
        assert!(outcome.receipt.is_none());
        assert!(outcome.gas_used.is_none());
        let receipt = client
            .wait_for_receipt(outcome.transaction_hash)
            .await
            .unwrap();
        assert!(receipt.status);
    }
}
