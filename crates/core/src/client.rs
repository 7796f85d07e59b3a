use crate::{
    account::Account,
    config::ClientOptions,
    contract::{self, ContractHandle},
    error::{Error, SigningErrorKind},
    metrics::ClientMetrics,
    nonce::{NonceSource, NonceTracker},
    transport::RpcTransport,
    Result,
};
use alloy::{
    consensus::TxType,
    eips::eip2718::Encodable2718,
    network::{ReceiptResponse, TransactionBuilder},
    primitives::{Address, Bytes, TxHash, TxKind, B256, U128, U256, U64},
    rpc::types::{
        Block, BlockId, BlockNumberOrTag, TransactionInput, TransactionReceipt,
        TransactionRequest,
    },
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// User-facing transaction description. Omitted fields are filled in by [`ChainClient`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Transaction {
    /// Sender; only used when the node signs (`eth_sendTransaction`).
    pub from: Option<Address>,
    /// Recipient. `None` creates a contract.
    pub to: Option<Address>,
    /// Value in wei.
    pub value: U256,
    pub input: Bytes,
    pub gas_limit: Option<u64>,
    pub gas_price: Option<u128>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
    pub nonce: Option<u64>,
    pub chain_id: Option<u64>,
}

impl Transaction {
    pub fn transfer(to: Address, value: U256) -> Self {
        Self {
            to: Some(to),
            value,
            ..Default::default()
        }
    }

    pub fn create(code: impl Into<Bytes>) -> Self {
        Self {
            input: code.into(),
            ..Default::default()
        }
    }

    pub fn with_input(self, input: impl Into<Bytes>) -> Self {
        Self {
            input: input.into(),
            ..self
        }
    }

    pub fn with_nonce(self, nonce: u64) -> Self {
        Self {
            nonce: Some(nonce),
            ..self
        }
    }

    pub fn with_gas_limit(self, gas_limit: u64) -> Self {
        Self {
            gas_limit: Some(gas_limit),
            ..self
        }
    }

    pub fn with_gas_price(self, gas_price: u128) -> Self {
        Self {
            gas_price: Some(gas_price),
            ..self
        }
    }

    fn has_fee_market_fields(&self) -> bool {
        self.max_fee_per_gas.is_some() || self.max_priority_fee_per_gas.is_some()
    }
}

/// Outcome of an included transaction.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Receipt {
    pub transaction_hash: TxHash,
    pub block_hash: B256,
    pub block_number: u64,
    /// `true` if execution succeeded.
    pub status: bool,
    pub from: Address,
    pub to: Option<Address>,
    /// Only set for contract creations.
    pub contract_address: Option<Address>,
    pub gas_used: u64,
    pub cumulative_gas_used: u64,
    pub effective_gas_price: u128,
}

impl From<TransactionReceipt> for Receipt {
    fn from(r: TransactionReceipt) -> Self {
        Self {
            transaction_hash: r.transaction_hash,
            block_hash: r.block_hash.unwrap_or_default(),
            block_number: r.block_number.unwrap_or_default(),
            status: r.status(),
            from: r.from,
            to: r.to,
            contract_address: r.contract_address,
            gas_used: r.gas_used,
            cumulative_gas_used: r.cumulative_gas_used(),
            effective_gas_price: r.effective_gas_price,
        }
    }
}

/// Facade over one RPC endpoint, bound to one [`Account`].
///
/// Clones share the transport, the nonce tracker and the key material, so a clone can be
/// handed to each [`ContractHandle`] or worker task.
#[derive(Clone, Debug)]
pub struct ChainClient {
    transport: RpcTransport,
    account: Arc<Account>,
    nonces: NonceTracker,
    chain_id: u64,
    opts: Arc<ClientOptions>,
}

impl ChainClient {
    /// Validates `opts`, connects to the endpoint and resolves the chain id.
    pub async fn connect(opts: ClientOptions) -> Result<Self> {
        let url = opts.rpc_url()?;
        let transport = RpcTransport::http(url, opts.request_timeout());
        Self::with_transport(opts, transport).await
    }

    /// Builds a client on an existing (possibly shared) transport.
    pub async fn with_transport(opts: ClientOptions, transport: RpcTransport) -> Result<Self> {
        let account = Account::from_options(&opts)?;
        let chain_id = match opts.chain_id {
            Some(id) => id,
            None => {
                let id: U64 = transport.call("eth_chainId", ()).await?;
                id.to()
            }
        };
        debug!(
            "client ready. chain_id: {chain_id}, account: {}",
            account
                .address()
                .map(|a| a.to_string())
                .unwrap_or("read-only".to_owned())
        );
        Ok(Self {
            transport,
            account: Arc::new(account),
            nonces: NonceTracker::new(),
            chain_id,
            opts: Arc::new(opts),
        })
    }

    /// Replaces the nonce tracker, e.g. to share one between clients of the same account.
    pub fn with_nonce_tracker(self, nonces: NonceTracker) -> Self {
        Self { nonces, ..self }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn address(&self) -> Option<Address> {
        self.account.address()
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn nonces(&self) -> &NonceTracker {
        &self.nonces
    }

    pub fn transport(&self) -> &RpcTransport {
        &self.transport
    }

    pub fn options(&self) -> &ClientOptions {
        &self.opts
    }

    /// Raw JSON-RPC passthrough.
    pub async fn call(
        &self,
        method: impl Into<String>,
        params: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        self.transport.call_json(method, params).await
    }

    pub async fn get_balance(&self, address: Address) -> Result<U256> {
        self.get_balance_at(address, BlockId::latest()).await
    }

    pub async fn get_balance_at(&self, address: Address, block: BlockId) -> Result<U256> {
        self.transport
            .call("eth_getBalance", (address, block))
            .await
    }

    /// Pending transaction count of `address`. Does not consult the nonce tracker.
    pub async fn get_nonce(&self, address: Address) -> Result<u64> {
        self.transport.transaction_count(address).await
    }

    /// Raises the tracked nonce of this client's account to the chain's count and returns
    /// the nonce the next submission will use.
    pub async fn sync_nonce(&self) -> Result<u64> {
        let address = self.address().ok_or(SigningErrorKind::NoCredential)?;
        let chain_nonce = self.get_nonce(address).await?;
        Ok(self.nonces.reconcile(address, chain_nonce).await)
    }

    /// Current gas price. Never cached.
    pub async fn gas_price(&self) -> Result<u128> {
        let price: U128 = self.transport.call("eth_gasPrice", ()).await?;
        Ok(price.to())
    }

    pub async fn block_number(&self) -> Result<u64> {
        let n: U64 = self.transport.call("eth_blockNumber", ()).await?;
        Ok(n.to())
    }

    /// Fetches a block header with tx hashes.
    pub async fn get_block_by_number(&self, number: impl Into<BlockNumberOrTag>) -> Result<Block> {
        let number = number.into();
        let block: Option<Block> = self
            .transport
            .call("eth_getBlockByNumber", (number, false))
            .await?;
        block.ok_or_else(|| Error::NotFound(format!("block {number}")))
    }

    pub async fn estimate_gas(&self, tx: &Transaction) -> Result<u64> {
        let from = tx.from.or(self.address());
        self.estimate_request(&self.request_from(tx, from)).await
    }

    async fn estimate_request(&self, req: &TransactionRequest) -> Result<u64> {
        let gas: U64 = self.transport.call("eth_estimateGas", (req,)).await?;
        Ok(gas.to())
    }

    /// Node-managed accounts. Empty against endpoints that don't expose `eth_accounts`.
    pub async fn accounts(&self) -> Result<Vec<Address>> {
        match self.transport.call("eth_accounts", ()).await {
            Ok(accounts) => Ok(accounts),
            Err(e @ Error::Rpc { .. }) => {
                debug!("eth_accounts unavailable: {e}");
                Ok(vec![])
            }
            Err(e) => Err(e),
        }
    }

    /// Submits `tx` and returns its hash without waiting for inclusion.
    ///
    /// Signs locally when a key is configured, otherwise asks the node to sign for
    /// `tx.from` (or its first unlocked account).
    pub async fn send_transaction(&self, tx: Transaction) -> Result<TxHash> {
        if self.account.is_read_only() {
            self.submit_unsigned(tx).await
        } else {
            self.submit_signed(tx).await
        }
    }

    /// Like [`send_transaction`](Self::send_transaction) but always signs locally.
    pub async fn send_raw_transaction(&self, tx: Transaction) -> Result<TxHash> {
        self.submit_signed(tx).await
    }

    async fn submit_signed(&self, tx: Transaction) -> Result<TxHash> {
        let wallet = self.account.wallet()?;
        let from = self.address().ok_or(SigningErrorKind::NoCredential)?;
        let explicit_nonce = tx.nonce;
        let mut req = self.prepare(tx, from).await?;

        let mut nonces = self.nonces.lock(from).await;
        let nonce = match explicit_nonce {
            Some(n) => n,
            None => nonces.current(&self.transport).await?,
        };
        req.set_nonce(nonce);
        let envelope = req.build(&wallet).await?;
        let raw = Bytes::from(envelope.encoded_2718());
        debug!("sending tx {} from {from} with nonce {nonce}", envelope.tx_hash());

        let res = self
            .transport
            .call::<_, TxHash>("eth_sendRawTransaction", (raw,))
            .await;
        after_dispatch(&res, nonce, &mut nonces);
        res
    }

    async fn submit_unsigned(&self, tx: Transaction) -> Result<TxHash> {
        let from = match tx.from {
            Some(from) => from,
            None => *self
                .accounts()
                .await?
                .first()
                .ok_or(SigningErrorKind::NoCredential)?,
        };
        let explicit_nonce = tx.nonce;
        let mut req = self.prepare(tx, from).await?;

        let mut nonces = self.nonces.lock(from).await;
        let nonce = match explicit_nonce {
            Some(n) => n,
            None => nonces.current(&self.transport).await?,
        };
        req.set_nonce(nonce);
        debug!("sending node-signed tx from {from} with nonce {nonce}");

        let res = self
            .transport
            .call::<_, TxHash>("eth_sendTransaction", (&req,))
            .await;
        after_dispatch(&res, nonce, &mut nonces);
        res
    }

    fn request_from(&self, tx: &Transaction, from: Option<Address>) -> TransactionRequest {
        TransactionRequest {
            from,
            to: Some(tx.to.map_or(TxKind::Create, TxKind::Call)),
            value: Some(tx.value),
            input: TransactionInput::both(tx.input.clone()),
            chain_id: Some(tx.chain_id.unwrap_or(self.chain_id)),
            gas: tx.gas_limit,
            ..Default::default()
        }
    }

    /// Fills fees and gas limit. The nonce is assigned later, under the account's lock.
    async fn prepare(&self, tx: Transaction, from: Address) -> Result<TransactionRequest> {
        let mut req = self.request_from(&tx, Some(from));

        if tx.has_fee_market_fields() {
            let (max_fee, priority_fee) =
                match (tx.max_fee_per_gas, tx.max_priority_fee_per_gas) {
                    (Some(max), Some(tip)) => (max, tip),
                    (max, tip) => {
                        let gas_price = self.gas_price().await?;
                        let max = max.unwrap_or(gas_price + gas_price / 10);
                        (max, tip.unwrap_or(gas_price / 10).min(max))
                    }
                };
            req.set_max_fee_per_gas(max_fee);
            req.set_max_priority_fee_per_gas(priority_fee);
        } else if let Some(gas_price) = tx.gas_price {
            req.set_gas_price(gas_price);
        } else {
            let gas_price = self.gas_price().await?;
            match self.opts.tx_type() {
                TxType::Eip1559 => {
                    req.set_max_fee_per_gas(gas_price + gas_price / 10);
                    req.set_max_priority_fee_per_gas(gas_price / 10);
                }
                _ => req.set_gas_price(gas_price),
            }
        }

        if req.gas.is_none() {
            let gas = self.estimate_request(&req).await?;
            req.set_gas_limit(gas);
        }
        Ok(req)
    }

    /// Single `eth_getTransactionReceipt` lookup; `NotFound` while the tx is pending.
    pub async fn get_transaction_receipt(&self, hash: TxHash) -> Result<Receipt> {
        self.fetch_receipt(hash)
            .await?
            .ok_or_else(|| Error::NotFound(format!("receipt for {hash}")))
    }

    async fn fetch_receipt(&self, hash: TxHash) -> Result<Option<Receipt>> {
        let receipt: Option<TransactionReceipt> = self
            .transport
            .call("eth_getTransactionReceipt", (hash,))
            .await?;
        Ok(receipt.map(Receipt::from))
    }

    /// Polls for the receipt of `hash` until it appears or `timeout` elapses.
    ///
    /// No nonce lock is held while polling.
    pub async fn wait_for_transaction_receipt(
        &self,
        hash: TxHash,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Receipt> {
        let start = Instant::now();
        let receipt = tokio::time::timeout(timeout, self.poll_receipt(hash, poll_interval))
            .await
            .map_err(|_| Error::tx_timeout(&hash, start.elapsed()))??;
        ClientMetrics::global().observe_time_to_mine(start.elapsed());
        debug!(
            "tx landed. hash: {hash}, gas_used: {}, block_num: {}",
            receipt.gas_used, receipt.block_number
        );
        Ok(receipt)
    }

    /// [`wait_for_transaction_receipt`](Self::wait_for_transaction_receipt) with the
    /// configured timeout and poll interval.
    pub async fn wait_for_receipt(&self, hash: TxHash) -> Result<Receipt> {
        self.wait_for_transaction_receipt(
            hash,
            self.opts.receipt_timeout(),
            self.opts.poll_interval(),
        )
        .await
    }

    async fn poll_receipt(&self, hash: TxHash, poll_interval: Duration) -> Result<Receipt> {
        loop {
            if let Some(receipt) = self.fetch_receipt(hash).await? {
                return Ok(receipt);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Deploys `bytecode` with ABI-encoded constructor args and waits for the receipt.
    ///
    /// The gas limit comes from `deployGasLimit` rather than estimation so that a reverting
    /// constructor is still mined and reported as [`Error::Deployment`].
    pub async fn deploy_contract(
        &self,
        abi: &str,
        bytecode: &str,
        ctor_args: &[impl AsRef<str>],
    ) -> Result<Receipt> {
        let abi = contract::parse_abi(abi)?;
        let mut code = contract::decode_bytecode(bytecode)?.to_vec();
        code.extend(contract::encode_constructor(&abi, ctor_args)?);

        let tx = Transaction::create(code).with_gas_limit(self.opts.deploy_gas_limit());
        let hash = self.send_transaction(tx).await?;
        info!("contract deployment sent: {hash}");
        let receipt = self.wait_for_receipt(hash).await?;
        if !receipt.status {
            warn!("contract deployment {hash} reverted");
            return Err(Error::Deployment {
                receipt: Box::new(receipt),
            });
        }
        if receipt.contract_address.is_none() {
            return Err(Error::NotFound(format!(
                "contract address in receipt of {hash}"
            )));
        }
        Ok(receipt)
    }

    /// Binds a deployed contract. No I/O.
    pub fn new_contract(&self, address: Address, abi: &str) -> Result<ContractHandle> {
        Ok(ContractHandle::new(
            self.clone(),
            address,
            contract::parse_abi(abi)?,
        ))
    }

    /// Read-only `eth_call` against the latest block.
    pub(crate) async fn eth_call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let req = TransactionRequest {
            from: self.address(),
            to: Some(TxKind::Call(to)),
            input: TransactionInput::both(data),
            ..Default::default()
        };
        self.transport
            .call("eth_call", (req, BlockId::latest()))
            .await
    }
}

/// Settles the tracked nonce after a submission attempt.
///
/// Success advances it. A network failure leaves it unknown, since the node may or may not
/// have received the tx, so the cache is dropped and the next submission re-reads the pending
/// count. An explicit rejection leaves the nonce free for reuse.
fn after_dispatch(res: &Result<TxHash>, nonce: u64, nonces: &mut crate::nonce::NonceGuard) {
    match res {
        Ok(_) => {
            nonces.reconcile(nonce + 1);
        }
        Err(e @ Error::Network { .. }) => {
            warn!("tx with nonce {nonce} may not have been delivered: {e}");
            nonces.reset();
        }
        Err(e) => {
            if let Some(kind) = e.rpc_kind() {
                warn!("tx with nonce {nonce} rejected: {kind}");
            }
        }
    }
}
