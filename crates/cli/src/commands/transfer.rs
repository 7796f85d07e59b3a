use alloy::primitives::{utils::format_ether, Address, U256};
use ethload_core::{ChainClient, Transaction};
use tracing::{debug, info};

use super::{
    common::{run_workers, LoadCliArgs},
    Session,
};

/// One transfer from `client`'s account (or the node's first account when read-only).
pub async fn send_transfer(
    client: &ChainClient,
    to: Address,
    value: U256,
    wait: bool,
) -> ethload_core::Result<()> {
    if let Some(from) = client.address() {
        let nonce = client.sync_nonce().await?;
        let gas_price = client.gas_price().await?;
        let balance = client.get_balance(from).await?;
        debug!(
            "{from}: nonce {nonce}, balance {} eth, gas price {gas_price}",
            format_ether(balance)
        );
    }
    let hash = client
        .send_transaction(Transaction::transfer(to, value))
        .await?;
    if wait {
        let receipt = client.wait_for_receipt(hash).await?;
        info!(
            "transfer {hash} landed in block {} (status {})",
            receipt.block_number, receipt.status
        );
    } else {
        info!("transfer sent: {hash}");
    }
    Ok(())
}

pub async fn transfer(
    session: &Session,
    to: Option<Address>,
    value: U256,
    wait: bool,
    load: LoadCliArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = session.client.clone();
    let to = match to.or(client.address()) {
        Some(to) => to,
        None => client
            .accounts()
            .await?
            .first()
            .copied()
            .ok_or("no recipient; pass --to")?,
    };
    info!(
        "sending {} eth to {to} from {} workers x {} iterations",
        format_ether(value),
        load.workers,
        load.iterations
    );
    run_workers(&load, move |_worker, _i| {
        let client = client.clone();
        async move { send_transfer(&client, to, value, wait).await }
    })
    .await
    .into_result()
}
