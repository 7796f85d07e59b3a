use alloy::primitives::{Address, U256};
use ethload_core::{
    funder::{AccountFunder, StaticAccounts},
    ChainClient, ClientOptions,
};
use std::{path::PathBuf, sync::Arc};
use tracing::{info, warn};

use super::{
    common::{run_workers, LoadCliArgs},
    transfer::send_transfer,
    Session,
};

/// Runs one worker per funded account. Every worker client shares the session's transport.
pub async fn multiple(
    session: &Session,
    accounts: PathBuf,
    to: Option<Address>,
    value: U256,
    load: LoadCliArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let funder = StaticAccounts::from_file(&accounts)?;
    let source = session.client.address().unwrap_or_default();
    let funded = funder
        .fund_test_accounts(source, &session.opts.rpc_url()?)
        .await?;
    if funded.is_empty() {
        return Err(format!("no accounts in {}", accounts.display()).into());
    }
    if funded.len() < load.workers {
        warn!(
            "{} workers requested but only {} accounts are funded; running {} workers",
            load.workers,
            funded.len(),
            funded.len()
        );
    }

    let mut clients = vec![];
    for acct in funded.iter().take(load.workers) {
        let opts = ClientOptions {
            private_key: Some(acct.private_key.to_owned()),
            mnemonic: None,
            chain_id: Some(session.client.chain_id()),
            ..session.opts.to_owned()
        };
        let client =
            ChainClient::with_transport(opts, session.client.transport().clone()).await?;
        clients.push(client);
    }
    info!("running {} accounts x {} iterations", clients.len(), load.iterations);

    let load = LoadCliArgs {
        workers: clients.len(),
        ..load
    };
    let clients = Arc::new(clients);
    run_workers(&load, move |worker, _i| {
        let clients = clients.clone();
        async move {
            let client = &clients[worker];
            let to = to.or(client.address()).unwrap_or_default();
            send_transfer(client, to, value, true).await
        }
    })
    .await
    .into_result()
}
