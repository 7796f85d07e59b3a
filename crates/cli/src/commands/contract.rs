use ethload_core::contract::TxnOptions;
use std::{path::PathBuf, sync::Arc};
use tracing::info;

use super::{
    common::{run_workers, LoadCliArgs},
    Session,
};

#[derive(Clone, Debug, clap::Args)]
pub struct ContractCliArgs {
    /// JSON ABI file (bare array or build artifact).
    #[arg(long)]
    pub abi: PathBuf,

    /// Hex-encoded creation bytecode file.
    #[arg(long)]
    pub bin: PathBuf,

    /// Constructor arguments, comma-separated.
    #[arg(long, value_delimiter = ',')]
    pub ctor_args: Vec<String>,

    /// Method sent as a transaction on every iteration.
    #[arg(long, default_value = "set")]
    pub method: String,

    /// Arguments for --method, comma-separated. `{worker}` and `{iteration}` are substituted.
    #[arg(long, value_delimiter = ',', default_value = "{iteration}")]
    pub args: Vec<String>,

    /// Argument-less view method called after every transaction.
    #[arg(long)]
    pub read: Option<String>,

    /// Wait for each receipt.
    #[arg(long)]
    pub wait: bool,

    #[command(flatten)]
    pub load: LoadCliArgs,
}

fn fill_placeholders(args: &[String], worker: usize, iteration: usize) -> Vec<String> {
    args.iter()
        .map(|a| {
            a.replace("{worker}", &worker.to_string())
                .replace("{iteration}", &iteration.to_string())
        })
        .collect()
}

pub async fn contract(
    session: &Session,
    args: ContractCliArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let abi = std::fs::read_to_string(&args.abi)?;
    let bin = std::fs::read_to_string(&args.bin)?;

    let receipt = session
        .client
        .deploy_contract(&abi, &bin, &args.ctor_args)
        .await?;
    let address = receipt
        .contract_address
        .ok_or("deployment receipt has no contract address")?;
    info!(
        "deployed contract at {address} (block {}, gas used {})",
        receipt.block_number, receipt.gas_used
    );
    let handle = Arc::new(session.client.new_contract(address, &abi)?);

    let ContractCliArgs {
        method,
        args: method_args,
        read,
        wait,
        load,
        ..
    } = args;
    let method = Arc::new(method);
    let method_args = Arc::new(method_args);
    let read = Arc::new(read);
    run_workers(&load, move |worker, i| {
        let handle = handle.clone();
        let method = method.clone();
        let method_args = method_args.clone();
        let read = read.clone();
        async move {
            let call_args = fill_placeholders(&method_args, worker, i);
            let opts = TxnOptions {
                wait,
                ..Default::default()
            };
            let outcome = handle.txn(&method, opts, &call_args).await?;
            info!(
                "{method}({}) -> {} (gas used: {:?})",
                call_args.join(", "),
                outcome.transaction_hash,
                outcome.gas_used
            );
            if let Some(read) = read.as_deref() {
                let values = handle.call(read, &[] as &[&str]).await?;
                info!("{read}() = {values:?}");
            }
            Ok(())
        }
    })
    .await
    .into_result()
}
