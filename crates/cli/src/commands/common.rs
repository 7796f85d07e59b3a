//! Arguments shared by every subcommand, and the worker loop they all drive.

use ethload_core::{
    config::TxTypeOption, error::ConfigError, metrics::gather_text, monitor::BlockMonitor,
    ChainClient, ClientOptions,
};
use futures::future::join_all;
use std::{future::Future, path::PathBuf, sync::Arc};
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Clone, Debug, clap::Args)]
pub struct ClientCliArgs {
    /// RPC URL to send requests.
    #[arg(
        env = "RPC_URL",
        short,
        long,
        global = true,
        long_help = "RPC URL to send requests. Defaults to http://localhost:8545 unless set in --config."
    )]
    pub rpc_url: Option<String>,

    /// Private key used to sign transactions.
    #[arg(
        env = "ETHLOAD_PRIVATE_KEY",
        long,
        global = true,
        conflicts_with = "mnemonic",
        long_help = "Private key used to sign transactions locally. Without a key or mnemonic, transactions are signed by the node (dev mode)."
    )]
    pub private_key: Option<String>,

    /// Mnemonic whose first account signs transactions.
    #[arg(env = "ETHLOAD_MNEMONIC", long, global = true)]
    pub mnemonic: Option<String>,

    /// Chain id. Queried from the node when omitted.
    #[arg(long, global = true)]
    pub chain_id: Option<u64>,

    /// Transaction type
    #[arg(short = 't', long, global = true, value_enum)]
    pub tx_type: Option<TxTypeCli>,

    /// JSON or TOML file with client options. Flags override its values.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log every new block and publish block gauges while running.
    #[arg(long, global = true)]
    pub monitor_blocks: bool,

    /// Print prometheus metrics after the run.
    #[arg(long, global = true)]
    pub metrics: bool,
}

impl ClientCliArgs {
    pub fn to_options(&self) -> Result<ClientOptions, ConfigError> {
        let base = match &self.config {
            Some(path) => ClientOptions::from_file(path)?,
            None => ClientOptions::default(),
        };
        Ok(base.merge(ClientOptions {
            url: self.rpc_url.to_owned(),
            private_key: self.private_key.to_owned(),
            mnemonic: self.mnemonic.to_owned(),
            chain_id: self.chain_id,
            tx_type: self.tx_type.map(Into::into),
            ..Default::default()
        }))
    }
}

#[derive(Copy, Debug, Clone, PartialEq, Eq, clap::ValueEnum)]
pub enum TxTypeCli {
    /// Legacy transaction (type `0x0`)
    Legacy,
    /// A transaction with a priority fee ([EIP-1559](https://eips.ethereum.org/EIPS/eip-1559)), type `0x2`
    Eip1559,
}

impl From<TxTypeCli> for TxTypeOption {
    fn from(value: TxTypeCli) -> Self {
        match value {
            TxTypeCli::Legacy => TxTypeOption::Legacy,
            TxTypeCli::Eip1559 => TxTypeOption::Eip1559,
        }
    }
}

#[derive(Clone, Copy, Debug, clap::Args)]
pub struct LoadCliArgs {
    /// Number of concurrent workers.
    #[arg(short, long, default_value_t = 4)]
    pub workers: usize,

    /// Iterations run by each worker.
    #[arg(short = 'n', long, default_value_t = 10)]
    pub iterations: usize,
}

/// Connected client plus the background tasks requested on the command line.
pub struct Session {
    pub opts: ClientOptions,
    pub client: ChainClient,
    monitor: Option<(CancellationToken, JoinHandle<()>)>,
    print_metrics: bool,
}

impl Session {
    pub async fn start(
        args: &ClientCliArgs,
        opts: ClientOptions,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let client = ChainClient::connect(opts.to_owned()).await?;
        info!(
            "connected to {} (chain id {})",
            opts.rpc_url()?,
            client.chain_id()
        );
        let monitor = args.monitor_blocks.then(|| {
            let cancel = CancellationToken::new();
            let handle = BlockMonitor::new(client.clone()).spawn(cancel.clone());
            (cancel, handle)
        });
        Ok(Self {
            opts,
            client,
            monitor,
            print_metrics: args.metrics,
        })
    }

    /// Stops the block monitor and prints metrics if requested.
    pub async fn finish(self) {
        if let Some((cancel, handle)) = self.monitor {
            cancel.cancel();
            if let Err(e) = handle.await {
                warn!("block monitor task failed: {e}");
            }
        }
        if self.print_metrics {
            println!("{}", gather_text());
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl LoadSummary {
    fn add(&mut self, other: LoadSummary) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
    }

    pub fn into_result(self) -> Result<(), Box<dyn std::error::Error>> {
        if self.failed > 0 {
            return Err(format!(
                "{} of {} iterations failed",
                self.failed,
                self.failed + self.succeeded
            )
            .into());
        }
        Ok(())
    }
}

/// Spawns `load.workers` tasks, each awaiting `task(worker, iteration)` `load.iterations` times.
/// Failed iterations are logged and counted; they never stop a worker.
pub async fn run_workers<F, Fut>(load: &LoadCliArgs, task: F) -> LoadSummary
where
    F: Fn(usize, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ethload_core::Result<()>> + Send + 'static,
{
    let task = Arc::new(task);
    let iterations = load.iterations;
    let start = Instant::now();
    let handles = (0..load.workers).map(|worker| {
        let task = task.clone();
        tokio::task::spawn(async move {
            let mut summary = LoadSummary::default();
            for i in 0..iterations {
                match task(worker, i).await {
                    Ok(()) => summary.succeeded += 1,
                    Err(e) => {
                        match e.rpc_kind() {
                            Some(kind) => warn!("worker {worker}, iteration {i} failed: {e}. {kind}"),
                            None => warn!("worker {worker}, iteration {i} failed: {e}"),
                        }
                        summary.failed += 1;
                    }
                }
            }
            summary
        })
    });

    let mut total = LoadSummary::default();
    for res in join_all(handles).await {
        match res {
            Ok(summary) => total.add(summary),
            Err(e) => warn!("worker task failed: {e}"),
        }
    }
    info!(
        "{} iterations succeeded, {} failed in {}ms",
        total.succeeded,
        total.failed,
        start.elapsed().as_millis()
    );
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethload_core::Error;

    #[tokio::test]
    async fn counts_failed_iterations_without_stopping() {
        let load = LoadCliArgs {
            workers: 3,
            iterations: 4,
        };
        let summary = run_workers(&load, |_worker, i| async move {
            if i % 2 == 1 {
                return Err(Error::NotFound(format!("iteration {i}")));
            }
            Ok(())
        })
        .await;
        assert_eq!(
            summary,
            LoadSummary {
                succeeded: 6,
                failed: 6
            }
        );
        assert!(summary.into_result().is_err());
    }

    #[test]
    fn flags_override_config_file() {
        let path = std::env::temp_dir().join(format!("ethload-cli-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{"url":"http://10.1.1.1:8545","chainID":7,"receiptTimeoutMs":1000}"#,
        )
        .unwrap();
        let args = ClientCliArgs {
            rpc_url: Some("http://localhost:9545".to_owned()),
            private_key: None,
            mnemonic: None,
            chain_id: None,
            tx_type: Some(TxTypeCli::Eip1559),
            config: Some(path.clone()),
            monitor_blocks: false,
            metrics: false,
        };
        let opts = args.to_options().unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(opts.url.as_deref(), Some("http://localhost:9545"));
        assert_eq!(opts.chain_id, Some(7));
        assert_eq!(opts.receipt_timeout_ms, Some(1000));
        assert_eq!(opts.tx_type, Some(TxTypeOption::Eip1559));
    }
}
