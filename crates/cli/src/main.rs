mod commands;
mod util;

use commands::{EthloadCli, EthloadSubcommand};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive("info".parse()?)
                .from_env_lossy(),
        )
        .init();

    let args = EthloadCli::parse_args();
    let opts = args.client.to_options()?;
    let session = commands::Session::start(&args.client, opts).await?;

    let res = match args.command {
        EthloadSubcommand::Transfer { to, value, wait, load } => {
            commands::transfer(&session, to, value, wait, load).await
        }
        EthloadSubcommand::Contract(contract_args) => {
            commands::contract(&session, contract_args).await
        }
        EthloadSubcommand::Multiple {
            accounts,
            to,
            value,
            load,
        } => commands::multiple(&session, accounts, to, value, load).await,
        EthloadSubcommand::Accounts { generate } => commands::accounts(&session, generate).await,
    };

    session.finish().await;
    res
}
