mod accounts;
mod common;
mod contract;
mod ethload_subcommand;
mod multiple;
mod transfer;

use clap::Parser;

pub use accounts::accounts;
pub use common::{ClientCliArgs, LoadCliArgs, Session};
pub use contract::{contract, ContractCliArgs};
pub use ethload_subcommand::EthloadSubcommand;
pub use multiple::multiple;
pub use transfer::transfer;

#[derive(Parser, Debug)]
#[command(
    name = "ethload",
    version,
    about = "Generate transaction load against an Ethereum JSON-RPC endpoint"
)]
pub struct EthloadCli {
    #[command(flatten)]
    pub client: ClientCliArgs,

    #[command(subcommand)]
    pub command: EthloadSubcommand,
}

impl EthloadCli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        EthloadCli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = EthloadCli::try_parse_from([
            "ethload",
            "transfer",
            "--rpc-url",
            "http://10.0.0.1:8545",
            "--workers",
            "2",
            "--monitor-blocks",
        ])
        .unwrap();
        assert_eq!(cli.client.rpc_url.as_deref(), Some("http://10.0.0.1:8545"));
        assert!(cli.client.monitor_blocks);
        match cli.command {
            EthloadSubcommand::Transfer { load, wait, .. } => {
                assert_eq!(load.workers, 2);
                assert_eq!(load.iterations, 10);
                assert!(!wait);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn private_key_and_mnemonic_conflict() {
        let res = EthloadCli::try_parse_from([
            "ethload",
            "--private-key",
            "0x01",
            "--mnemonic",
            "test test",
            "accounts",
        ]);
        assert!(res.is_err());
    }
}
