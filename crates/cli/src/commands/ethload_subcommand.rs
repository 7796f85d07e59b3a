use alloy::primitives::{Address, U256};
use clap::Subcommand;
use std::path::PathBuf;

use super::{ContractCliArgs, LoadCliArgs};
use crate::util::parse_value;

#[derive(Debug, Subcommand)]
pub enum EthloadSubcommand {
    #[command(
        name = "transfer",
        long_about = "Send value transfers from the configured account."
    )]
    Transfer {
        /// Recipient. Defaults to the sending account.
        #[arg(long)]
        to: Option<Address>,

        /// Amount sent per transfer, with units.
        #[arg(
            long,
            default_value = "0.0001 ether",
            value_parser = parse_value,
        )]
        value: U256,

        /// Wait for each receipt before sending the next transfer.
        #[arg(long)]
        wait: bool,

        #[command(flatten)]
        load: LoadCliArgs,
    },

    #[command(
        name = "contract",
        long_about = "Deploy a contract, then call one of its methods in a loop."
    )]
    Contract(ContractCliArgs),

    #[command(
        name = "multiple",
        long_about = "Send transfers from many pre-funded accounts, one account per worker."
    )]
    Multiple {
        /// JSON file holding `[{"address": ..., "private_key": ...}]`.
        #[arg(long)]
        accounts: PathBuf,

        /// Recipient. Defaults to each worker's own account.
        #[arg(long)]
        to: Option<Address>,

        #[arg(
            long,
            default_value = "0.0001 ether",
            value_parser = parse_value,
        )]
        value: U256,

        #[command(flatten)]
        load: LoadCliArgs,
    },

    #[command(
        name = "accounts",
        long_about = "List node-managed accounts and optionally generate fresh keys."
    )]
    Accounts {
        /// Number of random key pairs to print.
        #[arg(long, default_value_t = 0)]
        generate: usize,
    },
}
