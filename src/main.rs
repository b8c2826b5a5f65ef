use cc_wallet::{WalletCommand, WalletConfig, WalletManager};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[clap(version, about = "Colored-coin wallet")]
struct Opts {
    /// Name of the wallet state file (without extension)
    #[clap(short, long, default_value = "wallet")]
    wallet: String,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Creates a new wallet with a fresh seed and monitoring group
    Generate,
    /// Allocates a new funding address and lists all of them
    ShowFundingAddresses,
    /// Pulls the next batch of the monitoring log
    Sync,
    ShowCoins,
    /// Free value per color and owner
    Balance,
    /// Issues a new color to a fresh address
    IssueCoins { amount: u64 },
    /// Signs pending transactions (all known keys unless --participants is given)
    SignPendingTxs {
        #[clap(long, value_delimiter = ',')]
        participants: Vec<u32>,
    },
    /// Broadcasts every fully signed pending transaction
    BroadcastTxs,
    /// Registers a secondary party with a shared 2-of-2 address
    GenerateUser,
    /// Sends the latest issued color to every secondary party
    DistributeTokens { amount: u64 },
    TransferTokens { from: u32, to: u32, amount: u64 },
    /// Drops a pending transaction and releases its coins
    AbandonPending { index: usize },
    /// Unspent coins of a color at the funding addresses ("" for uncolored)
    ShowUnspent {
        #[clap(default_value = "")]
        color: String,
    },
    /// Every coin of a color known to the transaction service
    ShowColored {
        color: String,
        #[clap(long)]
        unspent: bool,
    },
}

impl From<Command> for WalletCommand {
    fn from(command: Command) -> Self {
        match command {
            Command::Generate => WalletCommand::Generate,
            Command::ShowFundingAddresses => WalletCommand::ShowFundingAddresses,
            Command::Sync => WalletCommand::Sync,
            Command::ShowCoins => WalletCommand::ShowCoins,
            Command::Balance => WalletCommand::Balance,
            Command::IssueCoins { amount } => WalletCommand::IssueCoins { amount },
            Command::SignPendingTxs { participants } => WalletCommand::SignPendingTxs {
                participants: (!participants.is_empty()).then(|| participants),
            },
            Command::BroadcastTxs => WalletCommand::BroadcastTxs,
            Command::GenerateUser => WalletCommand::GenerateUser,
            Command::DistributeTokens { amount } => WalletCommand::DistributeTokens { amount },
            Command::TransferTokens { from, to, amount } => {
                WalletCommand::TransferTokens { from, to, amount }
            }
            Command::AbandonPending { index } => WalletCommand::AbandonPending { index },
            Command::ShowUnspent { color } => WalletCommand::ShowUnspent { color },
            Command::ShowColored { color, unspent } => WalletCommand::ShowColored {
                color,
                unspent_only: unspent,
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    // RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();
    let manager = WalletManager::new(WalletConfig::from_env());

    let output = manager
        .execute(&opts.wallet, opts.command.into())
        .await
        .map_err(|e| {
            log::error!("{:?} error: {}", e.kind(), e);
            e
        })?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
