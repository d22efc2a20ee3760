use anyhow::Result;
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use fundwatch::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging, repeat for more detail
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for fundwatch::AppCommand {
    fn from(cmd: Commands) -> fundwatch::AppCommand {
        use fundwatch::AppCommand;
        match cmd {
            Commands::Add { codes } => AppCommand::Add { codes },
            Commands::Remove { code } => AppCommand::Remove { code },
            Commands::Refresh => AppCommand::Refresh,
            Commands::Watch => AppCommand::Watch,
            Commands::List => AppCommand::List,
            Commands::Search { keyword } => AppCommand::Search {
                keyword: keyword.join(" "),
            },
            Commands::Intraday { code } => AppCommand::Intraday { code },
            Commands::Interval { ms } => AppCommand::Interval { ms },
            Commands::Position {
                code,
                shares,
                cost_price,
                last_trade_nav,
                last_trade_date,
            } => AppCommand::Position {
                code,
                shares,
                cost_price,
                last_trade_nav,
                last_trade_date,
            },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Add funds to the watch-list
    Add {
        #[arg(required = true)]
        codes: Vec<String>,
    },
    /// Remove a fund from the watch-list
    Remove { code: String },
    /// Refresh every fund on the watch-list once
    Refresh,
    /// Keep refreshing on the stored interval until Ctrl-C
    Watch,
    /// Display the watch-list and portfolio summary
    List,
    /// Search funds by code, name or pinyin
    Search {
        #[arg(required = true)]
        keyword: Vec<String>,
    },
    /// Display today's recorded valuations for a fund
    Intraday { code: String },
    /// Set the refresh interval in milliseconds (minimum 5000)
    Interval { ms: u64 },
    /// Record the position held in a fund
    Position {
        code: String,
        #[arg(long)]
        shares: f64,
        #[arg(long)]
        cost_price: f64,
        /// Net value of the most recent trade
        #[arg(long)]
        last_trade_nav: Option<f64>,
        /// Date of the most recent trade, YYYY-MM-DD
        #[arg(long)]
        last_trade_date: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => fundwatch::cli::setup::setup_at_path(path),
            None => fundwatch::cli::setup::setup(),
        },
        Some(cmd) => fundwatch::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
