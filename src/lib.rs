pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

pub use crate::core::config;

use crate::cli::funds::PositionInput;
use crate::core::clock::LocalClock;
use crate::core::config::AppConfig;
use crate::core::fetcher::FundFetcher;
use crate::core::scheduler::RefreshScheduler;
use crate::core::store::{Persistence, Store};
use crate::providers::{CallbackGateway, EastmoneyProvider, TencentQuoteProvider};
use crate::store::KeyValueStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Collection holding the watch-list, interval, positions and intraday data.
const STATE_COLLECTION: &str = "state";

pub enum AppCommand {
    Add {
        codes: Vec<String>,
    },
    Remove {
        code: String,
    },
    Refresh,
    Watch,
    List,
    Search {
        keyword: String,
    },
    Intraday {
        code: String,
    },
    Interval {
        ms: u64,
    },
    Position {
        code: String,
        shares: f64,
        cost_price: f64,
        last_trade_nav: Option<f64>,
        last_trade_date: Option<String>,
    },
}

/// Everything a command needs, wired from one config.
pub struct App {
    pub scheduler: RefreshScheduler,
    pub persistence: Persistence,
    pub eastmoney: Arc<EastmoneyProvider>,
}

impl App {
    pub async fn build(config: &AppConfig) -> Result<Self> {
        let gateway = CallbackGateway::new(Duration::from_millis(config.request_timeout_ms))
            .context("Failed to create HTTP client")?;
        let eastmoney = Arc::new(EastmoneyProvider::new(
            gateway.clone(),
            config.providers.eastmoney.clone(),
        ));
        let quotes = Arc::new(TencentQuoteProvider::new(
            gateway,
            &config.providers.tencent.base_url,
        ));
        let fetcher = Arc::new(FundFetcher::new(eastmoney.clone(), quotes));

        let data_path = config.default_data_path()?;
        let store = KeyValueStore::open(&data_path.join("store"))?;
        let collection = store
            .get_collection(STATE_COLLECTION)
            .context("Failed to open state collection")?;
        let persistence = Persistence::new(collection);

        let scheduler =
            RefreshScheduler::load(fetcher, persistence.clone(), Arc::new(LocalClock)).await;

        Ok(Self {
            scheduler,
            persistence,
            eastmoney,
        })
    }
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("fundwatch starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let app = App::build(&config).await?;

    match command {
        AppCommand::Add { codes } => cli::funds::add(&app, &codes).await,
        AppCommand::Remove { code } => cli::funds::remove(&app, &code).await,
        AppCommand::Refresh => cli::funds::refresh(&app).await,
        AppCommand::Watch => cli::watch::run(&app).await,
        AppCommand::List => cli::list::run(&app).await,
        AppCommand::Search { keyword } => cli::search::search(&app, &keyword).await,
        AppCommand::Intraday { code } => cli::search::intraday(&app, &code).await,
        AppCommand::Interval { ms } => cli::funds::interval(&app, ms).await,
        AppCommand::Position {
            code,
            shares,
            cost_price,
            last_trade_nav,
            last_trade_date,
        } => {
            let input = PositionInput {
                shares,
                cost_price,
                last_trade_nav,
                last_trade_date,
            };
            cli::funds::position(&app, &code, input).await
        }
    }
}
