//! Staged retrieval of one fund.
//!
//! The valuation stage is mandatory. Holdings, quote enrichment and history
//! are each allowed to fail on their own; a failure there only empties the
//! part of the record that stage would have filled.

use crate::core::error::{FetchError, RetrievalError};
use crate::core::fund::{FundRecord, Holding, HistoryPoint, Rate};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Vendor valuation of a fund for the current trading day.
#[derive(Debug, Clone, PartialEq)]
pub struct Valuation {
    pub code: String,
    pub name: String,
    pub dwjz: Option<String>,
    pub gsz: Option<String>,
    pub gszzl: Option<Rate>,
    pub gztime: Option<String>,
}

/// Per-fund remote data.
#[async_trait]
pub trait FundSource: Send + Sync {
    /// `Ok(None)` when the source answered without any valuation data.
    async fn valuation(&self, code: &str) -> Result<Option<Valuation>, RetrievalError>;
    async fn holdings(&self, code: &str) -> Result<Vec<Holding>, RetrievalError>;
    async fn history(&self, code: &str) -> Result<Vec<HistoryPoint>, RetrievalError>;
}

/// Batched day-change lookup for listed instruments, keyed by code.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn day_changes(&self, codes: &[String]) -> Result<HashMap<String, f64>, RetrievalError>;
}

/// Produces a complete record for a fund code.
#[async_trait]
pub trait FundProvider: Send + Sync {
    async fn fetch_fund(&self, code: &str) -> Result<FundRecord, FetchError>;
}

pub struct FundFetcher {
    funds: Arc<dyn FundSource>,
    quotes: Arc<dyn QuoteSource>,
}

impl FundFetcher {
    pub fn new(funds: Arc<dyn FundSource>, quotes: Arc<dyn QuoteSource>) -> Self {
        Self { funds, quotes }
    }

    async fn holdings_stage(&self, code: &str) -> Vec<Holding> {
        match self.funds.holdings(code).await {
            Ok(holdings) => holdings,
            Err(e) => {
                warn!(error = %e, "Holdings unavailable, continuing without them");
                Vec::new()
            }
        }
    }

    async fn quote_stage(&self, holdings: &mut [Holding]) {
        if holdings.is_empty() {
            return;
        }
        let codes: Vec<String> = holdings.iter().map(|h| h.code.clone()).collect();
        match self.quotes.day_changes(&codes).await {
            Ok(changes) => {
                for holding in holdings.iter_mut() {
                    holding.change = changes.get(&holding.code).copied();
                }
            }
            Err(e) => warn!(error = %e, "Holding quotes unavailable, leaving changes empty"),
        }
    }

    async fn history_stage(&self, code: &str) -> (Vec<HistoryPoint>, Option<f64>) {
        match self.funds.history(code).await {
            Ok(trend) => {
                let yesterday = trend
                    .len()
                    .checked_sub(2)
                    .and_then(|i| trend[i].equity_return);
                (trend, yesterday)
            }
            Err(e) => {
                warn!(error = %e, "History unavailable, continuing without it");
                (Vec::new(), None)
            }
        }
    }
}

#[async_trait]
impl FundProvider for FundFetcher {
    #[instrument(name = "FundFetch", skip(self), fields(code = %code))]
    async fn fetch_fund(&self, code: &str) -> Result<FundRecord, FetchError> {
        let valuation = self
            .funds
            .valuation(code)
            .await
            .map_err(|source| FetchError::Valuation {
                code: code.to_string(),
                source,
            })?
            .ok_or_else(|| FetchError::EmptyValuation {
                code: code.to_string(),
            })?;
        debug!(?valuation, "Valuation received");

        let mut holdings = self.holdings_stage(code).await;
        self.quote_stage(&mut holdings).await;
        let (history_trend, yesterday_change) = self.history_stage(code).await;

        let record_code = if valuation.code.is_empty() {
            code.to_string()
        } else {
            valuation.code
        };
        let mut record = FundRecord {
            code: record_code,
            name: valuation.name,
            dwjz: valuation.dwjz,
            gsz: valuation.gsz,
            gszzl: valuation.gszzl,
            gztime: valuation.gztime,
            holdings,
            history_trend,
            yesterday_change,
            ..Default::default()
        };
        record.apply_holdings_estimate();

        debug!(
            holdings = record.holdings.len(),
            history = record.history_trend.len(),
            coverage = record.est_priced_coverage,
            "Fund fetched"
        );
        Ok(record)
    }
}
