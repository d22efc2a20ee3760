use crate::core::config::EastmoneyProviderConfig;
use crate::core::error::RetrievalError;
use crate::core::fetcher::{FundSource, Valuation};
use crate::core::fund::{Holding, HistoryPoint, Rate, SearchResult};
use crate::providers::gateway::CallbackGateway;
use crate::providers::holdings::{HoldingsParser, TableRowParser};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, instrument};

/// Callback the valuation scripts always invoke.
const VALUATION_CALLBACK: &str = "jsonpgz";
const HOLDINGS_GLOBAL: &str = "apidata";
const HISTORY_GLOBAL: &str = "Data_netWorthTrend";
/// Search category for public funds.
const FUND_CATEGORY: i64 = 700;
const FUND_CATEGORY_DESC: &str = "基金";

pub struct EastmoneyProvider {
    gateway: CallbackGateway,
    config: EastmoneyProviderConfig,
    parser: Arc<dyn HoldingsParser>,
}

impl EastmoneyProvider {
    pub fn new(gateway: CallbackGateway, config: EastmoneyProviderConfig) -> Self {
        Self::with_parser(gateway, config, Arc::new(TableRowParser))
    }

    pub fn with_parser(
        gateway: CallbackGateway,
        config: EastmoneyProviderConfig,
        parser: Arc<dyn HoldingsParser>,
    ) -> Self {
        Self {
            gateway,
            config,
            parser,
        }
    }

    /// Candidate public funds matching `keyword`. Failures are logged and
    /// give an empty list.
    pub async fn search(&self, keyword: &str) -> Vec<SearchResult> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Vec::new();
        }
        match self.try_search(keyword).await {
            Ok(results) => results,
            Err(e) => {
                error!(error = %e, %keyword, "Fund search failed");
                Vec::new()
            }
        }
    }

    async fn try_search(&self, keyword: &str) -> Result<Vec<SearchResult>, RetrievalError> {
        let endpoint = format!("{}/FundSearch/api/FundSearchAPI.ashx", self.config.suggest_url);
        let stamp = cache_buster();
        let url = Url::parse_with_params(&endpoint, &[("m", "1"), ("key", keyword), ("_", &stamp)])
            .map_err(|e| RetrievalError::Parse {
                url: endpoint.clone(),
                message: e.to_string(),
            })?;

        let argument = self.gateway.retrieve_callback(url.as_str(), "callback").await?;
        let payload: SearchPayload = parse_json(url.as_str(), &argument)?;
        let results: Vec<SearchResult> = payload
            .datas
            .into_iter()
            .filter(SearchEntry::is_fund)
            .map(|entry| SearchResult {
                code: entry.code,
                name: entry.name,
                category_desc: entry.category_desc,
            })
            .collect();
        debug!(count = results.len(), "Search results");
        Ok(results)
    }
}

#[derive(Debug, Deserialize)]
struct ValuationPayload {
    #[serde(default)]
    fundcode: String,
    #[serde(default)]
    name: String,
    dwjz: Option<Value>,
    gsz: Option<Value>,
    gszzl: Option<Value>,
    gztime: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchPayload {
    #[serde(rename = "Datas", default)]
    datas: Vec<SearchEntry>,
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    #[serde(rename = "CODE")]
    code: String,
    #[serde(rename = "NAME", default)]
    name: String,
    #[serde(rename = "CATEGORY")]
    category: Option<Value>,
    #[serde(rename = "CATEGORYDESC")]
    category_desc: Option<String>,
}

impl SearchEntry {
    fn is_fund(&self) -> bool {
        let by_code = match &self.category {
            Some(Value::Number(n)) => n.as_i64() == Some(FUND_CATEGORY),
            Some(Value::String(s)) => s.trim() == FUND_CATEGORY.to_string(),
            _ => false,
        };
        by_code || self.category_desc.as_deref() == Some(FUND_CATEGORY_DESC)
    }
}

#[async_trait]
impl FundSource for EastmoneyProvider {
    #[instrument(name = "EastmoneyValuation", skip(self), fields(code = %code))]
    async fn valuation(&self, code: &str) -> Result<Option<Valuation>, RetrievalError> {
        let url = format!("{}/js/{}.js?rt={}", self.config.fundgz_url, code, cache_buster());
        let script = self.gateway.retrieve(&url).await?;
        let argument = script
            .call_argument(VALUATION_CALLBACK)
            .ok_or_else(|| RetrievalError::MissingCallback {
                url: url.clone(),
                callback: VALUATION_CALLBACK.to_string(),
            })?;
        if argument.is_empty() {
            debug!("Valuation callback carried no data");
            return Ok(None);
        }

        let value: Value = parse_json(&url, argument)?;
        if !value.is_object() {
            debug!(?value, "Valuation callback carried a non-object");
            return Ok(None);
        }
        let payload: ValuationPayload =
            serde_json::from_value(value).map_err(|e| RetrievalError::Parse {
                url,
                message: e.to_string(),
            })?;

        Ok(Some(Valuation {
            code: payload.fundcode,
            name: payload.name,
            dwjz: payload.dwjz.as_ref().and_then(text),
            gsz: payload.gsz.as_ref().and_then(text),
            gszzl: payload.gszzl.as_ref().and_then(rate),
            gztime: payload.gztime,
        }))
    }

    #[instrument(name = "EastmoneyHoldings", skip(self), fields(code = %code))]
    async fn holdings(&self, code: &str) -> Result<Vec<Holding>, RetrievalError> {
        let url = format!(
            "{}/FundArchivesDatas.aspx?type=jjcc&code={}&topline=10&year=&month=&rt={}",
            self.config.fundf10_url,
            code,
            cache_buster()
        );
        let script = self.gateway.retrieve(&url).await?;
        let markup = script
            .object_string_property(HOLDINGS_GLOBAL, "content")
            .unwrap_or_default();
        let holdings = self.parser.parse(&markup);
        debug!(count = holdings.len(), "Holdings parsed");
        Ok(holdings)
    }

    #[instrument(name = "EastmoneyHistory", skip(self), fields(code = %code))]
    async fn history(&self, code: &str) -> Result<Vec<HistoryPoint>, RetrievalError> {
        let url = format!(
            "{}/pingzhongdata/{}.js?v={}",
            self.config.fund_url,
            code,
            cache_buster()
        );
        let script = self.gateway.retrieve(&url).await?;
        let expr = script
            .global(HISTORY_GLOBAL)
            .ok_or_else(|| RetrievalError::MissingGlobal {
                url: url.clone(),
                name: HISTORY_GLOBAL.to_string(),
            })?;

        // Every entry maps to a point so positions match the source array.
        let trend: Vec<Value> = parse_json(&url, expr)?;
        let points: Vec<HistoryPoint> = trend.iter().map(trend_point).collect();
        debug!(count = points.len(), "History parsed");
        Ok(points)
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(url: &str, text: &str) -> Result<T, RetrievalError> {
    serde_json::from_str(text).map_err(|e| RetrievalError::Parse {
        url: url.to_string(),
        message: e.to_string(),
    })
}

/// Reads one net value trend entry. Fields that are absent or not numeric
/// are left empty.
fn trend_point(entry: &Value) -> HistoryPoint {
    let number = |key: &str| entry.get(key).and_then(Value::as_f64);
    HistoryPoint {
        x: number("x").map_or(0, |x| x as i64),
        y: number("y"),
        equity_return: number("equityReturn"),
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn rate(value: &Value) -> Option<Rate> {
    match value {
        Value::String(s) => Some(Rate::coerce(s)),
        Value::Number(n) => n.as_f64().map(Rate::Number),
        _ => None,
    }
}

pub(crate) fn cache_buster() -> String {
    chrono::Utc::now().timestamp_millis().to_string()
}
