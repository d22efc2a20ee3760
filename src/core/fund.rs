//! Fund records and the values derived from them

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;

/// Coverage above which the holdings-based estimate is trusted over the
/// vendor estimate.
pub const CONFIDENT_COVERAGE: f64 = 0.05;

/// A percent change as reported by the valuation source.
///
/// The source sends a string; it is kept numeric whenever it parses so that
/// callers can do arithmetic on it, and kept verbatim otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rate {
    Number(f64),
    Text(String),
}

impl Rate {
    pub fn coerce(raw: &str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Rate::Number(v),
            _ => Rate::Text(raw.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Rate::Number(v) => Some(*v),
            Rate::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        }
    }
}

impl Display for Rate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rate::Number(v) => write!(f, "{v}"),
            Rate::Text(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub code: String,
    #[serde(default)]
    pub name: String,
    /// Portfolio weight exactly as disclosed, e.g. `"9.87%"`.
    pub weight: String,
    #[serde(default)]
    pub change: Option<f64>,
}

impl Holding {
    pub fn weight_percent(&self) -> Option<f64> {
        self.weight
            .trim()
            .trim_end_matches('%')
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|w| w.is_finite())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    /// Epoch milliseconds.
    pub x: i64,
    /// Unit net value; empty when the source has none for this date.
    pub y: Option<f64>,
    #[serde(default)]
    pub equity_return: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FundRecord {
    pub code: String,
    pub name: String,
    pub dwjz: Option<String>,
    pub gsz: Option<String>,
    pub gszzl: Option<Rate>,
    pub gztime: Option<String>,
    pub est_gsz: Option<f64>,
    pub est_gszzl: Option<f64>,
    pub est_priced_coverage: f64,
    pub holdings: Vec<Holding>,
    pub history_trend: Vec<HistoryPoint>,
    pub yesterday_change: Option<f64>,
}

impl FundRecord {
    pub fn dwjz_value(&self) -> Option<f64> {
        parse_number(self.dwjz.as_deref())
    }

    pub fn gsz_value(&self) -> Option<f64> {
        parse_number(self.gsz.as_deref())
    }

    pub fn has_confident_estimate(&self) -> bool {
        self.est_priced_coverage > CONFIDENT_COVERAGE
    }

    /// Best available value for today: the holdings-based estimate when it
    /// covers enough of the portfolio, then the vendor estimate, then the
    /// prior-day net value.
    pub fn current_price(&self) -> Option<f64> {
        if self.has_confident_estimate()
            && let Some(est) = self.est_gsz.filter(|v| v.is_finite())
        {
            return Some(est);
        }
        self.gsz_value().or_else(|| self.dwjz_value())
    }

    /// Today's percent change, following the same priority as
    /// [`current_price`](Self::current_price). Falls back to 0.
    pub fn today_change(&self) -> f64 {
        if self.has_confident_estimate()
            && let Some(est) = self.est_gszzl
        {
            return est;
        }
        self.gszzl.as_ref().and_then(Rate::as_f64).unwrap_or(0.0)
    }

    /// Derives the holdings-based estimate from the enriched holdings.
    ///
    /// Only holdings with both a parseable weight and a known change count.
    pub fn apply_holdings_estimate(&mut self) {
        let (weighted, priced_weight) = self
            .holdings
            .iter()
            .filter_map(|h| Some((h.weight_percent()?, h.change?)))
            .fold((0.0, 0.0), |(acc, total), (w, c)| (acc + w * c, total + w));

        if priced_weight <= 0.0 {
            self.est_gsz = None;
            self.est_gszzl = None;
            self.est_priced_coverage = 0.0;
            return;
        }

        let est_change = weighted / priced_weight;
        self.est_gszzl = Some(est_change);
        self.est_priced_coverage = priced_weight / 100.0;
        self.est_gsz = self.dwjz_value().map(|nav| nav * (1.0 + est_change / 100.0));
    }
}

fn parse_number(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// A user-entered position in a fund.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Position {
    pub shares: f64,
    pub cost_price: f64,
    pub total_cost: f64,
    pub last_trade_date: Option<String>,
    pub last_trade_nav: Option<f64>,
}

pub type Positions = HashMap<String, Position>;

/// Candidate instrument returned by a keyword search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub code: String,
    pub name: String,
    /// Category label such as "基金".
    pub category_desc: Option<String>,
}
