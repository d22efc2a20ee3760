//! Position-based figures derived from the latest fund records

use crate::core::error::StoreError;
use crate::core::fund::{FundRecord, Position, Positions};
use crate::core::store::{POSITIONS_KEY, Persistence};

pub async fn load_positions(persistence: &Persistence) -> Positions {
    persistence.load(POSITIONS_KEY, Positions::new()).await
}

pub async fn save_position(
    persistence: &Persistence,
    code: &str,
    position: Position,
) -> Result<Positions, StoreError> {
    let mut positions = load_positions(persistence).await;
    positions.insert(code.to_string(), position);
    persistence.save(POSITIONS_KEY, &positions).await?;
    Ok(positions)
}

/// Drops the position held in `code`. Returns whether one existed.
pub async fn remove_position(persistence: &Persistence, code: &str) -> Result<bool, StoreError> {
    let mut positions = load_positions(persistence).await;
    if positions.remove(code).is_none() {
        return Ok(false);
    }
    if positions.is_empty() {
        persistence.remove(POSITIONS_KEY).await?;
    } else {
        persistence.save(POSITIONS_KEY, &positions).await?;
    }
    Ok(true)
}

#[derive(Debug, Clone, PartialEq)]
pub struct FundValuation {
    pub code: String,
    pub value: f64,
    /// Percent gain against the cost price; `None` without a cost price.
    pub hold_yield: Option<f64>,
    /// Percent gain since the last trade; `None` without a last trade NAV.
    pub recent_yield: Option<f64>,
    pub today_pnl: f64,
}

impl FundValuation {
    pub fn compute(fund: &FundRecord, position: &Position) -> Option<Self> {
        if position.shares <= 0.0 {
            return None;
        }
        let price = fund.current_price().filter(|p| *p > 0.0)?;
        let value = position.shares * price;

        let hold_yield =
            (position.cost_price > 0.0).then(|| (price / position.cost_price - 1.0) * 100.0);
        let recent_yield = position
            .last_trade_nav
            .filter(|nav| *nav > 0.0)
            .map(|nav| (price / nav - 1.0) * 100.0);

        Some(Self {
            code: fund.code.clone(),
            value,
            hold_yield,
            recent_yield,
            today_pnl: value * fund.today_change() / 100.0,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortfolioSummary {
    pub total_value: f64,
    pub total_cost: f64,
    pub today_pnl: f64,
    pub funds: Vec<FundValuation>,
}

impl PortfolioSummary {
    pub fn compute(funds: &[FundRecord], positions: &Positions) -> Self {
        let mut summary = Self::default();
        for fund in funds {
            let Some(position) = positions.get(&fund.code) else {
                continue;
            };
            let Some(valuation) = FundValuation::compute(fund, position) else {
                continue;
            };
            summary.total_value += valuation.value;
            if position.cost_price > 0.0 {
                summary.total_cost += position.shares * position.cost_price;
            }
            summary.today_pnl += valuation.today_pnl;
            summary.funds.push(valuation);
        }
        summary
    }

    pub fn is_empty(&self) -> bool {
        self.total_value <= 0.0
    }

    /// Percent gain of the whole portfolio; `None` when no cost is known.
    pub fn hold_yield(&self) -> Option<f64> {
        (self.total_cost > 0.0).then(|| (self.total_value / self.total_cost - 1.0) * 100.0)
    }
}
