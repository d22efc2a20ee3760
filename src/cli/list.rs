use super::ui;
use crate::App;
use crate::core::fund::{FundRecord, Positions};
use crate::core::portfolio::{FundValuation, PortfolioSummary, load_positions};
use anyhow::Result;
use comfy_table::Cell;
use std::collections::HashMap;

/// Where the displayed price of a fund comes from.
fn price_basis(fund: &FundRecord) -> &'static str {
    if fund.has_confident_estimate() {
        "holdings"
    } else if fund.gsz_value().is_some() {
        "official"
    } else if fund.dwjz_value().is_some() {
        "nav"
    } else {
        "-"
    }
}

pub fn render_funds(funds: &[FundRecord], summary: &PortfolioSummary) -> String {
    let valuations: HashMap<&str, &FundValuation> =
        summary.funds.iter().map(|v| (v.code.as_str(), v)).collect();

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Code"),
        ui::header_cell("Name"),
        ui::header_cell("NAV"),
        ui::header_cell("Price"),
        ui::header_cell("Basis"),
        ui::header_cell("Change"),
        ui::header_cell("Updated"),
        ui::header_cell("Value"),
        ui::header_cell("Hold Yield"),
        ui::header_cell("Today P&L"),
    ]);

    for fund in funds {
        let valuation = valuations.get(fund.code.as_str()).copied();
        table.add_row(vec![
            Cell::new(&fund.code),
            Cell::new(&fund.name),
            ui::format_optional_cell(fund.dwjz_value(), |v| format!("{v:.4}")),
            ui::format_optional_cell(fund.current_price(), |v| format!("{v:.4}")),
            Cell::new(price_basis(fund)),
            ui::change_cell(fund.today_change()),
            Cell::new(fund.gztime.as_deref().unwrap_or("-")),
            ui::format_optional_cell(valuation.map(|v| v.value), |v| format!("{v:.2}")),
            ui::optional_change_cell(valuation.and_then(|v| v.hold_yield)),
            ui::format_optional_cell(valuation.map(|v| v.today_pnl), |v| format!("{v:+.2}")),
        ]);
    }
    table.to_string()
}

pub fn render_summary(summary: &PortfolioSummary) -> String {
    let hold_yield = summary
        .hold_yield()
        .map_or("-".to_string(), |y| ui::signed_text(y, 2) + "%");
    format!(
        "{} {}\n{} {:.2}\n{} {}\n{} {}",
        ui::style_text("Total Value:", ui::StyleType::TotalLabel),
        ui::style_text(&format!("{:.2}", summary.total_value), ui::StyleType::TotalValue),
        ui::style_text("Total Cost:", ui::StyleType::TotalLabel),
        summary.total_cost,
        ui::style_text("Today P&L:", ui::StyleType::TotalLabel),
        ui::signed_text(summary.today_pnl, 2),
        ui::style_text("Hold Yield:", ui::StyleType::TotalLabel),
        hold_yield,
    )
}

/// Prints the watch-list and, when any position is held, the portfolio
/// summary.
pub fn print_funds(funds: &[FundRecord], positions: &Positions) {
    if funds.is_empty() {
        println!(
            "{}",
            ui::style_text("Watch-list is empty. Use `add <code>` to start.", ui::StyleType::Subtle)
        );
        return;
    }
    let summary = PortfolioSummary::compute(funds, positions);
    println!("{}", render_funds(funds, &summary));
    if !summary.is_empty() {
        ui::print_separator();
        println!("{}", render_summary(&summary));
    }
}

pub async fn run(app: &App) -> Result<()> {
    let funds = app.scheduler.funds().await;
    let positions = load_positions(&app.persistence).await;
    print_funds(&funds, &positions);
    Ok(())
}
