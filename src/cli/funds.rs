use super::{list, ui};
use crate::App;
use crate::core::fund::Position;
use crate::core::portfolio::{load_positions, remove_position, save_position};
use crate::core::scheduler::{AddReport, RefreshReport};
use anyhow::{Context, Result};

fn print_codes(label: &str, codes: &[String], style_type: ui::StyleType) {
    if !codes.is_empty() {
        println!("{} {}", ui::style_text(label, style_type), codes.join(", "));
    }
}

pub fn print_add_report(report: &AddReport) {
    print_codes("Added:", &report.added, ui::StyleType::TotalLabel);
    print_codes("Already watched:", &report.skipped, ui::StyleType::Subtle);
    print_codes("Not found:", &report.failed, ui::StyleType::Error);
}

pub fn print_refresh_report(report: &RefreshReport) {
    print_codes("Kept previous data:", &report.retained, ui::StyleType::Subtle);
    print_codes("Unavailable:", &report.missing, ui::StyleType::Error);
}

pub async fn add(app: &App, codes: &[String]) -> Result<()> {
    let pb = ui::new_spinner("Fetching funds...");
    let report = app.scheduler.add_funds(codes).await;
    pb.finish_and_clear();

    print_add_report(&report);
    if report.added.is_empty() && !report.failed.is_empty() && report.skipped.is_empty() {
        anyhow::bail!("None of the requested funds could be fetched");
    }
    list::run(app).await
}

pub async fn remove(app: &App, code: &str) -> Result<()> {
    let code = code.trim();
    if !app.scheduler.remove_fund(code).await {
        anyhow::bail!("Fund {code} is not on the watch-list");
    }
    if remove_position(&app.persistence, code)
        .await
        .with_context(|| format!("Failed to remove position for {code}"))?
    {
        println!("Removed {code} and its position");
    } else {
        println!("Removed {code}");
    }
    Ok(())
}

pub async fn refresh(app: &App) -> Result<()> {
    let pb = ui::new_spinner("Refreshing valuations...");
    let report = app.scheduler.manual_refresh().await;
    pb.finish_and_clear();

    match report {
        Some(report) => print_refresh_report(&report),
        None => println!(
            "{}",
            ui::style_text("Nothing to refresh.", ui::StyleType::Subtle)
        ),
    }
    list::run(app).await
}

pub async fn interval(app: &App, ms: u64) -> Result<()> {
    let applied = app.scheduler.set_refresh_interval(ms).await;
    println!("Refresh interval set to {applied} ms");
    Ok(())
}

pub struct PositionInput {
    pub shares: f64,
    pub cost_price: f64,
    pub last_trade_nav: Option<f64>,
    pub last_trade_date: Option<String>,
}

pub async fn position(app: &App, code: &str, input: PositionInput) -> Result<()> {
    if input.shares < 0.0 || input.cost_price < 0.0 {
        anyhow::bail!("Shares and cost price must not be negative");
    }
    let code = code.trim();
    let position = Position {
        shares: input.shares,
        cost_price: input.cost_price,
        total_cost: input.shares * input.cost_price,
        last_trade_date: input.last_trade_date,
        last_trade_nav: input.last_trade_nav,
    };
    save_position(&app.persistence, code, position)
        .await
        .with_context(|| format!("Failed to save position for {code}"))?;

    let funds = app.scheduler.funds().await;
    if !funds.iter().any(|f| f.code == code) {
        println!(
            "{}",
            ui::style_text(
                &format!("{code} is not on the watch-list; add it to see its value."),
                ui::StyleType::Subtle
            )
        );
    }
    list::print_funds(&funds, &load_positions(&app.persistence).await);
    Ok(())
}
