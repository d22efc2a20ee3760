use super::ui;
use crate::App;
use crate::core::fund::SearchResult;
use crate::core::intraday::IntradayPoint;
use anyhow::Result;
use comfy_table::{Cell, CellAlignment};

pub fn render_results(results: &[SearchResult]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Code"),
        ui::header_cell("Name"),
        ui::header_cell("Category"),
    ]);
    for result in results {
        table.add_row(vec![
            Cell::new(&result.code),
            Cell::new(&result.name),
            Cell::new(result.category_desc.as_deref().unwrap_or("-")),
        ]);
    }
    table.to_string()
}

pub async fn search(app: &App, keyword: &str) -> Result<()> {
    let pb = ui::new_spinner("Searching...");
    let results = app.eastmoney.search(keyword).await;
    pb.finish_and_clear();

    if results.is_empty() {
        println!("No funds match {keyword:?}");
    } else {
        println!("{}", render_results(&results));
    }
    Ok(())
}

pub fn render_intraday(points: &[IntradayPoint]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Time"),
        ui::header_cell("Value"),
        ui::header_cell("Change"),
    ]);
    for point in points {
        table.add_row(vec![
            Cell::new(&point.time),
            Cell::new(format!("{:.4}", point.value)).set_alignment(CellAlignment::Right),
            ui::change_cell(point.change),
        ]);
    }
    table.to_string()
}

/// Prints today's recorded series for one fund.
pub async fn intraday(app: &App, code: &str) -> Result<()> {
    let points = app.scheduler.intraday_series(code.trim()).await;
    if points.is_empty() {
        println!("No intraday data recorded today for {code}");
        return Ok(());
    }
    println!(
        "{} {}",
        ui::style_text(code, ui::StyleType::Title),
        ui::style_text(&format!("{} points", points.len()), ui::StyleType::Subtle)
    );
    println!("{}", render_intraday(&points));
    Ok(())
}
