use super::{funds, list, ui};
use crate::App;
use crate::core::portfolio::load_positions;
use anyhow::Result;
use tracing::{error, info};

/// Refreshes on the stored interval and reprints the watch-list after every
/// cycle, until Ctrl-C.
pub async fn run(app: &App) -> Result<()> {
    let interval = app.scheduler.refresh_interval();
    println!(
        "{}",
        ui::style_text(
            &format!("Refreshing every {}s, Ctrl-C to stop", interval.as_secs()),
            ui::StyleType::Subtle
        )
    );
    info!(interval_ms = interval.as_millis() as u64, "Watching");

    let mut reports = app.scheduler.subscribe();
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };
    let printer = async {
        while reports.changed().await.is_ok() {
            let report = reports.borrow_and_update().clone();
            let funds = app.scheduler.funds().await;
            let positions = load_positions(&app.persistence).await;
            ui::print_separator();
            list::print_funds(&funds, &positions);
            if let Some(report) = report {
                funds::print_refresh_report(&report);
            }
        }
    };

    tokio::select! {
        _ = app.scheduler.run(shutdown) => {}
        _ = printer => {}
    }
    Ok(())
}
