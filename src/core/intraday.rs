//! Day-scoped intraday valuation snapshots.
//!
//! Stored under a single date key as `{ date: { code: [point, ...] } }`.
//! Loading drops every other date, and each code keeps at most
//! [`MAX_POINTS`] points with at most one point per clock minute.

use crate::core::error::StoreError;
use crate::core::fund::FundRecord;
use crate::core::store::{INTRADAY_KEY, Persistence};
use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, TimeZone, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const MAX_POINTS: usize = 500;
/// 09:30 in minutes since midnight.
pub const SESSION_OPEN: u32 = 9 * 60 + 30;
/// 15:00 in minutes since midnight.
pub const SESSION_CLOSE: u32 = 15 * 60;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntradayPoint {
    /// `HH:MM`
    pub time: String,
    pub value: f64,
    pub change: f64,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

type Series = BTreeMap<String, Vec<IntradayPoint>>;

pub fn is_trading_day(now: NaiveDateTime) -> bool {
    !matches!(now.weekday(), Weekday::Sat | Weekday::Sun)
}

pub fn is_trading_time(now: NaiveDateTime) -> bool {
    let minutes = now.hour() * 60 + now.minute();
    is_trading_day(now) && (SESSION_OPEN..=SESSION_CLOSE).contains(&minutes)
}

pub struct IntradayCache {
    persistence: Persistence,
    day: NaiveDate,
    series: Series,
}

impl IntradayCache {
    /// Loads today's snapshots, purging any other day from the store.
    pub async fn load(persistence: Persistence, today: NaiveDate) -> Self {
        let mut stored: BTreeMap<String, Series> =
            persistence.load(INTRADAY_KEY, BTreeMap::new()).await;
        let today_key = today.format(DATE_FORMAT).to_string();

        let stale: Vec<String> = stored.keys().filter(|d| **d != today_key).cloned().collect();
        let series = stored.remove(&today_key).unwrap_or_default();

        let cache = Self {
            persistence,
            day: today,
            series,
        };
        if !stale.is_empty() {
            info!(purged = ?stale, "Dropping intraday data from previous days");
            if let Err(e) = cache.save().await {
                tracing::error!(error = %e, "Failed to save purged intraday data");
            }
        }
        cache
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }

    pub fn series(&self, code: &str) -> &[IntradayPoint] {
        self.series.get(code).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// Appends a snapshot of `fund` taken at `now`.
    ///
    /// Returns `false` without touching the buffer outside trading hours,
    /// when a point for the same minute already ends the buffer, or when the
    /// record carries no usable value.
    pub fn record(&mut self, fund: &FundRecord, now: NaiveDateTime) -> bool {
        if !is_trading_time(now) {
            return false;
        }
        if now.date() != self.day {
            debug!(from = %self.day, to = %now.date(), "Intraday day rollover");
            self.day = now.date();
            self.series.clear();
        }

        let Some(value) = fund.current_price() else {
            debug!(code = %fund.code, "No value to record");
            return false;
        };
        let time = now.format("%H:%M").to_string();

        let points = self.series.entry(fund.code.clone()).or_default();
        if points.last().is_some_and(|p| p.time == time) {
            return false;
        }

        points.push(IntradayPoint {
            time,
            value: round_to(value, 4),
            change: round_to(fund.today_change(), 2),
            timestamp: epoch_millis(now),
        });
        if points.len() > MAX_POINTS {
            let excess = points.len() - MAX_POINTS;
            points.drain(..excess);
        }
        true
    }

    pub async fn save(&self) -> Result<(), StoreError> {
        let mut stored = BTreeMap::new();
        stored.insert(self.day.format(DATE_FORMAT).to_string(), &self.series);
        self.persistence.save(INTRADAY_KEY, &stored).await
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn epoch_millis(now: NaiveDateTime) -> i64 {
    Local
        .from_local_datetime(&now)
        .earliest()
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_else(|| now.and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fund::Rate;
    use crate::store::memory::MemoryCollection;
    use std::sync::Arc;

    // 2026-10-19 is a Monday.
    fn at(day: u32, hour: u32, minute: u32, second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, day)
            .unwrap()
            .and_hms_opt(hour, minute, second)
            .unwrap()
    }

    fn fund(code: &str, gsz: &str, gszzl: f64) -> FundRecord {
        FundRecord {
            code: code.to_string(),
            dwjz: Some("1.0000".to_string()),
            gsz: Some(gsz.to_string()),
            gszzl: Some(Rate::Number(gszzl)),
            ..Default::default()
        }
    }

    fn persistence() -> Persistence {
        Persistence::new(Arc::new(MemoryCollection::new()))
    }

    #[test]
    fn test_trading_window() {
        assert!(is_trading_time(at(19, 9, 30, 0)));
        assert!(is_trading_time(at(19, 15, 0, 59)));
        assert!(!is_trading_time(at(19, 9, 29, 59)));
        assert!(!is_trading_time(at(19, 15, 1, 0)));
        // Saturday and Sunday
        assert!(!is_trading_time(at(24, 10, 0, 0)));
        assert!(!is_trading_time(at(25, 10, 0, 0)));
    }

    #[tokio::test]
    async fn test_record_dedupes_by_minute() {
        let mut cache = IntradayCache::load(persistence(), at(19, 0, 0, 0).date()).await;

        assert!(cache.record(&fund("000001", "1.0123", 1.23), at(19, 10, 0, 5)));
        assert!(!cache.record(&fund("000001", "1.0200", 2.0), at(19, 10, 0, 50)));
        assert!(cache.record(&fund("000001", "1.0300", 3.0), at(19, 10, 1, 0)));

        let series = cache.series("000001");
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].time, "10:00");
        assert_eq!(series[0].value, 1.0123);
        assert_eq!(series[0].change, 1.23);
        assert_eq!(series[1].time, "10:01");
    }

    #[tokio::test]
    async fn test_record_outside_trading_hours_is_ignored() {
        let mut cache = IntradayCache::load(persistence(), at(19, 0, 0, 0).date()).await;

        assert!(!cache.record(&fund("000001", "1.01", 1.0), at(19, 8, 0, 0)));
        assert!(!cache.record(&fund("000001", "1.01", 1.0), at(19, 16, 0, 0)));
        assert!(!cache.record(&fund("000001", "1.01", 1.0), at(24, 11, 0, 0)));
        assert!(cache.series("000001").is_empty());
    }

    #[tokio::test]
    async fn test_buffer_is_capped_dropping_oldest() {
        let persistence = persistence();
        let full: Vec<IntradayPoint> = (0..MAX_POINTS)
            .map(|i| IntradayPoint {
                time: format!("p{i}"),
                value: i as f64,
                change: 0.0,
                timestamp: i as i64,
            })
            .collect();
        let mut seeded = BTreeMap::new();
        seeded.insert(
            "2026-10-19".to_string(),
            BTreeMap::from([("000001".to_string(), full)]),
        );
        persistence.save(INTRADAY_KEY, &seeded).await.unwrap();

        let mut cache = IntradayCache::load(persistence, at(19, 0, 0, 0).date()).await;
        assert_eq!(cache.series("000001").len(), MAX_POINTS);

        assert!(cache.record(&fund("000001", "1.2345", 0.5), at(19, 10, 0, 0)));

        let series = cache.series("000001");
        assert_eq!(series.len(), MAX_POINTS);
        assert_eq!(series[0].time, "p1");
        assert_eq!(series[MAX_POINTS - 1].time, "10:00");
        assert_eq!(series[MAX_POINTS - 1].value, 1.2345);
    }

    #[tokio::test]
    async fn test_load_purges_previous_days() {
        let persistence = persistence();
        let mut yesterday = IntradayCache::load(persistence.clone(), at(16, 0, 0, 0).date()).await;
        assert!(yesterday.record(&fund("000001", "1.01", 1.0), at(16, 10, 0, 0)));
        yesterday.save().await.unwrap();

        let today = IntradayCache::load(persistence.clone(), at(19, 0, 0, 0).date()).await;
        assert!(today.series("000001").is_empty());

        let stored: BTreeMap<String, Series> = persistence.load(INTRADAY_KEY, BTreeMap::new()).await;
        assert!(!stored.contains_key("2026-10-16"));
    }

    #[tokio::test]
    async fn test_save_and_reload_same_day() {
        let persistence = persistence();
        let mut cache = IntradayCache::load(persistence.clone(), at(19, 0, 0, 0).date()).await;
        cache.record(&fund("000001", "1.01", 1.0), at(19, 10, 0, 0));
        cache.record(&fund("110022", "2.02", -0.5), at(19, 10, 0, 0));
        cache.save().await.unwrap();

        let reloaded = IntradayCache::load(persistence, at(19, 0, 0, 0).date()).await;
        assert_eq!(reloaded.series("000001").len(), 1);
        assert_eq!(reloaded.series("110022")[0].change, -0.5);
        assert_eq!(reloaded.codes().collect::<Vec<_>>(), vec!["000001", "110022"]);
    }

    #[tokio::test]
    async fn test_record_rolls_over_to_new_day() {
        let mut cache = IntradayCache::load(persistence(), at(19, 0, 0, 0).date()).await;
        cache.record(&fund("000001", "1.01", 1.0), at(19, 10, 0, 0));

        assert!(cache.record(&fund("000001", "1.02", 2.0), at(20, 10, 0, 0)));
        assert_eq!(cache.day(), at(20, 0, 0, 0).date());
        assert_eq!(cache.series("000001").len(), 1);
        assert_eq!(cache.series("000001")[0].value, 1.02);
    }
}
