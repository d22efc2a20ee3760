//! Refresh cycles over the watch-list.
//!
//! At most one cycle runs at a time. A cycle fetches codes one after
//! another, keeps the previous record for any code whose fetch fails, and
//! folds everything back into the list in a single merge at the end.

use crate::core::clock::Clock;
use crate::core::fetcher::FundProvider;
use crate::core::fund::FundRecord;
use crate::core::intraday::{IntradayCache, IntradayPoint};
use crate::core::merge::{dedupe_by_code, merge, unique_codes};
use crate::core::store::{FUNDS_KEY, Persistence, REFRESH_MS_KEY};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub const MIN_REFRESH_MS: u64 = 5000;
pub const DEFAULT_REFRESH_MS: u64 = 30000;

pub fn clamp_refresh_ms(ms: u64) -> u64 {
    ms.max(MIN_REFRESH_MS)
}

/// What happened to each code in one refresh cycle.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RefreshReport {
    /// Fetched successfully.
    pub refreshed: Vec<String>,
    /// Fetch failed; the previous record was kept.
    pub retained: Vec<String>,
    /// Fetch failed and there was no previous record to keep.
    pub missing: Vec<String>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct AddReport {
    pub added: Vec<String>,
    /// Already on the watch-list.
    pub skipped: Vec<String>,
    /// Could not be fetched, so not added.
    pub failed: Vec<String>,
}

pub struct RefreshScheduler {
    provider: Arc<dyn FundProvider>,
    persistence: Persistence,
    clock: Arc<dyn Clock>,
    funds: Mutex<Vec<FundRecord>>,
    intraday: Mutex<IntradayCache>,
    refresh_ms: AtomicU64,
    cycle: Semaphore,
    reports: watch::Sender<Option<RefreshReport>>,
}

impl RefreshScheduler {
    /// Restores the watch-list, interval and today's intraday data.
    pub async fn load(
        provider: Arc<dyn FundProvider>,
        persistence: Persistence,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let stored: Vec<FundRecord> = persistence.load(FUNDS_KEY, Vec::new()).await;
        let funds = dedupe_by_code(stored);

        let stored_ms: u64 = persistence.load(REFRESH_MS_KEY, DEFAULT_REFRESH_MS).await;
        let refresh_ms = clamp_refresh_ms(stored_ms);

        let intraday = IntradayCache::load(persistence.clone(), clock.now().date()).await;
        debug!(funds = funds.len(), refresh_ms, "Scheduler state loaded");

        Self {
            provider,
            persistence,
            clock,
            funds: Mutex::new(funds),
            intraday: Mutex::new(intraday),
            refresh_ms: AtomicU64::new(refresh_ms),
            cycle: Semaphore::new(1),
            reports: watch::channel(None).0,
        }
    }

    pub async fn funds(&self) -> Vec<FundRecord> {
        self.funds.lock().await.clone()
    }

    pub async fn codes(&self) -> Vec<String> {
        unique_codes(self.funds.lock().await.iter().map(|f| f.code.as_str()))
    }

    pub async fn intraday_series(&self, code: &str) -> Vec<IntradayPoint> {
        self.intraday.lock().await.series(code).to_vec()
    }

    /// Receiver that sees the report of every finished cycle.
    pub fn subscribe(&self) -> watch::Receiver<Option<RefreshReport>> {
        self.reports.subscribe()
    }

    pub fn is_refreshing(&self) -> bool {
        self.cycle.available_permits() == 0
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_ms.load(Ordering::SeqCst))
    }

    /// Sets and persists the timer interval, clamped to [`MIN_REFRESH_MS`].
    /// Returns the interval actually applied.
    pub async fn set_refresh_interval(&self, ms: u64) -> u64 {
        let applied = clamp_refresh_ms(ms);
        if applied != ms {
            warn!(requested = ms, applied, "Refresh interval below minimum, clamping");
        }
        self.refresh_ms.store(applied, Ordering::SeqCst);
        if let Err(e) = self.persistence.save(REFRESH_MS_KEY, &applied).await {
            error!(error = %e, "Failed to save refresh interval");
        }
        applied
    }

    /// Runs one refresh cycle over `codes`.
    ///
    /// Returns `None` without doing anything when another cycle is running.
    pub async fn refresh<I, S>(&self, codes: I) -> Option<RefreshReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Ok(_permit) = self.cycle.try_acquire() else {
            debug!("Refresh already in flight, skipping");
            return None;
        };

        let codes = unique_codes(codes);
        let mut report = RefreshReport::default();
        let mut updated = Vec::with_capacity(codes.len());

        for code in &codes {
            match self.provider.fetch_fund(code).await {
                Ok(record) => {
                    report.refreshed.push(code.clone());
                    updated.push(record);
                }
                Err(e) => {
                    // Look at the list as it is now, not as it was when the
                    // cycle started.
                    let previous = self
                        .funds
                        .lock()
                        .await
                        .iter()
                        .find(|f| f.code == *code)
                        .cloned();
                    match previous {
                        Some(record) => {
                            warn!(%code, error = %e, "Refresh failed, keeping previous data");
                            report.retained.push(code.clone());
                            updated.push(record);
                        }
                        None => {
                            warn!(%code, error = %e, "Refresh failed with no previous data");
                            report.missing.push(code.clone());
                        }
                    }
                }
            }
        }

        if !updated.is_empty() {
            self.commit(&updated).await;
        }

        info!(
            refreshed = report.refreshed.len(),
            retained = report.retained.len(),
            missing = report.missing.len(),
            "Refresh cycle finished"
        );
        self.reports.send_replace(Some(report.clone()));
        Some(report)
    }

    /// Refreshes everything on the watch-list, unless it is empty or a cycle
    /// is already running.
    pub async fn manual_refresh(&self) -> Option<RefreshReport> {
        if self.is_refreshing() {
            debug!("Manual refresh ignored, cycle in flight");
            return None;
        }
        let codes = self.codes().await;
        if codes.is_empty() {
            return None;
        }
        self.refresh(codes).await
    }

    /// Refreshes on the configured interval until `shutdown` completes.
    ///
    /// Ticks are fixed-rate and the first fires immediately. A tick that
    /// lands while a cycle is still running is skipped. A changed interval
    /// takes effect from the tick after the one that noticed it.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut period = self.refresh_interval();
        let mut timer = ticker(Instant::now(), period);
        let mut cycle: Option<Pin<Box<dyn Future<Output = ()> + '_>>> = None;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Stopping refresh loop");
                    break;
                }
                _ = async {
                    if let Some(running) = cycle.as_mut() {
                        running.await;
                    }
                }, if cycle.is_some() => {
                    cycle = None;
                }
                _ = timer.tick() => {
                    if cycle.is_some() {
                        debug!("Refresh still in flight, skipping tick");
                    } else {
                        cycle = Some(Box::pin(self.refresh_listed()));
                    }
                    let current = self.refresh_interval();
                    if current != period {
                        debug!(?period, ?current, "Refresh interval changed");
                        period = current;
                        timer = ticker(Instant::now() + period, period);
                    }
                }
            }
        }
    }

    async fn refresh_listed(&self) {
        let codes = self.codes().await;
        if !codes.is_empty() {
            self.refresh(codes).await;
        }
    }

    /// Fetches codes that are not on the watch-list yet and puts them in
    /// front of it. Codes that fail to fetch are reported, not added.
    pub async fn add_funds<I, S>(&self, codes: I) -> AddReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = AddReport::default();
        let mut fetched = Vec::new();

        for code in unique_codes(codes) {
            let exists = self.funds.lock().await.iter().any(|f| f.code == code);
            if exists {
                report.skipped.push(code);
                continue;
            }
            match self.provider.fetch_fund(&code).await {
                Ok(record) => {
                    report.added.push(code);
                    fetched.push(record);
                }
                Err(e) => {
                    warn!(%code, error = %e, "Failed to add fund");
                    report.failed.push(code);
                }
            }
        }

        if !fetched.is_empty() {
            let mut funds = self.funds.lock().await;
            fetched.extend(funds.iter().cloned());
            *funds = dedupe_by_code(fetched);
            if let Err(e) = self.persistence.save(FUNDS_KEY, &*funds).await {
                error!(error = %e, "Failed to save fund list");
            }
        }
        report
    }

    /// Drops `code` from the watch-list. Returns whether it was there.
    pub async fn remove_fund(&self, code: &str) -> bool {
        let mut funds = self.funds.lock().await;
        let before = funds.len();
        funds.retain(|f| f.code != code);
        let removed = funds.len() != before;
        if removed && let Err(e) = self.persistence.save(FUNDS_KEY, &*funds).await {
            error!(error = %e, "Failed to save fund list");
        }
        removed
    }

    async fn commit(&self, updated: &[FundRecord]) {
        {
            let mut funds = self.funds.lock().await;
            *funds = merge(&funds, updated);
            if let Err(e) = self.persistence.save(FUNDS_KEY, &*funds).await {
                error!(error = %e, "Failed to save fund list");
            }
        }

        let now = self.clock.now();
        let mut intraday = self.intraday.lock().await;
        let recorded = updated.iter().filter(|f| intraday.record(f, now)).count();
        if recorded > 0 {
            debug!(recorded, "Intraday points recorded");
            if let Err(e) = intraday.save().await {
                error!(error = %e, "Failed to save intraday data");
            }
        }
    }
}

fn ticker(start: Instant, period: Duration) -> Interval {
    let mut timer = tokio::time::interval_at(start, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::FixedClock;
    use crate::core::error::{FetchError, RetrievalError};
    use crate::core::fund::Rate;
    use crate::store::memory::MemoryCollection;
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn record(code: &str, name: &str) -> FundRecord {
        FundRecord {
            code: code.to_string(),
            name: name.to_string(),
            dwjz: Some("1.0000".to_string()),
            gsz: Some("1.0100".to_string()),
            gszzl: Some(Rate::Number(1.0)),
            ..Default::default()
        }
    }

    fn failure(code: &str) -> FetchError {
        FetchError::Valuation {
            code: code.to_string(),
            source: RetrievalError::Timeout {
                url: format!("https://example.test/js/{code}.js"),
                timeout: Duration::from_millis(5000),
            },
        }
    }

    /// Monday, 10:00.
    fn trading_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    #[derive(Default)]
    struct ScriptedProvider {
        records: StdMutex<HashMap<String, FundRecord>>,
        calls: StdMutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn with(records: &[FundRecord]) -> Arc<Self> {
            let provider = Self::default();
            for r in records {
                provider.set(r.clone());
            }
            Arc::new(provider)
        }

        fn set(&self, record: FundRecord) {
            self.records.lock().unwrap().insert(record.code.clone(), record);
        }

        fn fail(&self, code: &str) {
            self.records.lock().unwrap().remove(code);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FundProvider for ScriptedProvider {
        async fn fetch_fund(&self, code: &str) -> Result<FundRecord, FetchError> {
            self.calls.lock().unwrap().push(code.to_string());
            self.records
                .lock()
                .unwrap()
                .get(code)
                .cloned()
                .ok_or_else(|| failure(code))
        }
    }

    async fn scheduler_with(
        provider: Arc<dyn FundProvider>,
        collection: Arc<MemoryCollection>,
        now: NaiveDateTime,
    ) -> RefreshScheduler {
        RefreshScheduler::load(
            provider,
            Persistence::new(collection),
            Arc::new(FixedClock::new(now)),
        )
        .await
    }

    #[tokio::test]
    async fn test_duplicate_codes_fetched_once() {
        let provider = ScriptedProvider::with(&[record("000001", "a"), record("110022", "b")]);
        let scheduler =
            scheduler_with(provider.clone(), Arc::new(MemoryCollection::new()), trading_time()).await;

        let report = scheduler
            .refresh(["000001", "110022", "000001"])
            .await
            .unwrap();

        assert_eq!(provider.calls(), vec!["000001", "110022"]);
        assert_eq!(report.refreshed, vec!["000001", "110022"]);
        let codes: Vec<String> = scheduler.funds().await.into_iter().map(|f| f.code).collect();
        assert_eq!(codes, vec!["000001", "110022"]);
    }

    #[tokio::test]
    async fn test_subscribers_see_cycle_reports() {
        let provider = ScriptedProvider::with(&[record("000001", "a")]);
        let scheduler =
            scheduler_with(provider, Arc::new(MemoryCollection::new()), trading_time()).await;
        let mut reports = scheduler.subscribe();
        assert!(reports.borrow().is_none());

        scheduler.refresh(["000001", "999999"]).await.unwrap();

        assert!(reports.has_changed().unwrap());
        let seen = reports.borrow_and_update().clone().unwrap();
        assert_eq!(seen.refreshed, vec!["000001"]);
        assert_eq!(seen.missing, vec!["999999"]);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_record() {
        let provider = ScriptedProvider::with(&[record("000001", "a"), record("110022", "b")]);
        let scheduler =
            scheduler_with(provider.clone(), Arc::new(MemoryCollection::new()), trading_time()).await;
        scheduler.refresh(["000001", "110022"]).await.unwrap();
        let before = scheduler.funds().await;

        provider.fail("000001");
        provider.set(record("110022", "b-new"));
        let report = scheduler.refresh(["000001", "110022"]).await.unwrap();

        assert_eq!(report.retained, vec!["000001"]);
        assert_eq!(report.refreshed, vec!["110022"]);
        let after = scheduler.funds().await;
        assert_eq!(after.len(), 2);
        assert_eq!(after[0], before[0]);
        assert_eq!(after[1].name, "b-new");
    }

    #[tokio::test]
    async fn test_failed_fetch_without_previous_record_is_missing() {
        let provider = ScriptedProvider::with(&[record("000001", "a")]);
        let scheduler =
            scheduler_with(provider, Arc::new(MemoryCollection::new()), trading_time()).await;

        let report = scheduler.refresh(["000001", "999999"]).await.unwrap();
        assert_eq!(report.missing, vec!["999999"]);
        assert_eq!(scheduler.codes().await, vec!["000001"]);
    }

    struct GatedProvider {
        gate: Notify,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FundProvider for GatedProvider {
        async fn fetch_fund(&self, code: &str) -> Result<FundRecord, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(record(code, "gated"))
        }
    }

    #[tokio::test]
    async fn test_second_refresh_while_running_is_noop() {
        let provider = Arc::new(GatedProvider {
            gate: Notify::new(),
            calls: AtomicUsize::new(0),
        });
        let scheduler =
            scheduler_with(provider.clone(), Arc::new(MemoryCollection::new()), trading_time()).await;

        let (first, second) = tokio::join!(scheduler.refresh(["000001"]), async {
            assert!(scheduler.is_refreshing());
            let second = scheduler.refresh(["000001", "110022"]).await;
            let manual = scheduler.manual_refresh().await;
            provider.gate.notify_one();
            (second, manual)
        });

        assert!(first.is_some());
        assert_eq!(second, (None, None));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_refreshing());
    }

    #[tokio::test]
    async fn test_refresh_persists_merged_list() {
        let collection = Arc::new(MemoryCollection::new());
        let provider = ScriptedProvider::with(&[record("000001", "a")]);
        let scheduler = scheduler_with(provider.clone(), collection.clone(), trading_time()).await;
        scheduler.refresh(["000001"]).await.unwrap();

        let reloaded = scheduler_with(provider, collection, trading_time()).await;
        assert_eq!(reloaded.codes().await, vec!["000001"]);
    }

    #[tokio::test]
    async fn test_persist_failure_does_not_fail_refresh() {
        let collection = Arc::new(MemoryCollection::new());
        collection.fail_writes(true);
        let provider = ScriptedProvider::with(&[record("000001", "a")]);
        let scheduler = scheduler_with(provider, collection, trading_time()).await;

        let report = scheduler.refresh(["000001"]).await.unwrap();
        assert_eq!(report.refreshed, vec!["000001"]);
        assert_eq!(scheduler.codes().await, vec!["000001"]);
        assert!(!scheduler.is_refreshing());
    }

    #[tokio::test]
    async fn test_refresh_records_intraday_during_trading_hours() {
        let provider = ScriptedProvider::with(&[record("000001", "a")]);
        let scheduler =
            scheduler_with(provider, Arc::new(MemoryCollection::new()), trading_time()).await;

        scheduler.refresh(["000001"]).await.unwrap();
        scheduler.refresh(["000001"]).await.unwrap();

        let series = scheduler.intraday_series("000001").await;
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].time, "10:00");
        assert_eq!(series[0].value, 1.01);
    }

    #[tokio::test]
    async fn test_refresh_after_midnight_starts_new_series() {
        let clock = Arc::new(FixedClock::new(trading_time()));
        let scheduler = RefreshScheduler::load(
            ScriptedProvider::with(&[record("000001", "a")]),
            Persistence::new(Arc::new(MemoryCollection::new())),
            clock.clone(),
        )
        .await;

        scheduler.refresh(["000001"]).await.unwrap();
        clock.set(trading_time() + chrono::Duration::minutes(5));
        scheduler.refresh(["000001"]).await.unwrap();
        assert_eq!(scheduler.intraday_series("000001").await.len(), 2);

        clock.set(trading_time() + chrono::Duration::days(1));
        scheduler.refresh(["000001"]).await.unwrap();
        let series = scheduler.intraday_series("000001").await;
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].time, "10:00");
    }

    #[tokio::test]
    async fn test_refresh_skips_intraday_on_weekend() {
        let saturday = NaiveDate::from_ymd_opt(2026, 10, 24)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let provider = ScriptedProvider::with(&[record("000001", "a")]);
        let scheduler = scheduler_with(provider, Arc::new(MemoryCollection::new()), saturday).await;

        scheduler.refresh(["000001"]).await.unwrap();
        assert!(scheduler.intraday_series("000001").await.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_interval_is_clamped() {
        let collection = Arc::new(MemoryCollection::new());
        let provider = ScriptedProvider::with(&[]);
        let scheduler = scheduler_with(provider.clone(), collection.clone(), trading_time()).await;
        assert_eq!(scheduler.refresh_interval(), Duration::from_millis(DEFAULT_REFRESH_MS));

        assert_eq!(scheduler.set_refresh_interval(3000).await, 5000);
        assert_eq!(scheduler.refresh_interval(), Duration::from_millis(5000));

        assert_eq!(scheduler.set_refresh_interval(60000).await, 60000);
        let reloaded = scheduler_with(provider, collection, trading_time()).await;
        assert_eq!(reloaded.refresh_interval(), Duration::from_millis(60000));
    }

    #[tokio::test]
    async fn test_load_clamps_stored_interval_and_dedupes_funds() {
        let collection = Arc::new(MemoryCollection::new());
        let persistence = Persistence::new(collection.clone());
        persistence.save(REFRESH_MS_KEY, &1000u64).await.unwrap();
        persistence
            .save(
                FUNDS_KEY,
                &vec![record("000001", "first"), record("000001", "second")],
            )
            .await
            .unwrap();

        let scheduler =
            scheduler_with(ScriptedProvider::with(&[]), collection, trading_time()).await;
        assert_eq!(scheduler.refresh_interval(), Duration::from_millis(MIN_REFRESH_MS));
        let funds = scheduler.funds().await;
        assert_eq!(funds.len(), 1);
        assert_eq!(funds[0].name, "first");
    }

    #[tokio::test]
    async fn test_add_funds_prepends_and_reports_failures() {
        let provider = ScriptedProvider::with(&[record("000001", "a"), record("110022", "b")]);
        let scheduler =
            scheduler_with(provider.clone(), Arc::new(MemoryCollection::new()), trading_time()).await;
        scheduler.add_funds(["000001"]).await;

        let report = scheduler.add_funds(["110022", "000001", "999999"]).await;
        assert_eq!(report.added, vec!["110022"]);
        assert_eq!(report.skipped, vec!["000001"]);
        assert_eq!(report.failed, vec!["999999"]);
        assert_eq!(scheduler.codes().await, vec!["110022", "000001"]);
    }

    #[tokio::test]
    async fn test_remove_fund() {
        let provider = ScriptedProvider::with(&[record("000001", "a"), record("110022", "b")]);
        let scheduler =
            scheduler_with(provider, Arc::new(MemoryCollection::new()), trading_time()).await;
        scheduler.add_funds(["000001", "110022"]).await;

        assert!(scheduler.remove_fund("000001").await);
        assert!(!scheduler.remove_fund("000001").await);
        assert_eq!(scheduler.codes().await, vec!["110022"]);
    }

    #[tokio::test]
    async fn test_manual_refresh_with_empty_list_is_noop() {
        let provider = ScriptedProvider::with(&[]);
        let scheduler =
            scheduler_with(provider.clone(), Arc::new(MemoryCollection::new()), trading_time()).await;
        assert!(scheduler.manual_refresh().await.is_none());
        assert!(provider.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_refreshes_on_interval_until_shutdown() {
        let provider = ScriptedProvider::with(&[record("000001", "a")]);
        let scheduler =
            scheduler_with(provider.clone(), Arc::new(MemoryCollection::new()), trading_time()).await;
        scheduler.add_funds(["000001"]).await;
        scheduler.set_refresh_interval(5000).await;

        scheduler
            .run(tokio::time::sleep(Duration::from_millis(12_000)))
            .await;

        // One call from add_funds, then cycles at 0s, 5s and 10s.
        assert_eq!(provider.calls().len(), 4);
    }

    /// Takes `delay` of virtual time per fetch and records when each fetch
    /// started.
    struct SlowProvider {
        delay: Duration,
        starts: StdMutex<Vec<Instant>>,
    }

    impl SlowProvider {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                starts: StdMutex::new(Vec::new()),
            })
        }

        /// Start offsets in whole seconds relative to `origin`.
        fn offsets(&self, origin: Instant) -> Vec<u64> {
            self.starts
                .lock()
                .unwrap()
                .iter()
                .map(|s| s.duration_since(origin).as_secs())
                .collect()
        }
    }

    #[async_trait]
    impl FundProvider for SlowProvider {
        async fn fetch_fund(&self, code: &str) -> Result<FundRecord, FetchError> {
            self.starts.lock().unwrap().push(Instant::now());
            tokio::time::sleep(self.delay).await;
            Ok(record(code, "slow"))
        }
    }

    async fn slow_scheduler(delay: Duration) -> (Arc<SlowProvider>, RefreshScheduler) {
        let provider = SlowProvider::new(delay);
        let scheduler =
            scheduler_with(provider.clone(), Arc::new(MemoryCollection::new()), trading_time()).await;
        scheduler.add_funds(["000001"]).await;
        scheduler.set_refresh_interval(5000).await;
        provider.starts.lock().unwrap().clear();
        (provider, scheduler)
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_keeps_fixed_rate_when_cycles_are_slow() {
        let (provider, scheduler) = slow_scheduler(Duration::from_secs(4)).await;
        let origin = Instant::now();

        scheduler
            .run(tokio::time::sleep(Duration::from_millis(20_500)))
            .await;

        assert_eq!(provider.offsets(origin), vec![0, 5, 10, 15, 20]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_skips_ticks_while_cycle_in_flight() {
        let (provider, scheduler) = slow_scheduler(Duration::from_secs(7)).await;
        let origin = Instant::now();

        scheduler
            .run(tokio::time::sleep(Duration::from_millis(20_500)))
            .await;

        // Ticks at 5s and 15s land on a running cycle.
        assert_eq!(provider.offsets(origin), vec![0, 10, 20]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_applies_new_interval() {
        let (provider, scheduler) = slow_scheduler(Duration::from_millis(100)).await;
        let origin = Instant::now();

        tokio::join!(
            scheduler.run(tokio::time::sleep(Duration::from_millis(31_000))),
            async {
                tokio::time::sleep(Duration::from_millis(6_000)).await;
                scheduler.set_refresh_interval(10_000).await;
            }
        );

        // The 10s tick notices the change; ticks follow every 10s from there.
        assert_eq!(provider.offsets(origin), vec![0, 5, 10, 20, 30]);
    }
}
