//! Usage metrics across session, daily, monthly and lifetime scopes
//!
//! Every completed request (cache hit or real synthesis) updates all four
//! scopes under one lock. Daily and monthly scopes are replaced, not
//! accumulated, when the calendar period changes. Daily, monthly and total
//! scopes are persisted; the session scope never is.

pub mod store;

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
pub use store::{FileStore, KeyValueStore, MemoryStore};

const DAILY_KEY: &str = "usage_daily";
const MONTHLY_KEY: &str = "usage_monthly";
const TOTAL_KEY: &str = "usage_total";

/// Counters shared by every scope
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageCounters {
    /// Accumulated cost in USD
    pub cost: f64,
    pub characters: u64,
    pub requests: u64,
    pub cache_hits: u64,
}

impl UsageCounters {
    fn add(&mut self, usage: &RequestUsage) {
        self.cost += usage.cost;
        self.characters += usage.characters;
        self.requests += 1;
        if usage.cache_hit {
            self.cache_hits += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUsage {
    #[serde(flatten)]
    pub counters: UsageCounters,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyUsage {
    #[serde(flatten)]
    pub counters: UsageCounters,
    /// Calendar date, `YYYY-MM-DD`
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyUsage {
    #[serde(flatten)]
    pub counters: UsageCounters,
    /// 1-based month
    pub month: u32,
    pub year: i32,
}

/// Immutable snapshot of all four scopes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageMetrics {
    pub session: SessionUsage,
    pub daily: DailyUsage,
    pub monthly: MonthlyUsage,
    pub total: UsageCounters,
}

impl UsageMetrics {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            session: SessionUsage {
                counters: UsageCounters::default(),
                started_at: now,
            },
            daily: fresh_daily(now),
            monthly: fresh_monthly(now),
            total: UsageCounters::default(),
        }
    }

    /// Replace daily/monthly scopes whose period has passed
    fn roll_over(&mut self, now: DateTime<Utc>) {
        if self.daily.date != date_key(now) {
            tracing::debug!(previous = %self.daily.date, "daily usage rolled over");
            self.daily = fresh_daily(now);
        }
        if self.monthly.month != now.month() || self.monthly.year != now.year() {
            tracing::debug!(
                month = self.monthly.month,
                year = self.monthly.year,
                "monthly usage rolled over"
            );
            self.monthly = fresh_monthly(now);
        }
    }
}

fn date_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

fn fresh_daily(now: DateTime<Utc>) -> DailyUsage {
    DailyUsage {
        counters: UsageCounters::default(),
        date: date_key(now),
    }
}

fn fresh_monthly(now: DateTime<Utc>) -> MonthlyUsage {
    MonthlyUsage {
        counters: UsageCounters::default(),
        month: now.month(),
        year: now.year(),
    }
}

/// What one completed request contributes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestUsage {
    pub characters: u64,
    pub cost: f64,
    pub cache_hit: bool,
}

/// Aggregates and persists usage metrics
pub struct UsageMetricsAggregator {
    metrics: Mutex<UsageMetrics>,
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Arc<dyn Clock>,
    /// Serializes writes so a stale snapshot never overwrites a newer one
    persist_lock: tokio::sync::Mutex<()>,
}

impl UsageMetricsAggregator {
    /// Create an aggregator, restoring persisted scopes whose period still
    /// matches the current date
    ///
    /// A missing store or unreadable values leave the scopes fresh.
    pub async fn load(store: Option<Arc<dyn KeyValueStore>>, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        let mut metrics = UsageMetrics::fresh(now);

        if let Some(store) = &store {
            if let Some(daily) = read::<DailyUsage>(store.as_ref(), DAILY_KEY).await {
                if daily.date == date_key(now) {
                    metrics.daily = daily;
                } else {
                    tracing::debug!(stored = %daily.date, "discarding stale daily usage");
                }
            }
            if let Some(monthly) = read::<MonthlyUsage>(store.as_ref(), MONTHLY_KEY).await {
                if monthly.month == now.month() && monthly.year == now.year() {
                    metrics.monthly = monthly;
                } else {
                    tracing::debug!(
                        month = monthly.month,
                        year = monthly.year,
                        "discarding stale monthly usage"
                    );
                }
            }
            if let Some(total) = read::<UsageCounters>(store.as_ref(), TOTAL_KEY).await {
                metrics.total = total;
            }
        }

        Self {
            metrics: Mutex::new(metrics),
            store,
            clock,
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, UsageMetrics> {
        self.metrics.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record one completed request and persist the result
    pub async fn record(&self, usage: RequestUsage) {
        {
            let now = self.clock.now();
            let mut metrics = self.lock();
            metrics.roll_over(now);
            metrics.session.counters.add(&usage);
            metrics.daily.counters.add(&usage);
            metrics.monthly.counters.add(&usage);
            metrics.total.add(&usage);
        }
        self.persist().await;
    }

    /// Current metrics as a value copy
    #[must_use]
    pub fn snapshot(&self) -> UsageMetrics {
        let now = self.clock.now();
        let mut metrics = self.lock();
        metrics.roll_over(now);
        metrics.clone()
    }

    /// Start a new session scope
    pub fn reset_session(&self) {
        let now = self.clock.now();
        self.lock().session = SessionUsage {
            counters: UsageCounters::default(),
            started_at: now,
        };
        tracing::info!("session usage reset");
    }

    /// Write daily, monthly and total scopes to the store
    ///
    /// Failures are logged and otherwise ignored.
    pub async fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };

        let _guard = self.persist_lock.lock().await;
        let (daily, monthly, total) = {
            let metrics = self.lock();
            (
                metrics.daily.clone(),
                metrics.monthly.clone(),
                metrics.total,
            )
        };

        write(store.as_ref(), DAILY_KEY, &daily).await;
        write(store.as_ref(), MONTHLY_KEY, &monthly).await;
        write(store.as_ref(), TOTAL_KEY, &total).await;
    }
}

impl std::fmt::Debug for UsageMetricsAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageMetricsAggregator")
            .field("persistent", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

async fn read<T: serde::de::DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    match store.get(key).await {
        Ok(Some(value)) => match serde_json::from_value(value) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!(key, error = %e, "ignoring unreadable persisted usage");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(key, error = %e, "failed to load persisted usage");
            None
        }
    }
}

async fn write<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) {
    let value = match serde_json::to_value(value) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(key, error = %e, "failed to serialize usage");
            return;
        }
    };
    if let Err(e) = store.set(key, value).await {
        tracing::warn!(key, error = %e, "failed to persist usage");
    }
}
