//! Success/failure analytics over historical cancellation requests.
//!
//! All derivation is read-only and defensive: on empty input or storage
//! failure the aggregator returns an all-zero structure instead of erroring,
//! so a broken analytics path can never take down a dashboard.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::storage::RequestStore;
use crate::types::{CancellationRequest, Method, RequestStatus};

/// Number of days in the fixed request/success trend.
const TREND_DAYS: i64 = 7;

/// Reporting window for analytics queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Day,
    #[default]
    Week,
    Month,
}

impl Timeframe {
    /// Start of the window relative to `now`.
    #[must_use]
    pub fn start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Day => now - Duration::days(1),
            Self::Week => now - Duration::weeks(1),
            Self::Month => now - Duration::days(30),
        }
    }
}

/// Top-line totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub total_requests: u64,
    pub completed: u64,
    pub failed: u64,
    pub pending: u64,
    pub success_rate: f64,
}

/// Request counts per method.
///
/// Automation's historical naming variants (`web_automation`,
/// `browser_automation`) are folded into the one automation bucket at
/// deserialization, so legacy rows can never split the count.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MethodBreakdown {
    pub api: u64,
    pub automation: u64,
    pub manual: u64,
}

/// Success rates per method.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MethodSuccessRates {
    pub api: f64,
    pub automation: f64,
    pub manual: f64,
}

/// Per-provider statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderStats {
    pub provider: String,
    pub total: u64,
    pub completed: u64,
    pub success_rate: f64,
    /// Mean of completion - creation over successful requests, in minutes
    pub avg_completion_minutes: Option<f64>,
}

/// One day in the trend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendPoint {
    /// Day, formatted `YYYY-MM-DD`
    pub date: String,
    pub requests: u64,
    pub successes: u64,
}

/// Full analytics response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedAnalytics {
    pub timeframe: Timeframe,
    pub generated_at: DateTime<Utc>,
    pub summary: AnalyticsSummary,
    pub method_breakdown: MethodBreakdown,
    pub method_success_rates: MethodSuccessRates,
    pub providers: Vec<ProviderStats>,
    /// Always exactly seven points, oldest first
    pub trend: Vec<TrendPoint>,
}

impl UnifiedAnalytics {
    /// All-zero structure for empty input or storage failure.
    #[must_use]
    pub fn empty(timeframe: Timeframe, now: DateTime<Utc>) -> Self {
        Self {
            timeframe,
            generated_at: now,
            summary: AnalyticsSummary::default(),
            method_breakdown: MethodBreakdown::default(),
            method_success_rates: MethodSuccessRates::default(),
            providers: Vec::new(),
            trend: empty_trend(now),
        }
    }
}

/// Seven zeroed trend points ending today.
fn empty_trend(now: DateTime<Utc>) -> Vec<TrendPoint> {
    (0..TREND_DAYS)
        .rev()
        .map(|offset| TrendPoint {
            date: (now - Duration::days(offset)).format("%Y-%m-%d").to_string(),
            requests: 0,
            successes: 0,
        })
        .collect()
}

fn rate(completed: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        completed as f64 / total as f64
    }
}

/// Derives analytics from historical cancellation requests.
pub struct AnalyticsAggregator {
    requests: Arc<dyn RequestStore>,
}

impl AnalyticsAggregator {
    /// Create a new aggregator.
    #[must_use]
    pub fn new(requests: Arc<dyn RequestStore>) -> Self {
        Self { requests }
    }

    /// Compute unified analytics for a user over a timeframe. Never errors.
    pub async fn unified(&self, user_id: &str, timeframe: Timeframe) -> UnifiedAnalytics {
        let now = Utc::now();
        let since = timeframe.start(now);

        let rows = match self.requests.for_user_since(user_id, since).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(user_id, error = %e, "Analytics storage read failed, returning zeros");
                return UnifiedAnalytics::empty(timeframe, now);
            }
        };

        if rows.is_empty() {
            return UnifiedAnalytics::empty(timeframe, now);
        }

        let summary = Self::summarize(&rows);
        let (method_breakdown, method_success_rates) = Self::per_method(&rows);
        let providers = Self::per_provider(&rows);
        let trend = Self::trend(&rows, now);

        UnifiedAnalytics {
            timeframe,
            generated_at: now,
            summary,
            method_breakdown,
            method_success_rates,
            providers,
            trend,
        }
    }

    fn summarize(rows: &[CancellationRequest]) -> AnalyticsSummary {
        let total_requests = rows.len() as u64;
        let completed = rows
            .iter()
            .filter(|r| r.status == RequestStatus::Completed)
            .count() as u64;
        let failed = rows
            .iter()
            .filter(|r| r.status == RequestStatus::Failed)
            .count() as u64;
        let pending = rows
            .iter()
            .filter(|r| {
                matches!(
                    r.status,
                    RequestStatus::Pending
                        | RequestStatus::Processing
                        | RequestStatus::Scheduled
                        | RequestStatus::RequiresManual
                )
            })
            .count() as u64;

        AnalyticsSummary {
            total_requests,
            completed,
            failed,
            pending,
            success_rate: rate(completed, total_requests),
        }
    }

    fn per_method(rows: &[CancellationRequest]) -> (MethodBreakdown, MethodSuccessRates) {
        let mut breakdown = MethodBreakdown::default();
        let mut completed: HashMap<Method, u64> = HashMap::new();
        let mut totals: HashMap<Method, u64> = HashMap::new();

        for row in rows {
            match row.method {
                Method::Api => breakdown.api += 1,
                Method::Automation => breakdown.automation += 1,
                Method::Manual => breakdown.manual += 1,
            }
            *totals.entry(row.method).or_default() += 1;
            if row.status == RequestStatus::Completed {
                *completed.entry(row.method).or_default() += 1;
            }
        }

        let rate_for = |method: Method| {
            rate(
                completed.get(&method).copied().unwrap_or(0),
                totals.get(&method).copied().unwrap_or(0),
            )
        };

        let rates = MethodSuccessRates {
            api: rate_for(Method::Api),
            automation: rate_for(Method::Automation),
            manual: rate_for(Method::Manual),
        };

        (breakdown, rates)
    }

    fn per_provider(rows: &[CancellationRequest]) -> Vec<ProviderStats> {
        let mut grouped: HashMap<&str, Vec<&CancellationRequest>> = HashMap::new();
        for row in rows {
            grouped.entry(row.provider.as_str()).or_default().push(row);
        }

        let mut stats: Vec<ProviderStats> = grouped
            .into_iter()
            .map(|(provider, rows)| {
                let total = rows.len() as u64;
                let successes: Vec<_> = rows
                    .iter()
                    .filter(|r| r.status == RequestStatus::Completed)
                    .collect();
                let completed = successes.len() as u64;

                let durations: Vec<f64> = successes
                    .iter()
                    .filter_map(|r| {
                        r.completed_at
                            .map(|done| (done - r.created_at).num_seconds() as f64 / 60.0)
                    })
                    .collect();
                let avg_completion_minutes = if durations.is_empty() {
                    None
                } else {
                    Some(durations.iter().sum::<f64>() / durations.len() as f64)
                };

                ProviderStats {
                    provider: provider.to_string(),
                    total,
                    completed,
                    success_rate: rate(completed, total),
                    avg_completion_minutes,
                }
            })
            .collect();

        // Busiest providers first; name as tiebreaker for stable output.
        stats.sort_by(|a, b| b.total.cmp(&a.total).then(a.provider.cmp(&b.provider)));
        stats
    }

    fn trend(rows: &[CancellationRequest], now: DateTime<Utc>) -> Vec<TrendPoint> {
        let mut trend = empty_trend(now);
        let by_date: HashMap<String, usize> = trend
            .iter()
            .enumerate()
            .map(|(index, point)| (point.date.clone(), index))
            .collect();

        for row in rows {
            let created = row.created_at.format("%Y-%m-%d").to_string();
            if let Some(&index) = by_date.get(&created) {
                trend[index].requests += 1;
            }
            if row.status == RequestStatus::Completed {
                if let Some(done) = row.completed_at {
                    let done = done.format("%Y-%m-%d").to_string();
                    if let Some(&index) = by_date.get(&done) {
                        trend[index].successes += 1;
                    }
                }
            }
        }

        trend
    }
}
