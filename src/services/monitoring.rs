use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use colored::Colorize;
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::common::{constants::MAX_METRIC_SAMPLES, logger::Logger};

/// Samples older than this are ignored by the health check.
const HEALTH_WINDOW: Duration = Duration::from_secs(300);
const UNHEALTHY_ERROR_RATE: f64 = 0.10;
const DEGRADED_ERROR_RATE: f64 = 0.05;

#[derive(Debug, Clone, Serialize)]
pub struct MetricData {
    pub name: String,
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
    pub tags: BTreeMap<String, String>,
    #[serde(skip)]
    at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: HealthState,
    pub uptime: Duration,
    pub total_requests: usize,
    pub error_count: usize,
    pub error_rate: f64,
}

/// In-process metric recorder shared by the API client and the sniper.
pub struct MonitoringService {
    samples: Mutex<VecDeque<MetricData>>,
    // Lifetime totals keyed by "<name>{<endpoint>}", unaffected by sample eviction
    totals: DashMap<String, f64>,
    started: Instant,
    logger: Logger,
}

impl Default for MonitoringService {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitoringService {
    pub fn new() -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(MAX_METRIC_SAMPLES)),
            totals: DashMap::new(),
            started: Instant::now(),
            logger: Logger::new("[MONITOR] => ".cyan().bold().to_string()),
        }
    }

    pub fn record_metric(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        let tags: BTreeMap<String, String> = tags
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let key = match tags.get("endpoint") {
            Some(endpoint) => format!("{}{{{}}}", name, endpoint),
            None => name.to_string(),
        };
        *self.totals.entry(key).or_insert(0.0) += value;

        if name.contains("error") || name.contains("failure") {
            self.logger
                .critical(format!("Critical metric: {} = {} {:?}", name, value, tags));
        }

        let mut samples = self.lock_samples();
        samples.push_back(MetricData {
            name: name.to_string(),
            value,
            recorded_at: Utc::now(),
            tags,
            at: Instant::now(),
        });
        while samples.len() > MAX_METRIC_SAMPLES {
            samples.pop_front();
        }
    }

    /// Retained samples, oldest first, optionally filtered by exact name.
    pub fn metrics(&self, name: Option<&str>) -> Vec<MetricData> {
        self.lock_samples()
            .iter()
            .filter(|m| name.map_or(true, |n| m.name == n))
            .cloned()
            .collect()
    }

    /// Lifetime sum for a metric, optionally scoped to one endpoint tag.
    pub fn total(&self, name: &str, endpoint: Option<&str>) -> f64 {
        let key = match endpoint {
            Some(endpoint) => format!("{}{{{}}}", name, endpoint),
            None => name.to_string(),
        };
        self.totals.get(&key).map(|v| *v).unwrap_or(0.0)
    }

    pub fn health_status(&self) -> HealthStatus {
        let now = Instant::now();
        let samples = self.lock_samples();
        let recent = samples
            .iter()
            .filter(|m| now.saturating_duration_since(m.at) < HEALTH_WINDOW);

        let (mut total_requests, mut error_count) = (0usize, 0usize);
        for metric in recent {
            if metric.name.ends_with("api.request") {
                total_requests += 1;
            }
            if metric.name.contains("error") {
                error_count += 1;
            }
        }

        let error_rate = if total_requests > 0 {
            error_count as f64 / total_requests as f64
        } else {
            0.0
        };
        let status = if error_count > 0 && total_requests > 0 {
            if error_rate > UNHEALTHY_ERROR_RATE {
                HealthState::Unhealthy
            } else if error_rate > DEGRADED_ERROR_RATE {
                HealthState::Degraded
            } else {
                HealthState::Healthy
            }
        } else {
            HealthState::Healthy
        };

        HealthStatus {
            status,
            uptime: now.saturating_duration_since(self.started),
            total_requests,
            error_count,
            error_rate,
        }
    }

    fn lock_samples(&self) -> MutexGuard<'_, VecDeque<MetricData>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
