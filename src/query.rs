//! Read-only projections over a store snapshot

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::store::{AggregateRecord, Counters};

/// Counters ranked by count, highest first. Serializes as a JSON object
/// whose key order is the ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranked(pub Vec<(String, u64)>);

impl Ranked {
    /// Stable sort, so equal counts keep their first-occurrence order
    pub fn from_counters(counters: &Counters) -> Self {
        let mut entries: Vec<_> = counters
            .iter()
            .map(|(key, count)| (key.clone(), *count))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        Self(entries)
    }
}

impl Serialize for Ranked {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(key, count)| (key, count)))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicStats {
    pub total_visits: u64,
    pub unique_visitors: u64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageStats {
    pub pages: Ranked,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeStats {
    pub hourly_stats: Counters,
    pub daily_stats: Counters,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TechStats {
    pub browser_stats: Counters,
    pub os_stats: Counters,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoStats {
    pub country_stats: Ranked,
    pub last_updated: DateTime<Utc>,
}

pub fn basic(record: &AggregateRecord) -> BasicStats {
    BasicStats {
        total_visits: record.total_visits,
        unique_visitors: record.unique_visitors,
        last_updated: record.last_updated,
    }
}

pub fn pages(record: &AggregateRecord) -> PageStats {
    PageStats {
        pages: Ranked::from_counters(&record.paths),
        last_updated: record.last_updated,
    }
}

pub fn time(record: &AggregateRecord) -> TimeStats {
    TimeStats {
        hourly_stats: record.hourly_stats.clone(),
        daily_stats: record.daily_stats.clone(),
        last_updated: record.last_updated,
    }
}

pub fn tech(record: &AggregateRecord) -> TechStats {
    TechStats {
        browser_stats: record.browser_stats.clone(),
        os_stats: record.os_stats.clone(),
        last_updated: record.last_updated,
    }
}

pub fn geo(record: &AggregateRecord) -> GeoStats {
    GeoStats {
        country_stats: Ranked::from_counters(&record.country_stats),
        last_updated: record.last_updated,
    }
}
