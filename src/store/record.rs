//! The aggregate record and the visit mutation applied to it

use chrono::{DateTime, Local, Timelike, Utc};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Counter map keyed by label, kept in first-occurrence order
pub type Counters = IndexMap<String, u64>;

/// The single persisted analytics document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRecord {
    pub total_visits: u64,
    pub unique_visitors: u64,
    pub paths: Counters,
    pub sessions: IndexMap<String, SessionRecord>,
    pub hourly_stats: Counters,
    pub daily_stats: Counters,
    pub browser_stats: Counters,
    pub os_stats: Counters,
    pub country_stats: Counters,
    pub last_updated: DateTime<Utc>,
    /// Keys whose sessions were dropped by retention. A returning key is
    /// moved back to `sessions` without counting a new visitor.
    #[serde(default, skip_serializing_if = "IndexSet::is_empty")]
    pub retired_sessions: IndexSet<String>,
}

/// Rolling state for one client address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub count: u64,
    pub last_visit: DateTime<Utc>,
    pub paths: IndexSet<String>,
    /// Empty until a country has been recorded
    #[serde(default)]
    pub country: String,
}

/// Everything one tracked request contributes to the aggregate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visit {
    pub path: String,
    pub session_key: String,
    pub browser: String,
    pub os: String,
    pub country: String,
    pub at: DateTime<Utc>,
}

impl Visit {
    /// Hour-of-day bucket in server local time
    pub fn hour_bucket(&self) -> String {
        self.at.with_timezone(&Local).hour().to_string()
    }

    /// Calendar-day bucket in UTC
    pub fn day_bucket(&self) -> String {
        self.at.format("%Y-%m-%d").to_string()
    }
}

fn bump(counters: &mut Counters, key: &str) {
    match counters.get_mut(key) {
        Some(count) => *count += 1,
        None => {
            counters.insert(key.to_string(), 1);
        }
    }
}

impl AggregateRecord {
    /// A zero-valued record
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            total_visits: 0,
            unique_visitors: 0,
            paths: Counters::new(),
            sessions: IndexMap::new(),
            hourly_stats: Counters::new(),
            daily_stats: Counters::new(),
            browser_stats: Counters::new(),
            os_stats: Counters::new(),
            country_stats: Counters::new(),
            last_updated: now,
            retired_sessions: IndexSet::new(),
        }
    }

    /// Fold one tracked request into every counter and its session
    pub fn record_visit(&mut self, visit: &Visit) {
        self.total_visits += 1;
        bump(&mut self.paths, &visit.path);
        bump(&mut self.hourly_stats, &visit.hour_bucket());
        bump(&mut self.daily_stats, &visit.day_bucket());
        bump(&mut self.browser_stats, &visit.browser);
        bump(&mut self.os_stats, &visit.os);
        bump(&mut self.country_stats, &visit.country);

        match self.sessions.get_mut(&visit.session_key) {
            Some(session) => {
                session.count += 1;
                session.last_visit = visit.at;
                session.paths.insert(visit.path.clone());
                if session.country.is_empty() {
                    session.country = visit.country.clone();
                }
            }
            None => {
                if !self.retired_sessions.shift_remove(&visit.session_key) {
                    self.unique_visitors += 1;
                }
                self.sessions.insert(
                    visit.session_key.clone(),
                    SessionRecord {
                        count: 1,
                        last_visit: visit.at,
                        paths: IndexSet::from([visit.path.clone()]),
                        country: visit.country.clone(),
                    },
                );
            }
        }

        self.touch(visit.at);
    }

    /// Advance `last_updated`, never moving it backwards
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_updated {
            self.last_updated = now;
        }
    }

    /// Drop sessions last seen before `cutoff`, remembering only their keys.
    /// `unique_visitors` keeps counting distinct keys, so it always equals
    /// `sessions.len() + retired_sessions.len()`. Returns how many were removed.
    pub fn prune_sessions(&mut self, cutoff: DateTime<Utc>, now: DateTime<Utc>) -> usize {
        let stale: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.last_visit < cutoff)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            self.sessions.shift_remove(key);
            self.retired_sessions.insert(key.clone());
        }
        let removed = stale.len();
        if removed > 0 {
            self.touch(now);
        }
        removed
    }
}
