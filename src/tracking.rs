//! Visit tracking
//!
//! Turns a request into a [`Visit`] and submits it to the stats store.
//! Tracking never fails the caller: faults are logged and dropped.

use chrono::Utc;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, warn};

use crate::classify::classify;
use crate::geoip::{resolve_country, SharedGeoResolver};
use crate::store::{StatsStore, StoreError, Visit};

/// File suffixes that mark a static asset request
pub const STATIC_ASSET_SUFFIXES: &[&str] = &[
    "js", "css", "png", "jpg", "jpeg", "gif", "ico", "svg", "woff", "woff2", "ttf", "eot",
];

/// Session key used when the client address is not available
pub const PLACEHOLDER_SESSION_KEY: &str = "127.0.0.1";

/// Whether `path` ends in a static asset suffix
pub fn is_static_asset(path: &str) -> bool {
    path.rsplit_once('.')
        .map(|(_, ext)| STATIC_ASSET_SUFFIXES.contains(&ext))
        .unwrap_or(false)
}

/// The parts of a request that tracking needs
#[derive(Debug, Clone)]
pub struct TrackedRequest {
    pub path: String,
    pub session_key: String,
    pub user_agent: Option<String>,
}

impl TrackedRequest {
    fn into_visit(self, country: String) -> Visit {
        let client = classify(self.user_agent.as_deref());
        Visit {
            path: self.path,
            session_key: self.session_key,
            browser: client.browser.to_string(),
            os: client.os.to_string(),
            country,
            at: Utc::now(),
        }
    }
}

/// Sample requests used to seed the store for verification:
/// (path, country, user agent)
pub const SAMPLE_VISITS: &[(&str, &str, &str)] = &[
    ("/", "IT", "Chrome/91.0.4472.124"),
    ("/about", "US", "Firefox/89.0"),
    ("/contact", "FR", "Safari/14.1.1"),
    ("/products", "DE", "Chrome/91.0.4472.124"),
    ("/blog", "ES", "Edge/91.0.864.59"),
    ("/", "IT", "Chrome/91.0 Mobile"),
    ("/about", "GB", "Safari Mobile/14.1.1"),
    ("/contact", "JP", "Chrome/91.0.4472.124"),
    ("/products", "CN", "Firefox/89.0"),
    ("/blog", "BR", "Chrome/91.0 Mobile"),
];

pub struct Tracker {
    store: StatsStore,
    geo: SharedGeoResolver,
    geo_timeout: Duration,
}

impl Tracker {
    pub fn new(store: StatsStore, geo: SharedGeoResolver, geo_timeout: Duration) -> Self {
        Self { store, geo, geo_timeout }
    }

    /// Record `request` with a country already known
    pub async fn record(&self, request: TrackedRequest, country: String) -> Result<(), StoreError> {
        let visit = request.into_visit(country);
        self.store.mutate(move |record| record.record_visit(&visit)).await
    }

    /// Resolve the country, then record. Errors are logged, never returned.
    pub async fn track(&self, request: TrackedRequest) {
        if is_static_asset(&request.path) {
            return;
        }

        let country = resolve_country(&self.geo, &request.session_key, self.geo_timeout).await;
        let path = request.path.clone();
        let session_key = request.session_key.clone();

        match self.record(request, country).await {
            Ok(()) => debug!("Tracked {} from {}", path, session_key),
            Err(e) => warn!("Failed to track {} from {}: {}", path, session_key, e),
        }
    }

    /// Push the fixed sample batch through the recording path
    pub async fn generate_samples(&self) -> Result<usize, StoreError> {
        for (path, country, user_agent) in SAMPLE_VISITS {
            let last_octet: u8 = rand::thread_rng().gen_range(0..255);
            let request = TrackedRequest {
                path: path.to_string(),
                session_key: format!("192.168.1.{}", last_octet),
                user_agent: Some(user_agent.to_string()),
            };
            self.record(request, country.to_string()).await?;
        }
        Ok(SAMPLE_VISITS.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geoip::testing::{Failing, FixedCountry, Stalled};
    use crate::geoip::GeoResolver;
    use std::sync::Arc;

    async fn tracker(geo: impl GeoResolver + 'static) -> (Tracker, StatsStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = StatsStore::open(dir.path().join("visits.json")).await;
        let tracker = Tracker::new(store.clone(), Arc::new(geo), Duration::from_millis(100));
        (tracker, store, dir)
    }

    fn request(path: &str, addr: &str, user_agent: Option<&str>) -> TrackedRequest {
        TrackedRequest {
            path: path.to_string(),
            session_key: addr.to_string(),
            user_agent: user_agent.map(str::to_string),
        }
    }

    #[test]
    fn static_asset_suffixes() {
        for path in ["/app.js", "/style.css", "/img/a.png", "/fonts/x.woff2", "/favicon.ico"] {
            assert!(is_static_asset(path), "{path}");
        }
        for path in ["/", "/about", "/api/visits", "/report.pdf", "/APP.JS", "/js"] {
            assert!(!is_static_asset(path), "{path}");
        }
    }

    #[tokio::test]
    async fn chrome_visit_from_italy() {
        let (tracker, store, _dir) = tracker(FixedCountry(Some("IT"))).await;
        tracker.track(request("/", "1.2.3.4", Some("Mozilla/5.0 Chrome/120.0"))).await;

        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.total_visits, 1);
        assert_eq!(snapshot.unique_visitors, 1);
        assert_eq!(snapshot.paths["/"], 1);
        assert_eq!(snapshot.browser_stats["Chrome"], 1);
        assert_eq!(snapshot.os_stats["Unknown"], 1);
        assert_eq!(snapshot.country_stats["IT"], 1);
        let session = &snapshot.sessions["1.2.3.4"];
        assert_eq!(session.count, 1);
        assert!(session.paths.contains("/"));

        tracker.track(request("/", "1.2.3.4", Some("Mozilla/5.0 Chrome/120.0"))).await;
        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.total_visits, 2);
        assert_eq!(snapshot.unique_visitors, 1);
        assert_eq!(snapshot.sessions["1.2.3.4"].count, 2);
        assert_eq!(snapshot.sessions["1.2.3.4"].paths.len(), 1);
    }

    #[tokio::test]
    async fn missing_user_agent_is_unknown() {
        let (tracker, store, _dir) = tracker(FixedCountry(Some("IT"))).await;
        tracker.track(request("/", "1.2.3.4", None)).await;
        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.browser_stats["Unknown"], 1);
        assert_eq!(snapshot.os_stats["Unknown"], 1);
    }

    #[tokio::test]
    async fn resolver_failure_still_records() {
        let (tracker, store, _dir) = tracker(Failing).await;
        tracker.track(request("/", "1.2.3.4", None)).await;
        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.total_visits, 1);
        assert_eq!(snapshot.country_stats["Unknown"], 1);
        assert_eq!(snapshot.sessions["1.2.3.4"].country, "Unknown");
    }

    #[tokio::test]
    async fn stalled_resolver_still_records() {
        let (tracker, store, _dir) = tracker(Stalled).await;
        tracker.track(request("/", "1.2.3.4", None)).await;
        assert_eq!(store.snapshot().unwrap().country_stats["Unknown"], 1);
    }

    #[tokio::test]
    async fn static_assets_are_not_tracked() {
        let (tracker, store, _dir) = tracker(FixedCountry(Some("IT"))).await;
        tracker.track(request("/bundle.js", "1.2.3.4", None)).await;
        tracker.track(request("/logo.svg", "1.2.3.4", None)).await;

        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.total_visits, 0);
        assert!(snapshot.paths.is_empty());
        assert!(snapshot.sessions.is_empty());
        assert!(snapshot.country_stats.is_empty());
    }

    #[tokio::test]
    async fn samples_bypass_the_resolver() {
        let (tracker, store, _dir) = tracker(Failing).await;
        assert_eq!(tracker.generate_samples().await.unwrap(), SAMPLE_VISITS.len());

        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.total_visits, 10);
        assert_eq!(snapshot.country_stats["IT"], 2);
        assert!(!snapshot.country_stats.contains_key("Unknown"));
        assert_eq!(snapshot.browser_stats["Chrome"], 5);
        assert_eq!(snapshot.paths["/about"], 2);
        assert!(snapshot
            .sessions
            .keys()
            .all(|key| key.starts_with("192.168.1.")));
    }
}
