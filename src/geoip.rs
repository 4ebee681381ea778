//! GeoIP lookup module using MaxMind GeoLite2 database

use anyhow::Result;
use async_trait::async_trait;
use maxminddb::{geoip2, MaxMindDBError, Reader};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::classify::UNKNOWN;

/// Address-to-country lookup used by visit tracking
#[async_trait]
pub trait GeoResolver: Send + Sync {
    /// Returns the ISO country code for `addr`, or `None` when the address
    /// has no known location.
    async fn lookup(&self, addr: &str) -> Result<Option<String>>;
}

/// Thread-safe resolver handle
pub type SharedGeoResolver = Arc<dyn GeoResolver>;

/// GeoIP reader wrapper
pub struct GeoIp {
    reader: Option<Reader<Vec<u8>>>,
}

impl GeoIp {
    /// Create a new GeoIP instance, loading the database if available
    pub fn new(database_path: &str) -> Self {
        let path = Path::new(database_path);

        if !path.exists() {
            warn!("GeoIP database not found at: {}", database_path);
            warn!("Download GeoLite2-City.mmdb from MaxMind and place it at: {}", database_path);
            return Self { reader: None };
        }

        match Reader::open_readfile(path) {
            Ok(reader) => {
                info!("GeoIP database loaded: {}", database_path);
                Self { reader: Some(reader) }
            }
            Err(e) => {
                warn!("Failed to load GeoIP database: {}", e);
                Self { reader: None }
            }
        }
    }

    /// Check if the GeoIP database is loaded
    pub fn is_available(&self) -> bool {
        self.reader.is_some()
    }
}

#[async_trait]
impl GeoResolver for GeoIp {
    async fn lookup(&self, addr: &str) -> Result<Option<String>> {
        let Some(reader) = self.reader.as_ref() else {
            return Ok(None);
        };

        let Ok(ip_addr) = addr.parse::<IpAddr>() else {
            return Ok(None);
        };

        if is_private_ip(&ip_addr) {
            return Ok(None);
        }

        match reader.lookup::<geoip2::Country>(ip_addr) {
            Ok(found) => Ok(found
                .country
                .and_then(|c| c.iso_code)
                .map(str::to_string)),
            Err(MaxMindDBError::AddressNotFoundError(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Check if an IP address is private/local
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private()
            || ipv4.is_loopback()
            || ipv4.is_link_local()
            || ipv4.is_broadcast()
            || ipv4.is_documentation()
            || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => {
            ipv6.is_loopback()
            || ipv6.is_unspecified()
        }
    }
}

/// Resolve the country for `addr`, collapsing every failure to "Unknown".
///
/// The lookup runs on its own task so that a panicking resolver is
/// contained, and it is abandoned once `timeout` elapses.
pub async fn resolve_country(resolver: &SharedGeoResolver, addr: &str, timeout: Duration) -> String {
    let task_resolver = resolver.clone();
    let task_addr = addr.to_string();
    let mut handle = tokio::spawn(async move { task_resolver.lookup(&task_addr).await });

    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(Ok(Some(country)))) if !country.is_empty() => country,
        Ok(Ok(Ok(_))) => {
            debug!("No country found for {}", addr);
            UNKNOWN.to_string()
        }
        Ok(Ok(Err(e))) => {
            warn!("GeoIP lookup failed for {}: {}", addr, e);
            UNKNOWN.to_string()
        }
        Ok(Err(e)) => {
            warn!("GeoIP lookup task for {} aborted: {}", addr, e);
            UNKNOWN.to_string()
        }
        Err(_) => {
            handle.abort();
            warn!("GeoIP lookup for {} timed out after {:?}", addr, timeout);
            UNKNOWN.to_string()
        }
    }
}
