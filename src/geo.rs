//! Geographic classification
//!
//! Wraps a MaxMind GeoIP2 city database behind the [`GeoResolver`] trait and
//! maps raw geo records to admission verdicts using the country/state policy:
//! - non-US traffic is denied with the country code, regardless of the
//!   blocked-state list
//! - US traffic is denied when its first subdivision is on the blocked list
//! - US traffic with no subdivision data is denied with the `"Unknown"`
//!   sentinel: ambiguous US geolocation is treated as suspicious, the one
//!   fail-closed case in an otherwise fail-open pipeline

use std::collections::HashSet;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use maxminddb::{geoip2, Reader};
use thiserror::Error;
use tracing::{debug, warn};

/// Reason code emitted when a US-classified IP carries no subdivision data
pub const UNKNOWN_REGION: &str = "Unknown";

/// Errors that can occur while opening the GeoIP database
#[derive(Error, Debug)]
pub enum GeoError {
    #[error("Failed to open GeoIP database: {0}")]
    DatabaseOpen(#[from] maxminddb::MaxMindDBError),

    #[error("Database file not found: {0}")]
    NotFound(String),
}

/// A per-request lookup failure; recovered by admitting the request
#[derive(Error, Debug)]
#[error("GeoIP lookup failed: {0}")]
pub struct LookupError(pub String);

/// Country/subdivision classification of an IP, as returned by the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoRecord {
    /// ISO country code (e.g., "US", "GB"); empty when the database has none
    pub country_code: String,
    /// Subdivision ISO codes, most specific last; only the first is consulted
    pub subdivisions: Vec<String>,
}

/// Admission outcome for a classified IP
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    /// Denied with the jurisdiction code that caused the denial
    /// (country code, state code, or [`UNKNOWN_REGION`])
    Denied(String),
}

/// Source of geo records for an IP address
///
/// The production implementation is [`MaxMindResolver`]; tests substitute
/// counting fakes to assert how often the pipeline reaches the database.
pub trait GeoResolver: Send + Sync {
    fn lookup(&self, ip: IpAddr) -> Result<GeoRecord, LookupError>;
}

/// GeoIP2 city database reader
#[derive(Debug)]
pub struct MaxMindResolver {
    reader: Reader<Vec<u8>>,
}

impl MaxMindResolver {
    /// Open a MaxMind GeoIP2 database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GeoError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GeoError::NotFound(path.display().to_string()));
        }

        let reader = Reader::open_readfile(path)?;
        Ok(Self { reader })
    }
}

impl GeoResolver for MaxMindResolver {
    fn lookup(&self, ip: IpAddr) -> Result<GeoRecord, LookupError> {
        let city: geoip2::City = self
            .reader
            .lookup(ip)
            .map_err(|e| LookupError(e.to_string()))?;

        let country_code = city
            .country
            .and_then(|c| c.iso_code)
            .unwrap_or_default()
            .to_string();

        let subdivisions = city
            .subdivisions
            .map(|subs| {
                subs.iter()
                    .filter_map(|s| s.iso_code)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(GeoRecord {
            country_code,
            subdivisions,
        })
    }
}

/// Maps geo records to verdicts under the configured blocked-state list
pub struct Classifier {
    resolver: Arc<dyn GeoResolver>,
    blocked_states: HashSet<String>,
}

impl Classifier {
    /// Create a classifier; blocked-state codes are normalized to uppercase
    pub fn new(resolver: Arc<dyn GeoResolver>, blocked_states: &[String]) -> Self {
        let blocked_states = blocked_states.iter().map(|s| s.to_uppercase()).collect();
        Self {
            resolver,
            blocked_states,
        }
    }

    /// Classify an IP string, or return `None` when no verdict can be made.
    ///
    /// An unparseable IP or a failed lookup produces no verdict: the caller
    /// fails open. Geo data being unavailable must not be conflated with
    /// "blocked", and a broken upstream resolver must not take the whole
    /// service down.
    pub fn classify(&self, ip_str: &str) -> Option<Verdict> {
        let ip: IpAddr = match ip_str.parse() {
            Ok(ip) => ip,
            Err(_) => {
                debug!(ip = %ip_str, "unparseable client IP, admitting");
                return None;
            }
        };

        let record = match self.resolver.lookup(ip) {
            Ok(record) => record,
            Err(e) => {
                warn!(ip = %ip_str, error = %e, "GeoIP lookup failed, admitting");
                return None;
            }
        };

        Some(self.verdict_for(&record))
    }

    /// Apply the country gate, then the state gate
    fn verdict_for(&self, record: &GeoRecord) -> Verdict {
        if record.country_code != "US" {
            return Verdict::Denied(record.country_code.clone());
        }

        match record.subdivisions.first() {
            Some(state) => {
                if self.blocked_states.contains(state) {
                    Verdict::Denied(state.clone())
                } else {
                    Verdict::Allowed
                }
            }
            None => Verdict::Denied(UNKNOWN_REGION.to_string()),
        }
    }

    pub fn blocked_states(&self) -> &HashSet<String> {
        &self.blocked_states
    }
}
