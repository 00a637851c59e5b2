//! stategate — geographic request-admission filter
//!
//! An HTTP middleware that admits or denies requests by the geographic
//! origin of the client IP (country, and US state), with override lists for
//! trusted IPs and trusted path prefixes, a bounded per-IP decision cache,
//! and a templated 403 page.
//!
//! Pipeline per request: path whitelist → IP whitelist → decision cache →
//! GeoIP classification → admit (next handler) or deny (403).

pub mod cache;
pub mod client_ip;
pub mod config;
pub mod deny;
pub mod filter;
pub mod geo;
pub mod whitelist;

pub use config::Config;
pub use filter::{admission_middleware, Decision, SetupError, StateFilter};
pub use geo::{GeoRecord, GeoResolver, LookupError, Verdict};
