//! Admission filter orchestrator
//!
//! Composes the pipeline: path whitelist → IP whitelist → decision cache →
//! geo classification → admit or deny. [`StateFilter`] owns all
//! configuration-derived state for the handler's lifetime;
//! [`admission_middleware`] exposes it to an axum router.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, info};

use crate::cache::DecisionCache;
use crate::client_ip;
use crate::config::Config;
use crate::deny::{self, DenyPage};
use crate::geo::{Classifier, GeoError, GeoResolver, MaxMindResolver, Verdict};
use crate::whitelist::{IpWhitelist, PathWhitelist};

/// Construction-time failures; fatal, the filter cannot be installed
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("db_path cannot be empty")]
    EmptyDatabasePath,

    #[error(transparent)]
    Database(#[from] GeoError),
}

/// Outcome of the admission pipeline for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Invoke the next handler
    Admit,
    /// Short-circuit with a 403 carrying the blocking jurisdiction code
    Deny(String),
}

/// Geographic request-admission filter
pub struct StateFilter {
    name: String,
    path_whitelist: PathWhitelist,
    ip_whitelist: IpWhitelist,
    classifier: Classifier,
    cache: DecisionCache,
    deny_page: DenyPage,
}

impl StateFilter {
    /// Build a filter from configuration, opening the GeoIP database.
    ///
    /// Fails when `db_path` is empty or the database cannot be opened; both
    /// are fatal at install time.
    pub fn new(config: &Config, name: impl Into<String>) -> Result<Self, SetupError> {
        if config.db_path.is_empty() {
            return Err(SetupError::EmptyDatabasePath);
        }

        let resolver = Arc::new(MaxMindResolver::open(config.db_path())?);
        Ok(Self::with_resolver(config, name, resolver))
    }

    /// Build a filter around an already-constructed geo resolver
    pub fn with_resolver(
        config: &Config,
        name: impl Into<String>,
        resolver: Arc<dyn GeoResolver>,
    ) -> Self {
        let deny_page = DenyPage::load(config.template_path.as_deref().map(Path::new));

        Self {
            name: name.into(),
            path_whitelist: PathWhitelist::new(config.whitelisted_paths.clone()),
            ip_whitelist: IpWhitelist::new(config.whitelisted_ips.iter().cloned()),
            classifier: Classifier::new(resolver, &config.blocked_states),
            cache: DecisionCache::new(config.cache_capacity),
            deny_page,
        }
    }

    /// Run the admission pipeline for a resolved client IP and request path
    pub fn decide(&self, ip: &str, path: &str) -> Decision {
        // Path bypass first: no geo lookup, no cache activity. Keeps ACME
        // challenges and health checks reachable during an active block.
        if self.path_whitelist.matches(path) {
            debug!(filter = %self.name, path = %path, "whitelisted path, admitted");
            return Decision::Admit;
        }

        if self.ip_whitelist.contains(ip) {
            info!(filter = %self.name, ip = %ip, "whitelisted IP, admitted");
            return Decision::Admit;
        }

        if let Some(verdict) = self.cache.get(ip) {
            debug!(filter = %self.name, ip = %ip, "verdict served from cache");
            return self.apply(ip, verdict);
        }

        match self.classifier.classify(ip) {
            Some(verdict) => {
                self.cache.put(ip, verdict.clone());
                self.apply(ip, verdict)
            }
            // No verdict (unparseable IP or lookup failure): fail open and
            // cache nothing, so a transient database error never becomes a
            // sticky process-lifetime answer.
            None => Decision::Admit,
        }
    }

    fn apply(&self, ip: &str, verdict: Verdict) -> Decision {
        match verdict {
            Verdict::Allowed => {
                debug!(filter = %self.name, ip = %ip, "allowed");
                Decision::Admit
            }
            Verdict::Denied(reason) => {
                info!(filter = %self.name, ip = %ip, reason = %reason, "blocked");
                Decision::Deny(reason)
            }
        }
    }

    /// Render the 403 response for a blocking jurisdiction code
    pub fn deny_response(&self, reason_code: &str) -> Response {
        (
            StatusCode::FORBIDDEN,
            [(header::CONTENT_TYPE, deny::CONTENT_TYPE)],
            self.deny_page.render(reason_code),
        )
            .into_response()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cache(&self) -> &DecisionCache {
        &self.cache
    }
}

/// axum middleware wrapping a shared [`StateFilter`].
///
/// Install with `axum::middleware::from_fn_with_state`; the router must be
/// served with `into_make_service_with_connect_info::<SocketAddr>()` so the
/// peer address is available.
pub async fn admission_middleware(
    State(filter): State<Arc<StateFilter>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    let ip = client_ip::resolve(req.headers(), &peer.to_string());

    match filter.decide(&ip, req.uri().path()) {
        Decision::Admit => next.run(req).await,
        Decision::Deny(reason) => filter.deny_response(&reason),
    }
}
