use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    error::AppError,
    limiter::{BucketRegistry, Consumption},
};

const FORWARDED_FOR: &str = "x-forwarded-for";
const UNKNOWN_CLIENT: &str = "unknown";

/// What the limiter needs to know about an inbound request.
#[derive(Debug, Clone, Default)]
pub struct RequestDescriptor {
    pub path: String,
    /// Raw `X-Forwarded-For` value, if the header was sent.
    pub forwarded_for: Option<String>,
    /// Transport-level peer address.
    pub peer_addr: Option<String>,
}

impl RequestDescriptor {
    pub fn from_request(req: &Request<Body>) -> Self {
        let forwarded_for = req
            .headers()
            .get(FORWARDED_FOR)
            .and_then(|h| h.to_str().ok())
            .map(str::to_owned);
        let peer_addr = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string());

        Self {
            path: req.uri().path().to_owned(),
            forwarded_for,
            peer_addr,
        }
    }

    /// First forwarded-for entry if non-empty, else the peer address.
    pub fn client_ip(&self) -> &str {
        self.forwarded_for
            .as_deref()
            .and_then(|s| s.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .or(self.peer_addr.as_deref())
            .unwrap_or(UNKNOWN_CLIENT)
    }

    /// Each (client, endpoint) pair gets its own quota.
    pub fn rate_limit_key(&self) -> String {
        format!("{}:{}", self.client_ip(), self.path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allow,
    Reject { retry_after: Duration },
}

/// Decides whether a request may proceed to the rest of the pipeline.
#[derive(Debug)]
pub struct AdmissionFilter {
    path_prefixes: Vec<String>,
    registry: Arc<BucketRegistry>,
}

impl AdmissionFilter {
    pub fn new(path_prefixes: Vec<String>, registry: Arc<BucketRegistry>) -> Self {
        Self {
            path_prefixes,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<BucketRegistry> {
        &self.registry
    }

    pub fn is_limited(&self, path: &str) -> bool {
        self.path_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    pub fn admit(&self, request: &RequestDescriptor) -> Admission {
        if !self.is_limited(&request.path) {
            return Admission::Allow;
        }

        let key = request.rate_limit_key();
        match self.registry.get_or_create(&key).try_consume(1) {
            Consumption::Admitted { remaining } => {
                tracing::debug!("Admitted {} ({} tokens left)", key, remaining);
                Admission::Allow
            }
            Consumption::Rejected { retry_after } => {
                tracing::warn!(
                    "Rate limit exceeded for {}, retry in {:?}",
                    key,
                    retry_after
                );
                Admission::Reject { retry_after }
            }
        }
    }
}

/// Axum adapter for [`AdmissionFilter`]; must be layered outside any
/// authentication middleware.
pub async fn rate_limit(
    State(filter): State<Arc<AdmissionFilter>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let descriptor = RequestDescriptor::from_request(&req);

    match filter.admit(&descriptor) {
        Admission::Allow => next.run(req).await,
        Admission::Reject { retry_after } => AppError::RateLimited { retry_after }.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::RateLimitPolicy;

    fn descriptor(path: &str, forwarded_for: Option<&str>, peer: Option<&str>) -> RequestDescriptor {
        RequestDescriptor {
            path: path.to_owned(),
            forwarded_for: forwarded_for.map(str::to_owned),
            peer_addr: peer.map(str::to_owned),
        }
    }

    fn filter(capacity: u64) -> AdmissionFilter {
        let policy = RateLimitPolicy::new(capacity, capacity, Duration::from_secs(60));
        let registry = Arc::new(BucketRegistry::new(policy, Duration::from_secs(600)));
        AdmissionFilter::new(vec!["/api/auth/".to_owned()], registry)
    }

    #[test]
    fn client_ip_prefers_first_forwarded_entry() {
        let req = descriptor("/", Some(" 1.2.3.4 , 10.0.0.1"), Some("10.0.0.2"));
        assert_eq!(req.client_ip(), "1.2.3.4");
    }

    #[test]
    fn client_ip_falls_back_to_peer() {
        assert_eq!(descriptor("/", None, Some("10.0.0.2")).client_ip(), "10.0.0.2");
        assert_eq!(descriptor("/", Some(""), Some("10.0.0.2")).client_ip(), "10.0.0.2");
        assert_eq!(descriptor("/", Some(" ,1.1.1.1"), Some("10.0.0.2")).client_ip(), "10.0.0.2");
        assert_eq!(descriptor("/", None, None).client_ip(), "unknown");
    }

    #[test]
    fn key_combines_client_and_path() {
        let req = descriptor("/api/auth/login", Some("1.2.3.4"), None);
        assert_eq!(req.rate_limit_key(), "1.2.3.4:/api/auth/login");
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_after_quota_and_isolates_endpoints() {
        let filter = filter(2);
        let login = descriptor("/api/auth/login", Some("1.2.3.4"), None);
        let register = descriptor("/api/auth/register", Some("1.2.3.4"), None);

        assert_eq!(filter.admit(&login), Admission::Allow);
        assert_eq!(filter.admit(&login), Admission::Allow);
        assert!(matches!(filter.admit(&login), Admission::Reject { .. }));

        assert_eq!(filter.admit(&register), Admission::Allow);
        assert_eq!(filter.registry().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unmatched_paths_bypass_the_limiter() {
        let filter = filter(1);
        let login = descriptor("/api/auth/login", Some("1.2.3.4"), None);
        filter.admit(&login);
        assert!(matches!(filter.admit(&login), Admission::Reject { .. }));

        let health = descriptor("/api/health", Some("1.2.3.4"), None);
        for _ in 0..20 {
            assert_eq!(filter.admit(&health), Admission::Allow);
        }
        // Prefix match is literal; the trailing slash matters.
        assert_eq!(filter.admit(&descriptor("/api/auth", Some("1.2.3.4"), None)), Admission::Allow);
        assert_eq!(filter.registry().len(), 1);
    }
}
