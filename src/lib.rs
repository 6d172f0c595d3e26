use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use config::Config;
use limiter::BucketRegistry;
use middleware::{AdmissionFilter, log_errors, rate_limit};
use tower::ServiceBuilder;

pub mod config;
pub mod error;
pub mod limiter;
pub mod middleware;
pub mod result;
pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub limiter: Arc<AdmissionFilter>,
}

impl AppState {
    /// Builds the process-wide bucket registry and the filter in front of it.
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(BucketRegistry::new(
            config.rate_limit_policy(),
            config.rate_limit_idle_eviction(),
        ));
        let limiter = Arc::new(AdmissionFilter::new(
            config.rate_limit_path_prefixes.clone(),
            registry,
        ));

        Self { config, limiter }
    }

    pub fn registry(&self) -> &Arc<BucketRegistry> {
        self.limiter.registry()
    }
}

pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/register", post(routes::auth::register))
        .route("/health", get(routes::health::health));

    let base = state.config.api_base_uri.trim_end_matches('/');
    let router = if base.is_empty() {
        Router::new().merge(api)
    } else {
        Router::new().nest(base, api)
    };

    // Outermost first: logging sees the limiter's rejections, and the limiter
    // runs before anything the application layers underneath (auth included).
    let router = router.layer(
        ServiceBuilder::new()
            .layer(axum::middleware::from_fn(log_errors))
            .layer(axum::middleware::from_fn_with_state(
                Arc::clone(&state.limiter),
                rate_limit,
            )),
    );

    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    router.with_state(state)
}
