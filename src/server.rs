use crate::config::Config;
use crate::error::ServiceError;
use crate::handlers::{
    confirm, health_check, login, metrics, not_found, register, reset_metrics, reset_rate_limit,
    AppState,
};
use crate::middleware::{
    content_type_guard, logging_middleware, payload_too_large_envelope, rate_limit_middleware,
    security_headers,
};
use crate::store::{AccountStore, MemoryStore, RedisStore};
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Build the router. The service builder layers run top to bottom and wrap
/// everything added before them, so the rate limiter sees a request before
/// any guard, body limit or handler does.
pub fn create_app(state: AppState) -> Router {
    let max_body_bytes = state.config.max_body_bytes;

    let admin_routes = state.config.admin_routes;
    let metrics_route = if admin_routes {
        get(metrics).delete(reset_metrics)
    } else {
        get(metrics)
    };

    let mut router = Router::new()
        // Account endpoints
        .route("/api/users/register", post(register))
        .route("/api/users/confirm", post(confirm))
        .route("/api/users/login", post(login))
        // Health and metrics endpoints
        .route("/health", get(health_check))
        .route("/metrics", metrics_route);

    // Operator endpoints
    if admin_routes {
        router = router.route("/rate-limit/:client_id", delete(reset_rate_limit));
    }

    router
        .fallback(not_found)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(middleware::map_response(payload_too_large_envelope))
        .layer(DefaultBodyLimit::disable())
        .layer(CorsLayer::permissive())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn_with_state(state.clone(), logging_middleware))
                .layer(middleware::from_fn_with_state(state.clone(), security_headers))
                .layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
                .layer(middleware::from_fn_with_state(state.clone(), content_type_guard)),
        )
        .with_state(state)
}

pub struct Server {
    app: Router,
    bind_addr: SocketAddr,
}

impl Server {
    pub async fn new(config: Config) -> Result<Self, ServiceError> {
        config.validate()?;

        let store: Arc<dyn AccountStore> = match &config.redis_url {
            Some(url) => {
                tracing::info!("Using Redis account store");
                Arc::new(RedisStore::connect(url).await?)
            }
            None => {
                tracing::warn!("REDIS_URL not set, accounts are kept in memory");
                Arc::new(MemoryStore::new())
            }
        };

        let bind_addr = config.bind_addr;
        let app = create_app(AppState::new(config, store));

        Ok(Self { app, bind_addr })
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;

        tracing::info!("shopgate listening on {}", self.bind_addr);
        tracing::info!("Health check available at /health");

        // Run server with graceful shutdown
        axum::serve(
            listener,
            self.app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
