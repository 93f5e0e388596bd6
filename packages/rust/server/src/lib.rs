//! HTTP API for StudyCards.
//!
//! Routes are nested under `/api/`. Layer order, outermost first:
//!
//! 1. Access log, CORS, security headers (whole app)
//! 2. `Extension(AppState)` so middleware can reach shared state
//! 3. Bearer token presence (everything except health and auth)
//! 4. Per-token rate limits (assistant routes only)

mod error;
pub mod middleware;
pub mod routes;
mod state;

use axum::http::header;
use axum::http::{HeaderValue, Method};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Extension, Router};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{info, warn};

use studycards_shared::{AppConfig, CorsConfig, Result, StudyCardsError};

pub use error::ApiError;
pub use state::{AppState, Limit, RateLimiter};

/// Build the full application router.
///
/// NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
pub fn build_router(state: AppState, cors: &CorsConfig) -> Result<Router> {
    let ask = Router::new()
        .route("/pia", post(routes::assistant::ask))
        .route_layer(axum::middleware::from_fn(middleware::limit_ask));

    let suggestions = Router::new()
        .route("/pia/suggestions", post(routes::assistant::suggestions))
        .route_layer(axum::middleware::from_fn(middleware::limit_suggestions));

    let protected = Router::new()
        .route("/cards", get(routes::cards::list).post(routes::cards::create))
        .route(
            "/cards/:id",
            get(routes::cards::get)
                .put(routes::cards::update)
                .delete(routes::cards::delete),
        )
        .route("/cards/:id/review", post(routes::cards::review))
        .route("/decks", get(routes::decks::list).post(routes::decks::create))
        .route(
            "/decks/:id",
            get(routes::decks::get)
                .put(routes::decks::update)
                .delete(routes::decks::delete),
        )
        .route("/decks/:id/stats", get(routes::decks::stats))
        .route("/decks/:id/cards", post(routes::decks::add_card))
        .route(
            "/decks/:id/cards/:card_id",
            delete(routes::decks::remove_card),
        )
        .route(
            "/users/:id",
            get(routes::users::get).put(routes::users::update),
        )
        .route("/users/:id/progress", get(routes::users::progress))
        .route(
            "/pia/related-cards/:id",
            get(routes::assistant::related_cards),
        )
        .merge(ask)
        .merge(suggestions)
        .route_layer(axum::middleware::from_fn(middleware::require_token));

    let public = Router::new()
        .route("/health", get(routes::health::check))
        .route("/auth/register", post(routes::users::register))
        .route("/auth/login", post(routes::users::login));

    let api = Router::new()
        .merge(protected)
        .merge(public)
        .with_state(state.clone())
        .layer(Extension(state));

    Ok(Router::new()
        .nest("/api", api)
        .fallback(not_found)
        .layer(cors_layer(cors)?)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(axum::middleware::from_fn(middleware::access_log)))
}

fn cors_layer(cors: &CorsConfig) -> Result<CorsLayer> {
    let origin = HeaderValue::from_str(&cors.origin).map_err(|e| {
        StudyCardsError::config(format!("invalid cors.origin '{}': {e}", cors.origin))
    })?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]))
}

async fn not_found() -> impl IntoResponse {
    ApiError::NotFound("Not found".into())
}

/// Bind the configured address and serve until Ctrl+C or SIGTERM.
pub async fn serve(config: &AppConfig, state: AppState) -> Result<()> {
    let app = build_router(state, &config.cors)?;

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|e| StudyCardsError::Network(format!("failed to bind {address}: {e}")))?;
    info!(%address, cors_origin = %config.cors.origin, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| StudyCardsError::Network(format!("server error: {e}")))?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl+C, shutting down"),
            Err(e) => {
                warn!(error = %e, "failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("received terminate signal, shutting down");
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests;
