// Copyright 2025 The Tubelytics Authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

pub mod api;
pub mod auth;
pub mod config;
pub mod recorder;

use anyhow::Result;
use axum::{middleware as axum_middleware, routing::get, Extension, Router};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tubelytics_query::AdminAnalytics;
use tubelytics_storage::{EventLogReader, EventLogWriter, MemoryEventLog};

use api::{admin_router, health_check, health_check_detailed, AppState};
use auth::{
    admin_guard, auth_middleware, AdminPolicy, ApiKeyAuth, Authenticator, BearerTokenAuth,
    MultiAuth, NoAuth,
};
use config::{HttpServerConfig, LoggingConfig, ServerConfig, StoreBackend, StoreConfig};

const DEFAULT_LOG_FILTER: &str = "tubelytics_server=info,tubelytics_query=info,tower_http=info";

/// Assemble the HTTP application.
///
/// `/health` is public. Everything else passes through authentication and the
/// request recorder; the admin routes additionally require an admin caller.
pub fn build_router(
    state: AppState,
    authenticator: Arc<dyn Authenticator>,
    admin_policy: AdminPolicy,
) -> Router {
    let admin_routes = admin_router().route_layer(axum_middleware::from_fn(admin_guard));

    let authed_routes = Router::new()
        .route("/api/v1/health", get(health_check_detailed))
        .nest("/api/v1/admin", admin_routes)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            recorder::record_request,
        ))
        .layer(axum_middleware::from_fn(auth_middleware))
        .layer(Extension(Arc::new(admin_policy)))
        .layer(Extension(authenticator));

    Router::new()
        .route("/health", get(health_check))
        .merge(authed_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        logging
            .filter
            .as_deref()
            .unwrap_or(DEFAULT_LOG_FILTER)
            .into()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(logging.json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!logging.json).then(tracing_subscriber::fmt::layer))
        .init();
}

/// Open the configured event log as a reader/writer pair
pub async fn open_event_log(
    store: &StoreConfig,
) -> Result<(Arc<dyn EventLogReader>, Arc<dyn EventLogWriter>)> {
    match store.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory request log; entries are lost on restart");
            let log = Arc::new(MemoryEventLog::new());
            let reader: Arc<dyn EventLogReader> = log.clone();
            let writer: Arc<dyn EventLogWriter> = log;
            Ok((reader, writer))
        }
        #[cfg(feature = "postgres")]
        StoreBackend::Postgres => {
            use tubelytics_storage::{PgEventLog, PgEventLogConfig};

            let pg_config = PgEventLogConfig {
                database_url: store.database_url.clone().unwrap_or_default(),
                max_connections: store.max_connections,
                acquire_timeout: std::time::Duration::from_secs(store.acquire_timeout_secs),
            };
            let log = PgEventLog::connect_lazy(&pg_config)?;
            if store.ensure_schema {
                log.ensure_schema().await?;
            }
            tracing::info!(
                max_connections = store.max_connections,
                "Using Postgres request log"
            );
            let log = Arc::new(log);
            let reader: Arc<dyn EventLogReader> = log.clone();
            let writer: Arc<dyn EventLogWriter> = log;
            Ok((reader, writer))
        }
        #[cfg(not(feature = "postgres"))]
        StoreBackend::Postgres => {
            anyhow::bail!("Postgres store selected but the server was built without the `postgres` feature")
        }
    }
}

/// Authenticator for the configured strategies, or [`NoAuth`] when
/// authentication is off and the bind address allows it
pub fn build_authenticator(config: &ServerConfig) -> Result<Arc<dyn Authenticator>> {
    let allow_noauth = std::env::var("TUBELYTICS_ALLOW_NOAUTH").ok();
    authenticator_for(config, allow_noauth.as_deref())
}

/// `allow_noauth` is the raw `TUBELYTICS_ALLOW_NOAUTH` value
fn authenticator_for(
    config: &ServerConfig,
    allow_noauth: Option<&str>,
) -> Result<Arc<dyn Authenticator>> {
    if config.auth.enabled {
        tracing::info!("Authentication enabled");

        let mut strategies: Vec<Arc<dyn Authenticator>> = vec![];

        if let Some(jwt_secret) = config.auth.jwt_secret.clone() {
            tracing::info!("JWT authentication enabled");
            strategies.push(Arc::new(BearerTokenAuth::new(jwt_secret)));
        }

        if !config.auth.api_keys.is_empty() {
            let keys = ApiKeyAuth::new(config.auth.api_keys.clone());
            tracing::info!("API key authentication enabled ({} keys)", keys.len());
            if !keys.is_empty() {
                strategies.push(Arc::new(keys));
            }
        }

        if strategies.is_empty() {
            anyhow::bail!("Authentication enabled but no strategies configured");
        }

        return Ok(Arc::new(MultiAuth::new(strategies)));
    }

    let is_explicitly_allowed = allow_noauth
        .map(|v| v.trim().to_ascii_lowercase())
        .is_some_and(|v| v == "true" || v == "1");

    let is_localhost = config.server.listen_addr.contains("localhost")
        || config.server.listen_addr.starts_with("127.0.0.1")
        || config.server.listen_addr.starts_with("[::1]");

    if !is_explicitly_allowed && !is_localhost {
        tracing::error!(
            "Authentication is DISABLED on non-localhost address {}. \
             Every caller would be treated as an admin.",
            config.server.listen_addr
        );
        anyhow::bail!(
            "Authentication is disabled on non-localhost address '{}'. \
            Bind to localhost, set TUBELYTICS_ALLOW_NOAUTH=true, or enable authentication.",
            config.server.listen_addr
        );
    }

    tracing::warn!(
        "Authentication disabled (NoAuth mode): all requests act as an anonymous admin. \
         Do not deploy this configuration."
    );
    Ok(Arc::new(NoAuth::new()))
}

fn cors_layer(server: &HttpServerConfig) -> CorsLayer {
    if !server.enable_cors {
        return CorsLayer::new();
    }

    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if server.cors_origins.is_empty() {
        tracing::warn!("CORS: Allowing all origins (development mode). Set cors_origins in production!");
        return cors.allow_origin(Any);
    }

    let origins: Vec<_> = server
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<axum::http::HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("CORS: ignoring invalid origin {:?}", origin);
                None
            }
        })
        .collect();
    tracing::info!("CORS: Allowing origins: {:?}", server.cors_origins);
    cors.allow_origin(AllowOrigin::list(origins))
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    init_tracing(&config.logging);

    tracing::info!("Starting Tubelytics Server");
    tracing::debug!("Configuration: {:#?}", config);

    config.validate()?;

    let (reader, writer) = open_event_log(&config.store).await?;
    let analytics = AdminAnalytics::new(reader, config.analytics);
    let state = AppState::new(analytics, writer);

    let authenticator = build_authenticator(&config)?;
    let admin_policy = AdminPolicy::new(&config.auth.admin_emails);
    tracing::info!(
        admin_emails = config.auth.admin_emails.len(),
        "Admin access: role 'admin' or allowlisted email"
    );

    let app = build_router(state, authenticator, admin_policy).layer(cors_layer(&config.server));

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("HTTP server received shutdown signal");
        })
        .await?;

    tracing::info!("HTTP server shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_auth_without_strategies_is_refused() {
        let mut config = ServerConfig::default();
        config.auth.enabled = true;
        config.auth.api_keys = vec!["malformed".to_string()];
        assert!(build_authenticator(&config).is_err());
    }

    #[test]
    fn test_noauth_allowed_on_localhost() {
        let config = ServerConfig::default();
        assert!(authenticator_for(&config, None).is_ok());

        let mut config = ServerConfig::default();
        config.server.listen_addr = "localhost:47300".to_string();
        assert!(authenticator_for(&config, None).is_ok());
    }

    #[test]
    fn test_noauth_refused_on_public_address() {
        let mut config = ServerConfig::default();
        config.server.listen_addr = "0.0.0.0:8080".to_string();

        assert!(authenticator_for(&config, None).is_err());
        assert!(authenticator_for(&config, Some("false")).is_err());
        assert!(authenticator_for(&config, Some("TRUE")).is_ok());
        assert!(authenticator_for(&config, Some("1")).is_ok());
    }

    #[tokio::test]
    async fn test_memory_store_opens() {
        let (reader, _writer) = open_event_log(&StoreConfig::default()).await.unwrap();
        assert_eq!(reader.backend_name(), "memory");
    }
}
