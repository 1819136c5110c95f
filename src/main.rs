use std::net::SocketAddr;
use std::sync::Arc;

use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use solar_leads::config::Config;
use solar_leads::crm_client::CrmClient;
use solar_leads::db::Database;
use solar_leads::db_storage::PgStore;
use solar_leads::handlers::AppState;
use solar_leads::routes;

/// Main entry point for the application.
///
/// This function initializes the application, including:
/// - Logging and tracing.
/// - Configuration loading.
/// - Database connection and migrations.
/// - CRM client and the background side-effect worker.
/// - HTTP routes and middleware (CORS, Rate Limiting).
///
/// It then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "solar_leads=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");
    let store = Arc::new(PgStore::new(db.pool.clone()));

    let crm = match config.crm.clone().map(CrmClient::new).transpose() {
        Ok(Some(client)) => {
            tracing::info!("✓ CRM client initialized");
            Some(client)
        }
        Ok(None) => None,
        Err(e) => {
            tracing::error!("Failed to initialize CRM client: {}", e);
            None
        }
    };

    let port = config.port;
    let (app_state, _side_effect_worker) = AppState::new(config, store, crm)?;

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    // Health check stays outside the rate limit
    let api = routes::api_routes().layer(ServiceBuilder::new().layer(GovernorLayer {
        config: governor_conf,
    }));
    let app = routes::app(app_state, api);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
