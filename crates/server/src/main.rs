use std::net::SocketAddr;

use courseware_server::{app, config::Config, db::Database, services::mailer, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Load configuration
    let config = Config::from_env();

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "courseware_server=debug,tower_http=info".into());
    if config.log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // Initialize database
    let db = Database::connect(&config.database_url).await?;
    db.run_migrations().await?;

    if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
        db.ensure_admin(email, password).await?;
    }

    if config.mail_webhook_url.is_none() {
        tracing::warn!("MAIL_WEBHOOK_URL not set, notifications will only be logged");
    }
    let mailer = mailer::from_config(&config);

    let state = AppState {
        db,
        config: config.clone(),
        mailer,
    };

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
