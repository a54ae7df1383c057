use anyhow::Result;
use clap::Parser;
use delivery_service::api::{self, AppState};
use delivery_service::auth::HttpTokenVerifier;
use delivery_service::checkout::CheckoutConfig;
use delivery_service::gateway::StripeGateway;
use delivery_service::postgres::PgStore;
use delivery_service::store::InMemoryStore;
use diesel::{Connection, PgConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Parser)]
#[command(name = "delivery-service")]
struct Args {
    /// Postgres connection string. Without it the service keeps everything in memory.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value = "10")]
    database_max_connections: u32,

    #[arg(long, env = "PORT", default_value = "3000")]
    port: u16,

    #[arg(long, env = "STRIPE_SECRET", hide_env_values = true)]
    stripe_secret: String,

    #[arg(long, env = "STRIPE_API_BASE", default_value = "https://api.stripe.com")]
    stripe_api_base: String,

    /// Public site that hosts the payment success and cancellation pages.
    #[arg(long, env = "SITE_DOMAIN")]
    site_domain: String,

    #[arg(long, env = "CURRENCY", default_value = "usd")]
    currency: String,

    #[arg(long, env = "GATEWAY_TIMEOUT_SECS", default_value = "15")]
    gateway_timeout_secs: u64,

    #[arg(
        long,
        env = "IDENTITY_VERIFY_URL",
        default_value = "https://oauth2.googleapis.com/tokeninfo"
    )]
    identity_verify_url: String,
}

fn run_migrations(database_url: &str) -> Result<()> {
    info!("Running database migrations...");
    let mut conn = PgConnection::establish(database_url)?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("Migration error: {}", e))?;
    info!("Migrations completed successfully");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let timeout = Duration::from_secs(args.gateway_timeout_secs);
    let gateway = Arc::new(StripeGateway::new(
        args.stripe_secret.clone(),
        args.stripe_api_base.clone(),
        timeout,
    )?);
    let verifier = Arc::new(HttpTokenVerifier::new(args.identity_verify_url.clone(), timeout)?);
    let config = CheckoutConfig {
        site_domain: args.site_domain.clone(),
        currency: args.currency.to_lowercase(),
    };

    let app_state = match &args.database_url {
        Some(database_url) => {
            let url = database_url.clone();
            tokio::task::spawn_blocking(move || run_migrations(&url)).await??;
            let store = PgStore::connect(database_url, args.database_max_connections).await?;
            AppState::new(store, gateway, verifier, config)
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory store; data is lost on restart");
            AppState::new(InMemoryStore::new(), gateway, verifier, config)
        }
    };

    let app = api::create_router(app_state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.port)).await?;

    info!("Delivery service listening on port {}", args.port);

    axum::serve(listener, app).await?;

    Ok(())
}
