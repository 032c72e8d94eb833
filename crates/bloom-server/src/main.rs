use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bloom_api::config::Config;
use bloom_api::email::Mailer;
use bloom_api::rate_limit::FixedWindowLimiter;
use bloom_api::state::AppStateInner;
use bloom_db::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("bloom=debug,tower_http=debug")),
        )
        .init();

    let config = Config::from_env()?;
    let db = Database::open(Path::new(&config.db_path))?;

    let mailer = match (&config.resend_api_key, &config.email_from) {
        (Some(api_key), Some(from)) => Some(Mailer::new(
            api_key.clone(),
            from.clone(),
            config.resend_base_url.clone(),
        )?),
        _ => {
            warn!("email delivery not configured, OTP codes will be returned inline");
            None
        }
    };

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = Arc::new(AppStateInner {
        db,
        config,
        mailer,
        limiter: FixedWindowLimiter::new(),
    });

    let app = bloom_api::build_router(state);

    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
