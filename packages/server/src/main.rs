use std::{net::SocketAddr, sync::Arc, time::Duration};

use common::storage::filesystem::FsBlobStore;
use tokio::net::TcpListener;
use tracing::{Level, info};

use server::config::AppConfig;
use server::mailer::LogMailer;
use server::state::AppState;
use server::utils::otp::OtpStore;
use server::{build_router, database, seed};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let config = AppConfig::load()?;

    let db = database::init_db(&config.database.url).await?;
    seed::seed_default_plans(&db).await?;
    seed::ensure_indexes(&db).await?;

    let blob_store = FsBlobStore::new(
        config.storage.root_dir.clone(),
        config.storage.max_upload_size,
    )
    .await?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let otp_ttl = Duration::from_secs(config.otp.ttl_secs);

    let state = AppState {
        db,
        blob_store: Arc::new(blob_store),
        mailer: Arc::new(LogMailer),
        otp: Arc::new(OtpStore::new(otp_ttl)),
        config,
    };
    let app = build_router(state);

    info!("listening on http://{addr}");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
