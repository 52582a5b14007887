use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::runtime::Handle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use whisper_api::AppStateInner;
use whisper_core::{ChatStore, StoreConfig};
use whisper_crypto::AesGcmGateway;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whisper=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let config = StoreConfig::from_env()?;
    let db_path = std::env::var("WHISPER_DB_PATH").unwrap_or_else(|_| "whisper.db".into());
    let host = std::env::var("WHISPER_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port: u16 = std::env::var("WHISPER_PORT")
        .unwrap_or_else(|_| "3400".into())
        .parse()?;

    let gateway = match std::env::var("WHISPER_CHAT_KEY") {
        Ok(encoded) => AesGcmGateway::from_base64(&encoded)?,
        Err(_) => {
            warn!("WHISPER_CHAT_KEY not set; encrypted messages will not be readable after a restart");
            AesGcmGateway::generate()
        }
    };

    // Init database
    let db = whisper_db::Database::open(&PathBuf::from(&db_path))?;

    let store = ChatStore::open(config, Arc::new(db), Arc::new(gateway), Handle::current());
    info!(user_id = store.user_id(), "chat store ready");

    let app = whisper_api::router(Arc::new(AppStateInner { store }))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Whisper listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
