use std::env;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError};

use anyhow::Context;
use tracing::{error, info, warn};

use bell_scheduler::alarm::{EventBus, SystemClock};
use bell_scheduler::bell::{BellPlayer, LogSink};
use bell_scheduler::config::{AppConfig, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};
use bell_scheduler::server::create_router;
use bell_scheduler::service::BellService;
use bell_scheduler::storage::SqliteStore;
use bell_scheduler::sync::{HttpScheduleSource, ResponseCache};
use bell_scheduler::types::AppState;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config_path = PathBuf::from(
        env::var(CONFIG_PATH_ENV)
            .ok()
            .or_else(|| env::args().nth(1))
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string()),
    );
    let config_found = config_path.exists();
    let config = if config_found {
        AppConfig::load(&config_path)?
    } else {
        AppConfig::default()
    };

    tracing_subscriber::fmt()
        .with_max_level(config.tracing_level()?)
        .init();

    if !config_found {
        warn!(
            "Config file {} not found, using defaults",
            config_path.display()
        );
    }
    info!("Starting bell_scheduler v{}", env!("CARGO_PKG_VERSION"));

    let events = EventBus::default();
    let store = Arc::new(
        SqliteStore::open(&config.database_path)
            .with_context(|| format!("Failed to open database {}", config.database_path))?,
    );
    let cache = Arc::new(ResponseCache::new(config.response_cache_ttl()));
    let source = Arc::new(HttpScheduleSource::new(config.client_config(), cache)?);
    let service = Arc::new(BellService::new(
        config.service_config(),
        Arc::new(SystemClock),
        events.clone(),
        source,
        store,
    ));
    service.bootstrap();

    let player = BellPlayer::new(Arc::new(LogSink), config.player_config());
    let player_handle = player.handle();
    let player_task = player.spawn(events.subscribe());

    let mut ticker = service.ticker(config.ticker_config());
    ticker.start();
    let freshness_task = tokio::spawn(Arc::clone(&service).run_freshness_loop());

    let state = Arc::new(AppState::new(Arc::clone(&service), player_handle, ticker));
    let app = create_router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("Listening on {}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    freshness_task.abort();
    state
        .ticker
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .stop();
    service.stop_bell();
    player_task.abort();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
