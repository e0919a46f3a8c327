//! Main entry point for the vaccine slot notifier.
//! Starts one poller per monitored city and serves a small status API.

use std::sync::Arc;

use actix_web::{App, HttpServer, middleware::Logger, web};
use anyhow::Context;
use slot_scan::{
    ChannelNotifier, ChatService, FleetConfig, MockChatService, NotificationSink, NotifierConfig,
    TelegramBot, TrackerStats, TrackerStore,
};

mod notifier_manager;
mod routes;

use notifier_manager::NotifierManager;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    log::info!("🚀 Starting vaccine slot notifier...");

    let config = NotifierConfig::from_env().context("Invalid environment configuration")?;
    let fleet = FleetConfig::load(&config.config_file).context("Invalid fleet configuration")?;

    let chat_service: Arc<dyn ChatService> = if config.dry_run {
        log::warn!("🧪 DRY_RUN enabled, messages will only be logged");
        Arc::new(MockChatService)
    } else {
        Arc::new(
            TelegramBot::new(config.telegram_base_url.as_str(), config.telegram_token.as_str())
                .context("Failed to initialize Telegram bot")?,
        )
    };
    let notification_sink: Arc<dyn NotificationSink> =
        Arc::new(ChannelNotifier::new(chat_service));

    let tracker = Arc::new(TrackerStore::new());
    let stats = Arc::new(TrackerStats::new(chrono::Utc::now()));

    let manager = web::Data::new(NotifierManager::new(tracker, stats));
    manager
        .start(&fleet, &config, notification_sink)
        .await
        .context("Failed to start pollers")?;

    log::info!("🌐 Status server will be available at: http://{}", config.bind_address);

    let server_manager = manager.clone();
    let server_result = HttpServer::new(move || {
        App::new()
            .app_data(server_manager.clone())
            .wrap(Logger::default())
            .configure(routes::configure)
    })
    .bind(config.bind_address.as_str())
    .with_context(|| format!("Failed to bind {}", config.bind_address))?
    .run()
    .await;

    manager.stop().await;

    server_result.context("Status server failed")
}
