use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use dotenv::dotenv;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Pool, Sqlite,
};
use std::{path::Path, str::FromStr, sync::Arc, time::Duration};

use crate::channels::{
    email_channel::EmailChannel, line_channel::LineChannel, onsite_channel::OnSiteChannel,
    push_channel::PushChannel, sms_channel::SmsChannel, ChannelRegistry,
};
use crate::config::engine_config::EngineConfig;
use crate::logger::init_logger;
use crate::services::{
    delivery_status_service::DeliveryStatusService,
    message_catalog_service::StaticMessageCatalog,
    notification_router_service::NotificationRouterService,
    preference_service::PreferenceService, queue_manager_service::QueueManagerService,
    queue_store_service::QueueStoreService, reminder_service::ReminderService,
    reservation_service::ReservationService,
};

mod app;
mod channels;
mod config;
mod handlers;
mod logger;
mod models;
mod services;

#[cfg(test)]
mod tests;

async fn setup_database(database_url: &str) -> Result<Pool<Sqlite>> {
    // Crear la carpeta del archivo (p.e. "data/") si hace falta
    let file_path = database_url
        .trim_start_matches("sqlite:")
        .trim_start_matches("//");
    if let Some(dir) = Path::new(file_path).parent() {
        if !dir.as_os_str().is_empty() && !file_path.starts_with(":memory:") {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("No se pudo crear directorio {}", dir.display()))?;
        }
    }

    log::info!("Conectando a SQLite en {}", database_url);

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
        .context("No se pudo conectar a la base de datos SQLite")?;

    Ok(db_pool)
}

/// Un adaptador por cada proveedor configurado. On-site siempre está disponible.
fn build_registry(
    config: &EngineConfig,
    db_pool: &Pool<Sqlite>,
    http_client: &reqwest::Client,
) -> Result<ChannelRegistry> {
    let mut registry = ChannelRegistry::new();
    registry.register(Arc::new(OnSiteChannel::new(db_pool.clone())));

    if let Some(smtp) = &config.smtp {
        registry.register(Arc::new(EmailChannel::new(smtp)?));
    }
    if let Some(line) = &config.line {
        registry.register(Arc::new(LineChannel::new(line, http_client.clone())));
    }
    if let Some(sms) = &config.sms {
        registry.register(Arc::new(SmsChannel::new(sms, http_client.clone())));
    }
    if let Some(push) = &config.push {
        registry.register(Arc::new(PushChannel::new(push, http_client.clone())));
    }

    log::info!("Canales configurados: {:?}", registry.channels());
    Ok(registry)
}

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv().ok(); // Cargar .env al inicio
    init_logger();

    let config = EngineConfig::from_env()?;
    if config.cron_secret.is_none() {
        log::warn!("CRON_SECRET no configurado: los triggers responderán 500");
    }

    let db_pool = setup_database(&config.database_url).await?;

    let store = QueueStoreService::new(db_pool.clone());
    store
        .run_migrations()
        .await
        .context("Fallo en migraciones de la cola")?;

    let http_client = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .context("No se pudo crear el cliente HTTP")?;
    let registry = build_registry(&config, &db_pool, &http_client)?;

    let preferences = PreferenceService::new(db_pool.clone());
    let reservations = ReservationService::new(db_pool.clone());
    let router = NotificationRouterService::new(
        store.clone(),
        preferences.clone(),
        Arc::new(StaticMessageCatalog::new().context("No se pudo cargar el catálogo de mensajes")?),
    );
    let queue_manager = QueueManagerService::new(store.clone(), registry.clone(), &config);
    let reminders = ReminderService::new(reservations, router.clone(), &config);
    let delivery_status = DeliveryStatusService::new(store.clone(), registry, &config);

    let bind = (config.bind_addr.clone(), config.port);
    log::info!("Levantando servidor en {}:{}", bind.0, bind.1);

    let config = web::Data::new(config);
    HttpServer::new(move || {
        App::new()
            .app_data(config.clone())
            .app_data(web::Data::new(store.clone()))
            .app_data(web::Data::new(preferences.clone()))
            .app_data(web::Data::new(router.clone()))
            .app_data(web::Data::new(queue_manager.clone()))
            .app_data(web::Data::new(reminders.clone()))
            .app_data(web::Data::new(delivery_status.clone()))
            .configure(app::init_app)
    })
    .workers(1)
    .bind(bind)?
    .run()
    .await?;

    Ok(())
}
