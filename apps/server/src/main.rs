use std::sync::Arc;

use actix_web::{middleware, web, App, HttpServer};
use tokio::sync::watch;

use rustrak_merge::config;
use rustrak_merge::db;
use rustrak_merge::queue::PgJobQueue;
use rustrak_merge::routes;
use rustrak_merge::tasks::TaskContext;
use rustrak_merge::worker;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // Load configuration
    let config = config::Config::from_env().map_err(|e| {
        log::error!("Configuration error: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    log::info!(
        "Starting Rustrak merge worker on {}:{}",
        config.host,
        config.port
    );

    // Create database pool
    let db_pool = db::create_pool(&config.database).await.map_err(|e| {
        log::error!("Database pool error: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    // Run migrations
    db::run_migrations(&db_pool).await.map_err(|e| {
        log::error!("Migration error: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    if config.security.api_token.is_none() {
        log::warn!("MERGE_API_TOKEN not set, the merge endpoint will reject every request");
    }

    let ctx = Arc::new(TaskContext::postgres(db_pool.clone(), &config.worker));

    // Workers stop once `true` is sent
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = worker::spawn_workers(
        PgJobQueue::new(db_pool.clone()),
        ctx.clone(),
        &config.worker,
        shutdown_rx,
    );

    log::info!("Started {} merge workers", workers.len());

    // Clone values for the closure
    let host = config.host.clone();
    let port = config.port;
    let security = config.security.clone();

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(db_pool.clone()))
            .app_data(web::Data::from(ctx.clone()))
            .app_data(web::Data::new(security.clone()))
            .wrap(middleware::Logger::default())
            // Health check routes (no auth required)
            .configure(routes::health::configure)
            // Merge trigger (Bearer token)
            .configure(routes::merge::configure)
    })
    .bind((host.as_str(), port))?
    .shutdown_timeout(30)
    .run();

    // Spawn graceful shutdown handler
    let server_handle = server.handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        log::info!("Shutdown signal received, stopping server...");
        server_handle.stop(true).await;
    });

    let result = server.await;

    // In-flight jobs finish; anything unfinished is picked up after its lock expires
    let _ = shutdown_tx.send(true);
    for handle in workers {
        if let Err(e) = handle.await {
            log::error!("Worker task panicked: {}", e);
        }
    }

    result
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                log::error!("Failed to install Ctrl+C handler: {}", e);
                // Wait forever if signal handler fails
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
