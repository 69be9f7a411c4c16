// src/main.rs
mod callback;
mod config;
mod db;
mod error;
mod gateway;
mod handlers;
mod locks;
mod models;
mod poll;
mod routes;
mod services;
mod store;
mod tally;
mod telegram;
mod voting;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, Transport};
use crate::handlers::Dispatcher;
use crate::store::{
    MemoryPollStore, MemoryVoteStore, PgPollStore, PgVoteStore, PollStore, VoteStore,
};
use crate::telegram::TelegramClient;

fn init_tracing(debug: bool) {
    let default = if debug {
        "poll_bot=debug,tower_http=debug"
    } else {
        "poll_bot=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // Load environment variables from .env file

    let config = Config::from_env()?;
    init_tracing(config.debug);

    let client = Arc::new(TelegramClient::new(
        &config.api_url,
        &config.bot_token,
        config.request_timeout,
    )?);

    let (polls, votes): (Arc<dyn PollStore>, Arc<dyn VoteStore>) = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(&config, url).await?;
            (
                Arc::new(PgPollStore::new(pool.clone())),
                Arc::new(PgVoteStore::new(pool)),
            )
        }
        None => {
            warn!("DATABASE_URL is not set, polls are kept in memory only");
            (
                Arc::new(MemoryPollStore::new()),
                Arc::new(MemoryVoteStore::new()),
            )
        }
    };

    let dispatcher = Arc::new(Dispatcher::new(polls, votes, client.clone(), &config));

    let me = client.get_me().await?;
    info!(username = ?me.username, "Init: ok");

    let failed = dispatcher.notify_admins("I started").await;
    if failed > 0 {
        warn!(failed, "Could not reach every admin");
    }

    match config.transport {
        Transport::Polling => {
            client.delete_webhook().await?;
            tokio::select! {
                _ = services::run_long_polling(client, dispatcher) => {}
                _ = shutdown_signal() => {}
            }
        }
        Transport::Webhook => {
            if let Some(url) = &config.webhook_url {
                client
                    .set_webhook(url, config.webhook_secret.as_deref())
                    .await?;
                info!(%url, "Webhook registered");
            }

            let routes = routes::create_routes(routes::AppState::new(
                dispatcher,
                config.webhook_secret.clone(),
            ));

            let handle = axum_server::Handle::new();
            let shutdown = handle.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                shutdown.graceful_shutdown(Some(Duration::from_secs(5)));
            });

            let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
            info!(%addr, "Listening for webhook calls");
            axum_server::bind(addr)
                .handle(handle)
                .serve(routes.into_make_service())
                .await?;
        }
    }

    Ok(())
}
