//! Headless webhook server.
//!
//! Serves the Twitch webhook callback, subscribes to the configured
//! subjects and logs their events until Ctrl+C.

mod config;
mod watch;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use twitch_webhooks::TwitchClient;

use config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    config::load_dotenv();
    let config = AppConfig::load();
    let missing = config.missing_settings();
    if !missing.is_empty() {
        tracing::warn!("Missing settings: {missing:?}");
    }

    let shutdown_token = CancellationToken::new();
    let client = TwitchClient::with_parent(config.client_config(), &shutdown_token)?;

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Webhook server listening on http://{}", addr);

    let app = client.webhook_router();
    let server_token = shutdown_token.clone();
    let server_handle = tokio::spawn(async move {
        let result = axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move { server_token.cancelled().await })
            .await;
        if let Err(e) = result {
            tracing::error!("Server failed: {e}");
        }
    });

    // The callback must be reachable before the hub sends its challenge.
    let consumers =
        watch::start_watchers(&client, &config.watch_streams, &config.watch_follows).await;
    tracing::info!(
        watchers = consumers.len(),
        port = config.server_port,
        "Webhook server running. Press Ctrl+C to stop."
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    client.close();
    shutdown_token.cancel();
    for consumer in consumers {
        let _ = consumer.await;
    }
    let _ = server_handle.await;
    tracing::info!("Shutdown sequence completed");
    Ok(())
}
