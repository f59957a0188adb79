//! Consumers that log the events of configured subscriptions.

use twitch_webhooks::{StreamEvent, TwitchClient, Watcher};

/// Start watchers for every configured subject and spawn a task draining
/// each one. Subjects that fail to subscribe are logged and skipped.
pub async fn start_watchers(
    client: &TwitchClient,
    streams: &[String],
    follows: &[String],
) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = Vec::new();

    for user_id in streams {
        match client.watch_stream(user_id).await {
            Ok(watcher) => handles.push(tokio::spawn(log_streams(watcher))),
            Err(e) => tracing::error!(user_id = %user_id, error = %e, "Failed to watch stream"),
        }
    }
    for user_id in follows {
        match client.watch_follows(user_id).await {
            Ok(watcher) => handles.push(tokio::spawn(log_follows(watcher))),
            Err(e) => tracing::error!(user_id = %user_id, error = %e, "Failed to watch follows"),
        }
    }

    handles
}

async fn log_streams(mut watcher: Watcher) {
    while let Some(event) = watcher.next_stream().await {
        match event {
            StreamEvent::Online(stream) => tracing::info!(
                user_id = %stream.user_id,
                game_id = %stream.game_id,
                viewers = stream.viewer_count,
                title = %stream.title,
                "Stream is live"
            ),
            StreamEvent::Offline => {
                tracing::info!(user_id = watcher.user_id(), "Stream went offline")
            }
        }
    }
    tracing::info!(key = %watcher.key(), "Stream watcher ended");
}

async fn log_follows(mut watcher: Watcher) {
    while let Some(follow) = watcher.next_follow().await {
        tracing::info!(
            from_id = %follow.from_id,
            to_id = %follow.to_id,
            followed_at = %follow.followed_at,
            "New follower"
        );
    }
    tracing::info!(key = %watcher.key(), "Follow watcher ended");
}
