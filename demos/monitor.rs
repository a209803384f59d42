//! Watch a channel go live and offline over EventSub WebSocket.
//!
//! Needs a user access token for the client id. Run with tracing enabled:
//! ```sh
//! TWITCH_CLIENT_ID=... TWITCH_ACCESS_TOKEN=... TWITCH_BROADCASTER_ID=12826 \
//!     RUST_LOG=info cargo run --example monitor --features tracing
//! ```

use std::env;

use eventsub_client::auth::Credentials;
use eventsub_client::eventsub::{EventMonitor, MonitorEvent, subscriber};
use eventsub_client::helix::types::Condition;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let credentials = Credentials::new(
        env::var("TWITCH_CLIENT_ID")?,
        env::var("TWITCH_ACCESS_TOKEN")?,
    );
    let broadcaster = env::var("TWITCH_BROADCASTER_ID")?;
    let condition = Condition::from([("broadcaster_user_id".to_owned(), broadcaster)]);

    let monitor = EventMonitor::new(credentials)?;

    for event_type in ["stream.online", "stream.offline"] {
        monitor.register(
            event_type,
            "1",
            condition.clone(),
            subscriber::from_fn(|notification| async move {
                info!(
                    event_type = notification.event_type(),
                    event = %notification.event,
                    "notification"
                );
                Ok(())
            }),
        );
    }

    let mut events = monitor.events();
    monitor.start()?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(MonitorEvent::Stopped(reason)) => {
                    warn!(%reason, "monitor stopped");
                    break;
                }
                Ok(event) => info!(?event),
                Err(e) => warn!(error = %e, "lagged behind monitor events"),
            },
        }
    }

    monitor.stop().await;

    Ok(())
}
