//! List every EventSub subscription of the client id and optionally delete them.
//!
//! ```sh
//! TWITCH_CLIENT_ID=... TWITCH_ACCESS_TOKEN=... \
//!     RUST_LOG=info cargo run --example list_subscriptions --features tracing -- --delete
//! ```

use std::env;

use eventsub_client::auth::Credentials;
use eventsub_client::helix::Client;
use eventsub_client::helix::types::SubscriptionsRequest;
use futures::StreamExt as _;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let delete = env::args().any(|arg| arg == "--delete");
    let client = Client::with_credentials(Credentials::new(
        env::var("TWITCH_CLIENT_ID")?,
        env::var("TWITCH_ACCESS_TOKEN")?,
    ))?;

    let first = client.subscriptions(&SubscriptionsRequest::default(), None).await?;
    info!(
        total = first.total,
        total_cost = first.total_cost,
        max_total_cost = first.max_total_cost,
        "subscriptions"
    );

    let request = SubscriptionsRequest::default();
    let mut stream = Box::pin(client.stream_subscriptions(&request));
    let mut ids = Vec::new();

    while let Some(record) = stream.next().await {
        match record {
            Ok(record) => {
                info!(
                    id = %record.id,
                    event_type = %record.event_type,
                    version = %record.version,
                    status = %record.status,
                    cost = record.cost
                );
                ids.push(record.id);
            }
            Err(e) => {
                warn!(error = %e, "listing failed");
                break;
            }
        }
    }
    drop(stream);

    if delete {
        for id in ids {
            client.delete_subscription(&id).await?;
            info!(%id, "deleted");
        }
    }

    Ok(())
}
