//! Agora Opinion Map Server
//!
//! Poll a projection payload file and serve the live model.

use agora_sync::{FileSource, PollingCoordinator};
use agora_vis::{VisConfig, VisServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agora_vis=info,agora=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = VisConfig::from_env()?;
    tracing::info!(
        conversation = %config.polling.conversation_id,
        payload = %config.payload_path.display(),
        "Starting opinion map server"
    );

    let mut source = FileSource::new(config.payload_path);
    if let Some(feed) = config.interest_feed {
        source = source.with_interest_feed(feed);
    }

    let (handle, coordinator) = PollingCoordinator::spawn(config.polling, source)?;
    let server = VisServer::new(handle.clone()).await?;

    tokio::select! {
        result = server.serve(config.port) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
            handle.shutdown().await?;
        }
    }
    coordinator.await?;

    Ok(())
}
