//! # Agora Sync
//!
//! Keeps a conversation's opinion model live. A [`PollingCoordinator`]
//! fetches projection payloads from a [`ProjectionSource`] on a fixed delay,
//! rebuilds the model through `agora-model` and pushes it to registered
//! [`ModelSubscriber`]s.
//!
//! ```no_run
//! use agora_sync::{ChannelSubscriber, FileSource, PollingConfig, PollingCoordinator};
//!
//! # async fn demo() -> agora_sync::Result<()> {
//! let config = PollingConfig::new("conversation-1");
//! let source = FileSource::new("data/{conversation}.json");
//! let (handle, _task) = PollingCoordinator::spawn(config, source)?;
//!
//! let (subscriber, mut events) = ChannelSubscriber::new();
//! handle.subscribe(subscriber).await?;
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod coordinator;
mod error;
mod source;
mod subscriber;

pub use config::{PollingConfig, DEFAULT_POLL_INTERVAL};
pub use coordinator::{
    Availability, CoordinatorHandle, CoordinatorState, CycleOutcome, PollingCoordinator,
};
pub use error::{Error, Result};
pub use source::{FetchOutcome, FileSource, ProjectionSource};
pub use subscriber::{
    ChannelSubscriber, ModelEvent, ModelSubscriber, SubscriberRegistry, SubscriptionId,
};
