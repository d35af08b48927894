//! Agora Opinion Map Server
//!
//! Serves a live opinion model to rendering clients.
//!
//! # Architecture
//!
//! - **Coordinator**: polls the projection source and rebuilds the model
//! - **Relay**: encodes each update once and fans it out to clients
//! - **WebSocket**: streams models and self moves, accepts votes
//! - **REST API**: status, model snapshot, vote tallies, votes and visibility
//!
//! # Usage
//!
//! ```ignore
//! let (handle, _task) = PollingCoordinator::spawn(config, FileSource::new("data/{conversation}.json"))?;
//! let server = VisServer::new(handle).await?;
//! server.serve(3000).await?;
//! ```

mod config;
mod error;
mod events;
mod server;

pub use config::VisConfig;
pub use error::{Error, Result};
pub use events::{ModelRelay, VisEvent};
pub use server::VisServer;
