//! Polling Coordinator - keeps one conversation's opinion model live.
//!
//! A single task owns the [`ProjectionCache`] and all subscribers. It runs
//! refresh cycles on a fixed delay:
//!
//! ```text
//! Idle ──► Fetching ──► Processing ──► Idle
//!             │                          ▲
//!             └── not modified / error ──┘
//! ```
//!
//! Commands from [`CoordinatorHandle`]s (local votes, visibility changes,
//! subscriptions) are applied between awaits, including while a fetch is in
//! flight, so a vote moves the viewer's dot without waiting for the network.
//!
//! There is no backoff and no immediate retry: whatever the outcome, the
//! next cycle starts one poll interval after the previous one finished.

use std::future::Future;
use std::sync::Arc;

use agora_model::{MathPayload, MathTick, OpinionModel, Position, ProjectionCache, Vote};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::PollingConfig;
use crate::error::Result;
use crate::source::{FetchOutcome, ProjectionSource};
use crate::subscriber::{ModelSubscriber, SubscriberRegistry, SubscriptionId};

/// Phase of the refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Waiting for the next cycle.
    Idle,
    /// A payload fetch is outstanding.
    Fetching,
    /// Building the model from a fresh payload.
    Processing,
}

impl std::fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Fetching => write!(f, "Fetching"),
            Self::Processing => write!(f, "Processing"),
        }
    }
}

/// Whether the conversation has a projection to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// No answer from the source yet
    Pending,
    /// A model has been published
    Available,
    /// The source reports no projection for the conversation
    Unavailable,
}

/// What a single refresh cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A new model was published.
    Published(MathTick),
    /// The source had nothing newer.
    NotModified,
    /// The view is hidden and a model already exists.
    Suppressed,
    /// The source has no projection for the conversation.
    NotFound,
    /// The fetch failed and will be retried next cycle.
    TransientError,
    /// The payload could not be turned into a model.
    Rejected,
    /// The coordinator was asked to stop mid-cycle.
    Stopped,
}

enum Command {
    RecordVote {
        vote: Vote,
        reply: oneshot::Sender<Position>,
    },
    SetVisible(bool),
    Subscribe {
        subscriber: Box<dyn ModelSubscriber>,
        reply: oneshot::Sender<SubscriptionId>,
    },
    Unsubscribe {
        id: SubscriptionId,
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<Option<Arc<OpinionModel>>>,
    },
    Shutdown,
}

/// Everything commands may touch, kept apart from the source so both can be
/// borrowed during a fetch.
struct ViewState {
    cache: ProjectionCache,
    subscribers: SubscriberRegistry,
    state: CoordinatorState,
    visible: bool,
    running: bool,
    availability: watch::Sender<Availability>,
}

impl ViewState {
    fn apply(&mut self, command: Command) {
        match command {
            Command::RecordVote { vote, reply } => {
                let _ = reply.send(self.record_vote(vote));
            }
            Command::SetVisible(visible) => self.set_visible(visible),
            Command::Subscribe { subscriber, reply } => {
                let _ = reply.send(self.subscribe(subscriber));
            }
            Command::Unsubscribe { id, reply } => {
                let _ = reply.send(self.subscribers.unregister(id));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.cache.model().cloned());
            }
            Command::Shutdown => {
                debug!("Shutdown requested");
                self.running = false;
            }
        }
    }

    fn record_vote(&mut self, vote: Vote) -> Position {
        let position = self.cache.record_vote(vote);
        self.subscribers.notify_self_moved(position);
        position
    }

    fn set_visible(&mut self, visible: bool) {
        if self.visible != visible {
            debug!(visible, "View visibility changed");
        }
        self.visible = visible;
    }

    fn subscribe(&mut self, subscriber: Box<dyn ModelSubscriber>) -> SubscriptionId {
        self.subscribers.register(subscriber, self.cache.model())
    }

    fn set_availability(&self, availability: Availability) {
        self.availability.send_if_modified(|current| {
            let changed = *current != availability;
            *current = availability;
            changed
        });
    }
}

/// Drive `fut` to completion while applying incoming commands.
///
/// Returns `None` when a shutdown was requested or every handle is gone.
async fn serve_commands_until<F: Future>(
    fut: F,
    commands: &mut mpsc::Receiver<Command>,
    view: &mut ViewState,
) -> Option<F::Output> {
    tokio::pin!(fut);
    loop {
        tokio::select! {
            output = &mut fut => return Some(output),
            command = commands.recv() => match command {
                Some(command) => {
                    view.apply(command);
                    if !view.running {
                        return None;
                    }
                }
                None => {
                    debug!("All coordinator handles dropped");
                    view.running = false;
                    return None;
                }
            },
        }
    }
}

/// Owns one conversation view and refreshes it from a [`ProjectionSource`].
pub struct PollingCoordinator<S> {
    config: PollingConfig,
    source: S,
    commands: mpsc::Receiver<Command>,
    view: ViewState,
}

impl<S: ProjectionSource> PollingCoordinator<S> {
    /// Create a coordinator and a handle to it. Nothing runs until
    /// [`run`](Self::run) is awaited.
    pub fn new(config: PollingConfig, source: S) -> (Self, CoordinatorHandle) {
        let (command_tx, commands) = mpsc::channel(config.command_buffer.max(1));
        let (availability, availability_rx) = watch::channel(Availability::Pending);

        let view = ViewState {
            cache: ProjectionCache::new(config.self_pid, config.options),
            subscribers: SubscriberRegistry::new(),
            state: CoordinatorState::Idle,
            visible: true,
            running: true,
            availability,
        };

        let coordinator = Self {
            config,
            source,
            commands,
            view,
        };
        let handle = CoordinatorHandle {
            commands: command_tx,
            availability: availability_rx,
        };
        (coordinator, handle)
    }

    /// Validate the config and run a coordinator on its own task.
    pub fn spawn(config: PollingConfig, source: S) -> Result<(CoordinatorHandle, JoinHandle<()>)> {
        config.validate()?;
        let (coordinator, handle) = Self::new(config, source);
        let task = tokio::spawn(coordinator.run());
        Ok((handle, task))
    }

    pub fn state(&self) -> CoordinatorState {
        self.view.state
    }

    pub fn model(&self) -> Option<&Arc<OpinionModel>> {
        self.view.cache.model()
    }

    pub fn availability(&self) -> Availability {
        *self.view.availability.borrow()
    }

    /// Register a subscriber directly, before the coordinator runs.
    pub fn subscribe(&mut self, subscriber: impl ModelSubscriber) -> SubscriptionId {
        self.view.subscribe(Box::new(subscriber))
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.view.set_visible(visible);
    }

    pub fn record_vote(&mut self, vote: Vote) -> Position {
        self.view.record_vote(vote)
    }

    /// Run refresh cycles until shut down or every handle is dropped.
    pub async fn run(mut self) {
        info!(
            conversation = %self.config.conversation_id,
            interval_ms = self.config.poll_interval.as_millis() as u64,
            "Polling coordinator started"
        );

        while self.view.running {
            let outcome = self.run_cycle().await;
            self.view.state = CoordinatorState::Idle;
            trace!(outcome = ?outcome, "Cycle complete");
            if !self.view.running {
                break;
            }

            let delay = tokio::time::sleep(self.config.poll_interval);
            serve_commands_until(delay, &mut self.commands, &mut self.view).await;
        }

        info!(conversation = %self.config.conversation_id, "Polling coordinator stopped");
    }

    /// Run one refresh cycle.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        if !self.view.visible && self.view.cache.model().is_some() {
            trace!("View hidden, skipping fetch");
            return CycleOutcome::Suppressed;
        }

        self.view.state = CoordinatorState::Fetching;
        let last_tick = self.view.cache.math_tick();
        let fetch = self.source.fetch_math(&self.config.conversation_id, last_tick);
        let Some(outcome) = serve_commands_until(fetch, &mut self.commands, &mut self.view).await
        else {
            return CycleOutcome::Stopped;
        };

        match outcome {
            FetchOutcome::Fresh(payload) => self.process(*payload).await,
            FetchOutcome::NotModified => {
                trace!(math_tick = ?last_tick, "Projection not modified");
                CycleOutcome::NotModified
            }
            FetchOutcome::NotFound => {
                warn!(conversation = %self.config.conversation_id, "No projection for conversation");
                self.view.set_availability(Availability::Unavailable);
                CycleOutcome::NotFound
            }
            FetchOutcome::TransientError(detail) => {
                warn!(
                    conversation = %self.config.conversation_id,
                    error = %detail,
                    "Projection fetch failed, retrying next cycle"
                );
                CycleOutcome::TransientError
            }
        }
    }

    async fn process(&mut self, payload: MathPayload) -> CycleOutcome {
        let feed = self
            .source
            .fetch_participants_of_interest(&self.config.conversation_id);
        match serve_commands_until(feed, &mut self.commands, &mut self.view).await {
            None => return CycleOutcome::Stopped,
            Some(Ok(feed)) => self.view.cache.set_participants_of_interest(&feed),
            Some(Err(e)) => {
                warn!(error = %e, "Participant-of-interest feed unavailable, keeping previous");
            }
        }

        self.view.state = CoordinatorState::Processing;
        match self.view.cache.rebuild(&payload) {
            Ok(model) => {
                self.view.subscribers.notify(&model);
                self.view.set_availability(Availability::Available);
                CycleOutcome::Published(model.math_tick)
            }
            Err(e) => {
                error!(
                    math_tick = payload.math_tick.0,
                    error = %e,
                    "Rejected projection payload, keeping previous model"
                );
                CycleOutcome::Rejected
            }
        }
    }
}

/// Cloneable handle for talking to a running coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
    availability: watch::Receiver<Availability>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RecordVote { vote, .. } => f.debug_tuple("RecordVote").field(vote).finish(),
            Self::SetVisible(visible) => f.debug_tuple("SetVisible").field(visible).finish(),
            Self::Subscribe { .. } => f.write_str("Subscribe"),
            Self::Unsubscribe { id, .. } => f.debug_tuple("Unsubscribe").field(id).finish(),
            Self::Snapshot { .. } => f.write_str("Snapshot"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

impl CoordinatorHandle {
    /// Record a local vote; returns the viewer's new position.
    pub async fn record_vote(&self, vote: Vote) -> Result<Position> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(Command::RecordVote { vote, reply }).await?;
        Ok(rx.await?)
    }

    /// Tell the coordinator whether the view is on screen.
    pub async fn set_visible(&self, visible: bool) -> Result<()> {
        self.commands.send(Command::SetVisible(visible)).await?;
        Ok(())
    }

    /// Register a subscriber; the latest model is replayed to it first.
    pub async fn subscribe(&self, subscriber: impl ModelSubscriber) -> Result<SubscriptionId> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Subscribe {
                subscriber: Box::new(subscriber),
                reply,
            })
            .await?;
        Ok(rx.await?)
    }

    pub async fn unsubscribe(&self, id: SubscriptionId) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(Command::Unsubscribe { id, reply }).await?;
        Ok(rx.await?)
    }

    /// The latest published model.
    pub async fn model(&self) -> Result<Option<Arc<OpinionModel>>> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(Command::Snapshot { reply }).await?;
        Ok(rx.await?)
    }

    /// Stop the coordinator after the current step.
    pub async fn shutdown(&self) -> Result<()> {
        self.commands.send(Command::Shutdown).await?;
        Ok(())
    }

    pub fn availability(&self) -> Availability {
        *self.availability.borrow()
    }

    /// Watch availability changes.
    pub fn watch_availability(&self) -> watch::Receiver<Availability> {
        self.availability.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_display() {
        assert_eq!(CoordinatorState::Idle.to_string(), "Idle");
        assert_eq!(CoordinatorState::Fetching.to_string(), "Fetching");
        assert_eq!(CoordinatorState::Processing.to_string(), "Processing");
    }

    #[test]
    fn availability_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Availability::Unavailable).unwrap(),
            "\"unavailable\""
        );
    }
}
