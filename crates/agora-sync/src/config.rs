//! Polling configuration.

use std::time::Duration;

use agora_model::{ModelOptions, Pid, SparsityPolicy};

use crate::error::{Error, Result};

/// Default delay between refresh cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Configuration for one conversation's polling coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct PollingConfig {
    /// Conversation to poll
    pub conversation_id: String,

    /// Fixed delay between the end of one cycle and the start of the next.
    pub poll_interval: Duration,

    /// The viewer's participant id, if assigned
    pub self_pid: Option<Pid>,

    /// Model building switches
    pub options: ModelOptions,

    /// Capacity of the command channel
    pub command_buffer: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            conversation_id: String::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            self_pid: None,
            options: ModelOptions::default(),
            command_buffer: 64,
        }
    }
}

impl PollingConfig {
    /// Create a config for a conversation with default settings.
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            ..Default::default()
        }
    }

    /// Read configuration from environment variables.
    ///
    /// | variable | meaning |
    /// |----------|---------|
    /// | `AGORA_CONVERSATION` | conversation id (required) |
    /// | `AGORA_POLL_INTERVAL_MS` | delay between cycles |
    /// | `AGORA_SELF_PID` | viewer's participant id |
    /// | `AGORA_SELF_COMPENSATION` | `compensate` or `raw` |
    /// | `AGORA_COMMENT_PROJECTION` | publish comment positions (`true`/`false`) |
    pub fn from_env() -> Result<Self> {
        let conversation_id = std::env::var("AGORA_CONVERSATION")
            .map_err(|_| Error::Config("AGORA_CONVERSATION is not set".to_string()))?;

        let mut config = Self::new(conversation_id);

        if let Some(ms) = env_parsed::<u64>("AGORA_POLL_INTERVAL_MS")? {
            config = config.with_poll_interval(Duration::from_millis(ms));
        }
        if let Some(pid) = env_parsed::<u64>("AGORA_SELF_PID")? {
            config = config.with_self_pid(Pid(pid));
        }
        if let Some(policy) = env_parsed::<SparsityPolicy>("AGORA_SELF_COMPENSATION")? {
            config = config.with_self_compensation(policy);
        }
        if let Some(enabled) = env_parsed::<bool>("AGORA_COMMENT_PROJECTION")? {
            config = config.with_comment_projection(enabled);
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the delay between cycles.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the viewer's participant id.
    #[must_use]
    pub fn with_self_pid(mut self, pid: Pid) -> Self {
        self.self_pid = Some(pid);
        self
    }

    /// Set how the viewer's projection treats sparse voting.
    #[must_use]
    pub fn with_self_compensation(mut self, policy: SparsityPolicy) -> Self {
        self.options.self_compensation = policy;
        self
    }

    /// Publish comment positions with each model.
    #[must_use]
    pub fn with_comment_projection(mut self, enabled: bool) -> Self {
        self.options.comment_projection = enabled;
        self
    }

    /// Set the command channel capacity.
    #[must_use]
    pub fn with_command_buffer(mut self, capacity: usize) -> Self {
        self.command_buffer = capacity;
        self
    }

    /// Check values a coordinator cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.conversation_id.is_empty() {
            return Err(Error::Config("conversation id is empty".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::Config("poll interval must be positive".to_string()));
        }
        if self.command_buffer == 0 {
            return Err(Error::Config("command buffer must be positive".to_string()));
        }
        Ok(())
    }
}

fn env_parsed<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("invalid {key}: {e}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PollingConfig::new("conv");
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.options.self_compensation, SparsityPolicy::CompensateSelf);
        assert!(!config.options.comment_projection);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builders_chain() {
        let config = PollingConfig::new("conv")
            .with_poll_interval(Duration::from_millis(250))
            .with_self_pid(Pid(4))
            .with_self_compensation(SparsityPolicy::RawSelf)
            .with_comment_projection(true);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.self_pid, Some(Pid(4)));
        assert_eq!(config.options.self_compensation, SparsityPolicy::RawSelf);
        assert!(config.options.comment_projection);
    }

    #[test]
    fn invalid_values_rejected() {
        assert!(PollingConfig::default().validate().is_err());
        assert!(PollingConfig::new("c")
            .with_poll_interval(Duration::ZERO)
            .validate()
            .is_err());
        assert!(PollingConfig::new("c").with_command_buffer(0).validate().is_err());
    }
}
