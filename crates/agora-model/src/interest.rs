//! Participants of interest: distinguished participants rendered on their own.
//!
//! They arrive from a feed separate from the projection payload, keyed by
//! participant id, each with a compact vote history code.

use std::collections::BTreeMap;

use agora_projection::{Tid, Vote, VoteValue};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ids::{Bid, Pid};

/// One entry of the participant-of-interest feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterestEntry {
    /// Vote history code, see [`VoteHistory`]
    #[serde(default)]
    pub votes: String,
    /// Display picture reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default)]
    pub priority: i64,
}

/// The participant-of-interest feed as published.
pub type InterestFeed = BTreeMap<Pid, InterestEntry>;

/// Compact per-comment vote history.
///
/// The character at index `i` is the participant's vote on comment `i`:
///
/// | code | meaning  |
/// |------|----------|
/// | `a`  | agree    |
/// | `d`  | disagree |
/// | `p`  | pass     |
/// | else | unseen   |
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoteHistory(String);

impl VoteHistory {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the seen comments into votes, in tid order.
    pub fn decode(&self) -> Vec<Vote> {
        self.0
            .chars()
            .enumerate()
            .filter_map(|(i, code)| {
                let value = match code {
                    'a' => VoteValue::Agree,
                    'd' => VoteValue::Disagree,
                    'p' => VoteValue::Pass,
                    _ => return None,
                };
                Some(Vote::new(Tid(i as u64), value))
            })
            .collect()
    }
}

/// A participant of interest ready to be merged into the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantOfInterest {
    pub pid: Pid,
    pub history: VoteHistory,
    pub picture: Option<String>,
    pub priority: i64,
}

impl ParticipantOfInterest {
    pub fn new(pid: Pid, history: VoteHistory) -> Self {
        Self {
            pid,
            history,
            picture: None,
            priority: 0,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_picture(mut self, picture: impl Into<String>) -> Self {
        self.picture = Some(picture.into());
        self
    }

    /// Synthetic bucket id, offset out of the server's range.
    pub fn bid(&self) -> Bid {
        Bid::for_participant_of_interest(self.pid)
    }

    /// Convert a feed into participants, in ascending pid order.
    ///
    /// Participants whose id has no room in the synthetic bucket range are
    /// skipped.
    pub fn from_feed(feed: &InterestFeed) -> Vec<Self> {
        feed.iter()
            .filter(|(pid, _)| {
                let fits = pid.fits_interest_range();
                if !fits {
                    warn!(pid = %pid, "Participant of interest id out of range, skipping");
                }
                fits
            })
            .map(|(&pid, entry)| Self {
                pid,
                history: VoteHistory::new(entry.votes.clone()),
                picture: entry.picture.clone(),
                priority: entry.priority,
            })
            .collect()
    }
}
