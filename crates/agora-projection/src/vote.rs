//! Comment identifiers and vote values.

/// Identifier of a comment (statement) in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(transparent))]
pub struct Tid(pub u64);

impl std::fmt::Display for Tid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A participant's reaction to a comment.
///
/// On the wire a vote is the integer `1` (agree), `-1` (disagree) or `0`
/// (pass).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "i8", into = "i8")
)]
pub enum VoteValue {
    Disagree,
    Pass,
    Agree,
}

impl VoteValue {
    /// Numeric value used by the projection.
    pub const fn as_f64(self) -> f64 {
        match self {
            VoteValue::Disagree => -1.0,
            VoteValue::Pass => 0.0,
            VoteValue::Agree => 1.0,
        }
    }
}

impl From<VoteValue> for i8 {
    fn from(value: VoteValue) -> Self {
        match value {
            VoteValue::Disagree => -1,
            VoteValue::Pass => 0,
            VoteValue::Agree => 1,
        }
    }
}

/// Rejected integer vote value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidVoteValue(pub i8);

impl std::fmt::Display for InvalidVoteValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid vote value {} (expected -1, 0 or 1)", self.0)
    }
}

impl std::error::Error for InvalidVoteValue {}

impl TryFrom<i8> for VoteValue {
    type Error = InvalidVoteValue;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(VoteValue::Disagree),
            0 => Ok(VoteValue::Pass),
            1 => Ok(VoteValue::Agree),
            other => Err(InvalidVoteValue(other)),
        }
    }
}

/// A single vote on a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vote {
    pub tid: Tid,
    #[cfg_attr(feature = "serde", serde(rename = "vote"))]
    pub value: VoteValue,
}

impl Vote {
    pub const fn new(tid: Tid, value: VoteValue) -> Self {
        Self { tid, value }
    }

    pub const fn agree(tid: u64) -> Self {
        Self::new(Tid(tid), VoteValue::Agree)
    }

    pub const fn disagree(tid: u64) -> Self {
        Self::new(Tid(tid), VoteValue::Disagree)
    }

    pub const fn pass(tid: u64) -> Self {
        Self::new(Tid(tid), VoteValue::Pass)
    }
}
