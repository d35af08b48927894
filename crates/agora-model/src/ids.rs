//! Participant, group and bucket identifiers.
//!
//! # Reserved bucket id ranges
//!
//! Server bucket ids live below [`PARTICIPANT_OF_INTEREST_BID_OFFSET`].
//! Synthetic buckets created on the client take ids from ranges above it:
//!
//! ```text
//! [0, 10^10)              server base buckets
//! [10^10, 2·10^10)        participants of interest (offset + pid)
//! [2·10^10, ...)          per-group summary buckets (offset + gid)
//! u64::MAX                the viewing participant
//! ```

use serde::{Deserialize, Serialize};

/// Offset added to a participant id to form the bucket id of a participant
/// of interest.
pub const PARTICIPANT_OF_INTEREST_BID_OFFSET: u64 = 10_000_000_000;

/// Offset added to a group id to form the bucket id of its summary bucket.
pub const SUMMARY_BUCKET_BID_OFFSET: u64 = 20_000_000_000;

/// Bucket id of the viewing participant when it is not a participant of
/// interest.
pub const SELF_BID: Bid = Bid(u64::MAX);

const _: () = assert!(PARTICIPANT_OF_INTEREST_BID_OFFSET < SUMMARY_BUCKET_BID_OFFSET);

/// Identifier of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pid(pub u64);

/// Identifier of an opinion group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gid(pub i64);

impl Gid {
    /// Group of buckets whose group could not be resolved.
    pub const UNGROUPED: Self = Self(-1);

    pub fn is_ungrouped(&self) -> bool {
        self.0 < 0
    }
}

/// Identifier of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bid(pub u64);

impl Pid {
    /// Whether the participant's synthetic bucket id stays inside the
    /// participant-of-interest range.
    pub fn fits_interest_range(&self) -> bool {
        self.0 < SUMMARY_BUCKET_BID_OFFSET - PARTICIPANT_OF_INTEREST_BID_OFFSET
    }
}

impl Bid {
    /// Bucket id of a participant of interest.
    pub fn for_participant_of_interest(pid: Pid) -> Self {
        debug_assert!(
            pid.fits_interest_range(),
            "participant {} overflows the participant-of-interest bucket range",
            pid.0
        );
        Self(PARTICIPANT_OF_INTEREST_BID_OFFSET + pid.0)
    }

    /// Bucket id of a group's summary bucket.
    pub fn for_summary(gid: Gid) -> Self {
        debug_assert!(!gid.is_ungrouped(), "ungrouped buckets have no summary");
        Self(SUMMARY_BUCKET_BID_OFFSET + gid.0.unsigned_abs())
    }

    /// Whether the id falls in a range reserved for synthetic buckets.
    pub fn is_reserved(&self) -> bool {
        self.0 >= PARTICIPANT_OF_INTEREST_BID_OFFSET
    }
}

macro_rules! display_inner {
    ($($ty:ty),*) => {
        $(impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        })*
    };
}

display_inner!(Pid, Gid, Bid);

/// Opaque version token of a projection payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MathTick(pub i64);
