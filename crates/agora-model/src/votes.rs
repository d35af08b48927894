//! Per-comment, per-bucket vote tallies.
//!
//! The matrix is rebuilt whole every cycle from the server's group tallies,
//! the decoded histories of participants of interest and the viewer's local
//! votes. It is dense over the comments seen in any source and the buckets
//! of the model, so every lookup inside that range is an explicit entry;
//! lookups outside it read as zero.

use std::collections::{BTreeMap, BTreeSet};

use agora_projection::{Tid, Vote, VoteValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::ids::{Bid, Gid};
use crate::payload::{GroupVotes, VoteCounts};

/// Agree, disagree and seen counts of one bucket on one comment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub agree: u64,
    pub disagree: u64,
    pub seen: u64,
}

impl VoteTally {
    /// Count one vote. A pass is seen without agreeing or disagreeing.
    pub fn record(&mut self, value: VoteValue) {
        self.seen += 1;
        match value {
            VoteValue::Agree => self.agree += 1,
            VoteValue::Disagree => self.disagree += 1,
            VoteValue::Pass => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        self.seen == 0 && self.agree == 0 && self.disagree == 0
    }
}

impl From<VoteCounts> for VoteTally {
    fn from(counts: VoteCounts) -> Self {
        Self {
            agree: counts.agree,
            disagree: counts.disagree,
            seen: counts.seen,
        }
    }
}

/// Compiled `(tid, bid) → tally` lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoteMatrix {
    entries: BTreeMap<Tid, BTreeMap<Bid, VoteTally>>,
}

impl VoteMatrix {
    /// Tally of a bucket on a comment; zero when unknown.
    pub fn get(&self, tid: Tid, bid: Bid) -> VoteTally {
        self.entries
            .get(&tid)
            .and_then(|row| row.get(&bid))
            .copied()
            .unwrap_or_default()
    }

    /// Every bucket's tally on one comment.
    pub fn for_comment(&self, tid: Tid) -> Option<&BTreeMap<Bid, VoteTally>> {
        self.entries.get(&tid)
    }

    pub fn tids(&self) -> impl Iterator<Item = Tid> + '_ {
        self.entries.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Accumulates tallies from every source, then zero-fills.
#[derive(Debug, Default)]
pub struct VoteMatrixCompiler {
    entries: BTreeMap<Tid, BTreeMap<Bid, VoteTally>>,
}

impl VoteMatrixCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit each group's server tallies to its summary bucket.
    ///
    /// A group with tallies but no cluster means the payload disagrees with
    /// itself and is rejected.
    pub fn add_group_votes(
        &mut self,
        group_votes: &BTreeMap<Gid, GroupVotes>,
        summary_bids: &BTreeMap<Gid, Bid>,
    ) -> Result<()> {
        for (gid, group) in group_votes {
            let bid = summary_bids.get(gid).copied().ok_or_else(|| {
                Error::MalformedPayload(format!("group-votes names unknown group {gid}"))
            })?;
            for (&tid, &counts) in &group.votes {
                *self.entry(tid, bid) = counts.into();
            }
        }
        Ok(())
    }

    /// Add one participant's individual votes under their bucket.
    pub fn add_participant<'v, I>(&mut self, bid: Bid, votes: I)
    where
        I: IntoIterator<Item = &'v Vote>,
    {
        for vote in votes {
            self.entry(vote.tid, bid).record(vote.value);
        }
    }

    /// Zero-fill over every comment seen and every bucket given, dropping
    /// tallies of buckets that are not in the model.
    pub fn finish<I>(mut self, bids: I) -> VoteMatrix
    where
        I: IntoIterator<Item = Bid>,
    {
        let bids: BTreeSet<Bid> = bids.into_iter().collect();
        for row in self.entries.values_mut() {
            row.retain(|bid, _| bids.contains(bid));
            for &bid in &bids {
                row.entry(bid).or_default();
            }
        }
        debug!(
            comments = self.entries.len(),
            buckets = bids.len(),
            "Compiled vote matrix"
        );
        VoteMatrix {
            entries: self.entries,
        }
    }

    fn entry(&mut self, tid: Tid, bid: Bid) -> &mut VoteTally {
        self.entries.entry(tid).or_default().entry(bid).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::fixtures::payload;

    fn summary_bids() -> BTreeMap<Gid, Bid> {
        [Gid(0), Gid(1)]
            .into_iter()
            .map(|gid| (gid, Bid::for_summary(gid)))
            .collect()
    }

    #[test]
    fn union_of_comments_is_dense() {
        let mut compiler = VoteMatrixCompiler::new();
        compiler
            .add_group_votes(&payload().group_votes, &summary_bids())
            .unwrap();
        let matrix = compiler.finish(summary_bids().into_values());

        // Group 0 never saw comment 2, group 1 never saw comment 1.
        assert_eq!(matrix.tids().collect::<Vec<_>>(), vec![Tid(0), Tid(1), Tid(2)]);
        for tid in matrix.tids() {
            assert_eq!(matrix.for_comment(tid).unwrap().len(), 2);
        }
        assert!(matrix.get(Tid(2), Bid::for_summary(Gid(0))).is_empty());
        assert_eq!(
            matrix.get(Tid(0), Bid::for_summary(Gid(1))),
            VoteTally { agree: 0, disagree: 5, seen: 6 }
        );
    }

    #[test]
    fn participant_votes_are_tallied() {
        let mut compiler = VoteMatrixCompiler::new();
        let bid = Bid(10_000_000_001);
        compiler.add_participant(bid, &[Vote::agree(4), Vote::pass(5), Vote::disagree(6)]);
        let matrix = compiler.finish([bid]);

        assert_eq!(matrix.get(Tid(4), bid), VoteTally { agree: 1, disagree: 0, seen: 1 });
        assert_eq!(matrix.get(Tid(5), bid), VoteTally { agree: 0, disagree: 0, seen: 1 });
        assert_eq!(matrix.get(Tid(6), bid).disagree, 1);
    }

    #[test]
    fn unknown_lookup_reads_zero() {
        let matrix = VoteMatrixCompiler::new().finish([Bid(1)]);
        assert_eq!(matrix.get(Tid(99), Bid(1)), VoteTally::default());
    }

    #[test]
    fn buckets_outside_model_are_dropped() {
        let mut compiler = VoteMatrixCompiler::new();
        compiler.add_participant(Bid(1), &[Vote::agree(0)]);
        compiler.add_participant(Bid(2), &[Vote::agree(0)]);
        let matrix = compiler.finish([Bid(2), Bid(3)]);
        let row = matrix.for_comment(Tid(0)).unwrap();
        assert_eq!(row.keys().copied().collect::<Vec<_>>(), vec![Bid(2), Bid(3)]);
    }

    #[test]
    fn group_votes_for_unknown_group_rejected() {
        let mut bids = summary_bids();
        bids.remove(&Gid(1));
        let mut compiler = VoteMatrixCompiler::new();
        assert!(matches!(
            compiler.add_group_votes(&payload().group_votes, &bids),
            Err(Error::MalformedPayload(_))
        ));
    }
}
