//! Placing the viewer and participants of interest among the buckets.
//!
//! Both are projected on the client from individual vote sets and rendered
//! as buckets of their own. The server still counts them inside its base
//! buckets, so the same person must be deducted there exactly once.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::str::FromStr;

use agora_projection::{project, Compensation, Position, ProjectionBasis, Tid};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::bucket::{Bucket, Cluster};
use crate::cache::LocalVotes;
use crate::ids::{Bid, Gid, Pid, SELF_BID};
use crate::interest::ParticipantOfInterest;

/// How the viewer's own projection treats sparse voting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SparsityPolicy {
    /// Scale the viewer like everyone else
    #[default]
    CompensateSelf,
    /// Show the viewer's raw projection
    RawSelf,
}

impl FromStr for SparsityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compensate" | "compensate_self" | "on" | "true" | "1" => Ok(Self::CompensateSelf),
            "raw" | "raw_self" | "off" | "false" | "0" => Ok(Self::RawSelf),
            other => Err(format!("unknown sparsity policy: {other}")),
        }
    }
}

/// Who the viewer is and which participants are of interest this cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identities {
    /// `None` while the viewer has not been assigned a participant id
    self_pid: Option<Pid>,
    interest: BTreeSet<Pid>,
}

impl Identities {
    pub fn new(self_pid: Option<Pid>, participants: &[ParticipantOfInterest]) -> Self {
        Self {
            self_pid,
            interest: participants.iter().map(|p| p.pid).collect(),
        }
    }

    pub fn self_pid(&self) -> Option<Pid> {
        self.self_pid
    }

    pub fn is_interest(&self, pid: Pid) -> bool {
        self.interest.contains(&pid)
    }

    /// Rendered individually, so deducted from the server's counts.
    pub fn is_tracked(&self, pid: Pid) -> bool {
        self.self_pid == Some(pid) || self.is_interest(pid)
    }

    /// The bucket that carries the viewer.
    pub fn self_bid(&self) -> Bid {
        match self.self_pid {
            Some(pid) if self.is_interest(pid) => Bid::for_participant_of_interest(pid),
            _ => SELF_BID,
        }
    }
}

/// Projects and places the viewer and participants of interest.
pub struct SelfAndInterestMerger<'a> {
    basis: &'a ProjectionBasis,
    excluded: &'a HashSet<Tid>,
    local_votes: &'a LocalVotes,
    identities: &'a Identities,
    placements: &'a BTreeMap<Pid, Gid>,
    policy: SparsityPolicy,
}

impl<'a> SelfAndInterestMerger<'a> {
    pub fn new(
        basis: &'a ProjectionBasis,
        excluded: &'a HashSet<Tid>,
        local_votes: &'a LocalVotes,
        identities: &'a Identities,
        placements: &'a BTreeMap<Pid, Gid>,
    ) -> Self {
        Self {
            basis,
            excluded,
            local_votes,
            identities,
            placements,
            policy: SparsityPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: SparsityPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The viewer's position from their local votes.
    pub fn project_self(&self) -> Position {
        project(
            &self.local_votes.to_votes(),
            self.excluded,
            self.basis,
            self.self_compensation(),
        )
    }

    fn self_compensation(&self) -> Compensation {
        // An unassigned viewer has no votes worth scaling.
        if self.identities.self_pid().is_none() {
            return Compensation::Skip;
        }
        match self.policy {
            SparsityPolicy::CompensateSelf => Compensation::Apply,
            SparsityPolicy::RawSelf => Compensation::Skip,
        }
    }

    /// Add one bucket per participant of interest and re-anchor summary
    /// buckets at the mean of their group's participants of interest.
    ///
    /// A participant already present is left alone. A participant who is
    /// also the viewer is projected from the local votes and carries the
    /// viewer flag.
    pub fn merge_interest_participants(
        &self,
        buckets: &mut Vec<Bucket>,
        clusters: &[Cluster],
        participants: &[ParticipantOfInterest],
    ) {
        let centers: BTreeMap<Gid, Position> = clusters.iter().map(|c| (c.gid, c.center)).collect();

        for participant in participants {
            let bid = participant.bid();
            if buckets.iter().any(|b| b.bid == bid) {
                continue;
            }

            let contains_self = self.identities.self_pid() == Some(participant.pid);
            let position = if contains_self {
                self.project_self()
            } else {
                project(
                    &participant.history.decode(),
                    self.excluded,
                    self.basis,
                    Compensation::Apply,
                )
            };
            let gid = self
                .placements
                .get(&participant.pid)
                .copied()
                .filter(|gid| centers.contains_key(gid))
                .unwrap_or(Gid::UNGROUPED);

            trace!(pid = %participant.pid, gid = %gid, x = position.x, y = position.y, "Placed participant of interest");
            buckets.push(Bucket::participant_of_interest(
                participant,
                gid,
                position,
                contains_self,
            ));
        }

        let mut anchors: BTreeMap<Gid, Vec<Position>> = BTreeMap::new();
        for bucket in buckets.iter().filter(|b| b.is_participant_of_interest) {
            if !bucket.gid.is_ungrouped() {
                anchors.entry(bucket.gid).or_default().push(bucket.proj);
            }
        }

        for summary in buckets.iter_mut().filter(|b| b.is_summary_bucket) {
            let fallback = centers.get(&summary.gid).copied().unwrap_or(summary.proj);
            summary.proj = anchors
                .get(&summary.gid)
                .and_then(|positions| Position::mean(positions.iter().copied()))
                .unwrap_or(fallback);
        }
    }

    /// Insert the viewer's bucket at the front. Does nothing when a bucket
    /// already carries the viewer.
    pub fn with_self(&self, buckets: &mut Vec<Bucket>) {
        if buckets.iter().any(|b| b.contains_self) {
            return;
        }
        let gid = self
            .identities
            .self_pid()
            .and_then(|pid| self.placements.get(&pid).copied())
            .unwrap_or(Gid::UNGROUPED);
        buckets.insert(0, Bucket::viewer(gid, self.project_self()));
    }

    /// Remove the viewer and participants of interest from the base buckets
    /// the server placed them in.
    ///
    /// Each participant is deducted at most once across all buckets, even
    /// when listed twice or when called again on the same buckets. Counts
    /// never go below zero. Returns the group each tracked participant was
    /// found in.
    pub fn deduplicate_counts(buckets: &mut [Bucket], identities: &Identities) -> BTreeMap<Pid, Gid> {
        let mut placements = BTreeMap::new();
        let mut deducted: BTreeSet<Pid> = buckets
            .iter()
            .flat_map(|b| b.deducted.iter().copied())
            .collect();

        for bucket in buckets.iter_mut() {
            for &pid in &bucket.members {
                if !identities.is_tracked(pid) {
                    continue;
                }
                placements.entry(pid).or_insert(bucket.gid);
                if !deducted.insert(pid) {
                    continue;
                }
                bucket.count = bucket.count.saturating_sub(1);
                bucket.deducted.push(pid);
            }
        }

        placements
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interest::VoteHistory;
    use agora_projection::{Vote, VoteValue};

    fn basis() -> ProjectionBasis {
        ProjectionBasis::new()
            .with_comment(Tid(0), 0.0, 1.0, 0.0)
            .with_comment(Tid(1), 0.0, 0.0, 1.0)
            .with_comment(Tid(2), 0.0, 1.0, 1.0)
            .with_comment(Tid(3), 0.0, -1.0, 0.0)
    }

    fn grouped(bid: u64, gid: i64, count: u64, members: &[u64]) -> Bucket {
        Bucket::base(Bid(bid), count, Position::ORIGIN)
            .in_group(Gid(gid))
            .with_members(members.iter().copied().map(Pid).collect())
    }

    fn cluster(gid: i64, center: Position) -> Cluster {
        Cluster {
            gid: Gid(gid),
            center,
            members: Vec::new(),
            count: 0,
        }
    }

    #[test]
    fn deduction_happens_once_per_participant() {
        let people = [ParticipantOfInterest::new(Pid(7), VoteHistory::default())];
        let identities = Identities::new(Some(Pid(3)), &people);
        let mut buckets = vec![grouped(1, 0, 2, &[3, 7]), grouped(2, 0, 1, &[7])];

        let placements = SelfAndInterestMerger::deduplicate_counts(&mut buckets, &identities);
        assert_eq!(buckets[0].count, 0);
        assert_eq!(buckets[1].count, 1);
        assert_eq!(placements.get(&Pid(3)), Some(&Gid(0)));

        // A second pass leaves counts alone.
        SelfAndInterestMerger::deduplicate_counts(&mut buckets, &identities);
        assert_eq!(buckets[0].count, 0);
        assert_eq!(buckets[1].count, 1);
    }

    #[test]
    fn deduction_saturates() {
        let identities = Identities::new(Some(Pid(1)), &[]);
        let mut buckets = vec![grouped(1, 0, 0, &[1])];
        SelfAndInterestMerger::deduplicate_counts(&mut buckets, &identities);
        assert_eq!(buckets[0].count, 0);
    }

    #[test]
    fn self_bid_follows_interest_membership() {
        let people = [ParticipantOfInterest::new(Pid(4), VoteHistory::default())];
        assert_eq!(Identities::new(Some(Pid(4)), &people).self_bid(), Bid(10_000_000_004));
        assert_eq!(Identities::new(Some(Pid(5)), &people).self_bid(), SELF_BID);
        assert_eq!(Identities::default().self_bid(), SELF_BID);
    }

    #[test]
    fn with_self_is_idempotent() {
        let basis = basis();
        let excluded = HashSet::new();
        let mut local = LocalVotes::default();
        local.record(Vote::agree(0));
        let identities = Identities::new(Some(Pid(1)), &[]);
        let placements = BTreeMap::from([(Pid(1), Gid(2))]);
        let merger = SelfAndInterestMerger::new(&basis, &excluded, &local, &identities, &placements);

        let mut buckets = vec![grouped(9, 2, 3, &[])];
        merger.with_self(&mut buckets);
        merger.with_self(&mut buckets);

        assert_eq!(buckets.iter().filter(|b| b.contains_self).count(), 1);
        assert_eq!(buckets[0].bid, SELF_BID);
        assert_eq!(buckets[0].gid, Gid(2));
        // One vote out of four comments: factor 2.
        assert_eq!(buckets[0].proj, Position::new(2.0, 0.0));
    }

    #[test]
    fn raw_policy_skips_compensation() {
        let basis = basis();
        let excluded = HashSet::new();
        let mut local = LocalVotes::default();
        local.record(Vote::agree(0));
        let identities = Identities::new(Some(Pid(1)), &[]);
        let placements = BTreeMap::new();
        let merger = SelfAndInterestMerger::new(&basis, &excluded, &local, &identities, &placements)
            .with_policy(SparsityPolicy::RawSelf);
        assert_eq!(merger.project_self(), Position::new(1.0, 0.0));
    }

    #[test]
    fn unassigned_viewer_is_not_compensated() {
        let basis = basis();
        let excluded = HashSet::new();
        let mut local = LocalVotes::default();
        local.record(Vote::agree(0));
        let identities = Identities::default();
        let placements = BTreeMap::new();
        let merger = SelfAndInterestMerger::new(&basis, &excluded, &local, &identities, &placements);
        assert_eq!(merger.project_self(), Position::new(1.0, 0.0));
    }

    #[test]
    fn summary_anchored_at_mean_of_interest_participants() {
        let basis = basis();
        let excluded = HashSet::new();
        let local = LocalVotes::default();
        let people = [
            // agree on 0 of 4 comments: (1, 0) * 2
            ParticipantOfInterest::new(Pid(10), VoteHistory::new("a")),
            // agree on 1 of 4 comments: (0, 1) * 2
            ParticipantOfInterest::new(Pid(11), VoteHistory::new("-a")),
        ];
        let identities = Identities::new(None, &people);
        let placements = BTreeMap::from([(Pid(10), Gid(0)), (Pid(11), Gid(0))]);
        let merger = SelfAndInterestMerger::new(&basis, &excluded, &local, &identities, &placements);

        let clusters = [cluster(0, Position::new(5.0, 5.0)), cluster(1, Position::new(-5.0, 0.0))];
        let mut buckets = vec![
            Bucket::summary(Gid(0), Position::new(5.0, 5.0)),
            Bucket::summary(Gid(1), Position::new(-5.0, 0.0)),
        ];
        merger.merge_interest_participants(&mut buckets, &clusters, &people);

        assert_eq!(buckets.len(), 4);
        assert_eq!(buckets[0].proj, Position::new(1.0, 1.0));
        assert_eq!(buckets[1].proj, Position::new(-5.0, 0.0));

        let poi = buckets.iter().find(|b| b.pid == Some(Pid(11))).unwrap();
        assert_eq!(poi.bid, Bid(10_000_000_011));
        assert_eq!(poi.count, 1);
        assert_eq!(poi.proj, Position::new(0.0, 2.0));

        // Merging again adds nothing.
        merger.merge_interest_participants(&mut buckets, &clusters, &people);
        assert_eq!(buckets.len(), 4);
    }

    #[test]
    fn viewer_who_is_of_interest_uses_local_votes() {
        let basis = basis();
        let excluded = HashSet::new();
        let mut local = LocalVotes::default();
        local.record(Vote::new(Tid(3), VoteValue::Agree));
        let people = [ParticipantOfInterest::new(Pid(10), VoteHistory::new("a")).with_priority(3)];
        let identities = Identities::new(Some(Pid(10)), &people);
        let placements = BTreeMap::new();
        let merger = SelfAndInterestMerger::new(&basis, &excluded, &local, &identities, &placements);

        let mut buckets = Vec::new();
        merger.merge_interest_participants(&mut buckets, &[], &people);
        merger.with_self(&mut buckets);

        assert_eq!(buckets.len(), 1);
        assert!(buckets[0].contains_self);
        assert!(buckets[0].is_participant_of_interest);
        assert_eq!(buckets[0].proj, Position::new(-2.0, 0.0));
        assert_eq!(buckets[0].gid, Gid::UNGROUPED);
    }

    #[test]
    fn policy_parses() {
        assert_eq!("raw".parse::<SparsityPolicy>(), Ok(SparsityPolicy::RawSelf));
        assert_eq!("ON".parse::<SparsityPolicy>(), Ok(SparsityPolicy::CompensateSelf));
        assert!("sideways".parse::<SparsityPolicy>().is_err());
    }
}
