//! Buckets and clusters: the renderable aggregate of the opinion map.
//!
//! A bucket is a point standing for one or more participants. The server
//! publishes fine-grained base buckets; the client folds each group's base
//! buckets into a single summary bucket so the number of rendered points
//! stays bounded, and renders participants of interest and the viewer as
//! buckets of their own.
//!
//! Buckets are rebuilt from the payload every refresh cycle and never
//! carried over.

use std::collections::BTreeMap;

use agora_projection::Position;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::ids::{Bid, Gid, Pid, SELF_BID};
use crate::interest::ParticipantOfInterest;
use crate::merge::{Identities, SelfAndInterestMerger};
use crate::payload::{BaseClusters, GroupCluster, MathPayload};

/// Render priority of the viewer's bucket; nothing is drawn above it.
pub const SELF_PRIORITY: i64 = i64::MAX;

/// Highest priority a participant of interest can take from the feed.
pub const MAX_INTEREST_PRIORITY: i64 = SELF_PRIORITY - 1;

/// An aggregated point in the opinion map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub bid: Bid,
    pub gid: Gid,
    pub count: u64,
    pub priority: i64,
    pub proj: Position,
    pub contains_self: bool,
    pub is_participant_of_interest: bool,
    pub is_summary_bucket: bool,

    /// Base buckets folded into a summary bucket
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constituents: Vec<Bid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<Pid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,

    /// Participants the server placed in this base bucket
    #[serde(skip)]
    pub(crate) members: Vec<Pid>,

    /// Members already removed from `count` this cycle
    #[serde(skip)]
    pub(crate) deducted: Vec<Pid>,
}

impl Bucket {
    /// A base bucket as published by the server.
    pub fn base(bid: Bid, count: u64, proj: Position) -> Self {
        Self {
            bid,
            gid: Gid::UNGROUPED,
            count,
            priority: 0,
            proj,
            contains_self: false,
            is_participant_of_interest: false,
            is_summary_bucket: false,
            constituents: Vec::new(),
            pid: None,
            picture: None,
            members: Vec::new(),
            deducted: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_members(mut self, members: Vec<Pid>) -> Self {
        self.members = members;
        self
    }

    #[must_use]
    pub fn in_group(mut self, gid: Gid) -> Self {
        self.gid = gid;
        self
    }

    /// An empty summary bucket for a group, anchored at its centre.
    pub fn summary(gid: Gid, center: Position) -> Self {
        Self {
            is_summary_bucket: true,
            ..Self::base(Bid::for_summary(gid), 0, center).in_group(gid)
        }
    }

    /// The viewer's own bucket.
    pub fn viewer(gid: Gid, proj: Position) -> Self {
        Self {
            priority: SELF_PRIORITY,
            contains_self: true,
            ..Self::base(SELF_BID, 1, proj).in_group(gid)
        }
    }

    /// A participant of interest rendered on their own.
    pub fn participant_of_interest(
        participant: &ParticipantOfInterest,
        gid: Gid,
        proj: Position,
        contains_self: bool,
    ) -> Self {
        Self {
            priority: if contains_self {
                SELF_PRIORITY
            } else {
                participant.priority.min(MAX_INTEREST_PRIORITY)
            },
            contains_self,
            is_participant_of_interest: true,
            pid: Some(participant.pid),
            picture: participant.picture.clone(),
            ..Self::base(participant.bid(), 1, proj).in_group(gid)
        }
    }

    /// Empty buckets are hidden unless they carry the viewer.
    pub fn is_renderable(&self) -> bool {
        self.count > 0 || self.contains_self
    }

    pub fn members(&self) -> &[Pid] {
        &self.members
    }

    /// A base bucket whose single member is rendered as a participant of
    /// interest. It is dropped rather than summarized.
    fn is_interest_shell(&self, identities: &Identities) -> bool {
        match (self.members.as_slice(), self.deducted.as_slice()) {
            ([member], [deducted]) => {
                self.count == 0 && member == deducted && identities.is_interest(*deducted)
            }
            _ => false,
        }
    }
}

/// An opinion group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub gid: Gid,
    pub center: Position,
    /// Rendered member buckets, in render order
    pub members: Vec<Bid>,
    /// Participants the server counts in the group: the reported group size
    /// when present, else the sum of its base buckets
    pub count: u64,
}

/// Output of [`BucketModel::ingest`].
#[derive(Debug, Clone, Default)]
pub struct Ingested {
    pub buckets: Vec<Bucket>,
    pub clusters: Vec<Cluster>,
    /// Group each deducted self/participant-of-interest was found in
    pub placements: BTreeMap<Pid, Gid>,
}

/// Turns a payload into summary buckets and clusters.
pub struct BucketModel;

impl BucketModel {
    /// Build this cycle's buckets and clusters from a payload.
    ///
    /// 1. Map base buckets to groups from cluster membership.
    /// 2. Convert the base-cluster arrays into bucket records.
    /// 3. Deduct the viewer and participants of interest from the buckets
    ///    that hold them.
    /// 4. Fold every grouped bucket into its group's summary bucket, dropping
    ///    shells left empty by participants of interest.
    /// 5. Ungrouped buckets stay individual at their server position.
    ///
    /// When a group's reported size disagrees with its base buckets, the
    /// reported size wins and the summary bucket absorbs the difference.
    pub fn ingest(payload: &MathPayload, identities: &Identities) -> Result<Ingested> {
        let groups = Self::group_centers(&payload.group_clusters)?;
        let bid_to_gid = Self::bid_to_gid(&payload.group_clusters);
        let mut buckets = Self::base_buckets(&payload.base_clusters, &bid_to_gid)?;

        let mut group_totals: BTreeMap<Gid, u64> = BTreeMap::new();
        for bucket in buckets.iter().filter(|b| !b.gid.is_ungrouped()) {
            *group_totals.entry(bucket.gid).or_default() += bucket.count;
        }

        let placements = SelfAndInterestMerger::deduplicate_counts(&mut buckets, identities);

        let mut summaries: BTreeMap<Gid, Bucket> = groups
            .iter()
            .map(|(&gid, &center)| (gid, Bucket::summary(gid, center)))
            .collect();
        let mut ungrouped = Vec::new();
        let mut shells = 0usize;

        for bucket in buckets {
            if bucket.is_interest_shell(identities) {
                trace!(bid = %bucket.bid, "Dropping participant-of-interest shell");
                shells += 1;
                continue;
            }
            match summaries.get_mut(&bucket.gid) {
                Some(summary) => {
                    summary.count += bucket.count;
                    summary.constituents.push(bucket.bid);
                }
                None => ungrouped.push(bucket),
            }
        }

        let mut clusters = Vec::with_capacity(groups.len());
        for (&gid, &center) in &groups {
            let base_total = group_totals.get(&gid).copied().unwrap_or(0);
            let reported = payload.group_votes.get(&gid).and_then(|v| v.n_members);
            let count = reported.unwrap_or(base_total);
            if count != base_total {
                warn!(gid = %gid, reported = count, base = base_total, "Group size disagrees with its base buckets");
                if let Some(summary) = summaries.get_mut(&gid) {
                    summary.count = (summary.count + count).saturating_sub(base_total);
                }
            }
            clusters.push(Cluster {
                gid,
                center,
                members: vec![Bid::for_summary(gid)],
                count,
            });
        }

        debug!(
            groups = summaries.len(),
            ungrouped = ungrouped.len(),
            shells,
            placed = placements.len(),
            "Ingested projection payload"
        );

        let mut out: Vec<Bucket> = summaries.into_values().collect();
        out.extend(ungrouped);

        Ok(Ingested {
            buckets: out,
            clusters,
            placements,
        })
    }

    /// Drop hidden buckets, order for rendering and refresh cluster membership.
    pub fn finish(mut buckets: Vec<Bucket>, clusters: &mut [Cluster]) -> Vec<Bucket> {
        buckets.retain(Bucket::is_renderable);
        Self::sort_for_render(&mut buckets);
        for cluster in clusters.iter_mut() {
            cluster.members = buckets
                .iter()
                .filter(|b| b.gid == cluster.gid)
                .map(|b| b.bid)
                .collect();
        }
        buckets
    }

    /// Order buckets with the viewer first, then by descending priority,
    /// ties by ascending bid.
    ///
    /// Later buckets are drawn on top of earlier ones by renderers that
    /// paint in reverse, so the viewer is never occluded.
    pub fn sort_for_render(buckets: &mut [Bucket]) {
        buckets.sort_by(|a, b| {
            b.contains_self
                .cmp(&a.contains_self)
                .then(b.priority.cmp(&a.priority))
                .then(a.bid.cmp(&b.bid))
        });
    }

    fn group_centers(groups: &[GroupCluster]) -> Result<BTreeMap<Gid, Position>> {
        let mut centers = BTreeMap::new();
        for group in groups {
            if group.id.is_ungrouped() {
                return Err(Error::MalformedPayload(format!(
                    "group id {} is reserved for ungrouped buckets",
                    group.id
                )));
            }
            if centers.insert(group.id, group.center_position()?).is_some() {
                return Err(Error::MalformedPayload(format!(
                    "group {} reported twice",
                    group.id
                )));
            }
        }
        Ok(centers)
    }

    fn bid_to_gid(groups: &[GroupCluster]) -> BTreeMap<Bid, Gid> {
        let mut map = BTreeMap::new();
        for group in groups {
            for &bid in &group.members {
                if let Some(previous) = map.insert(bid, group.id) {
                    warn!(bid = %bid, first = %previous, second = %group.id, "Bucket listed in two groups");
                }
            }
        }
        map
    }

    fn base_buckets(base: &BaseClusters, bid_to_gid: &BTreeMap<Bid, Gid>) -> Result<Vec<Bucket>> {
        let len = base.validated_len()?;
        let mut buckets = Vec::with_capacity(len);

        for i in 0..len {
            let bid = base.id[i];
            debug_assert!(
                !bid.is_reserved(),
                "server bucket id {bid} collides with a reserved synthetic range"
            );
            if bid.is_reserved() {
                return Err(Error::MalformedPayload(format!(
                    "server bucket id {bid} is in a reserved range"
                )));
            }

            let gid = bid_to_gid.get(&bid).copied().unwrap_or(Gid::UNGROUPED);
            let members = base
                .members
                .as_ref()
                .map(|members| members[i].clone())
                .unwrap_or_default();

            buckets.push(
                Bucket::base(bid, base.count[i], Position::new(base.x[i], base.y[i]))
                    .in_group(gid)
                    .with_members(members),
            );
        }

        Ok(buckets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interest::VoteHistory;
    use crate::payload::fixtures::payload;

    fn nobody() -> Identities {
        Identities::new(None, &[])
    }

    fn summary(ingested: &Ingested, gid: i64) -> &Bucket {
        ingested
            .buckets
            .iter()
            .find(|b| b.is_summary_bucket && b.gid == Gid(gid))
            .unwrap()
    }

    #[test]
    fn one_summary_per_group_plus_ungrouped() {
        let ingested = BucketModel::ingest(&payload(), &nobody()).unwrap();
        assert_eq!(ingested.buckets.len(), 3);
        assert_eq!(summary(&ingested, 0).count, 4);
        assert_eq!(summary(&ingested, 1).count, 6);
        assert_eq!(summary(&ingested, 0).constituents, vec![Bid(1), Bid(2)]);

        let loose = ingested.buckets.iter().find(|b| b.bid == Bid(5)).unwrap();
        assert_eq!(loose.gid, Gid::UNGROUPED);
        assert_eq!(loose.proj, Position::new(0.0, 3.0));
    }

    #[test]
    fn summary_starts_at_cluster_centre() {
        let ingested = BucketModel::ingest(&payload(), &nobody()).unwrap();
        assert_eq!(summary(&ingested, 1).proj, Position::new(-1.6, -0.4));
        assert_eq!(ingested.clusters[0].count, 4);
        assert_eq!(ingested.clusters[1].members, vec![Bid::for_summary(Gid(1))]);
    }

    #[test]
    fn mismatched_arrays_are_fatal() {
        let mut p = payload();
        p.base_clusters.count.pop();
        assert!(matches!(
            BucketModel::ingest(&p, &nobody()),
            Err(Error::LengthMismatch { field: "base-clusters.count", .. })
        ));
    }

    #[test]
    fn malformed_group_centre_rejected() {
        let mut p = payload();
        p.group_clusters[0].center = vec![1.0];
        assert!(matches!(
            BucketModel::ingest(&p, &nobody()),
            Err(Error::MalformedPayload(_))
        ));
    }

    #[test]
    fn interest_shell_dropped_not_summarized() {
        // pid 20 is alone in bucket 2.
        let people = [ParticipantOfInterest::new(Pid(20), VoteHistory::new("a"))];
        let ingested = BucketModel::ingest(&payload(), &Identities::new(None, &people)).unwrap();

        let group = summary(&ingested, 0);
        assert_eq!(group.count, 3);
        assert_eq!(group.constituents, vec![Bid(1)]);
        assert_eq!(ingested.placements.get(&Pid(20)), Some(&Gid(0)));
    }

    #[test]
    fn bucket_of_several_interest_participants_is_summarized() {
        let people = [
            ParticipantOfInterest::new(Pid(30), VoteHistory::new("a")),
            ParticipantOfInterest::new(Pid(31), VoteHistory::new("d")),
        ];
        let ingested = BucketModel::ingest(&payload(), &Identities::new(None, &people)).unwrap();

        let group = summary(&ingested, 1);
        assert_eq!(group.count, 4);
        assert_eq!(group.constituents, vec![Bid(3), Bid(4)]);
    }

    #[test]
    fn reported_group_size_wins() {
        let mut p = payload();
        p.group_votes.get_mut(&Gid(0)).unwrap().n_members = Some(9);
        let ingested = BucketModel::ingest(&p, &nobody()).unwrap();
        assert_eq!(ingested.clusters[0].count, 9);
        assert_eq!(summary(&ingested, 0).count, 9);

        // Smaller than the individually rendered participants: saturates.
        p.group_votes.get_mut(&Gid(0)).unwrap().n_members = Some(0);
        let people = [ParticipantOfInterest::new(Pid(20), VoteHistory::new("a"))];
        let ingested = BucketModel::ingest(&p, &Identities::new(None, &people)).unwrap();
        assert_eq!(ingested.clusters[0].count, 0);
        assert_eq!(summary(&ingested, 0).count, 0);
    }

    #[test]
    fn missing_group_size_falls_back_to_base_buckets() {
        let mut p = payload();
        p.group_votes.clear();
        let ingested = BucketModel::ingest(&p, &nobody()).unwrap();
        assert_eq!(ingested.clusters[1].count, 6);
    }

    #[test]
    fn interest_priority_stays_below_self() {
        let person = ParticipantOfInterest::new(Pid(30), VoteHistory::default()).with_priority(i64::MAX);
        let mut buckets = vec![
            Bucket::participant_of_interest(&person, Gid(1), Position::ORIGIN, false),
            Bucket::viewer(Gid(1), Position::ORIGIN),
        ];
        assert_eq!(buckets[0].priority, MAX_INTEREST_PRIORITY);

        BucketModel::sort_for_render(&mut buckets);
        assert!(buckets[0].contains_self);
    }

    #[test]
    fn self_deducted_from_its_group() {
        let ingested = BucketModel::ingest(&payload(), &Identities::new(Some(Pid(41)), &[])).unwrap();
        assert_eq!(summary(&ingested, 1).count, 5);
        assert_eq!(ingested.clusters[1].count, 6);
        assert_eq!(ingested.placements.get(&Pid(41)), Some(&Gid(1)));
    }

    #[test]
    fn unknown_group_member_is_ungrouped() {
        let mut p = payload();
        p.group_clusters[1].members = vec![Bid(3)];
        let ingested = BucketModel::ingest(&p, &nobody()).unwrap();
        let orphan = ingested.buckets.iter().find(|b| b.bid == Bid(4)).unwrap();
        assert_eq!(orphan.gid, Gid::UNGROUPED);
        assert_eq!(summary(&ingested, 1).count, 2);
    }

    #[test]
    fn render_order_is_priority_descending() {
        let mut buckets = vec![
            Bucket::base(Bid(3), 1, Position::ORIGIN),
            Bucket::viewer(Gid::UNGROUPED, Position::ORIGIN),
            Bucket {
                priority: 5,
                ..Bucket::base(Bid(9), 1, Position::ORIGIN)
            },
            Bucket::base(Bid(1), 1, Position::ORIGIN),
        ];
        BucketModel::sort_for_render(&mut buckets);
        let order: Vec<Bid> = buckets.iter().map(|b| b.bid).collect();
        assert_eq!(order, vec![SELF_BID, Bid(9), Bid(1), Bid(3)]);
    }

    #[test]
    fn finish_hides_empty_buckets_and_rebuilds_membership() {
        let mut clusters = vec![Cluster {
            gid: Gid(0),
            center: Position::ORIGIN,
            members: Vec::new(),
            count: 2,
        }];
        let buckets = vec![
            Bucket::summary(Gid(0), Position::ORIGIN),
            Bucket::base(Bid(4), 2, Position::ORIGIN).in_group(Gid(0)),
            Bucket::viewer(Gid(0), Position::ORIGIN),
        ];
        let buckets = BucketModel::finish(buckets, &mut clusters);
        assert_eq!(buckets.len(), 2);
        assert_eq!(clusters[0].members, vec![SELF_BID, Bid(4)]);
    }
}
