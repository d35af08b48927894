//! The per-conversation model state.
//!
//! [`ProjectionCache`] owns everything one conversation view needs between
//! refresh cycles: the latest projection basis, the published model, the
//! viewer's local votes and the known participants of interest. It is
//! owned by a single task and never shared.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use agora_projection::{project_comments, CommentPosition, Position, ProjectionBasis, Tid, Vote, VoteValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bucket::{Bucket, BucketModel, Cluster, Ingested};
use crate::error::Result;
use crate::ids::{Bid, Gid, MathTick, Pid};
use crate::interest::{InterestFeed, ParticipantOfInterest};
use crate::merge::{Identities, SelfAndInterestMerger, SparsityPolicy};
use crate::payload::{Consensus, MathPayload};
use crate::votes::{VoteMatrix, VoteMatrixCompiler};

/// The viewer's votes, latest per comment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalVotes {
    votes: BTreeMap<Tid, VoteValue>,
}

impl LocalVotes {
    /// Record a vote, returning the value it replaced.
    pub fn record(&mut self, vote: Vote) -> Option<VoteValue> {
        self.votes.insert(vote.tid, vote.value)
    }

    pub fn get(&self, tid: Tid) -> Option<VoteValue> {
        self.votes.get(&tid).copied()
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// Votes in tid order.
    pub fn to_votes(&self) -> Vec<Vote> {
        self.votes
            .iter()
            .map(|(&tid, &value)| Vote::new(tid, value))
            .collect()
    }
}

/// Model building switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOptions {
    pub self_compensation: SparsityPolicy,
    /// Publish comment positions with the model
    pub comment_projection: bool,
}

/// One published view of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpinionModel {
    pub math_tick: MathTick,
    /// In render order
    pub buckets: Vec<Bucket>,
    pub clusters: Vec<Cluster>,
    /// The reported total when the service sends one, else the sum of the
    /// base buckets
    pub participant_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_positions: Option<Vec<CommentPosition>>,
    pub consensus: Consensus,
    #[serde(skip)]
    pub votes: VoteMatrix,
}

impl OpinionModel {
    /// The bucket carrying the viewer.
    pub fn self_bucket(&self) -> Option<&Bucket> {
        self.buckets.iter().find(|b| b.contains_self)
    }

    pub fn bucket(&self, bid: Bid) -> Option<&Bucket> {
        self.buckets.iter().find(|b| b.bid == bid)
    }

    pub fn cluster_of(&self, bucket: &Bucket) -> Option<&Cluster> {
        self.clusters.iter().find(|c| c.gid == bucket.gid)
    }
}

/// State of one conversation view across refresh cycles.
#[derive(Debug)]
pub struct ProjectionCache {
    self_pid: Option<Pid>,
    options: ModelOptions,
    local_votes: LocalVotes,
    participants: Vec<ParticipantOfInterest>,
    basis: ProjectionBasis,
    excluded: HashSet<Tid>,
    model: Option<Arc<OpinionModel>>,
}

impl ProjectionCache {
    /// Create an empty cache. `self_pid` is `None` until the viewer has been
    /// assigned a participant id.
    pub fn new(self_pid: Option<Pid>, options: ModelOptions) -> Self {
        Self {
            self_pid,
            options,
            local_votes: LocalVotes::default(),
            participants: Vec::new(),
            basis: ProjectionBasis::new(),
            excluded: HashSet::new(),
            model: None,
        }
    }

    /// Version of the published model.
    pub fn math_tick(&self) -> Option<MathTick> {
        self.model.as_ref().map(|m| m.math_tick)
    }

    pub fn model(&self) -> Option<&Arc<OpinionModel>> {
        self.model.as_ref()
    }

    pub fn local_votes(&self) -> &LocalVotes {
        &self.local_votes
    }

    pub fn participants_of_interest(&self) -> &[ParticipantOfInterest] {
        &self.participants
    }

    /// Replace the known participants of interest. Takes effect on the next
    /// rebuild.
    pub fn set_participants_of_interest(&mut self, feed: &InterestFeed) {
        self.participants = ParticipantOfInterest::from_feed(feed);
    }

    /// Build and publish a model from a payload.
    ///
    /// Nothing is committed unless every step succeeds, so a rejected
    /// payload leaves the previous model in place.
    pub fn rebuild(&mut self, payload: &MathPayload) -> Result<Arc<OpinionModel>> {
        let basis = payload.basis()?;
        let excluded = payload.excluded();
        let identities = Identities::new(self.self_pid, &self.participants);

        let Ingested {
            mut buckets,
            mut clusters,
            placements,
        } = BucketModel::ingest(payload, &identities)?;

        let merger = SelfAndInterestMerger::new(
            &basis,
            &excluded,
            &self.local_votes,
            &identities,
            &placements,
        )
        .with_policy(self.options.self_compensation);
        merger.merge_interest_participants(&mut buckets, &clusters, &self.participants);
        merger.with_self(&mut buckets);
        let buckets = BucketModel::finish(buckets, &mut clusters);

        let votes = self.compile_votes(payload, &buckets, &clusters, &identities)?;
        let comment_positions = self
            .options
            .comment_projection
            .then(|| project_comments(&basis, &excluded));

        let participant_count = payload.participant_total();
        let rendered: u64 = buckets.iter().map(|b| b.count).sum();
        let unplaced = unplaced_individuals(&buckets, &identities, &placements);
        if rendered != participant_count + unplaced {
            warn!(
                math_tick = payload.math_tick.0,
                reported = participant_count,
                rendered,
                unplaced,
                "Rendered participants disagree with the reported total"
            );
        }

        let model = Arc::new(OpinionModel {
            math_tick: payload.math_tick,
            participant_count,
            buckets,
            clusters,
            comment_positions,
            consensus: payload.consensus.clone(),
            votes,
        });

        info!(
            math_tick = model.math_tick.0,
            buckets = model.buckets.len(),
            clusters = model.clusters.len(),
            participants = model.participant_count,
            "Rebuilt opinion model"
        );

        self.basis = basis;
        self.excluded = excluded;
        self.model = Some(Arc::clone(&model));
        Ok(model)
    }

    /// Record a local vote and return the viewer's new position.
    ///
    /// Only the local vote cache changes; the published model is refreshed
    /// by the next rebuild.
    pub fn record_vote(&mut self, vote: Vote) -> Position {
        let previous = self.local_votes.record(vote);
        let position = self.self_position();
        debug!(
            tid = %vote.tid,
            value = ?vote.value,
            replaced = ?previous,
            x = position.x,
            y = position.y,
            "Recorded local vote"
        );
        position
    }

    /// The viewer's position under the current basis.
    pub fn self_position(&self) -> Position {
        let identities = Identities::new(self.self_pid, &self.participants);
        let placements = BTreeMap::new();
        SelfAndInterestMerger::new(
            &self.basis,
            &self.excluded,
            &self.local_votes,
            &identities,
            &placements,
        )
        .with_policy(self.options.self_compensation)
        .project_self()
    }

    fn compile_votes(
        &self,
        payload: &MathPayload,
        buckets: &[Bucket],
        clusters: &[Cluster],
        identities: &Identities,
    ) -> Result<VoteMatrix> {
        let summary_bids: BTreeMap<Gid, Bid> = clusters
            .iter()
            .map(|c| (c.gid, Bid::for_summary(c.gid)))
            .collect();

        let mut compiler = VoteMatrixCompiler::new();
        compiler.add_group_votes(&payload.group_votes, &summary_bids)?;

        let self_bid = identities.self_bid();
        for participant in &self.participants {
            if participant.bid() != self_bid {
                compiler.add_participant(participant.bid(), &participant.history.decode());
            }
        }
        compiler.add_participant(self_bid, &self.local_votes.to_votes());

        Ok(compiler.finish(buckets.iter().map(|b| b.bid)))
    }
}

/// Individually rendered participants the server did not place in any base
/// bucket, so not part of its total.
fn unplaced_individuals(buckets: &[Bucket], identities: &Identities, placements: &BTreeMap<Pid, Gid>) -> u64 {
    buckets
        .iter()
        .filter(|b| b.contains_self || b.is_participant_of_interest)
        .filter(|b| {
            b.pid
                .or(identities.self_pid())
                .map_or(true, |pid| !placements.contains_key(&pid))
        })
        .count() as u64
}
