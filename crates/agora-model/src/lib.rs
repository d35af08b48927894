//! # Agora Model
//!
//! Turns the math service's projection payload into the renderable opinion
//! map: buckets, clusters and a per-comment vote matrix, with the viewer and
//! participants of interest placed by client-side projection.
//!
//! ## Pipeline
//!
//! ```text
//! MathPayload ──► BucketModel::ingest ──► SelfAndInterestMerger ──► BucketModel::finish
//!                       │                                                 │
//!                       └──────── VoteMatrixCompiler ◄────────────────────┘
//!                                        │
//!                                        ▼
//!                                  OpinionModel
//! ```
//!
//! [`ProjectionCache`] drives the pipeline for one conversation and holds
//! the state that survives between cycles.
//!
//! ## Conservation
//!
//! The server counts every participant in a base bucket, including the
//! viewer and participants of interest. Those are rendered on their own, so
//! they are deducted from their base bucket exactly once. For every group:
//!
//! ```text
//! summary.count + individually rendered members == cluster.count
//! ```

mod bucket;
mod cache;
mod error;
mod ids;
mod interest;
mod merge;
mod payload;
mod votes;

pub use bucket::{Bucket, BucketModel, Cluster, Ingested, MAX_INTEREST_PRIORITY, SELF_PRIORITY};
pub use cache::{LocalVotes, ModelOptions, OpinionModel, ProjectionCache};
pub use error::{Error, Result};
pub use ids::{
    Bid, Gid, MathTick, Pid, PARTICIPANT_OF_INTEREST_BID_OFFSET, SELF_BID,
    SUMMARY_BUCKET_BID_OFFSET,
};
pub use interest::{InterestEntry, InterestFeed, ParticipantOfInterest, VoteHistory};
pub use merge::{Identities, SelfAndInterestMerger, SparsityPolicy};
pub use payload::{
    BaseClusters, Consensus, GroupCluster, GroupVotes, MathPayload, Pca, VoteCounts,
};
pub use votes::{VoteMatrix, VoteMatrixCompiler, VoteTally};

pub use agora_projection::{Position, Tid, Vote, VoteValue};
