//! Wire format of the projection/clustering payload.
//!
//! The payload is produced by the external math service and versioned by
//! `math_tick`. Field names follow the service's JSON keys.

use std::collections::{BTreeMap, HashSet};

use agora_projection::{Position, ProjectionBasis, Tid};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ids::{Bid, Gid, MathTick, Pid};

/// One refresh of the projection and clustering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MathPayload {
    pub pca: Pca,

    /// Comment ids the `pca` arrays are indexed by. When absent, array
    /// position `i` is comment `i`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tids: Option<Vec<Tid>>,

    #[serde(rename = "base-clusters")]
    pub base_clusters: BaseClusters,

    #[serde(rename = "group-clusters", default)]
    pub group_clusters: Vec<GroupCluster>,

    #[serde(rename = "group-votes", default)]
    pub group_votes: BTreeMap<Gid, GroupVotes>,

    #[serde(default)]
    pub consensus: Consensus,

    /// Comments moderated out of the model
    #[serde(rename = "mod-out", default)]
    pub mod_out: Vec<Tid>,

    pub math_tick: MathTick,

    /// Total participant count, when the service reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u64>,
}

/// Principal components and per-comment centre.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pca {
    /// `comps[0]` and `comps[1]` hold the x and y loadings
    pub comps: Vec<Vec<f64>>,
    pub center: Vec<f64>,
}

/// Base clusters as parallel arrays.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaseClusters {
    pub id: Vec<Bid>,
    pub count: Vec<u64>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    /// Participant ids per bucket, when the service publishes them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<Vec<Pid>>>,
}

impl BaseClusters {
    /// Number of base buckets, after checking every array lines up.
    pub fn validated_len(&self) -> Result<usize> {
        let len = self.id.len();
        Error::check_len("base-clusters.count", len, self.count.len())?;
        Error::check_len("base-clusters.x", len, self.x.len())?;
        Error::check_len("base-clusters.y", len, self.y.len())?;
        if let Some(members) = &self.members {
            Error::check_len("base-clusters.members", len, members.len())?;
        }
        Ok(len)
    }
}

/// An opinion group and the base buckets it contains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupCluster {
    pub id: Gid,
    pub center: Vec<f64>,
    pub members: Vec<Bid>,
}

impl GroupCluster {
    pub fn center_position(&self) -> Result<Position> {
        match self.center.as_slice() {
            [x, y] => Ok(Position::new(*x, *y)),
            other => Err(Error::MalformedPayload(format!(
                "group {} centre has {} coordinates, expected 2",
                self.id,
                other.len()
            ))),
        }
    }
}

/// Vote tallies of one group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupVotes {
    /// Participants the service counts in the group
    #[serde(rename = "n-members", default, skip_serializing_if = "Option::is_none")]
    pub n_members: Option<u64>,
    #[serde(default)]
    pub votes: BTreeMap<Tid, VoteCounts>,
}

/// Agree, disagree and seen counts for one comment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCounts {
    #[serde(rename = "A", default)]
    pub agree: u64,
    #[serde(rename = "D", default)]
    pub disagree: u64,
    #[serde(rename = "S", default)]
    pub seen: u64,
}

/// Comments the whole conversation broadly agrees or disagrees on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Consensus {
    #[serde(default)]
    pub agree: Vec<Tid>,
    #[serde(default)]
    pub disagree: Vec<Tid>,
}

impl MathPayload {
    /// Decode a payload from JSON.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Comment ids in `pca` array order.
    pub fn comment_ids(&self) -> Vec<Tid> {
        match &self.tids {
            Some(tids) => tids.clone(),
            None => (0..self.pca.center.len() as u64).map(Tid).collect(),
        }
    }

    /// Comments excluded from projection.
    pub fn excluded(&self) -> HashSet<Tid> {
        self.mod_out.iter().copied().collect()
    }

    /// Build the projection basis, checking that the `pca` arrays line up.
    pub fn basis(&self) -> Result<ProjectionBasis> {
        let [xs, ys] = match self.pca.comps.as_slice() {
            [xs, ys, ..] => [xs, ys],
            other => {
                return Err(Error::MalformedPayload(format!(
                    "pca.comps has {} components, expected at least 2",
                    other.len()
                )))
            }
        };
        let tids = self.comment_ids();
        Error::check_len("pca.center", tids.len(), self.pca.center.len())?;
        Error::check_len("pca.comps[0]", tids.len(), xs.len())?;
        Error::check_len("pca.comps[1]", tids.len(), ys.len())?;

        Ok(ProjectionBasis::from_parallel(
            &tids,
            &self.pca.center,
            xs,
            ys,
            &self.excluded(),
        ))
    }

    /// Total participants: the reported `n`, else the sum of base bucket counts.
    pub fn participant_total(&self) -> u64 {
        self.n
            .unwrap_or_else(|| self.base_clusters.count.iter().sum())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Two groups, five base buckets, three comments.
    ///
    /// ```text
    /// group 0: buckets 1 (3 people: pids 10, 11, 12), 2 (1 person: pid 20)
    /// group 1: buckets 3 (2 people: pids 30, 31), 4 (4 people: pids 40..=43)
    /// ungrouped: bucket 5 (1 person: pid 50)
    /// ```
    pub fn payload() -> MathPayload {
        let json = r#"{
            "pca": {
                "comps": [[1.0, 0.5, -1.0], [0.0, 1.0, 0.5]],
                "center": [0.0, 0.25, -0.5]
            },
            "base-clusters": {
                "id": [1, 2, 3, 4, 5],
                "count": [3, 1, 2, 4, 1],
                "x": [1.0, 1.5, -1.0, -2.0, 0.0],
                "y": [0.5, 0.0, 1.0, -1.0, 3.0],
                "members": [[10, 11, 12], [20], [30, 31], [40, 41, 42, 43], [50]]
            },
            "group-clusters": [
                {"id": 0, "center": [1.2, 0.3], "members": [1, 2]},
                {"id": 1, "center": [-1.6, -0.4], "members": [3, 4]}
            ],
            "group-votes": {
                "0": {"n-members": 4, "votes": {"0": {"A": 3, "D": 1, "S": 4}, "1": {"A": 1, "D": 0, "S": 2}}},
                "1": {"n-members": 6, "votes": {"0": {"A": 0, "D": 5, "S": 6}, "2": {"A": 2, "D": 2, "S": 5}}}
            },
            "consensus": {"agree": [1], "disagree": []},
            "mod-out": [],
            "math_tick": 7
        }"#;
        MathPayload::from_json(json.as_bytes()).unwrap()
    }
}
