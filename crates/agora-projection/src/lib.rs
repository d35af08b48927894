//! Agora Opinion-Space Projection
//!
//! Places participants in a two-dimensional opinion space from their votes.
//!
//! # Mathematical Foundation
//!
//! The projection source periodically runs a principal component analysis
//! over the full participant × comment vote matrix and publishes, per
//! comment, a centre value and a loading on each of the first two
//! components. Any vote set can then be placed in the same plane locally:
//! the position is the sum of centred votes weighted by the loadings.
//!
//! Because the computation is pure, a client can place its own participant
//! the moment a vote is cast instead of waiting for the next server run.
//!
//! # Sparsity Compensation
//!
//! Participants who answered few comments are scaled by
//! `sqrt(total_comments / votes_cast)`, see [`sparsity_factor`].

mod basis;
mod position;
mod project;
mod vote;

pub use basis::{CommentLoading, ProjectionBasis};
pub use position::Position;
pub use project::{project, project_comments, sparsity_factor, CommentPosition, Compensation};
pub use vote::{InvalidVoteValue, Tid, Vote, VoteValue};

/// Number of components the opinion plane is built from
pub const COMPONENTS: usize = 2;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn full_voter_matches_raw_sum() {
        let basis = ProjectionBasis::new()
            .with_comment(Tid(0), 0.0, 1.0, 0.0)
            .with_comment(Tid(1), 0.0, 0.0, 1.0);
        let votes = [Vote::agree(0), Vote::disagree(1)];

        let p = project(&votes, &HashSet::new(), &basis, Compensation::Apply);
        assert_eq!(p, Position::new(1.0, -1.0));
    }
}
