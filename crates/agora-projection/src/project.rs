//! Linear projection of a vote set onto the two published components.
//!
//! For every counted vote on comment `t`:
//!
//! ```text
//! x += (vote − center[t]) × xLoading[t]
//! y += (vote − center[t]) × yLoading[t]
//! ```
//!
//! A participant who answered `k` of `n` comments is then scaled by the
//! sparsity ("jetpack") factor `sqrt(n / k)`. Without it, sparse voters sit
//! near the origin purely because they left most terms out of the sum.

use std::collections::HashSet;

use crate::basis::ProjectionBasis;
use crate::position::Position;
use crate::vote::{Tid, Vote};

/// Whether the sparsity factor is applied to a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compensation {
    /// Scale by `sqrt(total_comments / votes_cast)`
    #[default]
    Apply,
    /// Use the raw sum
    Skip,
}

/// Sparsity compensation factor for a participant who cast `votes_cast`
/// votes out of `total_comments`.
///
/// Returns `1.0` when nothing was cast or the basis has no comments, so the
/// factor never divides by zero and never collapses a projection to the
/// origin.
///
/// # Examples
///
/// ```
/// use agora_projection::sparsity_factor;
///
/// assert_eq!(sparsity_factor(1, 1), 1.0);
/// assert_eq!(sparsity_factor(4, 1), 2.0);
/// assert_eq!(sparsity_factor(4, 0), 1.0);
/// ```
pub fn sparsity_factor(total_comments: usize, votes_cast: usize) -> f64 {
    if votes_cast == 0 || total_comments == 0 {
        return 1.0;
    }
    (total_comments as f64 / votes_cast as f64).sqrt()
}

/// Project a participant's votes into the opinion plane.
///
/// Votes on comments in `excluded` are ignored entirely: they add no term
/// and do not count as cast. A term that evaluates to a non-finite value is
/// skipped, which degrades precision without aborting the projection. An
/// empty vote set projects to the origin.
pub fn project<'a, I>(
    votes: I,
    excluded: &HashSet<Tid>,
    basis: &ProjectionBasis,
    compensation: Compensation,
) -> Position
where
    I: IntoIterator<Item = &'a Vote>,
{
    let mut sum = Position::ORIGIN;
    let mut votes_cast = 0usize;

    for vote in votes {
        if excluded.contains(&vote.tid) {
            continue;
        }
        votes_cast += 1;

        let loading = basis.loading(vote.tid);
        let delta = vote.value.as_f64() - loading.center;
        let term = Position::new(delta * loading.x, delta * loading.y);
        if term.is_finite() {
            sum = sum + term;
        }
    }

    if votes_cast == 0 {
        return Position::ORIGIN;
    }

    match compensation {
        Compensation::Apply => {
            let factor = sparsity_factor(basis.total_comments(), votes_cast);
            if factor.is_finite() {
                sum * factor
            } else {
                sum
            }
        }
        Compensation::Skip => sum,
    }
}

/// A comment placed in the opinion plane at its loading pair.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CommentPosition {
    pub tid: Tid,
    pub position: Position,
}

/// Place every non-excluded comment of the basis at its (x, y) loading.
///
/// Comments come out in ascending tid order.
pub fn project_comments(basis: &ProjectionBasis, excluded: &HashSet<Tid>) -> Vec<CommentPosition> {
    basis
        .iter()
        .filter(|(tid, _)| !excluded.contains(tid))
        .map(|(tid, loading)| CommentPosition {
            tid,
            position: Position::new(loading.x, loading.y),
        })
        .filter(|c| c.position.is_finite())
        .collect()
}
