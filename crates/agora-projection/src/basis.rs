//! Per-comment projection basis: centre value and component loadings.

use std::collections::{BTreeMap, HashSet};

use crate::vote::Tid;

/// Centre and loadings of one comment.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CommentLoading {
    /// Mean vote on the comment across all participants
    pub center: f64,
    /// Loading on the first component
    pub x: f64,
    /// Loading on the second component
    pub y: f64,
}

/// The linear basis votes are projected onto.
///
/// Comments absent from the basis read as all-zero loadings, so a vote on an
/// unknown comment contributes nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectionBasis {
    comments: BTreeMap<Tid, CommentLoading>,
    total_comments: usize,
}

impl ProjectionBasis {
    /// Create an empty basis.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a basis from the parallel arrays published with the components.
    ///
    /// `total_comments` counts the comments that are not in `excluded`.
    /// Callers validate that the arrays have equal length; extra entries in
    /// the longer arrays are ignored.
    pub fn from_parallel(
        tids: &[Tid],
        center: &[f64],
        x: &[f64],
        y: &[f64],
        excluded: &HashSet<Tid>,
    ) -> Self {
        let comments: BTreeMap<Tid, CommentLoading> = tids
            .iter()
            .zip(center)
            .zip(x.iter().zip(y))
            .map(|((&tid, &center), (&x, &y))| (tid, CommentLoading { center, x, y }))
            .collect();
        let total_comments = comments.keys().filter(|tid| !excluded.contains(tid)).count();
        Self {
            comments,
            total_comments,
        }
    }

    /// Add or replace one comment's loading.
    ///
    /// The total comment count grows to cover the comments present.
    #[must_use]
    pub fn with_comment(mut self, tid: Tid, center: f64, x: f64, y: f64) -> Self {
        self.comments.insert(tid, CommentLoading { center, x, y });
        self.total_comments = self.total_comments.max(self.comments.len());
        self
    }

    /// Override the number of comments used for sparsity compensation.
    #[must_use]
    pub fn with_total_comments(mut self, total_comments: usize) -> Self {
        self.total_comments = total_comments;
        self
    }

    /// Loading of a comment, all zeros when unknown.
    pub fn loading(&self, tid: Tid) -> CommentLoading {
        self.comments.get(&tid).copied().unwrap_or_default()
    }

    /// Whether the comment has a published loading.
    pub fn contains(&self, tid: Tid) -> bool {
        self.comments.contains_key(&tid)
    }

    /// Number of comments a full voter could have voted on.
    pub fn total_comments(&self) -> usize {
        self.total_comments
    }

    /// Iterate comments in ascending tid order.
    pub fn iter(&self) -> impl Iterator<Item = (Tid, CommentLoading)> + '_ {
        self.comments.iter().map(|(&tid, &loading)| (tid, loading))
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_comment_reads_as_zero() {
        let basis = ProjectionBasis::new().with_comment(Tid(1), 0.5, 1.0, 2.0);
        assert_eq!(basis.loading(Tid(9)), CommentLoading::default());
        assert_eq!(basis.loading(Tid(1)).y, 2.0);
    }

    #[test]
    fn parallel_arrays_skip_excluded_in_total() {
        let tids = [Tid(0), Tid(1), Tid(2)];
        let excluded: HashSet<Tid> = [Tid(1)].into_iter().collect();
        let basis = ProjectionBasis::from_parallel(
            &tids,
            &[0.0, 0.1, 0.2],
            &[1.0, 1.0, 1.0],
            &[0.0, 0.0, 0.0],
            &excluded,
        );
        assert_eq!(basis.total_comments(), 2);
        assert!(basis.contains(Tid(1)));
    }

    #[test]
    fn total_override() {
        let basis = ProjectionBasis::new()
            .with_comment(Tid(1), 0.0, 2.0, 0.0)
            .with_total_comments(4);
        assert_eq!(basis.total_comments(), 4);
    }
}
