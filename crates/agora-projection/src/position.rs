//! Points in the two-component opinion plane.
//!
//! The x axis is the first principal component, the y axis the second.
//! Positions are plain values: they are recomputed every refresh cycle and
//! never shared mutably.

use std::ops::{Add, Mul, Sub};

/// A position in the 2-D opinion space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    /// First principal component
    pub x: f64,
    /// Second principal component
    pub y: f64,
}

impl Position {
    /// Origin of the opinion space.
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

    /// Create a new position.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance from the origin.
    pub fn magnitude(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Euclidean distance between two positions.
    pub fn distance(&self, other: &Self) -> f64 {
        (*self - *other).magnitude()
    }

    /// Whether both components are finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Arithmetic mean of a set of positions, `None` when the set is empty.
    pub fn mean<I>(positions: I) -> Option<Self>
    where
        I: IntoIterator<Item = Self>,
    {
        let (sum, n) = positions
            .into_iter()
            .fold((Self::ORIGIN, 0usize), |(acc, n), p| (acc + p, n + 1));
        if n == 0 {
            None
        } else {
            Some(sum * (1.0 / n as f64))
        }
    }
}

impl Add for Position {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y)
    }
}

impl Sub for Position {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y)
    }
}

impl Mul<f64> for Position {
    type Output = Self;

    fn mul(self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_has_zero_magnitude() {
        assert_eq!(Position::ORIGIN.magnitude(), 0.0);
    }

    #[test]
    fn magnitude_is_euclidean() {
        assert_eq!(Position::new(3.0, 4.0).magnitude(), 5.0);
        assert_eq!(Position::new(3.0, 4.0).distance(&Position::new(0.0, 4.0)), 3.0);
    }

    #[test]
    fn mean_of_empty_set_is_none() {
        assert_eq!(Position::mean(Vec::new()), None);
    }

    #[test]
    fn mean_averages_components() {
        let mean = Position::mean([Position::new(1.0, 2.0), Position::new(3.0, -2.0)]);
        assert_eq!(mean, Some(Position::new(2.0, 0.0)));
    }

    #[test]
    fn scaling() {
        assert_eq!(Position::new(1.5, -2.0) * 2.0, Position::new(3.0, -4.0));
    }
}
