// Piecewise-linear interpolation tables

use serde::{Deserialize, Serialize};

use crate::math_utils::{inverse_lerp, lerp};

/// What `compute` returns outside the tabulated range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Extrapolation {
    /// Hold the end value.
    Constant,
    /// Continue the end segment.
    Linear,
}

/// Table of (x, y) points kept sorted by x. Points with equal x keep their
/// insertion order, which lets a table carry a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interpolator {
    points: Vec<(f64, f64)>,
    extrapolation: Extrapolation,
}

impl Default for Interpolator {
    fn default() -> Self {
        Self::new(Extrapolation::Linear)
    }
}

impl Interpolator {
    pub fn new(extrapolation: Extrapolation) -> Self {
        Interpolator {
            points: Vec::new(),
            extrapolation,
        }
    }

    pub fn from_points(points: &[(f64, f64)], extrapolation: Extrapolation) -> Self {
        let mut interpolator = Self::new(extrapolation);
        for &(x, y) in points {
            interpolator.add_point(x, y);
        }
        interpolator
    }

    pub fn add_point(&mut self, x: f64, y: f64) {
        let at = self.points.partition_point(|&(px, _)| px <= x);
        self.points.insert(at, (x, y));
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn first(&self) -> Option<(f64, f64)> {
        self.points.first().copied()
    }

    pub fn last(&self) -> Option<(f64, f64)> {
        self.points.last().copied()
    }

    /// y at `x`. An empty table yields 0, a single point a constant.
    pub fn compute(&self, x: f64) -> f64 {
        let n = self.points.len();
        match n {
            0 => return 0.0,
            1 => return self.points[0].1,
            _ => {}
        }

        let (x0, y0) = self.points[0];
        let (xn, yn) = self.points[n - 1];

        if x < x0 {
            return match self.extrapolation {
                Extrapolation::Constant => y0,
                Extrapolation::Linear => Self::segment(self.points[0], self.points[1], x),
            };
        }
        if x > xn {
            return match self.extrapolation {
                Extrapolation::Constant => yn,
                Extrapolation::Linear => Self::segment(self.points[n - 2], self.points[n - 1], x),
            };
        }

        // first segment whose right end reaches x
        let upper = self.points.partition_point(|&(px, _)| px < x).max(1);
        if self.points[upper].0 == x {
            return self.points[upper].1;
        }
        Self::segment(self.points[upper - 1], self.points[upper], x)
    }

    /// Smallest x at which a non-decreasing table reaches `y`, so a flat
    /// stretch maps back to its first x. Clamped to the table ends.
    pub fn inverse(&self, y: f64) -> f64 {
        let n = self.points.len();
        if n == 0 {
            return 0.0;
        }
        let (x0, y0) = self.points[0];
        if y <= y0 || n == 1 {
            return x0;
        }
        for window in self.points.windows(2) {
            let (a, b) = (window[0], window[1]);
            if y <= b.1 {
                if b.1 <= a.1 {
                    return a.0;
                }
                return lerp(a.0, b.0, inverse_lerp(a.1, b.1, y));
            }
        }
        self.points[n - 1].0
    }

    fn segment(a: (f64, f64), b: (f64, f64), x: f64) -> f64 {
        if (b.0 - a.0).abs() < f64::EPSILON {
            return b.1;
        }
        lerp(a.1, b.1, (x - a.0) / (b.0 - a.0))
    }
}
