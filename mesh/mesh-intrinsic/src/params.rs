//! Refinement parameters.

/// Parameters for intrinsic Delaunay refinement.
#[derive(Debug, Clone)]
pub struct RefineParams {
    /// Minimum acceptable corner angle, in degrees. Faces below it are
    /// refined. Values above 30 may prevent termination.
    pub angle_threshold_degrees: f64,

    /// Maximum acceptable circumradius. Faces above it are refined.
    pub circumradius_threshold: f64,

    /// Hard cap on vertex insertions (circumcenters and segment splits).
    pub max_insertions: usize,

    /// Hard cap on total edge flips across the refinement.
    pub max_flips: usize,
}

impl Default for RefineParams {
    fn default() -> Self {
        Self {
            angle_threshold_degrees: 25.0,
            circumradius_threshold: f64::INFINITY,
            max_insertions: usize::MAX,
            max_flips: usize::MAX,
        }
    }
}

impl RefineParams {
    /// Create parameters with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create parameters with a specific angle threshold in degrees.
    #[must_use]
    pub fn with_angle_threshold(angle_threshold_degrees: f64) -> Self {
        Self {
            angle_threshold_degrees,
            ..Self::default()
        }
    }

    /// Create parameters for size-driven refinement only: no angle bound,
    /// refine every face whose circumradius exceeds the given value.
    #[must_use]
    pub fn with_circumradius(circumradius_threshold: f64) -> Self {
        Self {
            angle_threshold_degrees: 0.0,
            circumradius_threshold,
            ..Self::default()
        }
    }

    /// Set the angle threshold in degrees.
    #[must_use]
    pub const fn angle_threshold(mut self, degrees: f64) -> Self {
        self.angle_threshold_degrees = degrees;
        self
    }

    /// Set the circumradius threshold.
    #[must_use]
    pub const fn circumradius(mut self, threshold: f64) -> Self {
        self.circumradius_threshold = threshold;
        self
    }

    /// Set the insertion cap.
    #[must_use]
    pub const fn max_insertions(mut self, max_insertions: usize) -> Self {
        self.max_insertions = max_insertions;
        self
    }

    /// Set the flip cap.
    #[must_use]
    pub const fn max_flips(mut self, max_flips: usize) -> Self {
        self.max_flips = max_flips;
        self
    }

    /// The angle threshold in radians.
    #[must_use]
    pub fn angle_threshold_radians(&self) -> f64 {
        self.angle_threshold_degrees.to_radians()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params() {
        let params = RefineParams::default();
        assert!((params.angle_threshold_degrees - 25.0).abs() < 1e-12);
        assert!(params.circumradius_threshold.is_infinite());
        assert_eq!(params.max_insertions, usize::MAX);
    }

    #[test]
    fn test_builder() {
        let params = RefineParams::new()
            .angle_threshold(20.0)
            .circumradius(0.5)
            .max_insertions(100);
        assert!((params.angle_threshold_degrees - 20.0).abs() < 1e-12);
        assert!((params.circumradius_threshold - 0.5).abs() < 1e-12);
        assert_eq!(params.max_insertions, 100);
    }

    #[test]
    fn test_radians_conversion() {
        let params = RefineParams::with_angle_threshold(30.0);
        assert!((params.angle_threshold_radians() - std::f64::consts::FRAC_PI_6).abs() < 1e-12);
    }
}
