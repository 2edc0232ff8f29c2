/// A numeric range `[min, max]`.
///
/// `Interval<f64>` bounds valid ray parameters during intersection.
/// `Interval<usize>` describes a band of image rows; row bands are read
/// half-open (`min` inclusive, `max` exclusive) so that adjacent bands
/// share a boundary without sharing a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interval<T = f64> {
    pub min: T,
    pub max: T,
}

impl<T: Copy + PartialOrd> Interval<T> {
    /// Create a new interval given min and max values.
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    /// Returns true if x is within the interval [min, max] (inclusive).
    pub fn contains(&self, x: T) -> bool {
        self.min <= x && x <= self.max
    }

    /// Returns true if x is strictly within the interval (min, max) (exclusive).
    pub fn surrounds(&self, x: T) -> bool {
        self.min < x && x < self.max
    }

    /// Clamps x to be within the interval [min, max].
    pub fn clamp(&self, x: T) -> T {
        if x < self.min {
            self.min
        } else if x > self.max {
            self.max
        } else {
            x
        }
    }

    /// Returns a copy with `max` replaced, used to narrow a search window.
    pub fn with_max(&self, max: T) -> Self {
        Self::new(self.min, max)
    }
}

impl Interval<f64> {
    /// Returns the size of the interval (max - min).
    pub fn size(&self) -> f64 {
        self.max - self.min
    }

    /// An empty interval (min > max, contains nothing).
    pub const EMPTY: Interval<f64> = Interval {
        min: f64::INFINITY,
        max: f64::NEG_INFINITY,
    };

    /// A universe interval (contains everything).
    pub const UNIVERSE: Interval<f64> = Interval {
        min: f64::NEG_INFINITY,
        max: f64::INFINITY,
    };
}

impl Interval<usize> {
    /// Number of rows in a half-open row band.
    pub fn len(&self) -> usize {
        self.max.saturating_sub(self.min)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate the row indices of a half-open row band.
    pub fn rows(&self) -> std::ops::Range<usize> {
        self.min..self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_creation() {
        let interval: Interval = Interval::new(0.0, 10.0);
        assert_eq!(interval.min, 0.0);
        assert_eq!(interval.max, 10.0);
        assert_eq!(interval.size(), 10.0);
    }

    #[test]
    fn test_interval_contains() {
        let interval = Interval::new(0.0, 10.0);

        // Inclusive bounds
        assert!(interval.contains(0.0));
        assert!(interval.contains(10.0));
        assert!(interval.contains(5.0));

        assert!(!interval.contains(-0.1));
        assert!(!interval.contains(10.1));
    }

    #[test]
    fn test_interval_surrounds() {
        let interval = Interval::new(0.0, 10.0);

        // Exclusive bounds - endpoints NOT included
        assert!(!interval.surrounds(0.0));
        assert!(!interval.surrounds(10.0));
        assert!(interval.surrounds(0.1));
        assert!(interval.surrounds(9.9));
    }

    #[test]
    fn test_interval_clamp() {
        let intensity: Interval = Interval::new(0.0, 0.999);

        assert_eq!(intensity.clamp(-5.0), 0.0);
        assert_eq!(intensity.clamp(0.5), 0.5);
        assert_eq!(intensity.clamp(1.0), 0.999);
    }

    #[test]
    fn test_interval_empty_and_universe() {
        assert!(!Interval::<f64>::EMPTY.contains(0.0));
        assert!(Interval::<f64>::UNIVERSE.contains(1e300));
        assert!(Interval::<f64>::UNIVERSE.contains(-1e300));
    }

    #[test]
    fn test_row_band() {
        let band = Interval::new(3usize, 7);
        assert_eq!(band.len(), 4);
        assert_eq!(band.rows().collect::<Vec<_>>(), vec![3, 4, 5, 6]);
        assert!(Interval::new(5usize, 5).is_empty());
    }

    #[test]
    fn test_with_max_narrows() {
        let window: Interval = Interval::new(0.001, f64::INFINITY).with_max(2.5);
        assert_eq!(window.min, 0.001);
        assert_eq!(window.max, 2.5);
    }
}
