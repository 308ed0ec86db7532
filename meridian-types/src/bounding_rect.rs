//! Axis-aligned bounding rectangles.

use geo::BoundingRect as _;
use num_traits::Num;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle given by its minimum and maximum coordinates.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingRect<N: Num + Copy + PartialOrd = f64> {
    /// Minimum x.
    pub x_min: N,
    /// Minimum y.
    pub y_min: N,
    /// Maximum x.
    pub x_max: N,
    /// Maximum y.
    pub y_max: N,
}

impl<N: Num + Copy + PartialOrd> BoundingRect<N> {
    /// Creates a rectangle from its corner values.
    pub fn new(x_min: N, y_min: N, x_max: N, y_max: N) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Smallest rectangle containing both `self` and `other`.
    pub fn merge(&self, other: Self) -> Self {
        Self {
            x_min: if self.x_min < other.x_min {
                self.x_min
            } else {
                other.x_min
            },
            y_min: if self.y_min < other.y_min {
                self.y_min
            } else {
                other.y_min
            },
            x_max: if self.x_max > other.x_max {
                self.x_max
            } else {
                other.x_max
            },
            y_max: if self.y_max > other.y_max {
                self.y_max
            } else {
                other.y_max
            },
        }
    }

    /// Merges all rectangles of the iterator. Returns `None` for an empty iterator.
    pub fn merge_all(iter: impl IntoIterator<Item = Self>) -> Option<Self> {
        let mut iter = iter.into_iter();
        let first = iter.next()?;
        Some(iter.fold(first, |acc, rect| acc.merge(rect)))
    }

    /// Returns true if the rectangles share at least one point, boundaries included.
    pub fn intersects(&self, other: &Self) -> bool {
        self.x_min <= other.x_max
            && self.x_max >= other.x_min
            && self.y_min <= other.y_max
            && self.y_max >= other.y_min
    }

    /// Returns true if `other` lies inside `self`, boundaries included.
    pub fn contains_rect(&self, other: &Self) -> bool {
        self.x_min <= other.x_min
            && self.x_max >= other.x_max
            && self.y_min <= other.y_min
            && self.y_max >= other.y_max
    }

    /// Width of the rectangle.
    pub fn width(&self) -> N {
        self.x_max - self.x_min
    }

    /// Height of the rectangle.
    pub fn height(&self) -> N {
        self.y_max - self.y_min
    }
}

impl BoundingRect<f64> {
    /// Bounding rectangle of a geometry. Empty geometries have none.
    pub fn of_geometry(geometry: &geo_types::Geometry<f64>) -> Option<Self> {
        let rect = geometry.bounding_rect()?;
        Some(Self {
            x_min: rect.min().x,
            y_min: rect.min().y,
            x_max: rect.max().x,
            y_max: rect.max().y,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{polygon, Geometry, GeometryCollection};

    #[test]
    fn merges_rectangles() {
        let merged = BoundingRect::merge_all([
            BoundingRect::new(0.0, 0.0, 1.0, 1.0),
            BoundingRect::new(-5.0, 0.5, 0.5, 3.0),
        ]);
        assert_eq!(merged, Some(BoundingRect::new(-5.0, 0.0, 1.0, 3.0)));
        assert_eq!(BoundingRect::<f64>::merge_all([]), None);
    }

    #[test]
    fn touching_rectangles_intersect() {
        let a = BoundingRect::new(0, 0, 10, 10);
        let b = BoundingRect::new(10, 10, 20, 20);
        let c = BoundingRect::new(11, 0, 20, 5);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(a.contains_rect(&BoundingRect::new(2, 2, 10, 3)));
        assert!(!a.contains_rect(&b));
    }

    #[test]
    fn geometry_bounds() {
        let polygon: Geometry<f64> =
            polygon![(x: 1.0, y: 2.0), (x: 4.0, y: 2.0), (x: 4.0, y: 7.0), (x: 1.0, y: 2.0)].into();
        assert_eq!(
            BoundingRect::of_geometry(&polygon),
            Some(BoundingRect::new(1.0, 2.0, 4.0, 7.0))
        );

        let empty = Geometry::GeometryCollection(GeometryCollection::<f64>::default());
        assert_eq!(BoundingRect::of_geometry(&empty), None);
    }
}
