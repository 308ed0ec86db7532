use std::fmt::{Display, Formatter};
use std::str::FromStr;

use geo::{Geometry, Relate};
use meridian_types::BoundingRect;

use crate::error::StoreError;

/// DE-9IM pattern of "indexed geometry contains the query geometry without touching its boundary".
const CONTAINS_PROPERLY_PATTERN: &str = "T**FF*FF*";

/// Named topological test between an indexed geometry and a query geometry.
///
/// Every predicate reads as "indexed geometry *predicate* query geometry": `Within` selects indexed
/// geometries lying within the query geometry, `Contains` selects those containing it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Predicate {
    /// Indexed geometry contains the query geometry.
    Contains,
    /// Indexed geometry lies within the query geometry.
    Within,
    /// The geometries share at least one point.
    Intersects,
    /// The geometries share boundary points only.
    Touches,
    /// Interiors intersect and each geometry has points outside the other, same dimension.
    Overlaps,
    /// The geometries share no point.
    Disjoint,
    /// The geometries are topologically equal.
    Equals,
    /// No point of the query geometry is outside the indexed geometry.
    Covers,
    /// No point of the indexed geometry is outside the query geometry.
    CoveredBy,
    /// Interiors intersect in a lower dimension than the geometries have.
    Crosses,
    /// Query geometry lies in the interior of the indexed geometry.
    ContainsProperly,
    /// Bounding box of the indexed geometry contains the bounding box of the query geometry.
    BbContains,
    /// Bounding boxes of the geometries intersect.
    BbOverlaps,
}

impl Predicate {
    /// All supported predicates.
    pub const ALL: [Predicate; 13] = [
        Predicate::Contains,
        Predicate::Within,
        Predicate::Intersects,
        Predicate::Touches,
        Predicate::Overlaps,
        Predicate::Disjoint,
        Predicate::Equals,
        Predicate::Covers,
        Predicate::CoveredBy,
        Predicate::Crosses,
        Predicate::ContainsProperly,
        Predicate::BbContains,
        Predicate::BbOverlaps,
    ];

    /// Name of the predicate as used in geo specs.
    pub fn name(&self) -> &'static str {
        match self {
            Predicate::Contains => "contains",
            Predicate::Within => "within",
            Predicate::Intersects => "intersects",
            Predicate::Touches => "touches",
            Predicate::Overlaps => "overlaps",
            Predicate::Disjoint => "disjoint",
            Predicate::Equals => "equals",
            Predicate::Covers => "covers",
            Predicate::CoveredBy => "coveredBy",
            Predicate::Crosses => "crosses",
            Predicate::ContainsProperly => "containsProperly",
            Predicate::BbContains => "bbcontains",
            Predicate::BbOverlaps => "bboverlaps",
        }
    }

    /// SQL function registered on index connections that evaluates the predicate over two WKB blobs.
    pub fn sql_function(&self) -> &'static str {
        match self {
            Predicate::Contains => "ST_Contains",
            Predicate::Within => "ST_Within",
            Predicate::Intersects => "ST_Intersects",
            Predicate::Touches => "ST_Touches",
            Predicate::Overlaps => "ST_Overlaps",
            Predicate::Disjoint => "ST_Disjoint",
            Predicate::Equals => "ST_Equals",
            Predicate::Covers => "ST_Covers",
            Predicate::CoveredBy => "ST_CoveredBy",
            Predicate::Crosses => "ST_Crosses",
            Predicate::ContainsProperly => "ST_ContainsProperly",
            Predicate::BbContains => "MbrContains",
            Predicate::BbOverlaps => "MbrIntersects",
        }
    }

    /// Returns true if every match has a bounding box intersecting the query bounding box, so the R*Tree
    /// can prefilter candidates.
    pub fn implies_bbox_intersection(&self) -> bool {
        !matches!(self, Predicate::Disjoint)
    }

    /// Evaluates the predicate.
    pub fn evaluate(&self, indexed: &Geometry<f64>, query: &Geometry<f64>) -> bool {
        let matrix = || indexed.relate(query);
        match self {
            Predicate::Contains => matrix().is_contains(),
            Predicate::Within => matrix().is_within(),
            Predicate::Intersects => matrix().is_intersects(),
            Predicate::Touches => matrix().is_touches(),
            Predicate::Overlaps => matrix().is_overlaps(),
            Predicate::Disjoint => matrix().is_disjoint(),
            Predicate::Equals => matrix().is_equal_topo(),
            Predicate::Covers => matrix().is_covers(),
            Predicate::CoveredBy => matrix().is_coveredby(),
            Predicate::Crosses => matrix().is_crosses(),
            Predicate::ContainsProperly => matrix()
                .matches(CONTAINS_PROPERLY_PATTERN)
                .unwrap_or(false),
            Predicate::BbContains => match bboxes(indexed, query) {
                Some((a, b)) => a.contains_rect(&b),
                None => false,
            },
            Predicate::BbOverlaps => match bboxes(indexed, query) {
                Some((a, b)) => a.intersects(&b),
                None => false,
            },
        }
    }
}

fn bboxes(a: &Geometry<f64>, b: &Geometry<f64>) -> Option<(BoundingRect, BoundingRect)> {
    Some((BoundingRect::of_geometry(a)?, BoundingRect::of_geometry(b)?))
}

impl Display for Predicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Predicate {
    type Err = StoreError;

    /// Parses a predicate name. Names are case-insensitive and may carry a `$` operator prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.strip_prefix('$').unwrap_or(s);
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| StoreError::UnknownPredicate(s.to_owned()))
    }
}

/// Operator of a geo spec entry: a named predicate or a DE-9IM pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GeoOperator {
    /// One of the named predicates.
    Predicate(Predicate),
    /// Generic `relate` test with a DE-9IM pattern.
    Relate(String),
}

impl GeoOperator {
    /// Creates a `relate` operator, validating the pattern.
    ///
    /// A pattern has nine characters, each one of `T`, `F`, `*`, `0`, `1` and `2`.
    pub fn relate(pattern: &str) -> Result<Self, StoreError> {
        validate_pattern(pattern)?;
        Ok(Self::Relate(pattern.to_ascii_uppercase()))
    }
}

impl From<Predicate> for GeoOperator {
    fn from(value: Predicate) -> Self {
        Self::Predicate(value)
    }
}

impl Display for GeoOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            GeoOperator::Predicate(predicate) => write!(f, "{predicate}"),
            GeoOperator::Relate(pattern) => write!(f, "relate({pattern})"),
        }
    }
}

pub(crate) fn validate_pattern(pattern: &str) -> Result<(), StoreError> {
    let valid = pattern.len() == 9
        && pattern
            .chars()
            .all(|c| matches!(c.to_ascii_uppercase(), 'T' | 'F' | '*' | '0' | '1' | '2'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::Validation(format!(
            "`{pattern}` is not a DE-9IM pattern"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use geo::{line_string, point, polygon};

    fn square(min: f64, max: f64) -> Geometry<f64> {
        polygon![(x: min, y: min), (x: max, y: min), (x: max, y: max), (x: min, y: max), (x: min, y: min)]
            .into()
    }

    #[test]
    fn parses_names() {
        assert_eq!("within".parse::<Predicate>().unwrap(), Predicate::Within);
        assert_eq!("$within".parse::<Predicate>().unwrap(), Predicate::Within);
        assert_eq!("coveredby".parse::<Predicate>().unwrap(), Predicate::CoveredBy);
        assert_eq!(
            "$containsProperly".parse::<Predicate>().unwrap(),
            Predicate::ContainsProperly
        );
        assert_matches!(
            "nearby".parse::<Predicate>(),
            Err(StoreError::UnknownPredicate(name)) if name == "nearby"
        );
    }

    #[test]
    fn names_round_trip() {
        for predicate in Predicate::ALL {
            assert_eq!(predicate.to_string().parse::<Predicate>().unwrap(), predicate);
        }
    }

    #[test]
    fn evaluates_topology() {
        let big = square(0.0, 50.0);
        let small = square(10.0, 20.0);
        let neighbour = square(50.0, 150.0);
        let inner: Geometry<f64> = point!(x: 25.0, y: 25.0).into();
        let line: Geometry<f64> = line_string![(x: -10.0, y: 25.0), (x: 25.0, y: 25.0)].into();

        assert!(Predicate::Within.evaluate(&small, &big));
        assert!(Predicate::Contains.evaluate(&big, &small));
        assert!(Predicate::Covers.evaluate(&big, &big));
        assert!(Predicate::CoveredBy.evaluate(&small, &big));
        assert!(Predicate::Touches.evaluate(&big, &neighbour));
        assert!(Predicate::Intersects.evaluate(&big, &neighbour));
        assert!(!Predicate::Overlaps.evaluate(&big, &neighbour));
        assert!(Predicate::Disjoint.evaluate(&small, &neighbour));
        assert!(Predicate::Equals.evaluate(&big, &big.clone()));
        assert!(Predicate::Crosses.evaluate(&line, &big));
        assert!(Predicate::ContainsProperly.evaluate(&big, &inner));
        assert!(!Predicate::ContainsProperly.evaluate(&big, &big));
        assert!(Predicate::BbContains.evaluate(&big, &inner));
        assert!(Predicate::BbOverlaps.evaluate(&big, &neighbour));
        assert!(!Predicate::BbOverlaps.evaluate(&small, &neighbour));
    }

    #[test]
    fn relate_patterns() {
        assert_matches!(GeoOperator::relate("t*f**f***"), Ok(GeoOperator::Relate(p)) if p == "T*F**F***");
        assert_matches!(GeoOperator::relate("T*F"), Err(StoreError::Validation(_)));
        assert_matches!(GeoOperator::relate("T*F**F**X"), Err(StoreError::Validation(_)));
    }
}
