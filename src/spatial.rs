use crate::projection::feature_position;
use crate::records::AgentRecord;
use geo_types::Coord;
use geojson::Feature;

pub const MIN_POLYGON_VERTICES: usize = 3;

/// Even-odd ray cast. `x` is longitude, `y` latitude.
///
/// The ring may be open or closed; a repeated closing vertex contributes a
/// zero-length edge that never crosses the ray. Fewer than three vertices is
/// never inside.
pub fn point_in_polygon(point: Coord<f64>, polygon: &[Coord<f64>]) -> bool {
    if polygon.len() < MIN_POLYGON_VERTICES {
        return false;
    }

    let Coord { x, y } = point;
    let mut inside = false;
    let mut j = polygon.len() - 1;

    for i in 0..polygon.len() {
        let Coord { x: xi, y: yi } = polygon[i];
        let Coord { x: xj, y: yj } = polygon[j];

        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }

        j = i;
    }

    inside
}

/// Features whose point lies inside `polygon`, in input order.
pub fn select_within<'a>(polygon: &[Coord<f64>], features: &'a [Feature]) -> Vec<&'a Feature> {
    if polygon.len() < MIN_POLYGON_VERTICES {
        return vec![];
    }

    features
        .iter()
        .filter(|feature| {
            feature_position(feature)
                .map(|position| point_in_polygon(position, polygon))
                .unwrap_or(false)
        })
        .collect()
}

/// Records whose map position lies inside `polygon`, in input order.
pub fn select_records_within<'a, I>(polygon: &[Coord<f64>], records: I) -> Vec<&'a AgentRecord>
where
    I: IntoIterator<Item = &'a AgentRecord>,
{
    if polygon.len() < MIN_POLYGON_VERTICES {
        return vec![];
    }

    records
        .into_iter()
        .filter(|record| {
            record
                .map_position()
                .map(|(x, y)| point_in_polygon(Coord { x, y }, polygon))
                .unwrap_or(false)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::project;
    use crate::records::test_record;
    use geo::Contains;
    use geo_types::{LineString, Point, Polygon};

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    fn square() -> Vec<Coord<f64>> {
        vec![c(0.0, 0.0), c(0.0, 2.0), c(2.0, 2.0), c(2.0, 0.0), c(0.0, 0.0)]
    }

    #[test]
    fn square_inside_and_outside() {
        let polygon = square();
        assert!(point_in_polygon(c(1.0, 1.0), &polygon));
        assert!(!point_in_polygon(c(3.0, 3.0), &polygon));
        assert!(!point_in_polygon(c(-0.5, 1.0), &polygon));
    }

    #[test]
    fn vertex_result_is_stable_across_calls() {
        let polygon = square();
        let first = point_in_polygon(c(0.0, 0.0), &polygon);
        for _ in 0..10 {
            assert_eq!(point_in_polygon(c(0.0, 0.0), &polygon), first);
        }
    }

    #[test]
    fn open_and_closed_rings_agree() {
        let closed = square();
        let open = &closed[..4];
        for point in [c(1.0, 1.0), c(0.5, 1.9), c(2.5, 1.0), c(1.0, -0.1)] {
            assert_eq!(
                point_in_polygon(point, &closed),
                point_in_polygon(point, open)
            );
        }
    }

    #[test]
    fn degenerate_polygons_contain_nothing() {
        assert!(!point_in_polygon(c(0.0, 0.0), &[]));
        assert!(!point_in_polygon(c(0.5, 0.5), &[c(0.0, 0.0), c(1.0, 1.0)]));
    }

    #[test]
    fn concave_polygon_matches_geo_contains() {
        // U shape open to the north
        let ring = vec![
            c(0.0, 0.0),
            c(6.0, 0.0),
            c(6.0, 6.0),
            c(4.0, 6.0),
            c(4.0, 2.0),
            c(2.0, 2.0),
            c(2.0, 6.0),
            c(0.0, 6.0),
            c(0.0, 0.0),
        ];
        let reference = Polygon::new(LineString::from(ring.clone()), vec![]);

        for point in [
            c(1.0, 1.0),
            c(3.0, 1.0),
            c(3.0, 4.0),
            c(5.0, 5.0),
            c(1.0, 5.5),
            c(7.0, 3.0),
        ] {
            assert_eq!(
                point_in_polygon(point, &ring),
                reference.contains(&Point::from(point)),
                "disagreement at {:?}",
                point
            );
        }
    }

    #[test]
    fn selection_keeps_input_order_and_handles_no_hits() {
        let records = vec![
            test_record("1", "Ada", "NSW", "Sales", "Retail", "Grace", 0.5, 0.5),
            test_record("2", "Bob", "NSW", "Sales", "Retail", "Grace", 5.0, 5.0),
            test_record("3", "Cy", "NSW", "Sales", "Retail", "Grace", 1.5, 1.0),
        ];
        let features = project(&records);
        let polygon = square();

        let hits: Vec<_> = select_within(&polygon, &features.features)
            .into_iter()
            .filter_map(|f| f.properties.as_ref()?.get("empName")?.as_str())
            .collect();
        assert_eq!(hits, vec!["Ada", "Cy"]);

        let record_hits: Vec<_> = select_records_within(&polygon, &records)
            .into_iter()
            .map(|r| r.tsa_id.as_deref().unwrap_or(""))
            .collect();
        assert_eq!(record_hits, vec!["1", "3"]);

        let far = vec![c(50.0, 50.0), c(50.0, 51.0), c(51.0, 51.0)];
        assert!(select_within(&far, &features.features).is_empty());
        assert!(select_records_within(&polygon[..2], &records).is_empty());
    }
}
