/// Great-circle geofencing. A candidate matches iff the submitted point is
/// within its radius, boundary inclusive (`distance <= radius`).
const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone)]
pub struct Candidate {
    pub location_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius: f64,
}

/// Haversine distance in meters between two coordinate pairs.
pub fn distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

pub fn within(lat: f64, lon: f64, candidate: &Candidate) -> bool {
    distance_m(lat, lon, candidate.latitude, candidate.longitude) <= candidate.radius
}

/// Walks the candidates in the given order and returns the first whose
/// radius covers the point. First-match, not nearest-match: multiple
/// location windows may overlap and the caller's ordering decides.
pub fn first_match<'a>(lat: f64, lon: f64, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
    candidates.iter().find(|c| within(lat, lon, c))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Dhaka office anchor used across the fixtures.
    const LAT: f64 = 23.7806;
    const LON: f64 = 90.2794;

    fn candidate(id: &str, lat: f64, lon: f64, radius: f64) -> Candidate {
        Candidate {
            location_id: id.into(),
            latitude: lat,
            longitude: lon,
            radius,
        }
    }

    #[test]
    fn zero_distance_to_self() {
        assert_eq!(distance_m(LAT, LON, LAT, LON), 0.0);
    }

    #[test]
    fn boundary_is_inclusive() {
        // A point ~111m north of the anchor; use its exact distance as the
        // radius so the boundary itself is exercised from both sides.
        let point_lat = LAT + 0.001;
        let d = distance_m(point_lat, LON, LAT, LON);
        assert!(d > 100.0 && d < 120.0);

        assert!(within(point_lat, LON, &candidate("a", LAT, LON, d)));
        assert!(!within(point_lat, LON, &candidate("a", LAT, LON, d - 1.0)));
    }

    #[test]
    fn first_match_wins_over_nearer_later_candidate() {
        let far = candidate("far", LAT + 0.002, LON, 5000.0);
        let near = candidate("near", LAT, LON, 5000.0);
        let candidates = [far.clone(), near];
        let hit = first_match(LAT, LON, &candidates).unwrap();
        assert_eq!(hit.location_id, "far");
    }

    #[test]
    fn no_candidate_in_range() {
        let off = candidate("off", LAT + 0.5, LON, 100.0);
        assert!(first_match(LAT, LON, &[off]).is_none());
    }
}
