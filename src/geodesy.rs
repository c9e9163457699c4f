use geo::{Distance, HaversineMeasure};

use crate::models::GeoPoint;

/// 地球平均半径 (米)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// 纬度/经度是否在合法范围内
pub fn is_valid_coordinate(lat: f64, lon: f64) -> bool {
    lat.is_finite()
        && lon.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon)
}

/// 两点间大圆距离 (haversine, 米), 球半径取 [`EARTH_RADIUS_M`]
pub fn haversine_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    HaversineMeasure::new(EARTH_RADIUS_M).distance(a.to_point(), b.to_point())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_one_degree_of_latitude() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(1.0, 0.0);
        let d = haversine_m(&a, &b);
        assert!((d - 111_194.93).abs() < 1.0, "got {d}");
    }

    #[test]
    fn haversine_is_symmetric_and_zero_on_same_point() {
        let a = GeoPoint::new(40.7128, -74.0060);
        let b = GeoPoint::new(39.9526, -75.1652);
        assert_eq!(haversine_m(&a, &a), 0.0);
        assert!((haversine_m(&a, &b) - haversine_m(&b, &a)).abs() < 1e-6);
    }

    #[test]
    fn coordinate_bounds() {
        assert!(is_valid_coordinate(90.0, 180.0));
        assert!(is_valid_coordinate(-90.0, -180.0));
        assert!(!is_valid_coordinate(90.1, 0.0));
        assert!(!is_valid_coordinate(0.0, -180.5));
        assert!(!is_valid_coordinate(f64::NAN, 0.0));
    }
}
