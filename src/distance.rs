use crate::types::Coordinate;

/// Mean Earth radius used for all route distances
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine great-circle distance in meters.
///
/// Latitude and longitude are taken as-is; out-of-range values are not rejected.
pub fn haversine_distance(a: &Coordinate, b: &Coordinate) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).max(0.0).sqrt());
    EARTH_RADIUS_M * c
}

/// Sum of straight-line distances between consecutive points
pub fn chord_length(points: &[Coordinate]) -> f64 {
    points
        .windows(2)
        .map(|pair| haversine_distance(&pair[0], &pair[1]))
        .sum()
}
