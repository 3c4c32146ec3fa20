use crate::models::Coordinates;
use geo::{HaversineDistance, Point};

/// Calculate the Haversine distance between two points in kilometers
///
/// # Arguments
/// * `lat1` - Latitude of first point in degrees
/// * `lon1` - Longitude of first point in degrees
/// * `lat2` - Latitude of second point in degrees
/// * `lon2` - Longitude of second point in degrees
///
/// # Returns
/// Distance in kilometers
#[inline]
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    // geo points are (x = longitude, y = latitude) and distances are in meters
    let a = Point::new(lon1, lat1);
    let b = Point::new(lon2, lat2);
    a.haversine_distance(&b) / 1000.0
}

/// Distance between two listings' coordinates, or `None` if either is
/// missing or out of range
pub fn listing_distance_km(a: Option<&Coordinates>, b: Option<&Coordinates>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) if a.is_valid() && b.is_valid() => Some(haversine_distance(
            a.latitude,
            a.longitude,
            b.latitude,
            b.longitude,
        )),
        _ => None,
    }
}
