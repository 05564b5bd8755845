use crate::models::location::GeoPoint;

pub const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lng = (b.longitude - a.longitude).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    // Rounding can push this just past 1.0 for near-antipodal points.
    let haversine =
        (sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng).clamp(0.0, 1.0);
    let central_angle = 2.0 * haversine.sqrt().atan2((1.0 - haversine).sqrt());

    EARTH_RADIUS_KM * central_angle
}

/// Great-circle containment test; the boundary counts as in range.
///
/// Invalid coordinates or a non-finite radius never match.
pub fn is_in_range(point: &GeoPoint, center: &GeoPoint, radius_km: f64) -> bool {
    if !point.is_valid() || !center.is_valid() || !radius_km.is_finite() {
        return false;
    }

    let distance = haversine_km(point, center);
    !distance.is_nan() && distance <= radius_km
}

/// Same as [`is_in_range`], treating a missing location as out of range.
pub fn located_in_range(point: Option<&GeoPoint>, center: &GeoPoint, radius_km: f64) -> bool {
    point.is_some_and(|point| is_in_range(point, center, radius_km))
}
