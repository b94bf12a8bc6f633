use glam::DVec3;
use std::f64::consts::TAU;

use crate::map::cartographic::Cartographic;

/// North-East-Down frame anchored on a summit (a city for cones).
///
/// Down points into the earth, so a positive elevation goes below the
/// surface. Distances are in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NedLocal {
    summit: Cartographic,
    earth_radius_meters: f64,
    origin: DVec3,
    north: DVec3,
    east: DVec3,
    down: DVec3,
}

impl NedLocal {
    pub fn new(summit: Cartographic, earth_radius_meters: f64) -> Self {
        let (sin_lon, cos_lon) = summit.longitude().sin_cos();
        let (sin_lat, cos_lat) = summit.latitude().sin_cos();
        Self {
            summit,
            earth_radius_meters,
            origin: to_ecef(&summit, earth_radius_meters),
            north: DVec3::new(-cos_lon * sin_lat, -sin_lon * sin_lat, cos_lat),
            east: DVec3::new(-sin_lon, cos_lon, 0.0),
            down: DVec3::new(-cos_lon * cos_lat, -sin_lon * cos_lat, -sin_lat),
        }
    }

    #[inline]
    pub fn summit(&self) -> &Cartographic {
        &self.summit
    }

    pub fn cartographic_to_ned(&self, position: &Cartographic) -> DVec3 {
        let relative = to_ecef(position, self.earth_radius_meters) - self.origin;
        DVec3::new(
            self.north.dot(relative),
            self.east.dot(relative),
            self.down.dot(relative),
        )
    }

    pub fn ned_to_cartographic(&self, ned: DVec3) -> Cartographic {
        let ecef = self.north * ned.x + self.east * ned.y + self.down * ned.z + self.origin;
        from_ecef(ecef, self.earth_radius_meters)
    }

    /// Clock angle of `position` seen from the summit, in [0, 2π).
    pub fn clock_of(&self, position: &Cartographic) -> f64 {
        let ned = self.cartographic_to_ned(position);
        let clock = ned.y.atan2(ned.x);
        if clock < 0.0 {
            clock + TAU
        } else {
            clock
        }
    }

    /// Point reached from the summit along (clock, elevation) after `distance` meters.
    pub fn project(&self, clock: f64, elevation: f64, distance: f64) -> Cartographic {
        let (sin_el, cos_el) = elevation.sin_cos();
        let (sin_clock, cos_clock) = clock.sin_cos();
        self.ned_to_cartographic(DVec3::new(cos_el * cos_clock, cos_el * sin_clock, sin_el) * distance)
    }
}

fn to_ecef(position: &Cartographic, earth_radius_meters: f64) -> DVec3 {
    let radius = earth_radius_meters + position.height();
    let (sin_lat, cos_lat) = position.latitude().sin_cos();
    let (sin_lon, cos_lon) = position.longitude().sin_cos();
    DVec3::new(cos_lon * radius * cos_lat, sin_lon * radius * cos_lat, sin_lat * radius)
}

fn from_ecef(ecef: DVec3, earth_radius_meters: f64) -> Cartographic {
    let radius = ecef.length();
    if radius <= 0.0 {
        return Cartographic::from_radians(0.0, 0.0, -earth_radius_meters);
    }
    Cartographic::from_radians(
        ecef.y.atan2(ecef.x),
        (ecef.z / radius).clamp(-1.0, 1.0).asin(),
        radius - earth_radius_meters,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const R: f64 = 6371e3;

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn test_summit_is_origin() {
        let summit = Cartographic::from_degrees(2.35, 48.85, 0.0);
        let frame = NedLocal::new(summit, R);
        let ned = frame.cartographic_to_ned(&summit);
        assert!(ned.length() < 1e-6);
    }

    #[test]
    fn test_ned_round_trip() {
        let frame = NedLocal::new(Cartographic::from_degrees(-74.0, 40.7, 0.0), R);
        let target = Cartographic::from_degrees(-73.0, 41.5, 250.0);
        let back = frame.ned_to_cartographic(frame.cartographic_to_ned(&target));
        assert_close(back.longitude(), target.longitude(), 1e-9);
        assert_close(back.latitude(), target.latitude(), 1e-9);
        assert_close(back.height(), target.height(), 1e-4);
    }

    #[test]
    fn test_clock_points_north_and_east() {
        let frame = NedLocal::new(Cartographic::from_degrees(0.0, 0.0, 0.0), R);
        let north = Cartographic::from_degrees(0.0, 1.0, 0.0);
        let east = Cartographic::from_degrees(1.0, 0.0, 0.0);
        let west = Cartographic::from_degrees(-1.0, 0.0, 0.0);
        assert_close(frame.clock_of(&north), 0.0, 1e-6);
        assert_close(frame.clock_of(&east), PI / 2.0, 1e-6);
        assert_close(frame.clock_of(&west), 3.0 * PI / 2.0, 1e-6);
    }

    #[test]
    fn test_positive_elevation_goes_below_surface() {
        let frame = NedLocal::new(Cartographic::from_degrees(10.0, 20.0, 0.0), R);
        let below = frame.project(0.0, PI / 4.0, 100_000.0);
        assert!(below.height() < 0.0);
        assert!(below.latitude() > 20f64.to_radians());
        let level = frame.project(PI / 2.0, 0.0, 1_000.0);
        assert!(level.longitude() > 10f64.to_radians());
    }
}
