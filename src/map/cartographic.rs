use glam::DVec3;
use std::collections::BTreeMap;
use std::f64::consts::PI;

use crate::error::Result;
use crate::map::projection::ProjectionRegistry;

/// A geographic position: longitude and latitude in radians, height in meters.
///
/// Values are fixed at construction. Consumers derive new positions
/// (`with_height`, `lerp`) instead of mutating one in place.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Cartographic {
    longitude: f64,
    latitude: f64,
    height: f64,
}

impl Cartographic {
    /// Longitude is wrapped into (-π, π], latitude clamped to [-π/2, π/2].
    pub fn from_radians(longitude: f64, latitude: f64, height: f64) -> Self {
        Self {
            longitude: wrap_longitude(longitude),
            latitude: latitude.clamp(-PI / 2.0, PI / 2.0),
            height,
        }
    }

    pub fn from_degrees(longitude: f64, latitude: f64, height: f64) -> Self {
        Self::from_radians(longitude.to_radians(), latitude.to_radians(), height)
    }

    #[inline]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    #[inline]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn with_height(&self, height: f64) -> Self {
        Self { height, ..*self }
    }

    /// Planar distance (radians) with the longitude delta scaled by the mean
    /// latitude. Only meaningful for small separations.
    pub fn distance_approx(&self, other: &Cartographic) -> f64 {
        let x = (self.longitude - other.longitude) * ((self.latitude + other.latitude) / 2.0).cos();
        let y = self.latitude - other.latitude;
        (x * x + y * y).sqrt()
    }

    /// Great-circle distance in radians (spherical law of cosines).
    ///
    /// Loses precision for nearly identical or nearly antipodal points.
    /// Coincident points short-circuit to exactly zero.
    pub fn distance_exact(&self, other: &Cartographic) -> f64 {
        if self.longitude == other.longitude && self.latitude == other.latitude {
            return 0.0;
        }
        let cosine = self.latitude.sin() * other.latitude.sin()
            + self.latitude.cos() * other.latitude.cos() * (other.longitude - self.longitude).cos();
        cosine.clamp(-1.0, 1.0).acos()
    }

    /// Spherical linear interpolation toward `other`, one position per fraction.
    ///
    /// Returns an empty vector when both points coincide. Antipodal pairs have
    /// no unique great circle and give unreliable results.
    pub fn lerp(&self, other: &Cartographic, fractions: &[f64]) -> Vec<Cartographic> {
        let distance = self.distance_exact(other);
        if distance <= 0.0 {
            return Vec::new();
        }
        let sin_distance = distance.sin();
        let (cos_lat1, sin_lat1) = (self.latitude.cos(), self.latitude.sin());
        let (cos_lat2, sin_lat2) = (other.latitude.cos(), other.latitude.sin());

        fractions
            .iter()
            .map(|&fraction| {
                let a = ((1.0 - fraction) * distance).sin() / sin_distance;
                let b = (fraction * distance).sin() / sin_distance;
                let x = a * cos_lat1 * self.longitude.cos() + b * cos_lat2 * other.longitude.cos();
                let y = a * cos_lat1 * self.longitude.sin() + b * cos_lat2 * other.longitude.sin();
                let z = a * sin_lat1 + b * sin_lat2;
                Cartographic::from_radians(
                    y.atan2(x),
                    z.atan2((x * x + y * y).sqrt()),
                    (1.0 - fraction) * self.height + fraction * other.height,
                )
            })
            .collect()
    }

    /// Bearing toward `other` measured in the lon/lat plane.
    pub fn direction(&self, other: &Cartographic) -> f64 {
        (other.latitude - self.latitude).atan2(other.longitude - self.longitude)
    }

    /// Crossing-number test against a ring (closed implicitly).
    pub fn is_inside(&self, ring: &[Cartographic]) -> bool {
        let n = ring.len();
        let mut crossings = 0;
        for i in 0..n {
            let a = &ring[i];
            let b = &ring[(i + 1) % n];
            let upward = a.latitude <= self.latitude && b.latitude > self.latitude;
            let downward = a.latitude > self.latitude && b.latitude <= self.latitude;
            if upward || downward {
                let t = (self.latitude - a.latitude) / (b.latitude - a.latitude);
                if self.longitude < a.longitude + t * (b.longitude - a.longitude) {
                    crossings += 1;
                }
            }
        }
        crossings % 2 == 1
    }

    /// Render-space position under each named projection, or under every
    /// registered projection when `names` is empty.
    pub fn to_render_positions(
        &self,
        registry: &ProjectionRegistry,
        names: &[&str],
    ) -> Result<BTreeMap<String, DVec3>> {
        if names.is_empty() {
            return Ok(registry
                .iter()
                .map(|(name, projector)| (name.to_string(), projector.project(self, registry.params())))
                .collect());
        }
        names
            .iter()
            .map(|name| Ok((name.to_string(), registry.project(name, self)?)))
            .collect()
    }
}

#[inline]
fn wrap_longitude(longitude: f64) -> f64 {
    if longitude > -PI && longitude <= PI {
        return longitude;
    }
    let wrapped = (longitude + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped == -PI {
        PI
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::error::Error;

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    fn samples() -> Vec<Cartographic> {
        vec![
            Cartographic::from_degrees(0.0, 0.0, 0.0),
            Cartographic::from_degrees(2.35, 48.85, 35.0),
            Cartographic::from_degrees(-74.0, 40.7, 0.0),
            Cartographic::from_degrees(139.7, 35.7, 10.0),
            Cartographic::from_degrees(180.0, -89.9, 0.0),
            Cartographic::from_degrees(-179.99, 89.0, -50.0),
        ]
    }

    #[test]
    fn test_longitude_wraps_into_half_open_range() {
        let p = Cartographic::from_degrees(-180.0, 0.0, 0.0);
        assert_close(p.longitude(), PI, 1e-12);
        let q = Cartographic::from_degrees(190.0, 95.0, 0.0);
        assert_close(q.longitude(), (-170.0f64).to_radians(), 1e-12);
        assert_close(q.latitude(), PI / 2.0, 1e-12);
    }

    #[test]
    fn test_distance_exact_to_self_is_zero() {
        for p in samples() {
            assert_eq!(p.distance_exact(&p), 0.0);
        }
    }

    #[test]
    fn test_distance_exact_quarter_circle() {
        let a = Cartographic::from_degrees(0.0, 0.0, 0.0);
        let b = Cartographic::from_degrees(90.0, 0.0, 0.0);
        assert_close(a.distance_exact(&b), PI / 2.0, 1e-12);
        let pole = Cartographic::from_degrees(0.0, 90.0, 0.0);
        assert_close(a.distance_exact(&pole), PI / 2.0, 1e-12);
    }

    #[test]
    fn test_distance_approx_matches_exact_for_small_separations() {
        let a = Cartographic::from_degrees(2.35, 48.85, 0.0);
        let b = Cartographic::from_degrees(2.45, 48.9, 0.0);
        assert_close(a.distance_approx(&b), a.distance_exact(&b), 1e-6);
    }

    #[test]
    fn test_lerp_coincident_points_is_empty() {
        for p in samples() {
            assert!(p.lerp(&p, &[0.5]).is_empty());
        }
    }

    #[test]
    fn test_lerp_midpoint_on_equator() {
        let a = Cartographic::from_degrees(0.0, 0.0, 0.0);
        let b = Cartographic::from_degrees(90.0, 0.0, 100.0);
        let out = a.lerp(&b, &[0.0, 0.5, 1.0]);
        assert_eq!(out.len(), 3);
        assert_close(out[0].longitude(), 0.0, 1e-12);
        assert_close(out[1].longitude(), PI / 4.0, 1e-12);
        assert_close(out[1].latitude(), 0.0, 1e-12);
        assert_close(out[1].height(), 50.0, 1e-12);
        assert_close(out[2].longitude(), PI / 2.0, 1e-12);
        for p in &out {
            assert!(p.longitude().is_finite() && p.latitude().is_finite());
        }
    }

    #[test]
    fn test_is_inside_square() {
        let ring: Vec<Cartographic> = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]
            .iter()
            .map(|&(lon, lat)| Cartographic::from_degrees(lon, lat, 0.0))
            .collect();
        assert!(Cartographic::from_degrees(5.0, 5.0, 0.0).is_inside(&ring));
        assert!(!Cartographic::from_degrees(15.0, 5.0, 0.0).is_inside(&ring));
        assert!(!Cartographic::from_degrees(5.0, -1.0, 0.0).is_inside(&ring));
    }

    #[test]
    fn test_direction_east_and_north() {
        let a = Cartographic::from_degrees(0.0, 0.0, 0.0);
        assert_close(a.direction(&Cartographic::from_degrees(1.0, 0.0, 0.0)), 0.0, 1e-12);
        assert_close(a.direction(&Cartographic::from_degrees(0.0, 1.0, 0.0)), PI / 2.0, 1e-12);
    }

    #[test]
    fn test_to_render_positions() {
        let registry = ProjectionRegistry::new(Configuration::default().projection_params());
        let p = Cartographic::from_degrees(10.0, 20.0, 0.0);

        let all = p.to_render_positions(&registry, &[]).unwrap();
        assert_eq!(all.len(), registry.len());

        let some = p.to_render_positions(&registry, &["Mercator"]).unwrap();
        assert_eq!(some.len(), 1);
        assert!(some.contains_key("Mercator"));

        assert!(matches!(
            p.to_render_positions(&registry, &["bogus"]),
            Err(Error::UnknownProjection(_))
        ));
    }
}
