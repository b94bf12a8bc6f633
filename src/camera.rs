use glam::DVec3;

use globe_morph::scene::Ray;

/// Distance the picking rays start from, in render units.
const RAY_START: f64 = 10_000.0;

/// Orthographic camera orbiting the origin of render space.
///
/// Orientation is kept as three orthonormal axes. The screen maps render
/// units to braille dots through `zoom`.
#[derive(Clone)]
pub struct Camera {
    /// Points from the scene toward the viewer
    forward: DVec3,
    right: DVec3,
    up: DVec3,
    /// Dots per render unit
    pub zoom: f64,
    /// Canvas size in dots
    pub width: usize,
    pub height: usize,
}

impl Camera {
    /// Looking down the z axis, fitting a globe of `radius` render units.
    pub fn new(radius: f64, width: usize, height: usize) -> Self {
        let mut camera = Self {
            forward: DVec3::Z,
            right: DVec3::X,
            up: DVec3::Y,
            zoom: 1.0,
            width,
            height,
        };
        camera.fit(radius);
        camera
    }

    pub fn fit(&mut self, radius: f64) {
        let span = self.width.min(self.height).max(1) as f64;
        self.zoom = span * 0.45 / radius.max(f64::EPSILON);
    }

    /// Screen dot for a render-space point. With `cull`, points on the far
    /// side of the origin are dropped.
    pub fn project(&self, point: DVec3, cull: bool) -> Option<(i32, i32)> {
        if cull && point.dot(self.forward) < 0.0 {
            return None;
        }
        let sx = point.dot(self.right) * self.zoom;
        let sy = point.dot(self.up) * self.zoom;
        Some((
            (self.width as f64 / 2.0 + sx).round() as i32,
            (self.height as f64 / 2.0 - sy).round() as i32,
        ))
    }

    /// Ray through a screen dot, heading into the scene.
    pub fn ray_at(&self, px: i32, py: i32) -> Ray {
        let sx = (px as f64 - self.width as f64 / 2.0) / self.zoom;
        let sy = -(py as f64 - self.height as f64 / 2.0) / self.zoom;
        let origin = self.right * sx + self.up * sy + self.forward * RAY_START;
        Ray::new(origin, -self.forward)
    }

    /// Rotate by a drag of (dx, dy) dots so the surface follows the cursor.
    pub fn rotate_drag(&mut self, dx: i32, dy: i32, radius: f64) {
        let scale = radius * self.zoom;
        let yaw = dx as f64 / scale;
        let pitch = -(dy as f64) / scale;

        if yaw.abs() > 1e-10 {
            let (sin_a, cos_a) = yaw.sin_cos();
            let forward = self.forward * cos_a + self.right * sin_a;
            self.right = (self.right * cos_a - self.forward * sin_a).normalize();
            self.forward = forward.normalize();
        }
        if pitch.abs() > 1e-10 {
            let (sin_a, cos_a) = pitch.sin_cos();
            let forward = self.forward * cos_a + self.up * sin_a;
            self.up = (self.up * cos_a - self.forward * sin_a).normalize();
            self.forward = forward.normalize();
        }
    }

    pub fn zoom_in(&mut self) {
        self.zoom = (self.zoom * 1.25).min(1e4);
    }

    pub fn zoom_out(&mut self) {
        self.zoom = (self.zoom / 1.25).max(1e-4);
    }

    pub fn set_size(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_centre_and_cull() {
        let camera = Camera::new(100.0, 200, 100);
        assert_eq!(camera.project(DVec3::ZERO, true), Some((100, 50)));
        assert_eq!(camera.project(DVec3::new(0.0, 0.0, -50.0), true), None);
        assert!(camera.project(DVec3::new(0.0, 0.0, -50.0), false).is_some());
    }

    #[test]
    fn test_ray_hits_projected_point() {
        let camera = Camera::new(100.0, 200, 100);
        let point = DVec3::new(30.0, -20.0, 80.0);
        let (px, py) = camera.project(point, true).unwrap();
        let ray = camera.ray_at(px, py);
        let t = (ray.origin - point).dot(-ray.dir);
        let closest = ray.origin + ray.dir * t;
        assert!((closest - point).length() < 1.0 / camera.zoom + 1e-9);
    }

    #[test]
    fn test_drag_keeps_axes_orthonormal() {
        let mut camera = Camera::new(100.0, 200, 100);
        camera.rotate_drag(17, -9, 100.0);
        for axis in [camera.forward, camera.right, camera.up] {
            assert!((axis.length() - 1.0).abs() < 1e-9);
        }
        assert!(camera.forward.dot(camera.right).abs() < 1e-9);
        assert!(camera.forward.dot(camera.up).abs() < 1e-9);
    }
}
