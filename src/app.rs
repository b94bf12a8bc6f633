use std::sync::Arc;
use std::time::Duration;

use globe_morph::board::{BoardMesh, ConeBoard, CountryBoard, CountrySource, TownTransport};
use globe_morph::config::Configuration;
use globe_morph::criteria::PropertyValue;
use globe_morph::map::projection::NONE;
use globe_morph::map::{Cartographic, ProjectionRegistry};
use globe_morph::scene::{Ray, SceneIndex, TriangleRaycaster};

use crate::camera::Camera;

/// Cone length around each city, in meters.
const CONE_DISTANCE: f64 = 600_000.0;

/// Application state
pub struct App {
    pub camera: Camera,
    pub countries: CountryBoard,
    pub cones: ConeBoard,
    pub scene: SceneIndex,
    pub should_quit: bool,
    /// Last mouse position for drag tracking
    pub last_mouse: Option<(u16, u16)>,
    /// Line shown in the status bar about the last pick
    pub picked: Option<String>,
    registry: Arc<ProjectionRegistry>,
    radius: f64,
    extruded: bool,
}

impl App {
    pub fn new(config: Configuration, width: usize, height: usize) -> Self {
        let radius = config.three_earth_radius;
        let registry = Arc::new(ProjectionRegistry::new(config.projection_params()));
        let config = Arc::new(config);
        let (pixel_width, pixel_height) = canvas_size(width, height);
        Self {
            camera: Camera::new(radius, pixel_width, pixel_height),
            countries: CountryBoard::new(NONE, Arc::clone(&registry), Arc::clone(&config)),
            cones: ConeBoard::new(NONE, Arc::clone(&registry), config),
            scene: SceneIndex::default(),
            should_quit: false,
            last_mouse: None,
            picked: None,
            registry,
            radius,
            extruded: false,
        }
    }

    pub fn load(&mut self, countries: &[CountrySource], towns: &[TownTransport]) {
        self.countries.add(countries, &mut self.scene);
        let boundaries = self.countries.boundaries();
        self.cones.add(towns, &boundaries, CONE_DISTANCE, None, &mut self.scene);
        if let Some(year) = self.cones.years().first().map(|year| year.to_string()) {
            self.cones.set_year(&year);
        }
    }

    /// Update camera size when terminal resizes
    pub fn resize(&mut self, width: usize, height: usize) {
        let (pixel_width, pixel_height) = canvas_size(width, height);
        self.camera.set_size(pixel_width, pixel_height);
    }

    /// Advance both boards by one frame.
    pub fn tick(&mut self, elapsed: Duration) {
        self.countries.update(elapsed, &mut self.scene);
        self.cones.update(elapsed, &mut self.scene);
    }

    pub fn projection(&self) -> &str {
        self.countries.projection()
    }

    /// Whether the current projection is the sphere, which needs back faces culled.
    pub fn is_globe(&self) -> bool {
        self.projection() == NONE
    }

    pub fn cycle_projection(&mut self) {
        let names: Vec<&str> = self.registry.names().collect();
        let current = names.iter().position(|&name| name == self.projection()).unwrap_or(0);
        let next = names[(current + 1) % names.len()].to_string();
        if self.countries.change_projection(&next, None, None) {
            self.cones.change_projection(&next, None, None);
            self.picked = Some(format!("→ {next}"));
        }
    }

    pub fn toggle_extrusion(&mut self) {
        self.extruded = !self.extruded;
        let value = if self.extruded { None } else { Some(0.0) };
        for result in [self.countries.extrude(None, value), self.cones.extrude(None, value)] {
            if let Err(error) = result {
                self.picked = Some(error.to_string());
            }
        }
    }

    pub fn cycle_year(&mut self) {
        let years: Vec<String> = self.cones.years().into_iter().map(str::to_string).collect();
        if years.is_empty() {
            return;
        }
        let current = self
            .cones
            .year()
            .and_then(|year| years.iter().position(|y| y == year))
            .map_or(0, |i| (i + 1) % years.len());
        self.cones.set_year(&years[current]);
    }

    pub fn toggle_limits(&mut self) {
        let with_limits = !self.cones.with_limits();
        self.cones.set_with_limits(with_limits);
    }

    pub fn toggle_cones(&mut self) {
        let show = !self.cones.show();
        self.cones.set_show(show);
    }

    pub fn year(&self) -> Option<&str> {
        self.cones.year()
    }

    pub fn extruded(&self) -> bool {
        self.extruded
    }

    pub fn with_limits(&self) -> bool {
        self.cones.with_limits()
    }

    /// Pick under the cursor: cones first, then countries. The picked
    /// country is highlighted along with every polygon sharing its properties.
    pub fn pick(&mut self, col: u16, row: u16) {
        let (px, py) = mouse_to_pixel(col, row);
        let ray = self.camera.ray_at(px, py);
        let spot = self.ground_position(&ray).map_or_else(String::new, |position| {
            format!(
                " @ {:.1}°, {:.1}°",
                position.latitude().to_degrees(),
                position.longitude().to_degrees()
            )
        });
        if let Some(id) = self.cones.get_mesh_by_mouse(&ray, false, &TriangleRaycaster, &mut self.scene) {
            self.picked = self.cones.mesh(id).map(|cone| {
                let name = label(cone.properties().get("cityName"));
                format!("{name} {} {}{spot}", cone.transport(), cone.year())
            });
            return;
        }
        let hit = self
            .countries
            .get_mesh_by_mouse(&ray, true, &TriangleRaycaster, &mut self.scene);
        let name = hit.and_then(|id| self.countries.mesh(id)).map(|country| {
            let properties = country.properties();
            label(properties.get("name").or_else(|| properties.get("NAME")))
        });
        self.picked = match name {
            Some(name) => Some(format!("{name}{spot}")),
            None if !spot.is_empty() => Some(spot.trim_start().to_string()),
            None => None,
        };
    }

    /// Geographic position under a ray: on the sphere for the globe, on the
    /// ground plane for flat maps.
    fn ground_position(&self, ray: &Ray) -> Option<Cartographic> {
        let point = if self.is_globe() {
            let b = ray.origin.dot(ray.dir);
            let c = ray.origin.length_squared() - self.radius * self.radius;
            let discriminant = b * b - c;
            if discriminant < 0.0 {
                return None;
            }
            ray.origin + ray.dir * (-b - discriminant.sqrt())
        } else {
            if ray.dir.z.abs() < f64::EPSILON {
                return None;
            }
            ray.origin + ray.dir * (-ray.origin.z / ray.dir.z)
        };
        self.registry.unproject(self.projection(), point).ok()
    }

    /// Handle mouse drag
    pub fn handle_drag(&mut self, x: u16, y: u16) {
        if let Some((last_x, last_y)) = self.last_mouse {
            let dx = (last_x as i32 - x as i32) * 2;
            let dy = (last_y as i32 - y as i32) * 4;
            self.camera.rotate_drag(dx, dy, self.radius);
        }
        self.last_mouse = Some((x, y));
    }

    /// Reset drag state when mouse button released
    pub fn end_drag(&mut self) {
        self.last_mouse = None;
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }
}

fn label(value: Option<&PropertyValue>) -> String {
    value.map_or_else(|| "?".to_string(), PropertyValue::to_string)
}

/// Braille dots available inside the bordered map area.
fn canvas_size(width: usize, height: usize) -> (usize, usize) {
    // 2 for the border, 1 more row for the status bar
    (width.saturating_sub(2) * 2, height.saturating_sub(3) * 4)
}

/// Terminal cell to braille dot, past the one-cell border.
fn mouse_to_pixel(col: u16, row: u16) -> (i32, i32) {
    ((col.saturating_sub(1)) as i32 * 2, (row.saturating_sub(1)) as i32 * 4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use globe_morph::data;

    fn app() -> App {
        let mut app = App::new(Configuration::default(), 82, 43);
        app.load(&data::simple_world(), &data::simple_towns());
        app
    }

    #[test]
    fn test_load_fills_both_boards() {
        let app = app();
        assert_eq!(app.countries.len(), 6);
        assert_eq!(app.cones.len(), 16);
        assert_eq!(app.year(), Some("1990"));
    }

    #[test]
    fn test_cycle_year_wraps() {
        let mut app = app();
        app.cycle_year();
        assert_eq!(app.year(), Some("2010"));
        app.cycle_year();
        assert_eq!(app.year(), Some("1990"));
    }

    #[test]
    fn test_cycle_projection_moves_both_boards() {
        let mut app = app();
        app.cycle_projection();
        for _ in 0..200 {
            app.tick(Duration::from_millis(16));
        }
        assert_eq!(app.countries.projection(), app.cones.projection());
        assert_ne!(app.projection(), NONE);
    }

    #[test]
    fn test_pick_reports_ground_position() {
        let mut app = app();
        let ray = app.camera.ray_at(80, 80);
        let position = app.ground_position(&ray).unwrap();
        assert!(position.latitude().abs() < 0.05);
        // Camera looks down +z, which the globe maps to longitude 90°
        assert!((position.longitude().to_degrees() - 90.0).abs() < 3.0);
        app.pick(0, 0);
        assert!(app.picked.is_none());
    }

    #[test]
    fn test_canvas_size_accounts_for_border() {
        assert_eq!(canvas_size(82, 43), (160, 160));
        assert_eq!(canvas_size(1, 1), (0, 0));
    }
}
