use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::board::{Board, BoardMesh, MeshState};
use crate::config::Configuration;
use crate::criteria::{Properties, PropertyValue};
use crate::error::{Error, Result};
use crate::map::{Cartographic, NedLocal, ProjectionRegistry};
use crate::morph::cone::shape;
use crate::morph::{Boundary, ConeLimits, Direction, MorphableGeometry};
use crate::scene::{MeshId, RenderKind, Scene};

pub type ConeBoard = Board<ConeMesh>;

/// Epoch label → directions.
pub type Epochs = BTreeMap<String, Vec<Direction>>;

/// A city with its transport directions: transport → epoch → directions.
#[derive(Debug, Clone, Default)]
pub struct TownTransport {
    pub city_code: String,
    pub position: Cartographic,
    pub properties: Properties,
    pub transports: BTreeMap<String, Epochs>,
}

/// Everything that identifies one cone and shapes it.
#[derive(Debug, Clone)]
pub struct ConeParts {
    pub city_code: String,
    pub transport: String,
    pub frame: NedLocal,
    pub epochs: Epochs,
    pub properties: Properties,
}

/// The cone of one transport mode around one city, one geometry per epoch.
#[derive(Debug, Clone)]
pub struct ConeMesh {
    state: MeshState,
    city_code: String,
    transport: String,
    frame: NedLocal,
    epochs: Epochs,
    /// Never empty; same keys as `epochs`
    geometries: Vec<(String, MorphableGeometry)>,
    selected: usize,
    shown_year: Option<String>,
    distance: f64,
    with_limits: bool,
    limits: ConeLimits,
    registry: Arc<ProjectionRegistry>,
    config: Arc<Configuration>,
}

impl ConeMesh {
    /// Limits come from the boundaries holding the city.
    pub fn new(
        registry: Arc<ProjectionRegistry>,
        config: Arc<Configuration>,
        parts: ConeParts,
        boundaries: &[&Boundary],
        projection: &str,
        distance: f64,
        with_limits: bool,
    ) -> Result<Self> {
        let limits = local_limits(&parts.frame, boundaries, &config);
        let geometries = build_epochs(
            &registry,
            &config,
            &parts.frame,
            &parts.epochs,
            distance,
            with_limits.then_some(&limits),
            projection,
        )?;
        Ok(Self {
            state: MeshState::new(parts.properties),
            city_code: parts.city_code,
            transport: parts.transport,
            frame: parts.frame,
            epochs: parts.epochs,
            geometries,
            selected: 0,
            shown_year: None,
            distance,
            with_limits,
            limits,
            registry,
            config,
        })
    }

    pub fn city_code(&self) -> &str {
        &self.city_code
    }

    pub fn transport(&self) -> &str {
        &self.transport
    }

    pub fn position(&self) -> &Cartographic {
        self.frame.summit()
    }

    pub fn frame(&self) -> &NedLocal {
        &self.frame
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn with_limits(&self) -> bool {
        self.with_limits
    }

    /// Selected epoch.
    pub fn year(&self) -> &str {
        &self.geometries[self.selected].0
    }

    pub fn years(&self) -> impl Iterator<Item = &str> {
        self.geometries.iter().map(|(year, _)| year.as_str())
    }

    /// Select `year` if this cone has it. Returns whether it does.
    pub fn set_year(&mut self, year: &str) -> bool {
        match self.geometries.iter().position(|(label, _)| label == year) {
            Some(i) => {
                self.selected = i;
                true
            }
            None => false,
        }
    }

    /// Rebuild from new directions and/or a new distance, keeping the
    /// selected epoch, projection and extrusion.
    pub fn update(&mut self, distance: Option<f64>, epochs: Option<Epochs>) -> Result<()> {
        let distance = distance.unwrap_or(self.distance);
        let epochs = epochs.unwrap_or_else(|| self.epochs.clone());
        let limits = self.with_limits.then_some(&self.limits);
        let geometries = build_epochs(
            &self.registry,
            &self.config,
            &self.frame,
            &epochs,
            distance,
            limits,
            self.geometry().projection(),
        )?;
        self.distance = distance;
        self.epochs = epochs;
        self.replace_geometries(geometries);
        Ok(())
    }

    /// Recompute coastline limits. Only the shape changes.
    pub fn regenerate_limits(&mut self, boundaries: &[&Boundary]) -> Result<()> {
        self.limits = local_limits(&self.frame, boundaries, &self.config);
        if self.with_limits {
            self.update(None, None)?;
        }
        Ok(())
    }

    pub fn set_with_limits(&mut self, with_limits: bool) -> Result<()> {
        if self.with_limits == with_limits {
            return Ok(());
        }
        self.with_limits = with_limits;
        self.update(None, None)
    }

    fn replace_geometries(&mut self, mut geometries: Vec<(String, MorphableGeometry)>) {
        let year = self.year().to_string();
        for (label, geometry) in &mut geometries {
            let previous = self
                .geometries
                .iter()
                .find(|(old, _)| old == label)
                .map_or(&self.geometries[self.selected].1, |(_, g)| g);
            geometry.carry_state_from(previous);
        }
        self.selected = geometries.iter().position(|(label, _)| *label == year).unwrap_or(0);
        self.geometries = geometries;
    }
}

fn local_limits(frame: &NedLocal, boundaries: &[&Boundary], config: &Configuration) -> ConeLimits {
    let summit = frame.summit();
    ConeLimits::from_boundaries(
        boundaries.iter().copied().filter(|b| b.contains(summit)),
        frame,
        config.cone_step(),
    )
}

fn build_epochs(
    registry: &ProjectionRegistry,
    config: &Configuration,
    frame: &NedLocal,
    epochs: &Epochs,
    distance: f64,
    limits: Option<&ConeLimits>,
    projection: &str,
) -> Result<Vec<(String, MorphableGeometry)>> {
    if epochs.is_empty() {
        return Err(Error::Triangulation("cone has no epoch".to_string()));
    }
    epochs
        .iter()
        .map(|(year, directions)| {
            let cone = shape(frame, directions, distance, limits, config);
            let geometry = MorphableGeometry::build(registry, projection, &cone.vertices, cone.indices)?;
            Ok((year.clone(), geometry))
        })
        .collect()
}

/// Board-wide cone settings.
#[derive(Debug, Clone)]
pub struct ConeSettings {
    year: Option<String>,
    with_limits: bool,
}

impl Default for ConeSettings {
    fn default() -> Self {
        Self {
            year: None,
            with_limits: true,
        }
    }
}

impl BoardMesh for ConeMesh {
    const KIND: RenderKind = RenderKind::Cone;
    const EXCLUDED_PATHS: &'static [&'static str] = &["referential", "layers", "position", "transports"];
    type Extra = ConeSettings;

    fn state(&self) -> &MeshState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut MeshState {
        &mut self.state
    }

    fn geometry(&self) -> &MorphableGeometry {
        &self.geometries[self.selected].1
    }

    fn geometries_mut(&mut self) -> impl Iterator<Item = &mut MorphableGeometry> {
        self.geometries.iter_mut().map(|(_, geometry)| geometry)
    }

    fn covers(&self, point: &Cartographic, config: &Configuration) -> bool {
        self.position().distance_approx(point) < config.cone_search_epsilon
    }

    /// Drawn only when visible and showing the board's epoch.
    fn is_rendered(&self) -> bool {
        self.state.visible() && self.shown_year.as_deref().map_or(true, |year| year == self.year())
    }
}

impl Board<ConeMesh> {
    /// Add or refresh one cone per town and transport.
    ///
    /// A cone already present for the same city and transport gets the new
    /// directions and distance and its properties replaced. `with_limits`
    /// defaults to the board setting.
    pub fn add(
        &mut self,
        towns: &[TownTransport],
        boundaries: &[&Boundary],
        distance: f64,
        with_limits: Option<bool>,
        scene: &mut dyn Scene,
    ) -> Vec<MeshId> {
        let with_limits = with_limits.unwrap_or(self.extra.with_limits);
        let frame_radius = self.config.earth_radius_meters;
        let mut touched = Vec::new();
        for town in towns {
            for (transport, epochs) in &town.transports {
                let mut properties = town.properties.clone();
                properties.insert("cityCode".to_string(), PropertyValue::from(town.city_code.as_str()));
                properties.insert("transport".to_string(), PropertyValue::from(transport.as_str()));

                let existing = self
                    .meshes
                    .iter()
                    .position(|cone| cone.city_code == town.city_code && cone.transport == *transport);
                if let Some(i) = existing {
                    let cone = &mut self.meshes[i];
                    if let Err(error) = cone.update(Some(distance), Some(epochs.clone())) {
                        warn!(city = %town.city_code, transport, %error, "cone update failed");
                        continue;
                    }
                    self.summary.update(&properties);
                    cone.state.set_properties(properties);
                    touched.push(cone.id());
                    continue;
                }

                let parts = ConeParts {
                    city_code: town.city_code.clone(),
                    transport: transport.clone(),
                    frame: NedLocal::new(town.position, frame_radius),
                    epochs: epochs.clone(),
                    properties,
                };
                let built = ConeMesh::new(
                    Arc::clone(&self.registry),
                    Arc::clone(&self.config),
                    parts,
                    boundaries,
                    &self.projection,
                    distance,
                    with_limits,
                );
                match built {
                    Ok(mut cone) => {
                        if let Some(year) = &self.extra.year {
                            cone.set_year(year);
                            cone.shown_year = Some(year.clone());
                        }
                        touched.push(self.insert(cone, scene));
                    }
                    Err(error) => warn!(city = %town.city_code, transport, %error, "skipping cone"),
                }
            }
        }
        debug!(touched = touched.len(), total = self.meshes.len(), "cones added");
        touched
    }

    pub fn year(&self) -> Option<&str> {
        self.extra.year.as_deref()
    }

    /// Show the given epoch. Cones without it stay hidden.
    pub fn set_year(&mut self, year: &str) {
        self.extra.year = Some(year.to_string());
        for cone in &mut self.meshes {
            cone.set_year(year);
            cone.shown_year = Some(year.to_string());
        }
    }

    pub fn with_limits(&self) -> bool {
        self.extra.with_limits
    }

    pub fn set_with_limits(&mut self, with_limits: bool) {
        self.extra.with_limits = with_limits;
        for cone in &mut self.meshes {
            if let Err(error) = cone.set_with_limits(with_limits) {
                warn!(id = cone.id(), %error, "cone regeneration failed");
            }
        }
    }

    pub fn regenerate_limits(&mut self, boundaries: &[&Boundary]) {
        for cone in &mut self.meshes {
            if let Err(error) = cone.regenerate_limits(boundaries) {
                warn!(id = cone.id(), %error, "cone regeneration failed");
            }
        }
    }

    /// Show or hide every cone of one transport mode.
    pub fn set_layer(&mut self, transport: &str, show: bool) {
        for cone in self.meshes.iter_mut().filter(|cone| cone.transport == transport) {
            cone.state.set_visible(show);
        }
    }

    /// Epoch labels present on any cone, sorted.
    pub fn years(&self) -> Vec<&str> {
        let mut years: Vec<&str> = self.meshes.iter().flat_map(ConeMesh::years).collect();
        years.sort_unstable();
        years.dedup();
        years
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::tests::{settle, RecordingScene};
    use crate::board::MeshQuery;
    use crate::criteria::Criteria;
    use crate::map::projection::{MERCATOR, NONE};
    use crate::morph::Polygon;
    use std::f64::consts::FRAC_PI_2;

    fn directions(elevation: f64) -> Vec<Direction> {
        (0..4)
            .map(|i| Direction {
                clock: i as f64 * FRAC_PI_2,
                elevation,
            })
            .collect()
    }

    fn paris(city_name: &str) -> TownTransport {
        let road = Epochs::from([
            ("2000".to_string(), directions(0.2)),
            ("2010".to_string(), directions(0.4)),
        ]);
        let rail = Epochs::from([("2000".to_string(), directions(0.6))]);
        TownTransport {
            city_code: "75056".to_string(),
            position: Cartographic::from_degrees(2.35, 48.85, 0.0),
            properties: Properties::from([
                ("cityName".to_string(), PropertyValue::from(city_name)),
                ("countryName".to_string(), PropertyValue::from("France")),
            ]),
            transports: BTreeMap::from([("road".to_string(), road), ("rail".to_string(), rail)]),
        }
    }

    fn france() -> Boundary {
        Boundary::new(&Polygon {
            exterior: vec![[-2.0, 43.0], [7.0, 43.0], [7.0, 51.0], [-2.0, 51.0]],
            holes: vec![],
        })
    }

    fn board() -> ConeBoard {
        let config = Configuration::default();
        let registry = ProjectionRegistry::new(config.projection_params());
        Board::new(NONE, Arc::new(registry), Arc::new(config))
    }

    fn ids(cones: Vec<&ConeMesh>) -> Vec<MeshId> {
        cones.iter().map(|cone| cone.id()).collect()
    }

    #[test]
    fn test_one_cone_per_transport() {
        let mut scene = RecordingScene::default();
        let mut board = board();
        let france = france();
        let added = board.add(&[paris("Paris")], &[&france], 500_000.0, None, &mut scene);
        assert_eq!(added.len(), 2);
        assert_eq!(scene.live.count(RenderKind::Cone), 2);
        assert_eq!(board.years(), ["2000", "2010"]);

        let rail = Criteria::new().with("transport", "rail");
        let found = board.search_mesh(&rail);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].transport(), "rail");
        assert_eq!(found[0].city_code(), "75056");
    }

    #[test]
    fn test_internal_paths_are_ignored_by_search() {
        let mut scene = RecordingScene::default();
        let mut board = board();
        board.add(&[paris("Paris")], &[], 500_000.0, None, &mut scene);
        let criteria = Criteria::new()
            .with("transport", "road")
            .with("position", "anywhere")
            .with("referential.x", 3.0);
        assert_eq!(board.search_mesh(&criteria).len(), 1);
    }

    #[test]
    fn test_point_search_finds_cones_at_city() {
        let mut scene = RecordingScene::default();
        let mut board = board();
        let added = board.add(&[paris("Paris")], &[], 500_000.0, None, &mut scene);
        let city = Cartographic::from_degrees(2.35, 48.85, 0.0);
        assert_eq!(ids(board.search_mesh(MeshQuery::Point(&city))), added);
        let nearby = Cartographic::from_degrees(2.36, 48.85, 0.0);
        assert!(board.search_mesh(&nearby).is_empty());
    }

    #[test]
    fn test_add_again_updates_in_place() {
        let mut scene = RecordingScene::default();
        let mut board = board();
        let first = board.add(&[paris("Paris")], &[], 500_000.0, None, &mut scene);
        let inserted = scene.inserted;

        let again = board.add(&[paris("Lutetia")], &[], 800_000.0, None, &mut scene);
        assert_eq!(again, first);
        assert_eq!(board.len(), 2);
        assert_eq!(scene.inserted, inserted);
        let cone = board.mesh(first[0]).unwrap();
        assert_eq!(cone.distance(), 800_000.0);
        assert_eq!(cone.properties().get("cityName"), Some(&PropertyValue::from("Lutetia")));
        assert_eq!(cone.properties().get("transport"), Some(&PropertyValue::from(cone.transport())));
    }

    #[test]
    fn test_year_gates_rendering() {
        let mut scene = RecordingScene::default();
        let mut board = board();
        board.add(&[paris("Paris")], &[], 500_000.0, None, &mut scene);
        assert!(board.meshes().iter().all(|cone| cone.is_rendered()));

        board.set_year("2010");
        assert_eq!(board.year(), Some("2010"));
        let road = &board.search_mesh(&Criteria::new().with("transport", "road"))[0];
        let rail = &board.search_mesh(&Criteria::new().with("transport", "rail"))[0];
        assert_eq!(road.year(), "2010");
        assert!(road.is_rendered());
        assert_eq!(rail.year(), "2000");
        assert!(rail.state().visible());
        assert!(!rail.is_rendered());
    }

    #[test]
    fn test_new_cone_follows_board_year() {
        let mut scene = RecordingScene::default();
        let mut board = board();
        board.set_year("2010");
        board.add(&[paris("Paris")], &[], 500_000.0, None, &mut scene);
        let rendered: Vec<&str> = board
            .meshes()
            .iter()
            .filter(|cone| cone.is_rendered())
            .map(ConeMesh::transport)
            .collect();
        assert_eq!(rendered, ["road"]);
    }

    #[test]
    fn test_set_layer_toggles_one_transport() {
        let mut scene = RecordingScene::default();
        let mut board = board();
        board.add(&[paris("Paris")], &[], 500_000.0, None, &mut scene);
        board.set_layer("rail", false);
        for cone in board.meshes() {
            assert_eq!(cone.state().visible(), cone.transport() != "rail");
        }
    }

    #[test]
    fn test_limits_toggle_regenerates_shape() {
        let mut scene = RecordingScene::default();
        let mut board = board();
        let france = france();
        board.add(&[paris("Paris")], &[&france], 2_000_000.0, None, &mut scene);
        assert!(board.with_limits());
        let limited = board.meshes()[0].geometry().base().to_vec();

        board.set_with_limits(false);
        assert!(!board.meshes()[0].with_limits());
        let free = board.meshes()[0].geometry().base().to_vec();
        assert_eq!(limited.len(), free.len());
        assert_ne!(limited, free);

        board.set_with_limits(true);
        assert_eq!(board.meshes()[0].geometry().base(), limited.as_slice());
    }

    #[test]
    fn test_foreign_boundary_does_not_limit() {
        // L-shaped country whose bounding box covers the city but not its land
        let neighbour = Boundary::new(&Polygon {
            exterior: vec![[0.0, 0.0], [10.0, 0.0], [10.0, 2.0], [2.0, 2.0], [2.0, 10.0], [0.0, 10.0]],
            holes: vec![],
        });
        let city = Cartographic::from_degrees(5.0, 5.0, 0.0);
        assert!(neighbour.bounds_contain(&city));
        assert!(!neighbour.contains(&city));

        let mut town = paris("Paris");
        town.position = city;
        let mut scene = RecordingScene::default();
        let mut free = board();
        free.add(&[town.clone()], &[], 2_000_000.0, None, &mut scene);
        let mut near = board();
        near.add(&[town], &[&neighbour], 2_000_000.0, None, &mut scene);
        assert_eq!(
            free.meshes()[0].geometry().base(),
            near.meshes()[0].geometry().base()
        );
    }

    #[test]
    fn test_regenerate_limits_keeps_projection_and_extrusion() {
        let mut scene = RecordingScene::default();
        let mut board = board();
        board.add(&[paris("Paris")], &[], 2_000_000.0, None, &mut scene);
        board.change_projection(MERCATOR, None, None);
        settle(&mut board, &mut scene);
        board.extrude(None, Some(30.0)).unwrap();
        settle(&mut board, &mut scene);
        let free = board.meshes()[0].geometry().base().to_vec();

        let france = france();
        board.regenerate_limits(&[&france]);
        for cone in board.meshes() {
            assert_eq!(cone.projection(), MERCATOR);
            assert_eq!(cone.extruded(), 30.0);
        }
        assert_ne!(board.meshes()[0].geometry().base(), free.as_slice());
    }

    #[test]
    fn test_update_keeps_projection_year_and_extrusion() {
        let mut scene = RecordingScene::default();
        let mut board = board();
        board.add(&[paris("Paris")], &[], 500_000.0, None, &mut scene);
        board.set_year("2010");
        board.change_projection(MERCATOR, None, None);
        settle(&mut board, &mut scene);
        board.extrude(None, Some(30.0)).unwrap();
        settle(&mut board, &mut scene);

        board.add(&[paris("Paris")], &[], 900_000.0, None, &mut scene);
        for cone in board.meshes() {
            assert_eq!(cone.projection(), MERCATOR);
            assert_eq!(cone.extruded(), 30.0);
        }
        let road = &board.search_mesh(&Criteria::new().with("transport", "road"))[0];
        assert_eq!(road.year(), "2010");
    }

    #[test]
    fn test_town_without_epochs_is_skipped() {
        let mut scene = RecordingScene::default();
        let mut board = board();
        let mut town = paris("Paris");
        town.transports = BTreeMap::from([("boat".to_string(), Epochs::new())]);
        assert!(board.add(&[town], &[], 500_000.0, None, &mut scene).is_empty());
        assert!(board.is_empty());
    }
}
