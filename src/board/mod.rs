//! Boards own a collection of morphable meshes and animate them.
//!
//! A board is driven by its owner: call [`Board::update`] once per frame
//! with the elapsed time. Projection changes are exclusive (a second request
//! while one runs is ignored); extrusion tweens may overlap and the newest
//! one wins for the meshes it covers.

pub mod cone;
pub mod country;

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::Configuration;
use crate::criteria::{Criteria, Properties, Summary};
use crate::error::{Error, Result};
use crate::map::{Cartographic, ProjectionRegistry};
use crate::morph::MorphableGeometry;
use crate::scene::{MeshId, Pickable, Ray, Raycaster, RenderHandle, RenderKind, Scene};
use crate::tween::{Easing, Tween};

/// Highest stage sent before a transition finishes.
const LAST_BLEND_STAGE: f64 = 99.999;

pub use cone::{ConeBoard, ConeMesh, TownTransport};
pub use country::{CountryBoard, CountryMesh, CountrySource};

/// State every board mesh carries besides its geometry.
#[derive(Debug, Clone)]
pub struct MeshState {
    id: MeshId,
    properties: Properties,
    criteria: Rc<Criteria>,
    visible: bool,
    scale: f64,
}

impl MeshState {
    pub fn new(properties: Properties) -> Self {
        let criteria = Rc::new(Criteria::from_properties(&properties));
        Self {
            id: 0,
            properties,
            criteria,
            visible: true,
            scale: 1.0,
        }
    }

    pub fn id(&self) -> MeshId {
        self.id
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Criteria built once from the properties. Highlighting with it twice
    /// is recognised as the same request.
    pub fn criteria(&self) -> &Rc<Criteria> {
        &self.criteria
    }

    pub fn set_properties(&mut self, properties: Properties) {
        self.criteria = Rc::new(Criteria::from_properties(&properties));
        self.properties = properties;
    }

    /// Requested visibility, before any per-kind rule.
    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }
}

/// A mesh a [`Board`] can own and animate.
pub trait BoardMesh {
    const KIND: RenderKind;
    /// Property paths ignored by criteria search.
    const EXCLUDED_PATHS: &'static [&'static str] = &[];
    /// Board-wide state specific to this kind of mesh.
    type Extra: Default;

    fn state(&self) -> &MeshState;
    fn state_mut(&mut self) -> &mut MeshState;

    /// The geometry currently drawn and picked.
    fn geometry(&self) -> &MorphableGeometry;
    /// Every geometry the mesh owns; all of them follow projection and
    /// extrusion changes.
    fn geometries_mut(&mut self) -> impl Iterator<Item = &mut MorphableGeometry>;

    /// Whether the point lies on this mesh, for point searches.
    fn covers(&self, point: &Cartographic, config: &Configuration) -> bool;

    fn id(&self) -> MeshId {
        self.state().id()
    }

    fn properties(&self) -> &Properties {
        self.state().properties()
    }

    fn projection(&self) -> &str {
        self.geometry().projection()
    }

    fn extruded(&self) -> f64 {
        self.geometry().extruded()
    }

    /// Visibility as rendered.
    fn is_rendered(&self) -> bool {
        self.state().visible()
    }

    fn accept_projection(&mut self, name: &str) -> Result<bool> {
        let mut armed = false;
        for geometry in self.geometries_mut() {
            armed |= geometry.accept_projection(name)?;
        }
        Ok(armed)
    }

    fn set_projection_weight(&mut self, stage: f64) -> Result<()> {
        for geometry in self.geometries_mut() {
            geometry.set_projection_weight(stage)?;
        }
        Ok(())
    }

    fn set_extrusion(&mut self, percent: f64) -> Result<()> {
        if !(-100.0..=100.0).contains(&percent) {
            return Err(Error::ExtrusionOutOfRange(percent));
        }
        for geometry in self.geometries_mut() {
            geometry.set_extrusion(percent)?;
        }
        Ok(())
    }
}

/// A translucent copy of a matching mesh, drawn over it.
#[derive(Debug, Clone)]
pub struct Overlay {
    handle: RenderHandle,
    source: MeshId,
    geometry: MorphableGeometry,
    scale: f64,
    shown: bool,
    light: bool,
}

impl Overlay {
    pub fn handle(&self) -> RenderHandle {
        self.handle
    }

    pub fn source(&self) -> MeshId {
        self.source
    }

    pub fn geometry(&self) -> &MorphableGeometry {
        &self.geometry
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Lit and not hidden by a running animation.
    pub fn is_visible(&self) -> bool {
        self.shown && self.light
    }

    pub fn light(&self) -> bool {
        self.light
    }
}

/// Search key for [`Board::search_mesh`].
#[derive(Debug, Clone, Copy)]
pub enum MeshQuery<'a> {
    Criteria(&'a Criteria),
    Point(&'a Cartographic),
}

impl<'a> From<&'a Criteria> for MeshQuery<'a> {
    fn from(criteria: &'a Criteria) -> Self {
        MeshQuery::Criteria(criteria)
    }
}

impl<'a> From<&'a Cartographic> for MeshQuery<'a> {
    fn from(point: &'a Cartographic) -> Self {
        MeshQuery::Point(point)
    }
}

#[derive(Debug)]
struct Transition {
    target: String,
    tween: Tween,
}

impl Transition {
    /// Stage to broadcast. Only a finished tween reaches 100, which commits
    /// the projection, so easing overshoot stays just below it.
    fn stage(&self) -> f64 {
        if self.tween.is_finished() {
            100.0
        } else {
            self.tween.value().clamp(0.0, LAST_BLEND_STAGE)
        }
    }
}

#[derive(Debug)]
struct ExtrusionTween {
    /// Mesh, start value, end value
    targets: Vec<(MeshId, f64, f64)>,
    /// Runs from 0 to 1
    tween: Tween,
}

pub struct Board<M: BoardMesh> {
    registry: Arc<ProjectionRegistry>,
    config: Arc<Configuration>,
    meshes: Vec<M>,
    index: HashMap<MeshId, usize>,
    next_id: MeshId,
    projection: String,
    scale: f64,
    show: bool,
    summary: Summary,
    highlighted: Option<Rc<Criteria>>,
    overlays: Vec<Overlay>,
    transition: Option<Transition>,
    extrusions: Vec<ExtrusionTween>,
    extra: M::Extra,
}

impl<M: BoardMesh> Board<M> {
    /// An unknown initial projection falls back to the registry's first one.
    pub fn new(projection: &str, registry: Arc<ProjectionRegistry>, config: Arc<Configuration>) -> Self {
        let projection = if registry.contains(projection) {
            projection.to_string()
        } else {
            warn!(projection, fallback = registry.first(), "unknown initial projection");
            registry.first().to_string()
        };
        Self {
            registry,
            config,
            meshes: Vec::new(),
            index: HashMap::new(),
            next_id: 1,
            projection,
            scale: 1.0,
            show: true,
            summary: Summary::new(),
            highlighted: None,
            overlays: Vec::new(),
            transition: None,
            extrusions: Vec::new(),
            extra: M::Extra::default(),
        }
    }

    pub fn registry(&self) -> &Arc<ProjectionRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &Arc<Configuration> {
        &self.config
    }

    pub fn projection(&self) -> &str {
        &self.projection
    }

    pub fn meshes(&self) -> &[M] {
        &self.meshes
    }

    pub fn mesh(&self, id: MeshId) -> Option<&M> {
        self.index.get(&id).map(|&i| &self.meshes[i])
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    pub fn overlays(&self) -> &[Overlay] {
        &self.overlays
    }

    /// Distinct property values seen across every mesh added since the
    /// last [`Board::clean`].
    pub fn lookup_criterias(&self) -> &Summary {
        &self.summary
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
        for mesh in &mut self.meshes {
            mesh.state_mut().set_scale(scale);
        }
        for overlay in &mut self.overlays {
            overlay.scale = scale;
        }
    }

    pub fn show(&self) -> bool {
        self.show
    }

    pub fn set_show(&mut self, show: bool) {
        self.show = show;
        for mesh in &mut self.meshes {
            mesh.state_mut().set_visible(show);
        }
    }

    pub fn is_transitioning(&self) -> bool {
        self.transition.is_some()
    }

    /// Running tweens: the projection transition plus extrusion tweens.
    pub fn active_tweens(&self) -> usize {
        usize::from(self.transition.is_some()) + self.extrusions.len()
    }

    /// Register a freshly built mesh and hand it to the scene.
    fn insert(&mut self, mut mesh: M, scene: &mut dyn Scene) -> MeshId {
        let id = self.next_id;
        self.next_id += 1;
        let state = mesh.state_mut();
        state.id = id;
        state.set_visible(self.show);
        state.set_scale(self.scale);

        // Join a transition already under way.
        if let Some(transition) = &self.transition {
            let stage = transition.stage();
            let joined = mesh
                .accept_projection(&transition.target)
                .and_then(|_| mesh.set_projection_weight(stage));
            if let Err(error) = joined {
                warn!(id, %error, "new mesh could not join the running transition");
            }
        }

        self.summary.update(mesh.properties());
        self.index.insert(id, self.meshes.len());
        self.meshes.push(mesh);
        scene.insert(RenderHandle { kind: M::KIND, id });
        id
    }

    fn mesh_mut(&mut self, id: MeshId) -> Option<&mut M> {
        let i = *self.index.get(&id)?;
        self.meshes.get_mut(i)
    }

    /// Drop every mesh and overlay and start the summary over.
    pub fn clean(&mut self, scene: &mut dyn Scene) {
        for mesh in self.meshes.drain(..) {
            scene.remove(RenderHandle {
                kind: M::KIND,
                id: mesh.id(),
            });
        }
        self.index.clear();
        self.clear_overlays(scene);
        self.highlighted = None;
        self.extrusions.clear();
        self.summary = Summary::new();
    }

    /// Start animating every mesh toward `name`.
    ///
    /// Ignored, returning false, when a transition is already running, when
    /// `name` is not registered, or when it is the current projection.
    pub fn change_projection(&mut self, name: &str, duration: Option<Duration>, easing: Option<Easing>) -> bool {
        if let Some(running) = &self.transition {
            warn!(requested = name, running = %running.target, "projection transition already running");
            return false;
        }
        if !self.registry.contains(name) {
            warn!(requested = name, "unknown projection");
            return false;
        }
        if name == self.projection {
            debug!(projection = name, "already on this projection");
            return false;
        }

        for mesh in &mut self.meshes {
            if let Err(error) = mesh.accept_projection(name) {
                warn!(id = mesh.id(), %error, "mesh refused projection");
            }
        }
        self.hide_overlays();

        let duration = duration.unwrap_or_else(|| self.config.tween_timing());
        debug!(from = %self.projection, to = name, ?duration, "projection transition started");
        self.transition = Some(Transition {
            target: name.to_string(),
            tween: Tween::new(0.0, 100.0, duration, easing.unwrap_or_default()),
        });
        true
    }

    /// Tween the extrusion of the matching meshes (all of them without
    /// criteria) to `value`, the configured default when `None`.
    pub fn extrude(&mut self, criteria: Option<&Criteria>, value: Option<f64>) -> Result<()> {
        let value = value.unwrap_or(self.config.default_extrusion);
        if !(-100.0..=100.0).contains(&value) {
            warn!(value, "extrusion out of range");
            return Err(Error::ExtrusionOutOfRange(value));
        }
        let targets: Vec<(MeshId, f64, f64)> = self
            .matching(criteria.map(MeshQuery::Criteria))
            .into_iter()
            .map(|i| {
                let mesh = &self.meshes[i];
                (mesh.id(), mesh.extruded(), value)
            })
            .collect();
        self.hide_overlays();
        self.schedule_extrusion(targets, self.config.tween_timing(), Easing::Linear);
        Ok(())
    }

    fn schedule_extrusion(&mut self, targets: Vec<(MeshId, f64, f64)>, duration: Duration, easing: Easing) {
        for older in &mut self.extrusions {
            older
                .targets
                .retain(|(id, _, _)| !targets.iter().any(|(newer, _, _)| newer == id));
        }
        self.extrusions.retain(|tween| !tween.targets.is_empty());
        debug!(meshes = targets.len(), ?duration, "extrusion tween scheduled");
        self.extrusions.push(ExtrusionTween {
            targets,
            tween: Tween::new(0.0, 1.0, duration, easing),
        });
    }

    /// Advance every running tween by `elapsed`.
    pub fn update(&mut self, elapsed: Duration, scene: &mut dyn Scene) {
        if let Some(mut transition) = self.transition.take() {
            transition.tween.advance(elapsed);
            let stage = transition.stage();
            for mesh in &mut self.meshes {
                if let Err(error) = mesh.set_projection_weight(stage) {
                    warn!(id = mesh.id(), %error, "projection weight rejected");
                }
            }
            if transition.tween.is_finished() {
                self.finish_transition(transition.target);
            } else {
                self.transition = Some(transition);
            }
        }

        let mut rehighlight = false;
        let mut extrusions = std::mem::take(&mut self.extrusions);
        for extrusion in &mut extrusions {
            let fraction = extrusion.tween.advance(elapsed);
            let finished = extrusion.tween.is_finished();
            for &(id, from, to) in &extrusion.targets {
                let value = if finished {
                    to
                } else {
                    (from + (to - from) * fraction).clamp(-100.0, 100.0)
                };
                if let Some(mesh) = self.mesh_mut(id) {
                    if let Err(error) = mesh.set_extrusion(value) {
                        warn!(id, %error, "extrusion frame rejected");
                    }
                }
            }
            rehighlight |= finished;
        }
        extrusions.retain(|extrusion| !extrusion.tween.is_finished());
        self.extrusions = extrusions;

        if rehighlight {
            self.rehighlight(scene);
        }
    }

    fn finish_transition(&mut self, target: String) {
        let settle: Vec<(MeshId, f64, f64)> = self
            .meshes
            .iter()
            .map(|mesh| (mesh.id(), 0.0, mesh.extruded()))
            .collect();
        debug!(from = %self.projection, to = %target, "projection transition finished");
        self.projection = target;
        self.schedule_extrusion(settle, self.config.settle_timing(), Easing::ElasticInOut);
    }

    /// Indices of meshes matching `query`; every mesh when `None`.
    fn matching(&self, query: Option<MeshQuery<'_>>) -> Vec<usize> {
        let matches = |mesh: &M| match query {
            None => true,
            Some(MeshQuery::Criteria(criteria)) => criteria.matches(mesh.properties(), M::EXCLUDED_PATHS, ""),
            Some(MeshQuery::Point(point)) => mesh.covers(point, &self.config),
        };
        self.meshes
            .iter()
            .enumerate()
            .filter(|(_, mesh)| matches(*mesh))
            .map(|(i, _)| i)
            .collect()
    }

    /// Meshes whose properties match the criteria, or which contain (or sit
    /// on) the point, in insertion order.
    pub fn search_mesh<'a>(&self, query: impl Into<MeshQuery<'a>>) -> Vec<&M> {
        self.matching(Some(query.into()))
            .into_iter()
            .map(|i| &self.meshes[i])
            .collect()
    }

    /// Show or hide the meshes matching `criteria`. Nothing is shown while
    /// the board itself is hidden.
    pub fn show_criterias(&mut self, criteria: &Criteria, state: bool) {
        let visible = state && self.show;
        for i in self.matching(Some(MeshQuery::Criteria(criteria))) {
            self.meshes[i].state_mut().set_visible(visible);
        }
    }

    /// Overlay the meshes matching `criteria`.
    ///
    /// Passing the same `Rc` as the previous call only toggles the lights;
    /// any other criteria rebuild the overlays from scratch.
    pub fn highlight(&mut self, criteria: &Rc<Criteria>, light: bool, scene: &mut dyn Scene) {
        let same = self
            .highlighted
            .as_ref()
            .is_some_and(|current| Rc::ptr_eq(current, criteria));
        if !same {
            self.clear_overlays(scene);
            self.highlighted = Some(Rc::clone(criteria));
            for i in self.matching(Some(MeshQuery::Criteria(criteria))) {
                let id = self.next_id;
                self.next_id += 1;
                let mesh = &self.meshes[i];
                let overlay = Overlay {
                    handle: RenderHandle {
                        kind: RenderKind::Highlight,
                        id,
                    },
                    source: mesh.id(),
                    geometry: mesh.geometry().fuzzy_clone(),
                    scale: self.scale,
                    shown: true,
                    light,
                };
                scene.insert(overlay.handle);
                self.overlays.push(overlay);
            }
            debug!(overlays = self.overlays.len(), "highlight rebuilt");
        }
        for overlay in &mut self.overlays {
            overlay.light = light;
        }
    }

    /// Rebuild the overlays of the last highlight, keeping their lights.
    fn rehighlight(&mut self, scene: &mut dyn Scene) {
        let Some(light) = self.overlays.first().map(|overlay| overlay.light) else {
            return;
        };
        if let Some(criteria) = self.highlighted.take() {
            self.highlight(&criteria, light, scene);
        }
    }

    fn hide_overlays(&mut self) {
        for overlay in &mut self.overlays {
            overlay.shown = false;
        }
    }

    fn clear_overlays(&mut self, scene: &mut dyn Scene) {
        for overlay in self.overlays.drain(..) {
            scene.remove(overlay.handle);
        }
    }

    /// Pick the closest rendered mesh under `ray`.
    ///
    /// With `highlight` the hit mesh's own properties become the highlight
    /// criteria. A miss turns the overlay lights off.
    pub fn get_mesh_by_mouse(
        &mut self,
        ray: &Ray,
        highlight: bool,
        raycaster: &dyn Raycaster,
        scene: &mut dyn Scene,
    ) -> Option<MeshId> {
        let rendered: Vec<usize> = (0..self.meshes.len())
            .filter(|&i| self.meshes[i].is_rendered())
            .collect();
        let candidates: Vec<Pickable<'_>> = rendered
            .iter()
            .map(|&i| Pickable {
                geometry: self.meshes[i].geometry(),
                scale: self.meshes[i].state().scale(),
            })
            .collect();
        let hit = raycaster.intersect(ray, &candidates);
        drop(candidates);

        let Some(hit) = hit else {
            for overlay in &mut self.overlays {
                overlay.light = false;
            }
            return None;
        };
        let mesh = &self.meshes[rendered[hit.index]];
        let id = mesh.id();
        if highlight {
            let criteria = Rc::clone(mesh.state().criteria());
            self.highlight(&criteria, true, scene);
        }
        Some(id)
    }
}
