//! Viewer session orchestration
//!
//! `PanoramaViewer` lives on the render thread. Resolution work runs on the
//! tokio runtime and reports back over a channel that is drained at the start
//! of every frame; results from superseded sessions are dropped on arrival so
//! each session assigns at most one material.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::camera::{CameraController, CameraSignal, CameraState, GestureEvent};
use crate::descriptor::PanoramicImage;
use crate::material::{self, Material};
use crate::render::RenderBackend;
use crate::resolver::{
    LocatorResolver, Resolution, ResolutionTier, ResolutionTrace, ResolveError, SessionEpoch, SessionTracker,
};
use crate::scene::{GeometryKind, SceneComposer, SceneGraph};
use crate::settings::ViewerSettings;

/// Diagnostic summary of one resolution; for logging only
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionReport {
    pub image_id: String,
    pub epoch: SessionEpoch,
    pub winner: Option<ResolutionTier>,
    pub failure: Option<ResolveError>,
    pub trace: ResolutionTrace,
}

/// Notifications for the host UI
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerSignal {
    /// A scene graph was (re)composed and handed to the backend
    RenderReady { image_id: String, geometry: GeometryKind },
    Resolution(ResolutionReport),
    ResetComplete,
    Dismissed,
}

/// Result of a resolution task, tagged with the session it belongs to.
///
/// The material is already decoded; the render thread only composes.
struct ResolutionOutcome {
    epoch: SessionEpoch,
    image_id: String,
    winner: Option<ResolutionTier>,
    failure: Option<ResolveError>,
    trace: ResolutionTrace,
    material: Material,
}

impl ResolutionOutcome {
    /// Decode the resolved bytes. Blocking; call from a worker thread.
    fn build(epoch: SessionEpoch, image_id: String, resolution: Resolution, max_dimension: u32) -> Self {
        let material = material::build(&resolution.asset, max_dimension);
        Self {
            epoch,
            image_id,
            winner: resolution.trace.winner,
            failure: resolution.asset.failure().cloned(),
            trace: resolution.trace,
            material,
        }
    }
}

/// Panorama viewer bound to one render backend
pub struct PanoramaViewer<B: RenderBackend> {
    settings: ViewerSettings,
    resolver: Arc<LocatorResolver>,
    runtime: Handle,
    session: SessionTracker,
    results_tx: Sender<ResolutionOutcome>,
    results_rx: Receiver<ResolutionOutcome>,
    camera: CameraController,
    composer: SceneComposer,
    backend: B,
    geometry: GeometryKind,
    current_image: Option<PanoramicImage>,
    /// Whether the current session already received its material
    assigned: bool,
    signals: Vec<ViewerSignal>,
}

impl<B: RenderBackend> PanoramaViewer<B> {
    pub fn new(settings: ViewerSettings, resolver: Arc<LocatorResolver>, runtime: Handle, backend: B) -> Self {
        let settings = settings.sanitized();
        let (results_tx, results_rx) = mpsc::channel();

        Self {
            camera: CameraController::new(settings.camera.clone()),
            composer: SceneComposer::new(settings.scene.clone()),
            geometry: settings.default_geometry,
            settings,
            resolver,
            runtime,
            session: SessionTracker::new(),
            results_tx,
            results_rx,
            backend,
            current_image: None,
            assigned: false,
            signals: Vec::new(),
        }
    }

    /// Start a viewing session for `image`, superseding any current one
    pub fn open(&mut self, image: PanoramicImage) -> SessionEpoch {
        let (epoch, cancel) = self.session.begin();
        self.assigned = false;
        self.composer.clear();
        self.backend.clear_scene();
        self.camera.reset_to_defaults();

        tracing::info!(image_id = %image.id, title = %image.title, %epoch, "opening panorama");

        let image_id = image.id.clone();
        let locator = image.locator.clone();
        let has_locator = image.has_locator();
        self.current_image = Some(image);

        if !has_locator {
            self.apply_outcome(ResolutionOutcome {
                epoch,
                image_id,
                winner: None,
                failure: Some(ResolveError::NoLocator),
                trace: ResolutionTrace::default(),
                material: Material::fallback(),
            });
            return epoch;
        }

        let resolver = Arc::clone(&self.resolver);
        let tx = self.results_tx.clone();
        let max_dimension = self.settings.scene.max_texture_dimension;
        self.runtime.spawn(async move {
            let resolution = resolver.resolve(&locator, &cancel).await;
            if cancel.is_cancelled() {
                tracing::debug!(%epoch, "resolution finished after cancellation");
                return;
            }

            let built = tokio::task::spawn_blocking(move || {
                ResolutionOutcome::build(epoch, image_id, resolution, max_dimension)
            })
            .await;
            match built {
                Ok(outcome) => {
                    // Receiver gone means the viewer was dropped
                    let _ = tx.send(outcome);
                }
                Err(e) => tracing::warn!(%epoch, "material build task failed: {}", e),
            }
        });

        epoch
    }

    /// Advance one frame. Returns true while the camera is animating.
    pub fn frame(&mut self, dt: f32) -> bool {
        while let Ok(outcome) = self.results_rx.try_recv() {
            self.apply_outcome(outcome);
        }

        if let Some(CameraSignal::ResetComplete) = self.camera.tick(dt) {
            self.signals.push(ViewerSignal::ResetComplete);
        }

        if let Some(scene) = self.composer.current() {
            self.backend.present_scene(scene);
        }
        self.backend.update_camera(self.camera.camera());

        self.camera.is_animating()
    }

    /// Forward a gesture to the camera controller
    pub fn handle_gesture(&mut self, event: GestureEvent) {
        if let Some(CameraSignal::ResetComplete) = self.camera.handle(event) {
            self.signals.push(ViewerSignal::ResetComplete);
        }
    }

    /// Switch between sphere and cylinder.
    ///
    /// Camera rotation is kept unless `reset_camera` is set.
    pub fn set_geometry(&mut self, geometry: GeometryKind, reset_camera: bool) {
        self.geometry = geometry;
        if reset_camera {
            self.camera.reset_to_defaults();
        }

        if let Some(scene) = self.composer.set_geometry(geometry) {
            self.backend.present_scene(scene);
            self.signals.push(ViewerSignal::RenderReady {
                image_id: scene.image_id.clone(),
                geometry,
            });
        }
    }

    /// End the current session and drop the scene
    pub fn dismiss(&mut self) {
        self.session.end();
        self.assigned = false;
        self.current_image = None;
        self.composer.clear();
        self.backend.clear_scene();
        self.camera.reset_to_defaults();
        tracing::info!(epoch = %self.session.current(), "viewer dismissed");
        self.signals.push(ViewerSignal::Dismissed);
    }

    fn apply_outcome(&mut self, outcome: ResolutionOutcome) -> bool {
        if !self.session.is_current(outcome.epoch) {
            tracing::debug!(
                image_id = %outcome.image_id,
                epoch = %outcome.epoch,
                current = %self.session.current(),
                "discarding stale resolution"
            );
            return false;
        }
        if self.assigned {
            tracing::debug!(image_id = %outcome.image_id, "session already has a material");
            return false;
        }

        let ResolutionOutcome {
            epoch,
            image_id,
            winner,
            failure,
            trace,
            material,
        } = outcome;

        self.signals.push(ViewerSignal::Resolution(ResolutionReport {
            image_id: image_id.clone(),
            epoch,
            winner,
            failure,
            trace,
        }));

        let scene = self
            .composer
            .compose(&image_id, self.geometry, material, self.settings.camera.default_fov);
        self.backend.present_scene(scene);
        self.assigned = true;

        self.signals.push(ViewerSignal::RenderReady {
            image_id,
            geometry: self.geometry,
        });
        true
    }

    pub fn camera(&self) -> &CameraState {
        self.camera.camera()
    }

    pub fn camera_controller(&self) -> &CameraController {
        &self.camera
    }

    pub fn camera_controller_mut(&mut self) -> &mut CameraController {
        &mut self.camera
    }

    pub fn scene(&self) -> Option<&SceneGraph> {
        self.composer.current()
    }

    pub fn geometry(&self) -> GeometryKind {
        self.geometry
    }

    pub fn current_image(&self) -> Option<&PanoramicImage> {
        self.current_image.as_ref()
    }

    /// Whether the current session is still waiting for its material
    pub fn is_awaiting_resolution(&self) -> bool {
        self.current_image.is_some() && !self.assigned
    }

    pub fn current_epoch(&self) -> SessionEpoch {
        self.session.current()
    }

    pub fn settings(&self) -> &ViewerSettings {
        &self.settings
    }

    /// Take all signals queued since the last call
    pub fn drain_signals(&mut self) -> Vec<ViewerSignal> {
        std::mem::take(&mut self.signals)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
