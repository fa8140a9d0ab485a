//! Rendering seam between the viewer and a concrete backend

use crate::camera::CameraState;
use crate::scene::SceneGraph;

/// Anything that can display a composed panorama scene.
///
/// Both sphere and cylinder scenes go through the same two calls; backends
/// re-upload geometry and material only when the scene generation changes.
pub trait RenderBackend {
    fn present_scene(&mut self, scene: &SceneGraph);

    fn update_camera(&mut self, camera: &CameraState);

    /// Drop whatever scene is on screen
    fn clear_scene(&mut self) {}
}

/// Backend without a GPU; records what it was asked to draw
#[derive(Debug, Default)]
pub struct NullBackend {
    /// Generations actually uploaded, in order
    pub uploads: Vec<u64>,
    pub camera_updates: usize,
    pub last_camera: Option<CameraState>,
    pub cleared: usize,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_generation(&self) -> Option<u64> {
        self.uploads.last().copied()
    }
}

impl RenderBackend for NullBackend {
    fn present_scene(&mut self, scene: &SceneGraph) {
        if self.current_generation() != Some(scene.generation) {
            self.uploads.push(scene.generation);
        }
    }

    fn update_camera(&mut self, camera: &CameraState) {
        self.camera_updates += 1;
        self.last_camera = Some(*camera);
    }

    fn clear_scene(&mut self) {
        self.uploads.clear();
        self.cleared += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::Material;
    use crate::scene::{GeometryKind, SceneComposer};
    use crate::settings::SceneConfig;

    #[test]
    fn test_null_backend_uploads_once_per_generation() {
        let mut composer = SceneComposer::new(SceneConfig::default());
        let mut backend = NullBackend::new();

        let scene = composer.compose("a", GeometryKind::Sphere, Material::fallback(), 75.0).clone();
        backend.present_scene(&scene);
        backend.present_scene(&scene);
        assert_eq!(backend.uploads, vec![scene.generation]);

        let swapped = composer.set_geometry(GeometryKind::Cylinder).unwrap().clone();
        backend.present_scene(&swapped);
        assert_eq!(backend.uploads.len(), 2);

        backend.clear_scene();
        assert_eq!(backend.current_generation(), None);
    }
}
