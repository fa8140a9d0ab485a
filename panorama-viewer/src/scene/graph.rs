//! Scene composition
//!
//! A `SceneGraph` is one panorama surface, its material and the camera node at
//! its centre. The composer owns the current graph and bumps a generation
//! counter every time it is rebuilt so backends know when to re-upload.

use std::f32::consts::TAU;
use std::sync::Arc;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::mesh::PanoramaMesh;
use crate::material::{Material, MaterialParams};
use crate::settings::SceneConfig;

/// Surface the panorama is projected onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum GeometryKind {
    /// Full 360° sphere
    #[default]
    Sphere,
    /// Open cylinder for wide, non-spherical panoramas
    Cylinder,
}

impl GeometryKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            GeometryKind::Sphere => "Sphere",
            GeometryKind::Cylinder => "Cylinder",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            GeometryKind::Sphere => GeometryKind::Cylinder,
            GeometryKind::Cylinder => GeometryKind::Sphere,
        }
    }
}

/// Camera placement inside the geometry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraNode {
    pub position: Vec3,
    /// Field of view the camera starts at (degrees)
    pub field_of_view: f32,
}

#[derive(Debug, Clone)]
pub struct SceneGraph {
    pub generation: u64,
    pub image_id: String,
    pub geometry: GeometryKind,
    pub mesh: Arc<PanoramaMesh>,
    pub material: Material,
    pub params: MaterialParams,
    pub camera: CameraNode,
}

/// Builds and rebuilds the scene graph
pub struct SceneComposer {
    config: SceneConfig,
    generation: u64,
    current: Option<SceneGraph>,
}

impl SceneComposer {
    pub fn new(config: SceneConfig) -> Self {
        Self {
            config,
            generation: 0,
            current: None,
        }
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Build a scene for `material` on `geometry`, replacing any current one
    pub fn compose(
        &mut self,
        image_id: &str,
        geometry: GeometryKind,
        material: Material,
        default_fov: f32,
    ) -> &SceneGraph {
        let mesh = Arc::new(self.build_mesh(geometry, material.aspect()));
        self.generation += 1;

        tracing::debug!(
            image_id,
            geometry = geometry.display_name(),
            fallback = material.is_fallback(),
            generation = self.generation,
            "scene composed"
        );

        self.current.insert(SceneGraph {
            generation: self.generation,
            image_id: image_id.to_string(),
            geometry,
            mesh,
            params: material.params(),
            material,
            camera: CameraNode {
                position: Vec3::ZERO,
                field_of_view: default_fov,
            },
        })
    }

    /// Swap the geometry under the current material.
    ///
    /// Returns `None` when there is no scene or the geometry is unchanged.
    pub fn set_geometry(&mut self, geometry: GeometryKind) -> Option<&SceneGraph> {
        let aspect = match &self.current {
            Some(scene) if scene.geometry != geometry => scene.material.aspect(),
            _ => return None,
        };
        let mesh = Arc::new(self.build_mesh(geometry, aspect));
        self.generation += 1;
        let generation = self.generation;

        let scene = self.current.as_mut()?;
        scene.geometry = geometry;
        scene.mesh = mesh;
        scene.generation = generation;
        Some(&*scene)
    }

    pub fn current(&self) -> Option<&SceneGraph> {
        self.current.as_ref()
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    pub fn build_mesh(&self, geometry: GeometryKind, aspect: Option<f32>) -> PanoramaMesh {
        match geometry {
            GeometryKind::Sphere => PanoramaMesh::sphere(
                self.config.radius,
                self.config.sphere_segments_h,
                self.config.sphere_segments_v,
            ),
            GeometryKind::Cylinder => PanoramaMesh::cylinder(
                self.config.radius,
                self.cylinder_height(aspect),
                self.config.cylinder_segments,
            ),
        }
    }

    /// Height that keeps the texture's aspect ratio on the cylinder wall
    pub fn cylinder_height(&self, aspect: Option<f32>) -> f32 {
        let radius = self.config.radius;
        match aspect {
            Some(aspect) if aspect.is_finite() && aspect > 0.0 => {
                let circumference = TAU * radius;
                (circumference / aspect).clamp(radius * 0.25, radius * 4.0)
            }
            _ => self.config.cylinder_default_height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn texture(width: u32, height: u32) -> Material {
        Material::Texture(Arc::new(RgbaImage::new(width, height)))
    }

    #[test]
    fn test_compose_bumps_generation() {
        let mut composer = SceneComposer::new(SceneConfig::default());
        let first = composer.compose("a", GeometryKind::Sphere, Material::fallback(), 75.0).generation;
        let second = composer.compose("b", GeometryKind::Sphere, Material::fallback(), 75.0).generation;

        assert!(second > first);
        let scene = composer.current().unwrap();
        assert_eq!(scene.image_id, "b");
        assert_eq!(scene.camera.position, Vec3::ZERO);
        assert_eq!(scene.camera.field_of_view, 75.0);
        assert_eq!(scene.params, MaterialParams::INTERIOR);
    }

    #[test]
    fn test_set_geometry_keeps_material() {
        let mut composer = SceneComposer::new(SceneConfig::default());
        composer.compose("a", GeometryKind::Sphere, texture(8, 2), 75.0);

        let scene = composer.set_geometry(GeometryKind::Cylinder).unwrap();
        assert_eq!(scene.geometry, GeometryKind::Cylinder);
        assert_eq!(scene.generation, 2);
        assert_eq!(scene.material.aspect(), Some(4.0));
        assert_eq!(scene.mesh.vertex_count(), 2 * 97);

        assert!(composer.set_geometry(GeometryKind::Cylinder).is_none());
    }

    #[test]
    fn test_set_geometry_without_scene() {
        let mut composer = SceneComposer::new(SceneConfig::default());
        assert!(composer.set_geometry(GeometryKind::Cylinder).is_none());
    }

    #[test]
    fn test_cylinder_height_follows_aspect() {
        let composer = SceneComposer::new(SceneConfig::default());
        let circumference = TAU * 10.0;
        assert!((composer.cylinder_height(Some(8.0)) - circumference / 8.0).abs() < 1e-4);
        assert_eq!(composer.cylinder_height(None), 12.0);
        // Clamped for extreme aspects
        assert_eq!(composer.cylinder_height(Some(1000.0)), 2.5);
        assert_eq!(composer.cylinder_height(Some(0.01)), 40.0);
    }

    #[test]
    fn test_geometry_toggle() {
        assert_eq!(GeometryKind::Sphere.toggled(), GeometryKind::Cylinder);
        assert_eq!(GeometryKind::Cylinder.toggled(), GeometryKind::Sphere);
    }
}
