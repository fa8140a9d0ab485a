//! Panorama scene: inside-out meshes and the composed scene graph

pub mod graph;
pub mod mesh;

pub use graph::{CameraNode, GeometryKind, SceneComposer, SceneGraph};
pub use mesh::{PanoramaMesh, PanoramaVertex};
