//! Panorama Viewer Library
//!
//! Immersive 360° viewing of room panoramas: tiered locator resolution with
//! fallback, inside-out sphere and cylinder projection, and a gesture-driven
//! interior camera.

pub mod camera;
pub mod descriptor;
pub mod material;
pub mod render;
pub mod resolver;
pub mod scene;
pub mod settings;
pub mod telemetry;
pub mod viewer;

pub use camera::{CameraController, CameraState, GestureEvent};
pub use descriptor::{PanoramicImage, RoomType};
pub use material::Material;
pub use resolver::{LocatorResolver, ResolvedAsset, ResolveError};
pub use scene::{GeometryKind, SceneComposer, SceneGraph};
pub use settings::ViewerSettings;
pub use viewer::{PanoramaViewer, ViewerSignal};
