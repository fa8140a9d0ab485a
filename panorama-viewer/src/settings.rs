//! Settings management for the panorama viewer
//!
//! Handles loading/saving of the viewer XML file and clamping every tunable
//! into a range the camera, resolver and scene composer can rely on.

use quick_xml::de::from_str;
use quick_xml::se::to_string;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::resolver::ScanLimits;
use crate::scene::GeometryKind;

/// Camera tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Field of view the camera starts at and resets to (degrees)
    #[serde(rename = "defaultFov", default = "default_fov")]
    pub default_fov: f32,

    #[serde(rename = "minFov", default = "default_min_fov")]
    pub min_fov: f32,

    #[serde(rename = "maxFov", default = "default_max_fov")]
    pub max_fov: f32,

    /// Tight field of view used by the long-press quick zoom (degrees)
    #[serde(rename = "quickZoomFov", default = "default_quick_zoom_fov")]
    pub quick_zoom_fov: f32,

    /// Pitch is clamped to ±π / divisor; must stay above 2 so the camera
    /// never reaches a pole
    #[serde(rename = "pitchClampDivisor", default = "default_pitch_clamp_divisor")]
    pub pitch_clamp_divisor: f32,

    /// Radians of rotation per point of drag
    #[serde(rename = "sensitivity", default = "default_sensitivity")]
    pub sensitivity: f32,

    /// Fraction of the release velocity carried into momentum
    #[serde(rename = "momentumFactor", default = "default_momentum_factor")]
    pub momentum_factor: f32,

    #[serde(rename = "momentumDuration", default = "default_momentum_duration")]
    pub momentum_duration: f32,

    #[serde(rename = "resetDuration", default = "default_reset_duration")]
    pub reset_duration: f32,

    #[serde(rename = "quickZoomDuration", default = "default_quick_zoom_duration")]
    pub quick_zoom_duration: f32,

    #[serde(rename = "nearPlane", default = "default_near_plane")]
    pub near_plane: f32,

    #[serde(rename = "farPlane", default = "default_far_plane")]
    pub far_plane: f32,
}

fn default_fov() -> f32 {
    75.0
}

fn default_min_fov() -> f32 {
    10.0
}

fn default_max_fov() -> f32 {
    120.0
}

fn default_quick_zoom_fov() -> f32 {
    30.0
}

fn default_pitch_clamp_divisor() -> f32 {
    2.2
}

fn default_sensitivity() -> f32 {
    0.005
}

fn default_momentum_factor() -> f32 {
    0.15
}

fn default_momentum_duration() -> f32 {
    0.45
}

fn default_reset_duration() -> f32 {
    0.5
}

fn default_quick_zoom_duration() -> f32 {
    0.25
}

fn default_near_plane() -> f32 {
    0.1
}

fn default_far_plane() -> f32 {
    100.0
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            default_fov: default_fov(),
            min_fov: default_min_fov(),
            max_fov: default_max_fov(),
            quick_zoom_fov: default_quick_zoom_fov(),
            pitch_clamp_divisor: default_pitch_clamp_divisor(),
            sensitivity: default_sensitivity(),
            momentum_factor: default_momentum_factor(),
            momentum_duration: default_momentum_duration(),
            reset_duration: default_reset_duration(),
            quick_zoom_duration: default_quick_zoom_duration(),
            near_plane: default_near_plane(),
            far_plane: default_far_plane(),
        }
    }
}

impl CameraConfig {
    /// Largest pitch magnitude the camera may reach (radians)
    pub fn max_pitch(&self) -> f32 {
        std::f32::consts::PI / self.pitch_clamp_divisor
    }

    pub fn clamp_fov(&self, fov: f32) -> f32 {
        fov.clamp(self.min_fov, self.max_fov)
    }

    pub fn sanitize(&mut self) {
        if !(self.min_fov.is_finite() && self.max_fov.is_finite())
            || self.min_fov < 1.0
            || self.max_fov > 170.0
            || self.min_fov >= self.max_fov
        {
            self.min_fov = default_min_fov();
            self.max_fov = default_max_fov();
        }
        if !self.default_fov.is_finite() {
            self.default_fov = default_fov();
        }
        self.default_fov = self.clamp_fov(self.default_fov);
        if !self.quick_zoom_fov.is_finite() {
            self.quick_zoom_fov = default_quick_zoom_fov();
        }
        self.quick_zoom_fov = self.clamp_fov(self.quick_zoom_fov);

        if !self.pitch_clamp_divisor.is_finite() || self.pitch_clamp_divisor <= 2.0 {
            tracing::warn!(
                divisor = self.pitch_clamp_divisor,
                "pitch clamp divisor must exceed 2, using default"
            );
            self.pitch_clamp_divisor = default_pitch_clamp_divisor();
        }

        positive_or(&mut self.sensitivity, default_sensitivity());
        if !self.momentum_factor.is_finite() || self.momentum_factor < 0.0 {
            self.momentum_factor = default_momentum_factor();
        }
        positive_or(&mut self.momentum_duration, default_momentum_duration());
        positive_or(&mut self.reset_duration, default_reset_duration());
        positive_or(&mut self.quick_zoom_duration, default_quick_zoom_duration());
        positive_or(&mut self.near_plane, default_near_plane());
        if !self.far_plane.is_finite() || self.far_plane <= self.near_plane {
            self.far_plane = default_far_plane().max(self.near_plane * 2.0);
        }
    }
}

fn positive_or(value: &mut f32, fallback: f32) {
    if !value.is_finite() || *value <= 0.0 {
        *value = fallback;
    }
}

/// Locator resolution tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Soft deadline after which local tiers race the remote fetch
    #[serde(rename = "fetchDeadlineMs", default = "default_fetch_deadline_ms")]
    pub fetch_deadline_ms: u64,

    /// Hard limit on a whole HTTP request
    #[serde(rename = "requestTimeoutMs", default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(rename = "maxDownloadBytes", default = "default_max_download_bytes")]
    pub max_download_bytes: usize,

    /// Walk depth counted from the root's own entries (1); subdirectory contents start at 2
    #[serde(rename = "scanMaxDepth", default = "default_scan_max_depth")]
    pub scan_max_depth: usize,

    #[serde(rename = "scanMaxEntries", default = "default_scan_max_entries")]
    pub scan_max_entries: usize,
}

fn default_fetch_deadline_ms() -> u64 {
    1500
}

fn default_request_timeout_ms() -> u64 {
    20_000
}

fn default_max_download_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_scan_max_depth() -> usize {
    6
}

fn default_scan_max_entries() -> usize {
    5000
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fetch_deadline_ms: default_fetch_deadline_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            max_download_bytes: default_max_download_bytes(),
            scan_max_depth: default_scan_max_depth(),
            scan_max_entries: default_scan_max_entries(),
        }
    }
}

impl ResolverConfig {
    pub fn fetch_deadline(&self) -> Duration {
        Duration::from_millis(self.fetch_deadline_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn scan_limits(&self) -> ScanLimits {
        ScanLimits {
            max_depth: self.scan_max_depth,
            max_entries: self.scan_max_entries,
        }
    }

    fn sanitize(&mut self) {
        self.fetch_deadline_ms = self.fetch_deadline_ms.max(50);
        self.request_timeout_ms = self.request_timeout_ms.max(self.fetch_deadline_ms);
        self.max_download_bytes = self.max_download_bytes.max(1024);
        // Depth 1 would only see the root, which the scan skips
        self.scan_max_depth = self.scan_max_depth.max(2);
        self.scan_max_entries = self.scan_max_entries.max(1);
    }
}

/// Geometry and texture tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    #[serde(rename = "radius", default = "default_radius")]
    pub radius: f32,

    #[serde(rename = "sphereSegmentsH", default = "default_sphere_segments_h")]
    pub sphere_segments_h: u32,

    #[serde(rename = "sphereSegmentsV", default = "default_sphere_segments_v")]
    pub sphere_segments_v: u32,

    #[serde(rename = "cylinderSegments", default = "default_cylinder_segments")]
    pub cylinder_segments: u32,

    /// Cylinder height when no texture aspect is known
    #[serde(rename = "cylinderDefaultHeight", default = "default_cylinder_height")]
    pub cylinder_default_height: f32,

    #[serde(rename = "maxTextureDimension", default = "default_max_texture_dimension")]
    pub max_texture_dimension: u32,
}

fn default_radius() -> f32 {
    10.0
}

fn default_sphere_segments_h() -> u32 {
    96
}

fn default_sphere_segments_v() -> u32 {
    48
}

fn default_cylinder_segments() -> u32 {
    96
}

fn default_cylinder_height() -> f32 {
    12.0
}

fn default_max_texture_dimension() -> u32 {
    8192
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            radius: default_radius(),
            sphere_segments_h: default_sphere_segments_h(),
            sphere_segments_v: default_sphere_segments_v(),
            cylinder_segments: default_cylinder_segments(),
            cylinder_default_height: default_cylinder_height(),
            max_texture_dimension: default_max_texture_dimension(),
        }
    }
}

impl SceneConfig {
    fn sanitize(&mut self) {
        positive_or(&mut self.radius, default_radius());
        positive_or(&mut self.cylinder_default_height, default_cylinder_height());
        self.sphere_segments_h = self.sphere_segments_h.clamp(8, 512);
        self.sphere_segments_v = self.sphere_segments_v.clamp(4, 256);
        self.cylinder_segments = self.cylinder_segments.clamp(8, 512);
        self.max_texture_dimension = self.max_texture_dimension.clamp(64, 16384);
    }
}

/// Viewer settings stored in viewer.xml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename = "PanoramaViewer")]
pub struct ViewerSettings {
    #[serde(rename = "camera", default)]
    pub camera: CameraConfig,

    #[serde(rename = "resolver", default)]
    pub resolver: ResolverConfig,

    #[serde(rename = "scene", default)]
    pub scene: SceneConfig,

    /// Geometry used when a panorama is opened
    #[serde(rename = "defaultGeometry", default)]
    pub default_geometry: GeometryKind,
}

impl ViewerSettings {
    /// Clamp every value into its valid range
    pub fn sanitize(&mut self) {
        self.camera.sanitize();
        self.resolver.sanitize();
        self.scene.sanitize();
    }

    pub fn sanitized(mut self) -> Self {
        self.sanitize();
        self
    }

    /// Load settings from an XML file
    pub fn load_from_file(path: &PathBuf) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path).map_err(SettingsError::Io)?;
        let settings: Self = from_str(&contents).map_err(SettingsError::XmlParse)?;
        Ok(settings.sanitized())
    }

    /// Save settings to an XML file
    pub fn save_to_file(&self, path: &PathBuf) -> Result<(), SettingsError> {
        let xml = to_string(self).map_err(SettingsError::XmlWrite)?;
        let formatted = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", xml);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(SettingsError::Io)?;
        }
        fs::write(path, formatted).map_err(SettingsError::Io)?;
        Ok(())
    }

    /// Settings file path in the user config directory
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("PanoramaViewer");
            p.push("viewer.xml");
            p
        })
    }

    /// Load settings from the config directory, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match Self::load_from_file(&path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Ignoring unreadable settings at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save settings to the config directory
    pub fn save(&self) -> Result<(), SettingsError> {
        let Some(path) = Self::settings_path() else {
            return Err(SettingsError::NoConfigDir);
        };
        self.save_to_file(&path)
    }
}

/// Settings-related errors
#[derive(Debug)]
pub enum SettingsError {
    Io(std::io::Error),
    XmlParse(quick_xml::DeError),
    XmlWrite(quick_xml::SeError),
    NoConfigDir,
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::Io(e) => write!(f, "IO error: {}", e),
            SettingsError::XmlParse(e) => write!(f, "XML parse error: {}", e),
            SettingsError::XmlWrite(e) => write!(f, "XML write error: {}", e),
            SettingsError::NoConfigDir => write!(f, "Could not find config directory"),
        }
    }
}

impl std::error::Error for SettingsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = ViewerSettings::default();
        assert_eq!(settings.camera.default_fov, 75.0);
        assert_eq!(settings.camera.pitch_clamp_divisor, 2.2);
        assert_eq!(settings.resolver.fetch_deadline_ms, 1500);
        assert_eq!(settings.scene.sphere_segments_h, 96);
        assert_eq!(settings.scene.sphere_segments_v, 48);
        assert_eq!(settings.default_geometry, GeometryKind::Sphere);
    }

    #[test]
    fn test_divisor_at_or_below_two_is_replaced() {
        let mut settings = ViewerSettings::default();
        settings.camera.pitch_clamp_divisor = 2.0;
        settings.sanitize();
        assert_eq!(settings.camera.pitch_clamp_divisor, 2.2);
        assert!(settings.camera.max_pitch() < std::f32::consts::FRAC_PI_2);

        settings.camera.pitch_clamp_divisor = 3.0;
        settings.sanitize();
        assert_eq!(settings.camera.pitch_clamp_divisor, 3.0);
    }

    #[test]
    fn test_sanitize_repairs_fov_range() {
        let mut settings = ViewerSettings::default();
        settings.camera.min_fov = 90.0;
        settings.camera.max_fov = 40.0;
        settings.camera.default_fov = 300.0;
        settings.sanitize();

        assert_eq!(settings.camera.min_fov, 10.0);
        assert_eq!(settings.camera.max_fov, 120.0);
        assert_eq!(settings.camera.default_fov, 120.0);
    }

    #[test]
    fn test_sanitize_clamps_resolver_and_durations() {
        let mut settings = ViewerSettings::default();
        settings.resolver.fetch_deadline_ms = 5;
        settings.resolver.scan_max_depth = 0;
        settings.camera.reset_duration = -1.0;
        settings.camera.momentum_duration = f32::NAN;
        settings.sanitize();

        assert_eq!(settings.resolver.fetch_deadline_ms, 50);
        assert_eq!(settings.resolver.scan_max_depth, 2);
        assert_eq!(settings.camera.reset_duration, 0.5);
        assert_eq!(settings.camera.momentum_duration, 0.45);
    }

    #[test]
    fn test_sanitized_repairs_clip_planes() {
        let mut settings = ViewerSettings::default();
        settings.camera.near_plane = -1.0;
        settings.camera.far_plane = 0.05;
        let settings = settings.sanitized();

        assert_eq!(settings.camera.near_plane, 0.1);
        assert_eq!(settings.camera.far_plane, 100.0);
    }

    #[test]
    fn test_minimum_scan_depth_still_reaches_subdirectories() {
        use crate::resolver::{FsStorageRoot, StorageRoot};

        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("rooms")).unwrap();
        std::fs::write(dir.path().join("rooms/kitchen.jpg"), b"x").unwrap();

        let mut settings = ViewerSettings::default();
        settings.resolver.scan_max_depth = 1;
        settings.sanitize();
        let limits = settings.resolver.scan_limits();

        let found = FsStorageRoot::new(dir.path()).find_in_subdirectories(
            limits.max_depth,
            limits.max_entries,
            &mut |name| name == "kitchen.jpg",
        );
        assert_eq!(found, Some(PathBuf::from("rooms/kitchen.jpg")));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("viewer.xml");

        let mut settings = ViewerSettings::default();
        settings.camera.default_fov = 60.0;
        settings.resolver.scan_max_entries = 250;
        settings.default_geometry = GeometryKind::Cylinder;
        settings.save_to_file(&path).unwrap();

        let loaded = ViewerSettings::load_from_file(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("viewer.xml");
        fs::write(
            &path,
            "<PanoramaViewer><camera><defaultFov>90</defaultFov></camera></PanoramaViewer>",
        )
        .unwrap();

        let loaded = ViewerSettings::load_from_file(&path).unwrap();
        assert_eq!(loaded.camera.default_fov, 90.0);
        assert_eq!(loaded.camera.min_fov, 10.0);
        assert_eq!(loaded.resolver, ResolverConfig::default());
        assert_eq!(loaded.default_geometry, GeometryKind::Sphere);
    }

    #[test]
    fn test_parse_error_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("viewer.xml");
        fs::write(&path, "<PanoramaViewer><camera><defaultFov>wide</defaultFov></camera></PanoramaViewer>").unwrap();

        assert!(matches!(
            ViewerSettings::load_from_file(&path),
            Err(SettingsError::XmlParse(_))
        ));
    }
}
