//! Locator classification
//!
//! A locator is an opaque string from the host application. It is classified
//! once into empty, remote or local, and the local tiers only ever see the
//! normalised relative path derived from it.

use std::path::{Component, Path, PathBuf};

/// Image extensions stripped for bundle lookups and used by bundle probing
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "heic", "webp", "gif", "bmp", "tiff"];

const LOCAL_SCHEMES: &[&str] = &["local://", "file://", "local:"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Empty,
    /// `http(s)` URL plus its path component (query and fragment stripped)
    Remote { url: String, path: String },
    /// Local reference or bare path, scheme already stripped
    Local { path: String },
}

impl Locator {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Locator::Empty;
        }

        let lower = trimmed.to_ascii_lowercase();
        for scheme in ["https://", "http://"] {
            if lower.starts_with(scheme) {
                let rest = &trimmed[scheme.len()..];
                let path = match rest.find('/') {
                    Some(slash) => &rest[slash..],
                    None => "",
                };
                let path = path.split(['?', '#']).next().unwrap_or_default();
                return Locator::Remote {
                    url: trimmed.to_string(),
                    path: path.to_string(),
                };
            }
        }

        for scheme in LOCAL_SCHEMES {
            if lower.starts_with(scheme) {
                return Locator::Local {
                    path: trimmed[scheme.len()..].to_string(),
                };
            }
        }

        Locator::Local {
            path: trimmed.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Locator::Empty)
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Locator::Remote { .. })
    }

    /// Normalised path relative to the storage root, if any remains
    pub fn relative_path(&self) -> Option<PathBuf> {
        let raw = match self {
            Locator::Empty => return None,
            Locator::Remote { path, .. } => path.as_str(),
            Locator::Local { path } => path.as_str(),
        };
        let normalised = normalise(raw);
        (!normalised.as_os_str().is_empty()).then_some(normalised)
    }

    /// Final path component
    pub fn basename(&self) -> Option<String> {
        self.relative_path()?
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }

    /// Basename with a known image extension removed, used for bundle lookups
    pub fn bundle_stem(&self) -> Option<String> {
        let basename = self.basename()?;
        let stem = strip_image_extension(&basename);
        (!stem.is_empty()).then(|| stem.to_string())
    }
}

/// Drop separators, `.` and `..` so the result always stays under the root
fn normalise(raw: &str) -> PathBuf {
    let unified = raw.replace('\\', "/");
    Path::new(&unified)
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}

pub fn strip_image_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, ext))
            if IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext)) =>
        {
            stem
        }
        _ => name,
    }
}

/// Substring match in either direction, ASCII case-insensitive
pub fn names_match(candidate: &str, basename: &str) -> bool {
    if candidate.is_empty() || basename.is_empty() {
        return false;
    }
    let candidate = candidate.to_ascii_lowercase();
    let basename = basename.to_ascii_lowercase();
    candidate.contains(&basename) || basename.contains(&candidate)
}
