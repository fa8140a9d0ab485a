//! Panorama descriptors supplied by the host application
//!
//! A `PanoramicImage` is immutable once handed to the viewer. The viewer only
//! reads it; everything about where the pixels come from is encoded in the
//! opaque `locator` string.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Kind of room a panorama was captured in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RoomType {
    LivingRoom,
    Bedroom,
    Kitchen,
    Bathroom,
    DiningRoom,
    Office,
    Exterior,
    #[default]
    Other,
}

impl RoomType {
    /// Get display name for UI
    pub fn display_name(&self) -> &'static str {
        match self {
            RoomType::LivingRoom => "Living Room",
            RoomType::Bedroom => "Bedroom",
            RoomType::Kitchen => "Kitchen",
            RoomType::Bathroom => "Bathroom",
            RoomType::DiningRoom => "Dining Room",
            RoomType::Office => "Office",
            RoomType::Exterior => "Exterior",
            RoomType::Other => "Other",
        }
    }

    /// Get all room types for iteration
    pub fn all() -> &'static [RoomType] {
        &[
            RoomType::LivingRoom,
            RoomType::Bedroom,
            RoomType::Kitchen,
            RoomType::Bathroom,
            RoomType::DiningRoom,
            RoomType::Office,
            RoomType::Exterior,
            RoomType::Other,
        ]
    }
}

/// A 360° photo of a room, as described by the host application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanoramicImage {
    pub id: String,
    /// Opaque source reference: `local://…`, `file://…`, `http(s)://…` or a bare path
    pub locator: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "roomType", default)]
    pub room_type: RoomType,
    #[serde(rename = "captureDate")]
    pub capture_date: NaiveDate,
    #[serde(rename = "isAREnabled", default)]
    pub is_ar_enabled: bool,
}

impl PanoramicImage {
    pub fn new(id: impl Into<String>, locator: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            locator: locator.into(),
            title: title.into(),
            description: None,
            room_type: RoomType::default(),
            capture_date: NaiveDate::default(),
            is_ar_enabled: false,
        }
    }

    pub fn with_room_type(mut self, room_type: RoomType) -> Self {
        self.room_type = room_type;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_capture_date(mut self, date: NaiveDate) -> Self {
        self.capture_date = date;
        self
    }

    /// An empty locator never reaches the resolver
    pub fn has_locator(&self) -> bool {
        !self.locator.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_locator_is_treated_as_missing() {
        let image = PanoramicImage::new("p1", "   ", "Kitchen");
        assert!(!image.has_locator());
        let image = PanoramicImage::new("p1", "local://kitchen.jpg", "Kitchen");
        assert!(image.has_locator());
    }

    #[test]
    fn test_room_type_names_are_unique() {
        let mut names: Vec<_> = RoomType::all().iter().map(|r| r.display_name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), RoomType::all().len());
    }
}
