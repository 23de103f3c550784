// Common types used across multiple domains and layers
//
// These types are shared between the kernel and domain layers to avoid
// circular dependencies while maintaining type safety.

use serde::{Deserialize, Serialize};

/// A WGS84 point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// A named place listings are routed to (an office, a station, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub name: String,
    pub location: Coordinates,
}

impl Destination {
    pub fn new(name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            name: name.into(),
            location: Coordinates::new(lat, lon),
        }
    }
}

/// GeoJSON LineString with `[lon, lat]` positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineString {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<[f64; 2]>,
}

impl LineString {
    pub fn new(coordinates: Vec<[f64; 2]>) -> Self {
        Self {
            kind: "LineString".to_string(),
            coordinates,
        }
    }
}

/// A computed cycling route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    pub duration_minutes: i64,
    pub geometry: LineString,
}

/// Facts about a listing handed to the analyzer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub address: String,
    pub price: i32,
    pub living_area: i32,
    pub bedrooms: i32,
    pub energy_label: Option<String>,
    pub construction_year: Option<i32>,
    pub description: Option<String>,
    pub photos: Vec<String>,
}

/// What the analyzer says about a listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingAnalysis {
    pub positives: Vec<String>,
    pub negatives: Vec<String>,
    pub description: String,
}

/// A link button rendered below a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkButton {
    pub text: String,
    pub url: String,
}

/// A fully rendered notification, ready to send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    /// HTML caption
    pub caption: String,
    pub photos: Vec<String>,
    pub links: Vec<LinkButton>,
}
