//! Data-quality issues reported by Osmose

use super::{BoundingBox, ElementRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A reported problem tied to a location and some map elements.
///
/// Only built from API responses and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    pub title: String,
    pub subtitle: Option<String>,
    pub elements: Vec<ElementRef>,
    pub bbox: Option<BoundingBox>,
}

impl Issue {
    /// Detail text shown once an issue is selected
    pub fn detail(&self) -> String {
        let mut out = format!("\"{}\"", self.title);
        if let Some(subtitle) = &self.subtitle {
            out.push('\n');
            out.push_str(subtitle);
        }
        out.push_str(&format!("\nLocation: ({:.6}, {:.6})", self.lat, self.lon));
        if let Some(bbox) = &self.bbox {
            out.push_str(&format!("\nArea: {bbox}"));
        }
        for element in &self.elements {
            out.push_str(&format!("\nEdit {element}: /edit_{}_{}", element.kind, element.id));
        }
        out
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elements: Vec<String> = self.elements.iter().map(ToString::to_string).collect();
        write!(
            f,
            "\"{}\" at ({:.5}, {:.5}), elements: [{}], more: /iss{}",
            self.title,
            self.lat,
            self.lon,
            elements.join(", "),
            self.id
        )
    }
}
