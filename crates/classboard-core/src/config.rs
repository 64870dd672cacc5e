//! Board configuration.

use serde::{Deserialize, Serialize};

/// Tunable settings for a board.
///
/// Every field has a default, so a JSON document only needs to name the
/// values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Smallest allowed canvas scale.
    pub min_scale: f64,
    /// Largest allowed canvas scale.
    pub max_scale: f64,
    /// Additive scale change per wheel notch.
    pub zoom_step: f64,
    /// Distance (logical units) within which points snap to anchors and neighbours.
    pub snap_tolerance: f64,
    /// Distance (logical units) within which a pointer hits an association segment.
    pub hit_tolerance: f64,
    /// Font size used for class and multiplicity text.
    pub font_size: f64,
    /// Title given to classes created by double-clicking the canvas.
    pub default_class_title: String,
    /// Property text of newly created associations.
    pub default_association_properties: String,
    /// Maximum number of undo steps kept by the document.
    pub max_undo_steps: usize,
    /// Local edits closer together than this (milliseconds) merge into one undo step.
    pub undo_merge_interval_ms: i64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            min_scale: 0.3,
            max_scale: 2.0,
            zoom_step: 0.1,
            snap_tolerance: 5.0,
            hit_tolerance: 5.0,
            font_size: 14.0,
            default_class_title: "SimpleClass".to_string(),
            default_association_properties: "lt=->".to_string(),
            max_undo_steps: 100,
            undo_merge_interval_ms: 300,
        }
    }
}

impl BoardConfig {
    /// Parse a configuration from JSON, filling unspecified fields with defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BoardConfig::default();
        assert!((config.min_scale - 0.3).abs() < f64::EPSILON);
        assert!((config.max_scale - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.default_class_title, "SimpleClass");
        assert_eq!(config.default_association_properties, "lt=->");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = BoardConfig::from_json(r#"{ "max_scale": 4.0, "default_class_title": "Entity" }"#)
            .expect("valid config");
        assert!((config.max_scale - 4.0).abs() < f64::EPSILON);
        assert!((config.min_scale - 0.3).abs() < f64::EPSILON);
        assert_eq!(config.default_class_title, "Entity");
    }

    #[test]
    fn test_json_roundtrip() {
        let config = BoardConfig::default();
        let json = config.to_json().expect("serializable");
        assert_eq!(BoardConfig::from_json(&json).expect("parseable"), config);
    }
}
