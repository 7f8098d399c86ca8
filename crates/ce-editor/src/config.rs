//! Editor configuration.
//!
//! Every field has a default, so hosts only pass what they override:
//!
//! ```json
//! { "dragLibraryUrl": "/cms/scripts/dragula.min.js", "editMode": true }
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditorConfig {
    /// Added to the iframe height so its border never clips the page.
    pub border_compensation: f64,
    /// Added to the natural content width when it overflows the viewport.
    pub horizontal_compensation: f64,
    pub drag_library_url: String,
    pub overlay_css_url: String,
    /// Element whose bottom edge marks the end of the page.
    pub height_marker_selector: String,
    /// Computed style properties never copied onto a drag mirror. A trailing
    /// `*` matches a prefix.
    pub mirror_excluded_properties: Vec<String>,
    /// Whether drag and drop starts enabled.
    pub edit_mode: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            border_compensation: 2.0,
            horizontal_compensation: 2.0,
            drag_library_url: "scripts/dragula.min.js".into(),
            overlay_css_url: "styles/channel-overlay.css".into(),
            height_marker_selector: ".channel-height-marker".into(),
            mirror_excluded_properties: [
                "display",
                "position",
                "top",
                "left",
                "right",
                "bottom",
                "width",
                "height",
                "min-*",
                "max-*",
                "margin*",
                "transform*",
                "visibility",
                "opacity",
                "z-index",
                "box-sizing",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            edit_mode: false,
        }
    }
}

impl EditorConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn excludes_from_mirror(&self, property: &str) -> bool {
        self.mirror_excluded_properties
            .iter()
            .any(|pattern| match pattern.strip_suffix('*') {
                Some(prefix) => property.starts_with(prefix),
                None => property == pattern,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            EditorConfig::from_json(r#"{"dragLibraryUrl":"/lib/dragula.js","editMode":true}"#)
                .unwrap();
        assert_eq!(config.drag_library_url, "/lib/dragula.js");
        assert!(config.edit_mode);
        assert_eq!(config.border_compensation, 2.0);
        assert_eq!(config.overlay_css_url, EditorConfig::default().overlay_css_url);
    }

    #[test]
    fn mirror_exclusions() {
        let config = EditorConfig::default();
        assert!(config.excludes_from_mirror("width"));
        assert!(config.excludes_from_mirror("margin-left"));
        assert!(config.excludes_from_mirror("max-height"));
        assert!(!config.excludes_from_mirror("color"));
        assert!(!config.excludes_from_mirror("font-size"));
        assert!(!config.excludes_from_mirror("padding-top"));
    }
}
