use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ModelMetadata – the descriptive record embedded in a model
// ---------------------------------------------------------------------------

/// Descriptive metadata travelling inside a `.tflite` file.
///
/// Only the top-level text fields of the TFLite metadata schema are modelled;
/// subgraph and associated-file metadata are out of scope.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub name: String,
    pub description: String,
    pub version: String,
    pub author: String,
    pub license: String,
    /// Oldest metadata parser able to read this record.
    /// Filled in by the populator when left empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_parser_version: Option<String>,
}

impl ModelMetadata {
    /// The record stamped onto the plant disease classifier.
    pub fn plant_disease_detection() -> Self {
        Self {
            name: "Plant Disease Detection".to_string(),
            description: "A model to classify plant diseases using TFLite.".to_string(),
            version: "1.0".to_string(),
            // TODO: replace the placeholder author before publishing the model.
            author: "Your Name".to_string(),
            license: "MIT".to_string(),
            min_parser_version: None,
        }
    }

    /// Same record without the parser version, for comparing the five
    /// descriptive fields only.
    pub fn without_parser_version(&self) -> Self {
        Self {
            min_parser_version: None,
            ..self.clone()
        }
    }
}

impl fmt::Display for ModelMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} v{} by {} ({})",
            self.name, self.version, self.author, self.license
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plant_disease_record_has_fixed_fields() {
        let meta = ModelMetadata::plant_disease_detection();
        assert_eq!(meta.name, "Plant Disease Detection");
        assert_eq!(
            meta.description,
            "A model to classify plant diseases using TFLite."
        );
        assert_eq!(meta.version, "1.0");
        assert_eq!(meta.author, "Your Name");
        assert_eq!(meta.license, "MIT");
        assert!(meta.min_parser_version.is_none());
    }

    #[test]
    fn json_omits_unset_parser_version() {
        let json = serde_json::to_value(ModelMetadata::plant_disease_detection()).unwrap();
        assert_eq!(json["license"], "MIT");
        assert!(json.get("min_parser_version").is_none());
    }

    #[test]
    fn display_is_one_line_summary() {
        let meta = ModelMetadata::plant_disease_detection();
        assert_eq!(
            meta.to_string(),
            "Plant Disease Detection v1.0 by Your Name (MIT)"
        );
    }
}
