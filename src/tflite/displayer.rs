use std::path::Path;

use super::loader;
use super::model::ModelMetadata;
use super::schema;
use crate::error::{MetadataError, Result};

/// Reads back the metadata embedded in a model.
#[derive(Debug, Clone)]
pub struct MetadataDisplayer {
    model_buf: Vec<u8>,
}

impl MetadataDisplayer {
    /// Read and verify a model from disk.
    pub fn with_model_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            model_buf: loader::load_model(path.as_ref())?,
        })
    }

    /// Verify an in-memory model.
    pub fn with_model_buffer(model_buf: Vec<u8>) -> Result<Self> {
        loader::verify_model(&model_buf)?;
        Ok(Self { model_buf })
    }

    /// Raw `M001` flatbuffer stored under `TFLITE_METADATA`.
    pub fn metadata_buffer(&self) -> Result<&[u8]> {
        let model = schema::root_as_model(&self.model_buf)?;
        let index = model
            .metadata_buffer_index()
            .ok_or(MetadataError::MetadataNotFound)?;
        let len = model.buffers().map_or(0, |v| v.len());
        let buffers = model
            .buffers()
            .filter(|_| index < len)
            .ok_or(MetadataError::BufferIndexOutOfRange { index, len })?;
        buffers
            .get(index)
            .bytes_in(&self.model_buf)
            .ok_or(MetadataError::BufferOutOfBounds { index })
    }

    /// Decoded `TFLITE_METADATA` record.
    pub fn metadata(&self) -> Result<ModelMetadata> {
        let table = schema::root_as_model_metadata(self.metadata_buffer()?)?;
        let text = |s: Option<&str>| s.unwrap_or_default().to_string();
        Ok(ModelMetadata {
            name: text(table.name()),
            description: text(table.description()),
            version: text(table.version()),
            author: text(table.author()),
            license: text(table.license()),
            min_parser_version: table.min_parser_version().map(str::to_string),
        })
    }

    /// Pretty-printed JSON of [`Self::metadata`].
    pub fn metadata_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.metadata()?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tflite::populator::MetadataPopulator;
    use crate::tflite::sample::SampleModel;

    #[test]
    fn model_without_metadata_reports_not_found() {
        let displayer = MetadataDisplayer::with_model_buffer(SampleModel::default().build()).unwrap();
        assert!(matches!(
            displayer.metadata(),
            Err(MetadataError::MetadataNotFound)
        ));
    }

    #[test]
    fn dangling_metadata_index_is_reported() {
        // Entry points one past the last buffer.
        let model = SampleModel::default()
            .with_dangling_entry("TFLITE_METADATA")
            .build();
        let displayer = MetadataDisplayer::with_model_buffer(model).unwrap();
        assert!(matches!(
            displayer.metadata_buffer(),
            Err(MetadataError::BufferIndexOutOfRange { .. })
        ));
    }

    #[test]
    fn json_lists_every_field() {
        let mut populator = MetadataPopulator::with_model_buffer(SampleModel::default().build()).unwrap();
        populator.load_metadata(&ModelMetadata::plant_disease_detection());
        populator.populate().unwrap();

        let displayer = MetadataDisplayer::with_model_buffer(populator.into_model_buffer()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&displayer.metadata_json().unwrap()).unwrap();
        assert_eq!(json["name"], "Plant Disease Detection");
        assert_eq!(json["description"], "A model to classify plant diseases using TFLite.");
        assert_eq!(json["version"], "1.0");
        assert_eq!(json["author"], "Your Name");
        assert_eq!(json["license"], "MIT");
        assert_eq!(json["min_parser_version"], "1.0.0");
    }
}
