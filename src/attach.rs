use std::path::Path;

use anyhow::{Context, Result};

use crate::tflite::{MetadataPopulator, ModelMetadata};

/// Model read by [`attach_metadata`], relative to the working directory.
pub const INPUT_MODEL_PATH: &str = "model.tflite";
/// Model written by [`attach_metadata`]; overwritten if present.
pub const OUTPUT_MODEL_PATH: &str = "model_with_metadata.tflite";
/// Printed by the binary once the output is on disk.
pub const SUCCESS_MESSAGE: &str = "✅ Metadata added successfully!";

/// Stamp the plant disease record onto `model.tflite`, writing
/// `model_with_metadata.tflite`.
pub fn attach_metadata() -> Result<()> {
    attach_metadata_to(
        Path::new(INPUT_MODEL_PATH),
        Path::new(OUTPUT_MODEL_PATH),
        &ModelMetadata::plant_disease_detection(),
    )
}

/// Embed `metadata` into the model at `input` and write the result to
/// `output`. Nothing is written unless loading and population succeed; the
/// write itself is not atomic.
pub fn attach_metadata_to(input: &Path, output: &Path, metadata: &ModelMetadata) -> Result<()> {
    let mut populator = MetadataPopulator::with_model_file(input)
        .with_context(|| format!("loading model {}", input.display()))?;
    populator.load_metadata(metadata);
    populator.populate().context("populating metadata")?;

    let bytes = populator.into_model_buffer();
    std::fs::write(output, &bytes)
        .with_context(|| format!("writing {}", output.display()))?;
    log::info!("wrote {} ({} bytes): {metadata}", output.display(), bytes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tflite::{MetadataDisplayer, SampleModel};

    #[test]
    fn writes_model_with_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join(INPUT_MODEL_PATH);
        let output = dir.path().join(OUTPUT_MODEL_PATH);
        std::fs::write(&input, SampleModel::default().build()).unwrap();

        attach_metadata_to(&input, &output, &ModelMetadata::plant_disease_detection()).unwrap();

        let read = MetadataDisplayer::with_model_file(&output).unwrap().metadata().unwrap();
        assert_eq!(read.name, "Plant Disease Detection");
    }

    #[test]
    fn invalid_input_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join(INPUT_MODEL_PATH);
        let output = dir.path().join(OUTPUT_MODEL_PATH);
        std::fs::write(&input, b"arbitrary bytes, not a flatbuffer").unwrap();

        let err = attach_metadata_to(&input, &output, &ModelMetadata::plant_disease_detection())
            .unwrap_err();
        assert!(format!("{err:#}").contains("loading model"));
        assert!(!output.exists());
    }

    #[test]
    fn unwritable_output_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join(INPUT_MODEL_PATH);
        std::fs::write(&input, SampleModel::default().build()).unwrap();
        let output = dir.path().join("missing-dir").join(OUTPUT_MODEL_PATH);

        let err = attach_metadata_to(&input, &output, &ModelMetadata::plant_disease_detection())
            .unwrap_err();
        assert!(format!("{err:#}").contains("writing"));
    }
}
