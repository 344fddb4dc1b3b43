use std::path::Path;

use super::schema;
use crate::error::{MetadataError, Result};

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Read a `.tflite` file and check that it is a well-formed model.
///
/// The whole file is kept in memory; models addressing tensor data by file
/// offset need the trailing bytes too.
pub fn load_model(path: &Path) -> Result<Vec<u8>> {
    let bytes = std::fs::read(path).map_err(|source| MetadataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!("read {} bytes from {}", bytes.len(), path.display());
    verify_model(&bytes)?;
    Ok(bytes)
}

/// Check the `TFL3` identifier and run the flatbuffer verifier over the
/// tables this crate reads.
pub fn verify_model(buf: &[u8]) -> Result<()> {
    let model = schema::root_as_model(buf)?;
    log::debug!(
        "model schema v{}: {} subgraphs, {} buffers, {} metadata entries",
        model.version(),
        model.subgraphs().map_or(0, |v| v.len()),
        model.buffers().map_or(0, |v| v.len()),
        model.metadata().map_or(0, |v| v.len()),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tflite::sample::SampleModel;

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.tflite");
        let err = load_model(&path).unwrap_err();
        assert!(matches!(err, MetadataError::Io { .. }));
        assert!(err.to_string().contains("absent.tflite"));
    }

    #[test]
    fn empty_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.tflite");
        std::fs::write(&path, b"").unwrap();
        assert!(matches!(
            load_model(&path),
            Err(MetadataError::WrongIdentifier { .. })
        ));
    }

    #[test]
    fn sample_model_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.tflite");
        let bytes = SampleModel::default().build();
        std::fs::write(&path, &bytes).unwrap();
        assert_eq!(load_model(&path).unwrap(), bytes);
    }

    #[test]
    fn truncated_model_is_rejected() {
        let bytes = SampleModel::default().build();
        assert!(verify_model(&bytes[..bytes.len() / 2]).is_err());
    }
}
