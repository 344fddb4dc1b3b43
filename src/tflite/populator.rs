use std::ops::Range;
use std::path::Path;

use flatbuffers::{FlatBufferBuilder, WIPOffset};

use super::loader;
use super::model::ModelMetadata;
use super::relink::{Field, PrefixWriter, Target};
use super::schema::{
    self, offset_field_target, Buffer, Metadata, Model, ModelMetadataTable,
    METADATA_FIELD_NAME, METADATA_FILE_IDENTIFIER, MODEL_FILE_IDENTIFIER,
};
use crate::error::{MetadataError, Result};

/// Parser version recorded when the metadata does not name one. Plain
/// descriptive fields have been readable since the first metadata parser.
pub const DEFAULT_MIN_PARSER_VERSION: &str = "1.0.0";

/// Tensor data alignment the TFLite runtime expects for buffers.
const BUFFER_ALIGNMENT: usize = 16;

// ---------------------------------------------------------------------------
// MetadataPopulator
// ---------------------------------------------------------------------------

/// Embeds a metadata flatbuffer into a `.tflite` model.
///
/// ```no_run
/// # fn main() -> Result<(), tflite_metadata::MetadataError> {
/// use tflite_metadata::tflite::{MetadataPopulator, ModelMetadata};
///
/// let mut populator = MetadataPopulator::with_model_file("model.tflite")?;
/// populator.load_metadata(&ModelMetadata::plant_disease_detection());
/// populator.populate()?;
/// std::fs::write("model_with_metadata.tflite", populator.model_buffer()).unwrap();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MetadataPopulator {
    model_buf: Vec<u8>,
    metadata_buf: Option<Vec<u8>>,
}

impl MetadataPopulator {
    /// Read and verify a model from disk.
    pub fn with_model_file(path: impl AsRef<Path>) -> Result<Self> {
        let model_buf = loader::load_model(path.as_ref())?;
        Ok(Self {
            model_buf,
            metadata_buf: None,
        })
    }

    /// Verify an in-memory model.
    pub fn with_model_buffer(model_buf: Vec<u8>) -> Result<Self> {
        loader::verify_model(&model_buf)?;
        Ok(Self {
            model_buf,
            metadata_buf: None,
        })
    }

    /// Serialize `metadata` into the buffer `populate` will embed.
    pub fn load_metadata(&mut self, metadata: &ModelMetadata) {
        self.metadata_buf = Some(metadata_to_buffer(metadata));
    }

    /// Use an already serialized metadata flatbuffer.
    pub fn load_metadata_buffer(&mut self, metadata_buf: Vec<u8>) -> Result<()> {
        schema::root_as_model_metadata(&metadata_buf)?;
        self.metadata_buf = Some(metadata_buf);
        Ok(())
    }

    /// Embed the loaded metadata, replacing the model buffer.
    pub fn populate(&mut self) -> Result<()> {
        let metadata_buf = self
            .metadata_buf
            .as_deref()
            .ok_or(MetadataError::MetadataNotLoaded)?;
        let populated = embed_metadata(&self.model_buf, metadata_buf)?;
        log::debug!(
            "populated {} metadata bytes, model grew {} -> {} bytes",
            metadata_buf.len(),
            self.model_buf.len(),
            populated.len()
        );
        self.model_buf = populated;
        Ok(())
    }

    /// Current model bytes, populated once `populate` has run.
    pub fn model_buffer(&self) -> &[u8] {
        &self.model_buf
    }

    /// Take the model bytes, ready to be written to disk.
    pub fn into_model_buffer(self) -> Vec<u8> {
        self.model_buf
    }
}

// ---------------------------------------------------------------------------
// Serialization helpers
// ---------------------------------------------------------------------------

/// Serialize a record as an `M001` metadata flatbuffer.
pub fn metadata_to_buffer(metadata: &ModelMetadata) -> Vec<u8> {
    let mut fbb = FlatBufferBuilder::new();
    let name = fbb.create_string(&metadata.name);
    let description = fbb.create_string(&metadata.description);
    let version = fbb.create_string(&metadata.version);
    let author = fbb.create_string(&metadata.author);
    let license = fbb.create_string(&metadata.license);
    let min_parser_version = fbb.create_string(
        metadata
            .min_parser_version
            .as_deref()
            .unwrap_or(DEFAULT_MIN_PARSER_VERSION),
    );

    let start = fbb.start_table();
    fbb.push_slot_always::<WIPOffset<_>>(ModelMetadataTable::VT_NAME, name);
    fbb.push_slot_always::<WIPOffset<_>>(ModelMetadataTable::VT_DESCRIPTION, description);
    fbb.push_slot_always::<WIPOffset<_>>(ModelMetadataTable::VT_VERSION, version);
    fbb.push_slot_always::<WIPOffset<_>>(ModelMetadataTable::VT_AUTHOR, author);
    fbb.push_slot_always::<WIPOffset<_>>(ModelMetadataTable::VT_LICENSE, license);
    fbb.push_slot_always::<WIPOffset<_>>(
        ModelMetadataTable::VT_MIN_PARSER_VERSION,
        min_parser_version,
    );
    let root = fbb.end_table(start);
    fbb.finish(root, Some(METADATA_FILE_IDENTIFIER));
    fbb.finished_data().to_vec()
}

/// Build a new model buffer that stores `metadata_buf` under
/// `TFLITE_METADATA`.
///
/// The original bytes are kept behind a freshly written root table; only the
/// `buffers` vector (and `metadata`, when no entry exists yet) is rebuilt, and
/// the payload of a replaced metadata buffer is zeroed. Buffers addressed by
/// file offset get new tables so their offsets can be shifted past the new
/// root.
fn embed_metadata(model_buf: &[u8], metadata_buf: &[u8]) -> Result<Vec<u8>> {
    let model = schema::root_as_model(model_buf)?;
    if model.num_fields() > Model::KNOWN_FIELDS {
        log::warn!(
            "model root has {} fields, only the first {} are carried over",
            model.num_fields(),
            Model::KNOWN_FIELDS
        );
    }

    let buffers: Vec<Buffer> = model.buffers().map(|v| v.iter().collect()).unwrap_or_default();
    let entries: Vec<Metadata> = model.metadata().map(|v| v.iter().collect()).unwrap_or_default();

    let replaced: Vec<usize> = entries
        .iter()
        .filter(|entry| entry.name() == Some(METADATA_FIELD_NAME))
        .map(|entry| entry.buffer() as usize)
        .collect();
    if let Some(&index) = replaced.iter().find(|&&i| i >= buffers.len()) {
        return Err(MetadataError::BufferIndexOutOfRange {
            index,
            len: buffers.len(),
        });
    }
    let appending = replaced.is_empty();
    if appending {
        log::debug!("adding {METADATA_FIELD_NAME} as buffer {}", buffers.len());
    } else {
        log::debug!("replacing {METADATA_FIELD_NAME} in buffers {replaced:?}");
    }

    let mut w = PrefixWriter::new(MODEL_FILE_IDENTIFIER);
    let root = w.label();
    let buffers_vec = w.label();
    let metadata_vec = w.label();
    let metadata_buffer = w.label();

    let tab = &model._tab;
    let original = |slot| offset_field_target(tab, slot).map(|pos| Field::Offset(Target::Original(pos)));
    let metadata_field = if appending {
        Some(Field::Offset(Target::New(metadata_vec)))
    } else {
        original(Model::VT_METADATA)
    };
    w.table(
        Some(root),
        &[
            Some(Field::U32(model.version())),
            original(Model::VT_OPERATOR_CODES),
            original(Model::VT_SUBGRAPHS),
            original(Model::VT_DESCRIPTION),
            Some(Field::Offset(Target::New(buffers_vec))),
            original(Model::VT_METADATA_BUFFER),
            metadata_field,
            original(Model::VT_SIGNATURE_DEFS),
        ],
    );

    if appending {
        let entry = w.label();
        let name = w.label();
        let mut targets: Vec<Target> = entries
            .iter()
            .map(|e| Target::Original(e._tab.loc()))
            .collect();
        targets.push(Target::New(entry));
        w.offset_vector(Some(metadata_vec), &targets);
        w.table(
            Some(entry),
            &[
                Some(Field::Offset(Target::New(name))),
                Some(Field::U32(buffers.len() as u32)),
            ],
        );
        w.string(Some(name), METADATA_FIELD_NAME);
    }

    // External buffers get rewritten tables; everything else is shared.
    let mut rewritten = Vec::new();
    let mut targets = Vec::with_capacity(buffers.len() + 1);
    for (index, buffer) in buffers.iter().enumerate() {
        if replaced.contains(&index) {
            targets.push(Target::New(metadata_buffer));
        } else if buffer.is_external() {
            let label = w.label();
            rewritten.push((label, *buffer));
            targets.push(Target::New(label));
        } else {
            targets.push(Target::Original(buffer._tab.loc()));
        }
    }
    if appending {
        targets.push(Target::New(metadata_buffer));
    }
    w.offset_vector(Some(buffers_vec), &targets);

    for (label, buffer) in rewritten {
        let data = offset_field_target(&buffer._tab, Buffer::VT_DATA)
            .map(|pos| Field::Offset(Target::Original(pos)));
        w.table(
            Some(label),
            &[
                data,
                Some(Field::FileOffset(buffer.offset())),
                Some(Field::U64(buffer.size())),
            ],
        );
    }

    let data = w.label();
    w.table(
        Some(metadata_buffer),
        &[Some(Field::Offset(Target::New(data)))],
    );
    w.byte_vector(Some(data), metadata_buf, BUFFER_ALIGNMENT);

    // Replaced metadata must not be recoverable from the output.
    let live: Vec<Range<usize>> = buffers
        .iter()
        .enumerate()
        .filter(|(index, _)| !replaced.contains(index))
        .filter_map(|(_, buffer)| data_range(buffer, model_buf.len()))
        .collect();
    for &index in &replaced {
        let Some(stale) = data_range(&buffers[index], model_buf.len()) else {
            continue;
        };
        if live.iter().any(|l| l.start < stale.end && stale.start < l.end) {
            log::warn!("buffer {index} shares data with a live buffer, leaving it in place");
            continue;
        }
        w.scrub_original(stale);
    }

    let populated = w.finish(root, model_buf)?;
    schema::root_as_model(&populated)?;
    Ok(populated)
}

/// Byte range of a buffer's payload within a file of `file_len` bytes.
fn data_range(buffer: &Buffer<'_>, file_len: usize) -> Option<Range<usize>> {
    let range = if buffer.is_external() {
        let start = usize::try_from(buffer.offset()).ok()?;
        start..start.checked_add(usize::try_from(buffer.size()).ok()?)?
    } else {
        let start = offset_field_target(&buffer._tab, Buffer::VT_DATA)? + 4;
        start..start + buffer.data()?.len()
    };
    (range.end <= file_len && !range.is_empty()).then_some(range)
}
