use flatbuffers::{FlatBufferBuilder, TableFinishedWIPOffset, WIPOffset};

use super::schema::{Buffer, Metadata, Model, MODEL_FILE_IDENTIFIER};

/// Schema version written by current TFLite converters.
pub const SCHEMA_VERSION: u32 = 3;

// SubGraph slots; the table itself is never read back.
const SUBGRAPH_TENSORS: u16 = 4;
const SUBGRAPH_INPUTS: u16 = 6;
const SUBGRAPH_OUTPUTS: u16 = 8;
const SUBGRAPH_OPERATORS: u16 = 10;
const SUBGRAPH_NAME: u16 = 12;

type Table = WIPOffset<TableFinishedWIPOffset>;

/// Builder for small, structurally valid `.tflite` files.
///
/// The result has one empty subgraph, the conventional empty buffer at
/// index 0 and whatever metadata entries were added. It does not run on an
/// interpreter, but it is a faithful container for exercising the populator.
#[derive(Debug, Clone)]
pub struct SampleModel {
    description: String,
    metadata: Vec<(String, Vec<u8>)>,
    dangling: Vec<String>,
    external_data: Option<Vec<u8>>,
}

impl Default for SampleModel {
    fn default() -> Self {
        Self::new("Sample model generated by tflite-metadata")
    }
}

impl SampleModel {
    /// A model carrying a `min_runtime_version` entry, like converter output.
    pub fn new(description: &str) -> Self {
        let mut runtime_version = b"1.5.0".to_vec();
        runtime_version.resize(16, 0);
        Self {
            description: description.to_string(),
            metadata: vec![("min_runtime_version".to_string(), runtime_version)],
            dangling: Vec::new(),
            external_data: None,
        }
    }

    /// Add a `Metadata` entry backed by its own buffer.
    pub fn with_metadata(mut self, name: &str, contents: &[u8]) -> Self {
        self.metadata.push((name.to_string(), contents.to_vec()));
        self
    }

    /// Add a `Metadata` entry whose buffer index is past the end.
    pub fn with_dangling_entry(mut self, name: &str) -> Self {
        self.dangling.push(name.to_string());
        self
    }

    /// Store `data` after the flatbuffer, addressed by `offset`/`size`, as
    /// converters do for models over 2 GiB.
    pub fn with_external_data(mut self, data: Vec<u8>) -> Self {
        self.external_data = Some(data);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let Some(data) = &self.external_data else {
            return self.build_flatbuffer(None);
        };
        // The offset field has a fixed width, so a first pass fixes the layout.
        let first_pass = self.build_flatbuffer(Some((2, data.len() as u64)));
        let start = first_pass.len().next_multiple_of(16);
        let mut bytes = self.build_flatbuffer(Some((start as u64, data.len() as u64)));
        debug_assert_eq!(bytes.len(), first_pass.len());
        bytes.resize(start, 0);
        bytes.extend_from_slice(data);
        bytes
    }

    fn build_flatbuffer(&self, external: Option<(u64, u64)>) -> Vec<u8> {
        let mut fbb = FlatBufferBuilder::new();
        let no_tables: [Table; 0] = [];
        let no_indices: [i32; 0] = [];

        let start = fbb.start_table();
        let mut buffers = vec![fbb.end_table(start)];

        if let Some((offset, size)) = external {
            let start = fbb.start_table();
            fbb.push_slot_always::<u64>(Buffer::VT_OFFSET, offset);
            fbb.push_slot_always::<u64>(Buffer::VT_SIZE, size);
            buffers.push(fbb.end_table(start));
        }

        let mut entries = Vec::new();
        for (name, contents) in &self.metadata {
            let data = fbb.create_vector(contents.as_slice());
            let start = fbb.start_table();
            fbb.push_slot_always::<WIPOffset<_>>(Buffer::VT_DATA, data);
            let index = buffers.len() as u32;
            buffers.push(fbb.end_table(start));
            entries.push(metadata_entry(&mut fbb, name, index));
        }
        for name in &self.dangling {
            entries.push(metadata_entry(&mut fbb, name, buffers.len() as u32));
        }

        let tensors = fbb.create_vector(&no_tables);
        let inputs = fbb.create_vector(&no_indices);
        let outputs = fbb.create_vector(&no_indices);
        let operators = fbb.create_vector(&no_tables);
        let subgraph_name = fbb.create_string("main");
        let start = fbb.start_table();
        fbb.push_slot_always::<WIPOffset<_>>(SUBGRAPH_TENSORS, tensors);
        fbb.push_slot_always::<WIPOffset<_>>(SUBGRAPH_INPUTS, inputs);
        fbb.push_slot_always::<WIPOffset<_>>(SUBGRAPH_OUTPUTS, outputs);
        fbb.push_slot_always::<WIPOffset<_>>(SUBGRAPH_OPERATORS, operators);
        fbb.push_slot_always::<WIPOffset<_>>(SUBGRAPH_NAME, subgraph_name);
        let subgraph = fbb.end_table(start);

        let operator_codes = fbb.create_vector(&no_tables);
        let subgraphs = fbb.create_vector(&[subgraph]);
        let description = fbb.create_string(&self.description);
        let buffers = fbb.create_vector(buffers.as_slice());
        let metadata = fbb.create_vector(entries.as_slice());

        let start = fbb.start_table();
        fbb.push_slot::<u32>(Model::VT_VERSION, SCHEMA_VERSION, 0);
        fbb.push_slot_always::<WIPOffset<_>>(Model::VT_OPERATOR_CODES, operator_codes);
        fbb.push_slot_always::<WIPOffset<_>>(Model::VT_SUBGRAPHS, subgraphs);
        fbb.push_slot_always::<WIPOffset<_>>(Model::VT_DESCRIPTION, description);
        fbb.push_slot_always::<WIPOffset<_>>(Model::VT_BUFFERS, buffers);
        fbb.push_slot_always::<WIPOffset<_>>(Model::VT_METADATA, metadata);
        let root = fbb.end_table(start);
        fbb.finish(root, Some(MODEL_FILE_IDENTIFIER));
        fbb.finished_data().to_vec()
    }
}

fn metadata_entry(fbb: &mut FlatBufferBuilder, name: &str, buffer: u32) -> Table {
    let name = fbb.create_string(name);
    let start = fbb.start_table();
    fbb.push_slot_always::<WIPOffset<_>>(Metadata::VT_NAME, name);
    fbb.push_slot::<u32>(Metadata::VT_BUFFER, buffer, 0);
    fbb.end_table(start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tflite::schema::root_as_model;

    #[test]
    fn default_sample_is_a_valid_model() {
        let bytes = SampleModel::default().build();
        let model = root_as_model(&bytes).unwrap();
        assert_eq!(model.version(), SCHEMA_VERSION);
        assert_eq!(model.subgraphs().unwrap().len(), 1);
        assert_eq!(model.buffers().unwrap().len(), 2);
        assert!(model.metadata_buffer_index().is_none());
    }

    #[test]
    fn external_data_is_addressed_by_offset() {
        let bytes = SampleModel::default()
            .with_external_data(vec![7; 32])
            .build();
        let model = root_as_model(&bytes).unwrap();
        let tensor = model.buffers().unwrap().get(1);
        assert!(tensor.is_external());
        assert_eq!(tensor.offset() % 16, 0);
        assert_eq!(tensor.bytes_in(&bytes), Some(&[7u8; 32][..]));
    }

    #[test]
    fn extra_metadata_gets_its_own_buffer() {
        let bytes = SampleModel::default()
            .with_metadata("TFLITE_METADATA", b"not really metadata")
            .build();
        let model = root_as_model(&bytes).unwrap();
        assert_eq!(model.metadata_buffer_index(), Some(2));
    }
}
