use tflite_metadata::tflite::schema::{self, METADATA_FIELD_NAME};
use tflite_metadata::tflite::{MetadataDisplayer, MetadataPopulator, ModelMetadata, SampleModel};
use tflite_metadata::MetadataError;

fn populate(model: Vec<u8>) -> Result<Vec<u8>, MetadataError> {
    let mut populator = MetadataPopulator::with_model_buffer(model)?;
    populator.load_metadata(&ModelMetadata::plant_disease_detection());
    populator.populate()?;
    Ok(populator.into_model_buffer())
}

#[test]
fn dangling_metadata_entry_is_rejected() {
    let model = SampleModel::default()
        .with_dangling_entry(METADATA_FIELD_NAME)
        .build();
    assert!(matches!(
        populate(model),
        Err(MetadataError::BufferIndexOutOfRange { index: 2, len: 2 })
    ));
}

#[test]
fn placeholder_metadata_is_overwritten_in_place() {
    let model = SampleModel::default()
        .with_metadata(METADATA_FIELD_NAME, b"stale")
        .with_metadata("conversion_metadata", b"\x01\x02\x03")
        .build();
    let buffers_before = schema::root_as_model(&model).unwrap().buffers().unwrap().len();

    let out = populate(model).unwrap();
    let parsed = schema::root_as_model(&out).unwrap();
    assert_eq!(parsed.buffers().unwrap().len(), buffers_before);

    let names: Vec<&str> = parsed
        .metadata()
        .unwrap()
        .iter()
        .filter_map(|e| e.name())
        .collect();
    assert_eq!(names, ["min_runtime_version", METADATA_FIELD_NAME, "conversion_metadata"]);

    let conversion = parsed.metadata().unwrap().get(2);
    let bytes = parsed
        .buffers()
        .unwrap()
        .get(conversion.buffer() as usize)
        .bytes_in(&out)
        .unwrap();
    assert_eq!(bytes, b"\x01\x02\x03");

    let read = MetadataDisplayer::with_model_buffer(out).unwrap().metadata().unwrap();
    assert_eq!(read.name, "Plant Disease Detection");
}

#[test]
fn large_model_layout_survives_repeated_population() {
    let tensor: Vec<u8> = (0..=255).collect();
    let model = SampleModel::default().with_external_data(tensor.clone()).build();

    let once = populate(model).unwrap();
    let twice = populate(once).unwrap();

    let parsed = schema::root_as_model(&twice).unwrap();
    let buffer = parsed.buffers().unwrap().get(1);
    assert_eq!(buffer.bytes_in(&twice).unwrap(), tensor.as_slice());
    assert_eq!(buffer.offset() % 16, 0);
}

#[test]
fn description_and_subgraphs_are_untouched() {
    let out = populate(SampleModel::new("cassava leaf model").build()).unwrap();
    let parsed = schema::root_as_model(&out).unwrap();
    assert_eq!(parsed.description(), Some("cassava leaf model"));
    assert_eq!(parsed.subgraphs().unwrap().len(), 1);
}

#[test]
fn replaced_record_is_not_recoverable() {
    let private = ModelMetadata {
        author: "Jane Secret Author".into(),
        ..ModelMetadata::plant_disease_detection()
    };
    let mut populator = MetadataPopulator::with_model_buffer(SampleModel::default().build()).unwrap();
    populator.load_metadata(&private);
    populator.populate().unwrap();
    let first = populator.into_model_buffer();
    let secret: &[u8] = b"Jane Secret Author";
    assert!(first.windows(secret.len()).any(|w| w == secret));

    let second = populate(first).unwrap();
    let third = populate(second.clone()).unwrap();

    for out in [&second, &third] {
        assert!(!out.windows(secret.len()).any(|w| w == secret));
    }
    let read = MetadataDisplayer::with_model_buffer(third).unwrap().metadata().unwrap();
    assert_eq!(read.author, "Your Name");
}
