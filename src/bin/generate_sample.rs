use anyhow::Context;
use tflite_metadata::attach::INPUT_MODEL_PATH;
use tflite_metadata::tflite::SampleModel;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let bytes = SampleModel::new("Plant disease classifier placeholder").build();
    std::fs::write(INPUT_MODEL_PATH, &bytes)
        .with_context(|| format!("writing {INPUT_MODEL_PATH}"))?;

    println!("Wrote sample model ({} bytes) to {INPUT_MODEL_PATH}", bytes.len());
    Ok(())
}
