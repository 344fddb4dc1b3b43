use std::path::PathBuf;

use anyhow::Context;
use tflite_metadata::attach::OUTPUT_MODEL_PATH;
use tflite_metadata::tflite::MetadataDisplayer;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(OUTPUT_MODEL_PATH));

    let displayer = MetadataDisplayer::with_model_file(&path)
        .with_context(|| format!("loading model {}", path.display()))?;
    println!("{}", displayer.metadata_json()?);
    Ok(())
}
