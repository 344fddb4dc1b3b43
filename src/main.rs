use tflite_metadata::attach::{attach_metadata, SUCCESS_MESSAGE};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    attach_metadata()?;
    println!("{SUCCESS_MESSAGE}");
    Ok(())
}
