//! TFLite container layer: reading, populating and inspecting metadata.
//!
//! Architecture:
//! ```text
//!   model.tflite (TFL3 flatbuffer)
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  loader   │  read file, verify TFL3 root
//!   └──────────┘
//!        │                 ModelMetadata ──► M001 flatbuffer
//!        ▼                                        │
//!   ┌────────────┐                                │
//!   │ populator   │ ◄─────────────────────────────┘
//!   └────────────┘  new root + buffers in front of the original bytes
//!        │
//!        ▼
//!   ┌────────────┐
//!   │ displayer   │  TFLITE_METADATA buffer → ModelMetadata / JSON
//!   └────────────┘
//! ```

pub mod displayer;
pub mod loader;
pub mod model;
pub mod populator;
mod relink;
pub mod sample;
pub mod schema;

pub use displayer::MetadataDisplayer;
pub use model::ModelMetadata;
pub use populator::MetadataPopulator;
pub use sample::SampleModel;
