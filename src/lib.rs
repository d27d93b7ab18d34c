// Library root. The binary (`main.rs`) drives these modules; everything
// testable lives here.
//
// - `api`: blocking client for the deposition service (create, upload,
//   metadata update, publish, version lookup, download) plus the
//   key -> deposition-id upsert.
// - `metadata`: deposition metadata value objects and their validation.
// - `config`: the local key/value store backing tokens and id mappings.
// - `ui`: terminal flows that collect input and delegate to `api`.
pub mod api;
pub mod config;
pub mod metadata;
pub mod ui;

pub use api::{Deposition, Record, Zenodo};
pub use config::ConfigStore;
pub use metadata::{
    AccessRight, Community, Creator, ImageType, Metadata, PublicationType, UploadType,
};
