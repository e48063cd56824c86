//! # Temporary File Storage
//!
//! Uploaded audio is written to a temp directory before the transcriber runs,
//! and both the upload and the transcriber output are removed once the request
//! is done.
//!
//! - **saver**: writes an upload under a unique name
//! - **cleanup**: request-scoped guard that deletes tracked files on drop

pub mod cleanup;
pub mod saver;

pub use cleanup::TempFiles;
pub use saver::{FileSaver, TempSaver};
