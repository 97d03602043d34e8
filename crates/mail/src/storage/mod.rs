//! Local storage for downloaded attachments
//!
//! The sink trait keeps the processing task independent of where bytes end
//! up; the filename schema turns an email and a part into a file name.

mod file;
mod filename;
mod memory;
mod sink;

pub use file::FileAttachmentSink;
pub use filename::{DEFAULT_FILENAME_SCHEMA, FilenameSchema};
pub use memory::InMemoryAttachmentSink;
pub use sink::{AttachmentSink, avoid_collision};
