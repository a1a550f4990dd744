pub mod blob_file;
pub mod glb_writer;

pub use blob_file::{BlobRecord, load, read_record, save, write_mesh, write_record};
pub use glb_writer::write_glb;
