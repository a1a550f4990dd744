pub mod assembler;
pub mod dedup;
pub mod key;
pub mod layout;
pub mod normals;

pub use assembler::{Assembly, GpuBlob, assemble};
pub use dedup::{DedupIndex, VertexKey};
pub use key::{Channel, KeySchema};
pub use layout::{IndexWidth, StreamSlot, VertexLayout};
pub use normals::{GeneratedNormals, POSITION_EPSILON, face_normal, generate_layer_normals};
