pub mod bounds;
pub mod instance;
pub mod layer;
pub mod material;
pub mod mesh;
pub mod pass;
pub mod stream;

pub use bounds::BoundingBox;
pub use instance::{GeometrySource, MeshInstance};
pub use layer::{Layer, NormalState};
pub use material::{ANGLE_EPSILON, Material, MaterialId, MaterialLibrary, SmoothingAngles};
pub use mesh::{Mesh, MeshFlags, Winding};
pub use pass::{DrawRange, IndexSet, LayerId, Pass, PassId};
pub use stream::{DataStream, StreamType};
