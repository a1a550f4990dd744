/// Identity of a material; also the trailing word of every composite vertex key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MaterialId(pub u32);

/// Smoothing-angle changes at or below this magnitude are ignored.
pub const ANGLE_EPSILON: f32 = 1e-5;

/// The one material property the geometry pipeline consults.
pub trait SmoothingAngles {
    /// Smoothing angle in radians; 0 disables averaging.
    fn smoothing_angle(&self, material: MaterialId) -> f32;
}

/// Surface description referenced by passes.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    /// Base color factor [r, g, b, a].
    pub base_color: [f32; 4],
    /// Normal smoothing threshold in radians.
    pub smoothing_angle: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            base_color: [1.0, 1.0, 1.0, 1.0],
            smoothing_angle: 0.0,
        }
    }
}

/// Collection of materials addressed by `MaterialId` (the vector index).
#[derive(Debug, Clone, Default)]
pub struct MaterialLibrary {
    pub materials: Vec<Material>,
}

impl MaterialLibrary {
    pub fn add(&mut self, material: Material) -> MaterialId {
        self.materials.push(material);
        MaterialId(self.materials.len() as u32 - 1)
    }

    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Update a smoothing angle. Returns `true` when the change exceeds
    /// `ANGLE_EPSILON`, i.e. when dependent normals went stale.
    pub fn set_smoothing_angle(&mut self, id: MaterialId, angle: f32) -> bool {
        match self.materials.get_mut(id.0 as usize) {
            Some(mat) => {
                let changed = (mat.smoothing_angle - angle).abs() > ANGLE_EPSILON;
                mat.smoothing_angle = angle;
                changed
            }
            None => false,
        }
    }
}

impl SmoothingAngles for MaterialLibrary {
    fn smoothing_angle(&self, material: MaterialId) -> f32 {
        self.get(material).map_or(0.0, |m| m.smoothing_angle)
    }
}

/// A single angle for every material.
impl SmoothingAngles for f32 {
    fn smoothing_angle(&self, _material: MaterialId) -> f32 {
        *self
    }
}
