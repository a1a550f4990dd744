use std::sync::Arc;

use super::bounds::BoundingBox;
use super::layer::Layer;
use super::material::MaterialId;
use super::mesh::{Mesh, Winding};
use crate::assembly::assembler::GpuBlob;

/// Where an instance's geometry lives.
#[derive(Debug, Clone)]
pub enum GeometrySource {
    /// The instance owns its mesh.
    Owned(Mesh),
    /// The instance draws a parent's geometry.
    Shared(Arc<MeshInstance>),
}

/// A named mesh that either owns geometry or delegates to a parent.
#[derive(Debug, Clone)]
pub struct MeshInstance {
    name: String,
    source: GeometrySource,
}

impl MeshInstance {
    pub fn owned(mesh: Mesh) -> Self {
        Self {
            name: mesh.name().to_string(),
            source: GeometrySource::Owned(mesh),
        }
    }

    pub fn instance_of(name: impl Into<String>, parent: Arc<MeshInstance>) -> Self {
        Self {
            name: name.into(),
            source: GeometrySource::Shared(parent),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &GeometrySource {
        &self.source
    }

    pub fn is_instance(&self) -> bool {
        matches!(self.source, GeometrySource::Shared(_))
    }

    /// Immediate parent, if this is an instance.
    pub fn parent(&self) -> Option<&Arc<MeshInstance>> {
        match &self.source {
            GeometrySource::Shared(parent) => Some(parent),
            GeometrySource::Owned(_) => None,
        }
    }

    /// Follow the parent chain to the mesh that owns the geometry.
    pub fn resolve(&self) -> &Mesh {
        let mut current = self;
        loop {
            match &current.source {
                GeometrySource::Owned(mesh) => return mesh,
                GeometrySource::Shared(parent) => current = parent,
            }
        }
    }

    /// Mutable access to owned geometry; `None` for instances.
    pub fn mesh_mut(&mut self) -> Option<&mut Mesh> {
        match &mut self.source {
            GeometrySource::Owned(mesh) => Some(mesh),
            GeometrySource::Shared(_) => None,
        }
    }

    // Typed accessors, all resolved through the parent chain.

    pub fn bounds(&self) -> BoundingBox {
        self.resolve().bounds()
    }

    pub fn layers(&self) -> &[Layer] {
        self.resolve().layers()
    }

    pub fn materials(&self) -> &[MaterialId] {
        self.resolve().materials()
    }

    pub fn sh_bands(&self) -> u8 {
        self.resolve().sh_bands()
    }

    pub fn winding(&self) -> Winding {
        self.resolve().winding()
    }

    pub fn blob(&self) -> Option<&Arc<GpuBlob>> {
        self.resolve().blob()
    }
}
