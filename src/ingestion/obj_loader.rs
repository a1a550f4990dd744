use std::path::Path;

use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::error::{MeshError, Result};
use crate::types::{LayerId, Material, MaterialId, MaterialLibrary, Mesh, StreamType};

/// Keep OBJ's independent position / normal / texcoord indices.
fn load_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        single_index: false,
        triangulate: true,
        ignore_points: true,
        ignore_lines: true,
        ..Default::default()
    }
}

/// Load an OBJ file (+ associated MTL) into a multi-index mesh.
///
/// Every OBJ object becomes a pass; objects carrying the same set of
/// attributes share a layer.
pub fn load_obj(
    path: &Path,
    name: &str,
    config: &PipelineConfig,
) -> Result<(Mesh, MaterialLibrary)> {
    let (models, materials_result) = tobj::load_obj(path, &load_options())
        .map_err(|e| MeshError::Input(format!("Failed to load OBJ: {e}")))?;

    debug!(model_count = models.len(), "Loaded OBJ models");

    let tobj_materials = match materials_result {
        Ok(mats) => mats,
        Err(e) => {
            warn!("Failed to load MTL: {e}");
            Vec::new()
        }
    };

    let mut library = convert_materials(&tobj_materials, config.normals.smoothing_angle);
    let mesh = build_mesh(name, models, &mut library, config)?;
    Ok((mesh, library))
}

/// Attribute streams of one layer while models are being merged into it.
#[derive(Debug, Default)]
struct LayerBuilder {
    has_normals: bool,
    has_uvs: bool,
    positions: Vec<f32>,
    normals: Vec<f32>,
    uvs: Vec<f32>,
    passes: Vec<PassIndices>,
}

#[derive(Debug)]
struct PassIndices {
    material: MaterialId,
    vertices: Vec<u32>,
    normals: Vec<u32>,
    uvs: Vec<u32>,
}

impl LayerBuilder {
    fn push(&mut self, mesh: tobj::Mesh, material: MaterialId) {
        let base_pos = (self.positions.len() / 3) as u32;
        let base_nrm = (self.normals.len() / 3) as u32;
        let base_uv = (self.uvs.len() / 2) as u32;

        // Indices fall back to the position indices when tobj leaves them empty.
        let rebase = |idx: &[u32], fallback: &[u32], base: u32| -> Vec<u32> {
            let src = if idx.is_empty() { fallback } else { idx };
            src.iter().map(|i| i + base).collect()
        };

        let pass = PassIndices {
            material,
            vertices: mesh.indices.iter().map(|i| i + base_pos).collect(),
            normals: if self.has_normals {
                rebase(&mesh.normal_indices, &mesh.indices, base_nrm)
            } else {
                Vec::new()
            },
            uvs: if self.has_uvs {
                rebase(&mesh.texcoord_indices, &mesh.indices, base_uv)
            } else {
                Vec::new()
            },
        };

        self.positions.extend_from_slice(&mesh.positions);
        self.normals.extend_from_slice(&mesh.normals);
        // UV V-flip: OBJ uses bottom-left origin, GPUs sample top-left
        self.uvs
            .extend(mesh.texcoords.chunks_exact(2).flat_map(|uv| [uv[0], 1.0 - uv[1]]));
        self.passes.push(pass);
    }

    fn commit(self, mesh: &mut Mesh) -> Result<()> {
        let layer: LayerId = mesh.add_layer();
        mesh.add_stream(layer, StreamType::Vertices, 3, self.positions)?;
        if self.has_normals {
            mesh.add_stream(layer, StreamType::Normals, 3, self.normals)?;
        }
        if self.has_uvs {
            mesh.add_stream(layer, StreamType::TexCoords, 2, self.uvs)?;
        }
        for pass in self.passes {
            let id = mesh.add_pass(layer, pass.material, pass.vertices.len() as u32)?;
            mesh.add_pass_indices(id, StreamType::Vertices, 0, pass.vertices)?;
            if self.has_normals {
                mesh.add_pass_indices(id, StreamType::Normals, 0, pass.normals)?;
            }
            if self.has_uvs {
                mesh.add_pass_indices(id, StreamType::TexCoords, 0, pass.uvs)?;
            }
        }
        Ok(())
    }
}

/// Group tobj models into layers by attribute signature and register them.
fn build_mesh(
    name: &str,
    models: Vec<tobj::Model>,
    library: &mut MaterialLibrary,
    config: &PipelineConfig,
) -> Result<Mesh> {
    let mut mesh = Mesh::new(name, config.mesh_flags).with_winding(config.normals.winding);
    let mut layers: Vec<LayerBuilder> = Vec::new();
    let mut fallback_material = None;

    for model in models {
        let m = model.mesh;
        if m.indices.is_empty() {
            warn!(model = %model.name, "Skipping OBJ object without faces");
            continue;
        }

        let material = match m.material_id {
            Some(id) if id < library.len() => MaterialId(id as u32),
            _ => *fallback_material.get_or_insert_with(|| {
                library.add(Material {
                    name: "default".into(),
                    smoothing_angle: config.normals.smoothing_angle,
                    ..Default::default()
                })
            }),
        };

        let has_normals = !m.normals.is_empty();
        let has_uvs = !m.texcoords.is_empty();
        let idx = match layers
            .iter()
            .position(|l| l.has_normals == has_normals && l.has_uvs == has_uvs)
        {
            Some(idx) => idx,
            None => {
                layers.push(LayerBuilder {
                    has_normals,
                    has_uvs,
                    ..Default::default()
                });
                layers.len() - 1
            }
        };
        layers[idx].push(m, material);
    }

    for layer in layers {
        layer.commit(&mut mesh)?;
    }
    Ok(mesh)
}

/// Convert tobj materials into our `MaterialLibrary`.
fn convert_materials(tobj_mats: &[tobj::Material], smoothing_angle: f32) -> MaterialLibrary {
    let mut lib = MaterialLibrary::default();

    for mat in tobj_mats {
        let mut material = Material {
            name: mat.name.clone(),
            smoothing_angle,
            ..Default::default()
        };

        // Kd -> base_color
        if let Some(diffuse) = mat.diffuse {
            material.base_color = [
                diffuse[0],
                diffuse[1],
                diffuse[2],
                mat.dissolve.unwrap_or(1.0),
            ];
        }

        lib.add(material);
    }

    lib
}
