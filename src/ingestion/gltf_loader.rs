use std::path::Path;

use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::error::{MeshError, Result};
use crate::types::{Material, MaterialId, MaterialLibrary, Mesh, StreamType};

/// Load a glTF or GLB file into a multi-index mesh.
///
/// Every triangle primitive becomes a layer with a single pass. glTF is
/// already single-indexed, so every stream shares the primitive's index list;
/// additional UV channels are appended to the layer's TEXCOORDS stream and
/// addressed through their own index set.
pub fn load_gltf(
    path: &Path,
    name: &str,
    config: &PipelineConfig,
) -> Result<(Mesh, MaterialLibrary)> {
    let (document, buffers, _images) = gltf::import(path)
        .map_err(|e| MeshError::Input(format!("Failed to load glTF: {e}")))?;

    debug!(
        meshes = document.meshes().len(),
        materials = document.materials().len(),
        "Loaded glTF document"
    );

    let mut library = MaterialLibrary::default();
    for material in document.materials() {
        library.add(convert_gltf_material(&material, config.normals.smoothing_angle));
    }

    let mut mesh = Mesh::new(name, config.mesh_flags).with_winding(config.normals.winding);
    let mut fallback_material = None;

    for gltf_mesh in document.meshes() {
        for primitive in gltf_mesh.primitives() {
            let geometry = match extract_primitive(&primitive, &buffers) {
                Ok(geometry) => geometry,
                Err(e) => {
                    warn!(mesh = ?gltf_mesh.name(), "Skipping primitive: {e}");
                    continue;
                }
            };
            let material = match primitive.material().index() {
                Some(idx) => MaterialId(idx as u32),
                None => *fallback_material.get_or_insert_with(|| {
                    library.add(Material {
                        name: "default".into(),
                        smoothing_angle: config.normals.smoothing_angle,
                        ..Default::default()
                    })
                }),
            };
            add_primitive(&mut mesh, geometry, material)?;
        }
    }

    Ok((mesh, library))
}

/// Geometry of a single glTF primitive.
#[derive(Debug, Default)]
struct PrimitiveGeometry {
    positions: Vec<f32>,
    normals: Vec<f32>,
    /// One entry per UV channel, 2 floats per vertex.
    uv_sets: Vec<Vec<f32>>,
    indices: Vec<u32>,
}

/// Extract geometry from a single glTF primitive.
fn extract_primitive(
    primitive: &gltf::Primitive<'_>,
    buffers: &[gltf::buffer::Data],
) -> Result<PrimitiveGeometry> {
    if primitive.mode() != gltf::mesh::Mode::Triangles {
        return Err(MeshError::Input(format!(
            "unsupported primitive mode {:?}",
            primitive.mode()
        )));
    }

    let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

    // Positions (required)
    let positions: Vec<f32> = reader
        .read_positions()
        .ok_or_else(|| MeshError::Input("Primitive missing positions".into()))?
        .flatten()
        .collect();

    // Normals (optional)
    let normals: Vec<f32> = reader
        .read_normals()
        .map(|iter| iter.flatten().collect())
        .unwrap_or_default();

    // UV channels (optional, no V-flip needed for glTF)
    let mut uv_sets = Vec::new();
    while let Some(uvs) = reader.read_tex_coords(uv_sets.len() as u32) {
        uv_sets.push(uvs.into_f32().flatten().collect::<Vec<f32>>());
    }

    // Non-indexed primitives draw their vertices in order.
    let indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..(positions.len() / 3) as u32).collect(),
    };

    Ok(PrimitiveGeometry {
        positions,
        normals,
        uv_sets,
        indices,
    })
}

/// Register one primitive as a layer with a single pass.
fn add_primitive(mesh: &mut Mesh, geometry: PrimitiveGeometry, material: MaterialId) -> Result<()> {
    let n_elements = geometry.indices.len() as u32;
    let vertex_count = (geometry.positions.len() / 3) as u32;
    let has_normals = !geometry.normals.is_empty();
    let uv_channels = geometry.uv_sets.len() as u32;

    let layer = mesh.add_layer();
    mesh.add_stream(layer, StreamType::Vertices, 3, geometry.positions)?;
    if has_normals {
        mesh.add_stream(layer, StreamType::Normals, 3, geometry.normals)?;
    }
    if uv_channels > 0 {
        let uvs: Vec<f32> = geometry.uv_sets.into_iter().flatten().collect();
        mesh.add_stream(layer, StreamType::TexCoords, 2, uvs)?;
    }

    let pass = mesh.add_pass(layer, material, n_elements)?;
    mesh.add_pass_indices(pass, StreamType::Vertices, 0, geometry.indices.clone())?;
    if has_normals {
        mesh.add_pass_indices(pass, StreamType::Normals, 0, geometry.indices.clone())?;
    }
    for set in 0..uv_channels {
        let base = set * vertex_count;
        let indices = geometry.indices.iter().map(|i| i + base).collect();
        mesh.add_pass_indices(pass, StreamType::TexCoords, set, indices)?;
    }
    Ok(())
}

/// Convert a glTF material to our material type.
fn convert_gltf_material(material: &gltf::Material<'_>, smoothing_angle: f32) -> Material {
    Material {
        name: material.name().unwrap_or("").to_string(),
        base_color: material.pbr_metallic_roughness().base_color_factor(),
        smoothing_angle,
    }
}
