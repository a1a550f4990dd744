use std::borrow::Cow;
use std::collections::BTreeMap;

use gltf::binary::Glb;
use gltf_json::Index;
use gltf_json::accessor::{ComponentType, GenericComponentType, Type as AccessorType};
use gltf_json::buffer::Target;
use gltf_json::mesh::{Mode, Primitive, Semantic};
use gltf_json::validation::{Checked, USize64};

use crate::assembly::{GpuBlob, IndexWidth, StreamSlot};
use crate::error::{MeshError, Result};
use crate::types::{MaterialId, MaterialLibrary, Mesh, StreamType};

/// glTF caps `byteStride` at 252.
const MAX_BYTE_STRIDE: u32 = 252;

/// Serialize an assembled mesh into a binary GLB (glTF 2.0) byte buffer.
///
/// The blob is written unchanged:
/// - 1 buffer view over the interleaved vertices (with `byteStride`)
/// - 1 buffer view over the index array
/// - 1 glTF mesh per layer, 1 primitive per pass, each primitive's index
///   accessor addressing the pass's draw range
/// - spherical-harmonic slots as custom `_SH3` / `_SH4` attributes
///
/// Materials are looked up in `materials` when given; otherwise each distinct
/// material gets a default white entry.
///
/// The blob is held in host byte order. glTF binary data is little-endian, so
/// on big-endian hosts every float and index is byte-swapped on the way out.
pub fn write_glb(mesh: &Mesh, materials: Option<&MaterialLibrary>) -> Result<Vec<u8>> {
    let blob = mesh
        .blob()
        .ok_or_else(|| MeshError::Output(format!("mesh '{}' is not assembled", mesh.name())))?;
    if blob.is_empty() {
        return write_empty_glb();
    }
    if blob.layout.stride > MAX_BYTE_STRIDE {
        return Err(MeshError::Output(format!(
            "vertex stride {} exceeds the glTF limit of {MAX_BYTE_STRIDE}",
            blob.layout.stride
        )));
    }

    let mut root = gltf_json::Root {
        asset: gltf_json::Asset {
            version: "2.0".into(),
            generator: Some("meshweld".into()),
            ..Default::default()
        },
        ..Default::default()
    };

    let mut bin_data: Vec<u8> = Vec::with_capacity(blob.len() + 4);
    let buffer_idx = Index::new(0); // pushed last

    // --- Interleaved vertices ---
    extend_le(&mut bin_data, blob.vertex_bytes(), size_of::<f32>());
    let vertex_view = root.push(gltf_json::buffer::View {
        buffer: buffer_idx,
        byte_length: USize64::from(blob.vertex_bytes().len()),
        byte_offset: Some(USize64(0)),
        byte_stride: Some(gltf_json::buffer::Stride(blob.layout.stride as usize)),
        name: None,
        target: Some(Checked::Valid(Target::ArrayBuffer)),
        extensions: Default::default(),
        extras: Default::default(),
    });

    let mut attributes = BTreeMap::new();
    for slot in &blob.layout.slots {
        let (min, max) = if (slot.stream, slot.set_id) == (StreamType::Vertices, 0) {
            let (min, max) = position_bounds(blob, slot);
            (Some(serde_json::json!(min)), Some(serde_json::json!(max)))
        } else {
            (None, None)
        };
        let accessor = root.push(gltf_json::Accessor {
            buffer_view: Some(vertex_view),
            byte_offset: Some(USize64::from(slot.offset as usize)),
            count: USize64::from(blob.unique_vertex_count as usize),
            component_type: Checked::Valid(GenericComponentType(ComponentType::F32)),
            type_: Checked::Valid(accessor_type(slot.components)),
            min,
            max,
            name: None,
            normalized: false,
            sparse: None,
            extensions: Default::default(),
            extras: Default::default(),
        });
        attributes.insert(Checked::Valid(semantic(slot)), accessor);
    }

    // --- Index array ---
    while bin_data.len() % 4 != 0 {
        bin_data.push(0);
    }
    let index_base = bin_data.len();
    extend_le(&mut bin_data, blob.index_bytes(), blob.index_width.bytes());
    let index_view = root.push(gltf_json::buffer::View {
        buffer: buffer_idx,
        byte_length: USize64::from(blob.index_bytes().len()),
        byte_offset: Some(USize64::from(index_base)),
        byte_stride: None,
        name: None,
        target: Some(Checked::Valid(Target::ElementArrayBuffer)),
        extensions: Default::default(),
        extras: Default::default(),
    });
    let index_component = match blob.index_width {
        IndexWidth::U8 => ComponentType::U8,
        IndexWidth::U16 => ComponentType::U16,
        IndexWidth::U32 => ComponentType::U32,
    };

    // --- Materials ---
    let mut material_indices = BTreeMap::new();
    for &id in mesh.materials() {
        let idx = build_material(&mut root, id, materials);
        material_indices.insert(id, idx);
    }

    // --- Meshes: one per layer, one primitive per pass ---
    let mut nodes = Vec::new();
    for (li, layer) in mesh.layers().iter().enumerate() {
        let mut primitives = Vec::new();
        for pass in layer.passes() {
            let Some(range) = pass.draw_range() else {
                continue;
            };
            if range.n_elements == 0 {
                continue;
            }
            let indices = root.push(gltf_json::Accessor {
                buffer_view: Some(index_view),
                byte_offset: Some(USize64::from(range.index_byte_offset as usize)),
                count: USize64::from(range.n_elements as usize),
                component_type: Checked::Valid(GenericComponentType(index_component)),
                type_: Checked::Valid(AccessorType::Scalar),
                min: Some(serde_json::json!([range.min_index])),
                max: Some(serde_json::json!([range.max_index])),
                name: None,
                normalized: false,
                sparse: None,
                extensions: Default::default(),
                extras: Default::default(),
            });
            primitives.push(Primitive {
                attributes: attributes.clone(),
                indices: Some(indices),
                material: material_indices.get(&pass.material).copied(),
                mode: Checked::Valid(Mode::Triangles),
                targets: None,
                extensions: Default::default(),
                extras: Default::default(),
            });
        }
        if primitives.is_empty() {
            continue;
        }

        let mesh_idx = root.push(gltf_json::Mesh {
            primitives,
            weights: None,
            name: Some(format!("{}.layer{li}", mesh.name())),
            extensions: Default::default(),
            extras: Default::default(),
        });
        nodes.push(root.push(gltf_json::Node {
            mesh: Some(mesh_idx),
            ..Default::default()
        }));
    }

    let scene_idx = root.push(gltf_json::Scene {
        nodes,
        name: Some(mesh.name().to_string()),
        extensions: Default::default(),
        extras: Default::default(),
    });
    root.scene = Some(scene_idx);

    // --- Buffer ---
    while bin_data.len() % 4 != 0 {
        bin_data.push(0);
    }
    root.push(gltf_json::Buffer {
        byte_length: USize64::from(bin_data.len()),
        uri: None,
        name: None,
        extensions: Default::default(),
        extras: Default::default(),
    });

    finish_glb(&root, Some(bin_data))
}

/// Append host-order `word`-sized values as little-endian.
fn extend_le(out: &mut Vec<u8>, bytes: &[u8], word: usize) {
    if cfg!(target_endian = "little") {
        out.extend_from_slice(bytes);
    } else {
        swap_words(out, bytes, word);
    }
}

fn swap_words(out: &mut Vec<u8>, bytes: &[u8], word: usize) {
    for chunk in bytes.chunks_exact(word) {
        out.extend(chunk.iter().rev());
    }
}

fn semantic(slot: &StreamSlot) -> Semantic {
    match (slot.stream, slot.set_id) {
        (StreamType::Vertices, 0) => Semantic::Positions,
        (StreamType::Normals, 0) => Semantic::Normals,
        (StreamType::TexCoords, set) => Semantic::TexCoords(set),
        (StreamType::Sh3Bands, 0) => Semantic::Extras("SH3".into()),
        (StreamType::Sh4Bands, 0) => Semantic::Extras("SH4".into()),
        (stream, set) => Semantic::Extras(format!("{stream}_{set}")),
    }
}

fn accessor_type(components: u32) -> AccessorType {
    match components {
        1 => AccessorType::Scalar,
        2 => AccessorType::Vec2,
        3 => AccessorType::Vec3,
        _ => AccessorType::Vec4,
    }
}

/// Min/max of the position slot over every unique vertex.
fn position_bounds(blob: &GpuBlob, slot: &StreamSlot) -> ([f32; 3], [f32; 3]) {
    let mut min = [f32::INFINITY; 3];
    let mut max = [f32::NEG_INFINITY; 3];

    for v in 0..blob.unique_vertex_count {
        if let Some(p) = blob.read_slot(v, slot) {
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
        }
    }

    (min, max)
}

fn build_material(
    root: &mut gltf_json::Root,
    id: MaterialId,
    materials: Option<&MaterialLibrary>,
) -> Index<gltf_json::Material> {
    let mat = materials.and_then(|lib| lib.get(id));
    let base_color = mat.map_or([1.0, 1.0, 1.0, 1.0], |m| m.base_color);
    let name = mat
        .map(|m| m.name.clone())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("material{}", id.0));

    root.push(gltf_json::Material {
        pbr_metallic_roughness: gltf_json::material::PbrMetallicRoughness {
            base_color_factor: gltf_json::material::PbrBaseColorFactor(base_color),
            ..Default::default()
        },
        name: Some(name),
        ..Default::default()
    })
}

/// Produce a minimal valid empty GLB.
fn write_empty_glb() -> Result<Vec<u8>> {
    let mut root = gltf_json::Root {
        asset: gltf_json::Asset {
            version: "2.0".into(),
            generator: Some("meshweld".into()),
            ..Default::default()
        },
        ..Default::default()
    };

    let node_idx = root.push(gltf_json::Node::default());
    let scene_idx = root.push(gltf_json::Scene {
        nodes: vec![node_idx],
        name: None,
        extensions: Default::default(),
        extras: Default::default(),
    });
    root.scene = Some(scene_idx);

    finish_glb(&root, None)
}

fn finish_glb(root: &gltf_json::Root, bin_data: Option<Vec<u8>>) -> Result<Vec<u8>> {
    let json_string = gltf_json::serialize::to_string(root)
        .map_err(|e| MeshError::Output(format!("glTF JSON serialization: {e}")))?;
    let mut json_bytes = json_string.into_bytes();
    // Pad JSON to 4-byte alignment with spaces
    while json_bytes.len() % 4 != 0 {
        json_bytes.push(b' ');
    }

    let bin_len = bin_data.as_ref().map_or(0, |b| 8 + b.len());
    let glb = Glb {
        header: gltf::binary::Header {
            magic: *b"glTF",
            version: 2,
            length: (12 + 8 + json_bytes.len() + bin_len) as u32,
        },
        json: Cow::Owned(json_bytes),
        bin: bin_data.map(Cow::Owned),
    };

    glb.to_vec()
        .map_err(|e| MeshError::Output(format!("GLB serialization: {e}")))
}
