//! End-to-end integration tests.
//!
//! These tests build meshes through the public API (or synthetic input
//! files), assemble them and validate the resulting buffers and outputs.

use std::collections::HashMap;
use std::f32::consts::PI;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use approx::assert_abs_diff_eq;
use glam::Vec3;

use meshweld::assembly::{self, IndexWidth, face_normal};
use meshweld::config::{OutputConfig, PipelineConfig};
use meshweld::export::{self, BlobRecord};
use meshweld::types::{
    LayerId, Material, MaterialId, MaterialLibrary, Mesh, MeshFlags, PassId, StreamType, Winding,
};
use meshweld::Pipeline;

const KEEP_RAW: MeshFlags = MeshFlags {
    keep_raw_streams: true,
    support_kd_tree_generation: false,
};

fn grid_positions(n: usize) -> Vec<f32> {
    (0..n).flat_map(|i| [i as f32, (i % 7) as f32, 0.0]).collect()
}

/// One layer, one pass reading an implicit VERTICES stream of `elements` items.
fn implicit_mesh(elements: u32) -> Mesh {
    let mut mesh = Mesh::new("implicit", MeshFlags::default());
    let layer = mesh.add_layer();
    mesh.add_stream(layer, StreamType::Vertices, 3, grid_positions(elements as usize))
        .unwrap();
    mesh.add_pass(layer, MaterialId(0), elements).unwrap();
    mesh
}

fn quad_mesh(flags: MeshFlags) -> (Mesh, PassId) {
    let mut mesh = Mesh::new("quad", flags);
    let layer = mesh.add_layer();
    mesh.add_stream(
        layer,
        StreamType::Vertices,
        3,
        vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
    )
    .unwrap();
    let pass = mesh.add_pass(layer, MaterialId(0), 6).unwrap();
    mesh.add_pass_indices(pass, StreamType::Vertices, 0, vec![0, 1, 2, 0, 2, 3])
        .unwrap();
    (mesh, pass)
}

#[test]
fn shared_edge_quad_welds_to_four_vertices() {
    let (mut mesh, _) = quad_mesh(MeshFlags::default());
    let blob = mesh.assemble().unwrap();

    assert_eq!(blob.unique_vertex_count, 4);
    assert_eq!(blob.total_elements, 6);
    assert_eq!(blob.index_width, IndexWidth::U8);
    assert_eq!(blob.indices(), vec![0, 1, 2, 0, 2, 3]);
    assert_eq!(blob.len(), 4 * 12 + 6);
    assert_eq!(blob.attribute(2, StreamType::Vertices, 0).unwrap(), vec![1.0, 1.0, 0.0]);
}

#[test]
fn unique_count_is_invariant_under_pass_order() {
    let build = |order: &[(u32, [u32; 3])]| {
        let mut mesh = Mesh::new("perm", MeshFlags::default());
        let layer = mesh.add_layer();
        mesh.add_stream(layer, StreamType::Vertices, 3, grid_positions(5)).unwrap();
        mesh.add_stream(layer, StreamType::TexCoords, 2, vec![0.5; 10]).unwrap();
        for (material, tri) in order {
            let pass = mesh.add_pass(layer, MaterialId(*material), 3).unwrap();
            mesh.add_pass_indices(pass, StreamType::Vertices, 0, tri.to_vec()).unwrap();
            mesh.add_pass_indices(pass, StreamType::TexCoords, 0, tri.to_vec()).unwrap();
        }
        mesh.assemble().unwrap().unique_vertex_count
    };

    let passes = [(0, [0, 1, 2]), (0, [2, 1, 3]), (1, [2, 3, 4])];
    let forward = build(&passes);
    let reversed: Vec<_> = passes.iter().rev().copied().collect();
    let rotated = [passes[1], passes[2], passes[0]];

    // Index sets are registered per pass, so their unique set ids differ and
    // nothing welds across passes.
    assert_eq!(forward, 9);
    assert_eq!(build(&reversed), forward);
    assert_eq!(build(&rotated), forward);
}

#[test]
fn implicit_channels_weld_across_passes() {
    let build = |swap: bool| {
        let mut mesh = Mesh::new("shared", MeshFlags::default());
        let layer = mesh.add_layer();
        mesh.add_stream(layer, StreamType::Vertices, 3, grid_positions(3)).unwrap();
        let mut materials = [MaterialId(0), MaterialId(1)];
        if swap {
            materials.reverse();
        }
        for material in materials {
            mesh.add_pass(layer, material, 3).unwrap();
        }
        mesh.add_pass(layer, MaterialId(0), 3).unwrap();
        mesh.assemble().unwrap().unique_vertex_count
    };

    // Passes share the implicit VERTICES channel; only the material splits keys.
    assert_eq!(build(false), 6);
    assert_eq!(build(true), 6);
}

#[test]
fn assembly_is_idempotent() {
    let (mesh, _) = quad_mesh(KEEP_RAW);
    let first = assembly::assemble(mesh.layers()).unwrap();
    let second = assembly::assemble(mesh.layers()).unwrap();
    assert_eq!(first.blob.data, second.blob.data);
    assert_eq!(first.draw_ranges, second.draw_ranges);
}

#[test]
fn index_width_boundaries() {
    assert_eq!(IndexWidth::for_vertex_count(255), IndexWidth::U8);
    assert_eq!(IndexWidth::for_vertex_count(256), IndexWidth::U16);
    assert_eq!(IndexWidth::for_vertex_count(65_535), IndexWidth::U16);
    assert_eq!(IndexWidth::for_vertex_count(65_536), IndexWidth::U32);

    for (elements, width) in [
        (255, IndexWidth::U8),
        (258, IndexWidth::U16),
        (65_535, IndexWidth::U16),
        (65_538, IndexWidth::U32),
    ] {
        let blob = implicit_mesh(elements).assemble().unwrap();
        assert_eq!(blob.unique_vertex_count, elements);
        assert_eq!(blob.index_width, width, "{elements} vertices");
        assert_eq!(blob.index(elements as usize - 1), Some(elements - 1));
    }
}

/// Unit cube, 8 corners, 12 outward-facing CCW triangles.
fn cube_mesh() -> (Mesh, LayerId) {
    let positions: Vec<f32> = (0..8)
        .flat_map(|i| [(i & 1) as f32, ((i >> 1) & 1) as f32, ((i >> 2) & 1) as f32])
        .collect();
    let faces: [[u32; 4]; 6] = [
        [0, 2, 3, 1],
        [4, 5, 7, 6],
        [0, 1, 5, 4],
        [2, 6, 7, 3],
        [0, 4, 6, 2],
        [1, 3, 7, 5],
    ];
    let indices: Vec<u32> = faces
        .iter()
        .flat_map(|[a, b, c, d]| [*a, *b, *c, *a, *c, *d])
        .collect();

    let mut mesh = Mesh::new("cube", KEEP_RAW);
    let layer = mesh.add_layer();
    mesh.add_stream(layer, StreamType::Vertices, 3, positions).unwrap();
    let pass = mesh.add_pass(layer, MaterialId(0), 36).unwrap();
    mesh.add_pass_indices(pass, StreamType::Vertices, 0, indices).unwrap();
    (mesh, layer)
}

fn corner(mesh: &Mesh, layer: LayerId, element: u32) -> Vec3 {
    let positions = mesh.layer(layer).unwrap().stream(StreamType::Vertices).unwrap();
    let pass = &mesh.layer(layer).unwrap().passes()[0];
    Vec3::from_slice(positions.item(pass.vertex_index(element)).unwrap())
}

fn generated_normal(mesh: &Mesh, layer: LayerId, element: u32) -> Vec3 {
    let normals = mesh.layer(layer).unwrap().stream(StreamType::Normals).unwrap();
    Vec3::from_slice(normals.item(element).unwrap())
}

#[test]
fn flat_cube_keeps_face_normals() {
    let (mut mesh, layer) = cube_mesh();
    assert_eq!(mesh.generate_normals(&0.0f32).unwrap(), 1);

    for element in 0..36 {
        let tri = element - element % 3;
        let face = face_normal(
            corner(&mesh, layer, tri),
            corner(&mesh, layer, tri + 1),
            corner(&mesh, layer, tri + 2),
            Winding::CounterClockwise,
        );
        let normal = generated_normal(&mesh, layer, element);
        assert_abs_diff_eq!(normal.x, face.x, epsilon = 1e-6);
        assert_abs_diff_eq!(normal.y, face.y, epsilon = 1e-6);
        assert_abs_diff_eq!(normal.z, face.z, epsilon = 1e-6);
        assert_abs_diff_eq!(face.abs().max_element(), 1.0, epsilon = 1e-6);
    }
}

#[test]
fn smooth_cube_averages_corner_normals() {
    let (mut mesh, layer) = cube_mesh();
    mesh.generate_normals(&PI).unwrap();

    for element in 0..36 {
        let normal = generated_normal(&mesh, layer, element);
        assert_abs_diff_eq!(normal.length(), 1.0, epsilon = 1e-5);
        // Every corner touches three faces, so no component vanishes.
        assert!(
            normal.abs().min_element() > 0.1,
            "element {element} normal {normal} is face-aligned"
        );
        // And the normal points away from the cube centre.
        let outward = corner(&mesh, layer, element) - Vec3::splat(0.5);
        assert!(normal.dot(outward) > 0.0);
    }
}

#[test]
fn smoothing_change_regenerates_only_normals() {
    let mut mesh = Mesh::new("fold", MeshFlags::default());
    let layer = mesh.add_layer();
    mesh.add_stream(
        layer,
        StreamType::Vertices,
        3,
        vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 1.0],
    )
    .unwrap();
    mesh.add_stream(
        layer,
        StreamType::TexCoords,
        2,
        vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0],
    )
    .unwrap();
    let indices = vec![0, 1, 2, 1, 3, 2];
    let pass = mesh.add_pass(layer, MaterialId(0), 6).unwrap();
    mesh.add_pass_indices(pass, StreamType::Vertices, 0, indices.clone()).unwrap();
    mesh.add_pass_indices(pass, StreamType::TexCoords, 0, indices).unwrap();

    let mut materials = MaterialLibrary::default();
    let id = materials.add(Material {
        name: "fold".into(),
        smoothing_angle: 0.5,
        ..Default::default()
    });

    mesh.generate_normals(&materials).unwrap();
    let before = mesh.assemble().unwrap();
    let layer_before = mesh.layers()[0].clone();
    let crease_before = generated_normal(&mesh, LayerId(0), 1);
    assert_abs_diff_eq!(crease_before.z, 1.0, epsilon = 1e-6);

    // The fold is about 55 degrees: 0.5 rad keeps it sharp, 1.0 rad smooths it.
    assert!(materials.set_smoothing_angle(id, 1.0));
    assert!(mesh.refresh_normals(&materials).unwrap());

    let after = mesh.blob().unwrap();
    assert!(!Arc::ptr_eq(&before, after));
    assert_eq!(after.unique_vertex_count, before.unique_vertex_count);

    let layer_after = &mesh.layers()[0];
    for stream in [StreamType::Vertices, StreamType::TexCoords] {
        assert_eq!(layer_after.stream(stream), layer_before.stream(stream));
        assert_eq!(
            layer_after.passes()[0].index_sets(stream),
            layer_before.passes()[0].index_sets(stream)
        );
    }
    let crease_after = generated_normal(&mesh, LayerId(0), 1);
    assert!(crease_after.z < 0.99);

    // A second refresh with the same angles is a no-op.
    assert!(!mesh.refresh_normals(&materials).unwrap());
}

#[test]
fn sh_streams_are_aligned() {
    for (stream, components, align) in [(StreamType::Sh3Bands, 3, 12), (StreamType::Sh4Bands, 4, 16)] {
        let mut mesh = Mesh::new("sh", MeshFlags::default());
        let layer = mesh.add_layer();
        mesh.add_stream(layer, StreamType::Vertices, 3, grid_positions(3)).unwrap();
        mesh.add_stream(layer, StreamType::TexCoords, 2, vec![0.25; 6]).unwrap();
        mesh.add_stream(layer, stream, components, vec![0.75; 3 * components as usize])
            .unwrap();
        mesh.add_pass(layer, MaterialId(0), 3).unwrap();

        let blob = mesh.assemble().unwrap();
        let slot = blob.layout.slot(stream, 0).unwrap();
        assert_eq!(slot.offset % align, 0, "{stream}");
        assert!(slot.offset >= 20);
        assert_eq!(blob.layout.stride, slot.offset + 4 * components);
        assert_eq!(mesh.sh_bands(), stream.sh_bands().unwrap());
        assert_eq!(
            blob.attribute(1, stream, 0).unwrap(),
            vec![0.75; components as usize]
        );
    }
}

/// Write a two-object OBJ with an MTL to `dir`.
fn write_two_object_obj(dir: &Path) {
    let mtl = "\
newmtl red
Kd 1 0 0

newmtl blue
Kd 0 0 1
";
    fs::write(dir.join("scene.mtl"), mtl).unwrap();

    let obj = "\
mtllib scene.mtl
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
v 2 0 0
v 2 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
o left
usemtl red
f 1/1 2/2 3/3
f 1/1 3/3 4/4
o right
usemtl blue
f 2/1 5/2 6/3
f 2/1 6/3 3/4
";
    fs::write(dir.join("scene.obj"), obj).unwrap();
}

#[test]
fn full_pipeline_obj_to_blob_and_glb() {
    let tmp = tempfile::tempdir().unwrap();
    let input_dir = tmp.path().join("input");
    let output_dir = tmp.path().join("output");
    fs::create_dir_all(&input_dir).unwrap();
    write_two_object_obj(&input_dir);

    let config = PipelineConfig {
        inputs: vec![input_dir.join("scene.obj")],
        output: output_dir.clone(),
        output_files: OutputConfig {
            glb: true,
            ..Default::default()
        },
        ..Default::default()
    };

    let result = Pipeline::run(&config).expect("pipeline should succeed");
    assert_eq!(result.meshes.len(), 1);
    let report = &result.meshes[0];
    assert_eq!(report.stats.layer_count, 1);
    assert_eq!(report.stats.pass_count, 2);
    assert_eq!(report.generated_normal_layers, 1);
    assert_eq!(report.total_elements, 12);
    // Generated normals are element-aligned, so every corner is its own vertex.
    assert_eq!(report.unique_vertices, 12);

    // report.json
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(output_dir.join("report.json")).unwrap())
            .unwrap();
    assert_eq!(json["meshes"][0]["name"], "scene");
    assert_eq!(json["meshes"][0]["stats"]["input_format"], "OBJ");

    // .mwb reloads as a frozen mesh with the same blob
    let materials: HashMap<u32, MaterialId> = (0..2).map(|i| (i, MaterialId(i))).collect();
    let BlobRecord::Mesh(mut reloaded) =
        export::load(&output_dir.join("scene.mwb"), &materials).unwrap()
    else {
        panic!("expected a mesh record");
    };
    assert!(reloaded.is_frozen());
    assert!(!reloaded.has_raw_geometry());
    assert_eq!(reloaded.blob().unwrap().unique_vertex_count, 12);
    assert_eq!(reloaded.layers()[0].passes().len(), 2);
    assert!(reloaded.assemble().is_ok());

    // .glb has one primitive per pass
    let (doc, _, _) = gltf::import(output_dir.join("scene.glb")).unwrap();
    let primitives: usize = doc.meshes().map(|m| m.primitives().len()).sum();
    assert_eq!(primitives, 2);
    let names: Vec<_> = doc.materials().filter_map(|m| m.name().map(String::from)).collect();
    assert!(names.contains(&"red".to_string()));
    assert!(names.contains(&"blue".to_string()));
}

#[test]
fn exported_glb_reimports_with_same_topology() {
    let tmp = tempfile::tempdir().unwrap();
    let input_dir = tmp.path().join("input");
    fs::create_dir_all(&input_dir).unwrap();
    write_two_object_obj(&input_dir);

    let first = Pipeline::run(&PipelineConfig {
        inputs: vec![input_dir.join("scene.obj")],
        output: tmp.path().join("first"),
        output_files: OutputConfig {
            glb: true,
            blob: false,
            report: false,
        },
        ..Default::default()
    })
    .unwrap();

    let second = Pipeline::run(&PipelineConfig {
        inputs: vec![tmp.path().join("first").join("scene.glb")],
        output: tmp.path().join("second"),
        ..Default::default()
    })
    .unwrap();

    let (a, b) = (&first.meshes[0], &second.meshes[0]);
    assert_eq!(b.stats.input_format, "GLB");
    assert_eq!(b.stats.layer_count, 2);
    assert!(b.stats.has_normals);
    assert_eq!(b.generated_normal_layers, 0);
    assert_eq!(b.total_elements, a.total_elements);
    assert_eq!(b.unique_vertices, a.unique_vertices);
}

#[test]
fn pipeline_missing_input_returns_error() {
    let tmp = tempfile::tempdir().unwrap();
    let config = PipelineConfig {
        inputs: vec![tmp.path().join("nonexistent.obj")],
        output: tmp.path().join("output"),
        ..Default::default()
    };

    let err = Pipeline::run(&config);
    assert!(err.is_err(), "missing input should return error");
}
