use criterion::{Criterion, criterion_group, criterion_main};
use meshweld::assembly::generate_layer_normals;
use meshweld::types::{MaterialId, Mesh, MeshFlags, StreamType, Winding};

/// `n x n` height field with a ridge, so smoothing has creases to respect.
fn make_terrain(n: usize) -> Mesh {
    let verts_per_side = n + 1;
    let mut positions = Vec::with_capacity(verts_per_side * verts_per_side * 3);
    for y in 0..verts_per_side {
        for x in 0..verts_per_side {
            let fx = x as f32 / n as f32;
            let fy = y as f32 / n as f32;
            let height = 0.5 - (fx - 0.5).abs();
            positions.extend_from_slice(&[fx, fy, height]);
        }
    }

    let mut indices = Vec::with_capacity(n * n * 6);
    for y in 0..n {
        for x in 0..n {
            let tl = (y * verts_per_side + x) as u32;
            let tr = tl + 1;
            let bl = tl + verts_per_side as u32;
            let br = bl + 1;
            indices.extend_from_slice(&[tl, tr, bl, tr, br, bl]);
        }
    }

    let mut mesh = Mesh::new("terrain", MeshFlags::default());
    let layer = mesh.add_layer();
    mesh.add_stream(layer, StreamType::Vertices, 3, positions).unwrap();
    let pass = mesh.add_pass(layer, MaterialId(0), indices.len() as u32).unwrap();
    mesh.add_pass_indices(pass, StreamType::Vertices, 0, indices).unwrap();
    mesh
}

fn bench_normals(c: &mut Criterion) {
    let mesh = make_terrain(128);
    let layer = &mesh.layers()[0];

    c.bench_function("normals_flat_32k", |b| {
        b.iter(|| generate_layer_normals(layer, Winding::CounterClockwise, &0.0f32).unwrap());
    });

    c.bench_function("normals_smooth_60deg_32k", |b| {
        b.iter(|| {
            generate_layer_normals(layer, Winding::CounterClockwise, &60f32.to_radians()).unwrap()
        });
    });
}

criterion_group!(benches, bench_normals);
criterion_main!(benches);
