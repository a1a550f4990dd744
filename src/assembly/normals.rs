//! Smoothing-angle vertex normal generation.
//!
//! Triangle corners are bucketed into a grid of `POSITION_EPSILON` cells. A
//! corner normal is its face normal plus every other face normal of the same
//! pass that touches a position within `POSITION_EPSILON` on each axis and
//! whose angle to it is within the material's smoothing angle.

use std::collections::HashMap;

use glam::Vec3;
use tracing::debug;

use crate::error::{MeshError, Result};
use crate::types::{Layer, SmoothingAngles, StreamType, Winding};

/// Per-axis tolerance for treating two positions as coincident.
pub const POSITION_EPSILON: f32 = 1e-5;

type CellKey = [i64; 3];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TriangleRef {
    pass: u32,
    triangle: u32,
}

fn cell_key(p: Vec3) -> CellKey {
    [
        (p.x / POSITION_EPSILON).floor() as i64,
        (p.y / POSITION_EPSILON).floor() as i64,
        (p.z / POSITION_EPSILON).floor() as i64,
    ]
}

/// Corner positions bucketed by grid cell.
#[derive(Debug, Default)]
struct CornerGrid {
    cells: HashMap<CellKey, Vec<(TriangleRef, Vec3)>>,
}

impl CornerGrid {
    fn insert(&mut self, tref: TriangleRef, p: Vec3) {
        self.cells.entry(cell_key(p)).or_default().push((tref, p));
    }

    /// Visit every stored corner within `POSITION_EPSILON` of `p` on each
    /// axis. A matching point can sit at most one cell away per axis.
    fn for_each_near(&self, p: Vec3, mut f: impl FnMut(TriangleRef)) {
        let [cx, cy, cz] = cell_key(p);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let Some(cell) = self.cells.get(&[cx + dx, cy + dy, cz + dz]) else {
                        continue;
                    };
                    for (tref, q) in cell {
                        if (*q - p).abs().max_element() <= POSITION_EPSILON {
                            f(*tref);
                        }
                    }
                }
            }
        }
    }

    fn len(&self) -> usize {
        self.cells.len()
    }
}

/// Normals generated for one layer, element-aligned and concatenated over passes.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedNormals {
    /// `3 * total elements` floats.
    pub data: Vec<f32>,
    /// `(first item, element count)` of each pass inside `data`.
    pub pass_ranges: Vec<(u32, u32)>,
    /// Smoothing angle used for each pass.
    pub angles: Vec<f32>,
}

impl GeneratedNormals {
    pub fn item_count(&self) -> u32 {
        (self.data.len() / 3) as u32
    }

    pub fn normal(&self, item: u32) -> Vec3 {
        Vec3::from_slice(&self.data[item as usize * 3..item as usize * 3 + 3])
    }
}

/// Generate normals for every pass of `layer`.
pub fn generate_layer_normals(
    layer: &Layer,
    winding: Winding,
    angles: &impl SmoothingAngles,
) -> Result<GeneratedNormals> {
    let positions = layer.stream(StreamType::Vertices).ok_or_else(|| {
        MeshError::Integrity("normal generation needs a VERTICES stream".into())
    })?;
    if positions.component_count < 3 {
        return Err(MeshError::Integrity(format!(
            "VERTICES stream has {} components",
            positions.component_count
        )));
    }

    // Resolve corner positions once.
    let mut corners: Vec<Vec<Vec3>> = Vec::with_capacity(layer.passes.len());
    for (pi, pass) in layer.passes.iter().enumerate() {
        let mut pts = Vec::with_capacity(pass.n_elements as usize);
        for element in 0..pass.n_elements {
            let source = pass.vertex_index(element);
            let item = positions.item(source).ok_or_else(|| {
                MeshError::Integrity(format!(
                    "VERTICES index {source} out of range on pass {pi}"
                ))
            })?;
            pts.push(Vec3::from_slice(&item[..3]));
        }
        corners.push(pts);
    }

    // Phase 1: adjacency.
    let mut grid = CornerGrid::default();
    for (pi, pts) in corners.iter().enumerate() {
        for (ti, tri) in pts.chunks_exact(3).enumerate() {
            let tref = TriangleRef {
                pass: pi as u32,
                triangle: ti as u32,
            };
            for p in tri {
                grid.insert(tref, *p);
            }
        }
    }

    // Phase 2: face normals.
    let faces: Vec<Vec<Vec3>> = corners
        .iter()
        .map(|pts| {
            pts.chunks_exact(3)
                .map(|t| face_normal(t[0], t[1], t[2], winding))
                .collect()
        })
        .collect();

    // Phase 3: per-corner smoothing.
    let total: usize = corners.iter().map(Vec::len).sum();
    let mut data = Vec::with_capacity(total * 3);
    let mut pass_ranges = Vec::with_capacity(corners.len());
    let mut pass_angles = Vec::with_capacity(corners.len());
    let mut neighbours: Vec<u32> = Vec::new();

    for (pi, (pass, pts)) in layer.passes.iter().zip(&corners).enumerate() {
        let angle = angles.smoothing_angle(pass.material);
        pass_ranges.push(((data.len() / 3) as u32, pass.n_elements));
        pass_angles.push(angle);

        for (element, p) in pts.iter().enumerate() {
            let ti = element / 3;
            let own = faces[pi][ti];
            let mut sum = own;

            if angle > 0.0 {
                neighbours.clear();
                grid.for_each_near(*p, |other| {
                    if other.pass as usize == pi
                        && other.triangle as usize != ti
                        && !neighbours.contains(&other.triangle)
                    {
                        neighbours.push(other.triangle);
                    }
                });
                for &other in &neighbours {
                    let n = faces[pi][other as usize];
                    if n.dot(own).clamp(-1.0, 1.0).acos() <= angle {
                        sum += n;
                    }
                }
            }

            data.extend_from_slice(&sum.normalize_or_zero().to_array());
        }
    }

    debug!(
        passes = layer.passes.len(),
        cells = grid.len(),
        normals = total,
        "Generated layer normals"
    );

    Ok(GeneratedNormals {
        data,
        pass_ranges,
        angles: pass_angles,
    })
}

/// Unit face normal; zero for degenerate triangles.
pub fn face_normal(v0: Vec3, v1: Vec3, v2: Vec3, winding: Winding) -> Vec3 {
    let n = (v1 - v0).cross(v2 - v0).normalize_or_zero();
    match winding {
        Winding::CounterClockwise => n,
        Winding::Clockwise => -n,
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::{FRAC_PI_2, PI};

    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::types::{MaterialId, Mesh, MeshFlags};

    /// Two triangles folded 90 degrees along the shared edge x = 0..1, y = 0.
    fn folded_pair() -> Mesh {
        let mut mesh = Mesh::new("fold", MeshFlags::default());
        let layer = mesh.add_layer();
        mesh.add_stream(
            layer,
            StreamType::Vertices,
            3,
            vec![
                0.0, 0.0, 0.0, //
                1.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, //
                0.0, 0.0, -1.0, //
            ],
        )
        .unwrap();
        let pass = mesh.add_pass(layer, MaterialId(0), 6).unwrap();
        mesh.add_pass_indices(pass, StreamType::Vertices, 0, vec![0, 1, 2, 0, 1, 3])
            .unwrap();
        mesh
    }

    #[test]
    fn face_normal_ccw_and_cw() {
        let (a, b, c) = (Vec3::ZERO, Vec3::X, Vec3::Y);
        assert_eq!(face_normal(a, b, c, Winding::CounterClockwise), Vec3::Z);
        assert_eq!(face_normal(a, b, c, Winding::Clockwise), -Vec3::Z);
        assert_eq!(face_normal(a, a, c, Winding::CounterClockwise), Vec3::ZERO);
    }

    #[test]
    fn zero_angle_keeps_face_normals() {
        let mesh = folded_pair();
        let out = generate_layer_normals(&mesh.layers()[0], Winding::CounterClockwise, &0.0_f32)
            .unwrap();

        assert_eq!(out.item_count(), 6);
        assert_eq!(out.pass_ranges, vec![(0, 6)]);
        for i in 0..3 {
            assert_eq!(out.normal(i), Vec3::Z);
        }
        for i in 3..6 {
            assert_eq!(out.normal(i), Vec3::Y);
        }
    }

    #[test]
    fn wide_angle_averages_shared_edge() {
        let mesh = folded_pair();
        let out = generate_layer_normals(&mesh.layers()[0], Winding::CounterClockwise, &PI)
            .unwrap();

        let diag = (Vec3::Z + Vec3::Y).normalize();
        // Corners on the shared edge blend both faces.
        let n0 = out.normal(0);
        assert_abs_diff_eq!(n0.x, diag.x, epsilon = 1e-6);
        assert_abs_diff_eq!(n0.y, diag.y, epsilon = 1e-6);
        assert_abs_diff_eq!(n0.z, diag.z, epsilon = 1e-6);
        // The lone corner of the first triangle keeps its face normal.
        assert_eq!(out.normal(2), Vec3::Z);
        assert_eq!(out.normal(5), Vec3::Y);
    }

    #[test]
    fn angle_threshold_is_inclusive() {
        let mesh = folded_pair();
        let exact = generate_layer_normals(
            &mesh.layers()[0],
            Winding::CounterClockwise,
            &(FRAC_PI_2 + 1e-4),
        )
        .unwrap();
        assert!(exact.normal(0).y > 0.5);

        let narrow = generate_layer_normals(
            &mesh.layers()[0],
            Winding::CounterClockwise,
            &(FRAC_PI_2 - 1e-3),
        )
        .unwrap();
        assert_eq!(narrow.normal(0), Vec3::Z);
    }

    /// `folded_pair` with the corner at the origin stored twice, once per
    /// triangle, at the two given x offsets.
    fn split_corner_pair(a_x: f32, b_x: f32) -> Mesh {
        let mut mesh = Mesh::new("split-corner", MeshFlags::default());
        let layer = mesh.add_layer();
        mesh.add_stream(
            layer,
            StreamType::Vertices,
            3,
            vec![
                a_x, 0.0, 0.0, //
                1.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, //
                0.0, 0.0, -1.0, //
                b_x, 0.0, 0.0, //
            ],
        )
        .unwrap();
        let pass = mesh.add_pass(layer, MaterialId(0), 6).unwrap();
        mesh.add_pass_indices(pass, StreamType::Vertices, 0, vec![0, 1, 2, 4, 1, 3])
            .unwrap();
        mesh
    }

    #[test]
    fn near_corners_across_cell_boundary_smooth() {
        // 0.999e-5 and 1.001e-5 fall into neighbouring grid cells.
        let mesh = split_corner_pair(0.999e-5, 1.001e-5);
        let out = generate_layer_normals(&mesh.layers()[0], Winding::CounterClockwise, &PI)
            .unwrap();

        let diag = (Vec3::Z + Vec3::Y).normalize();
        for element in [0, 3] {
            let n = out.normal(element);
            assert_abs_diff_eq!(n.x, diag.x, epsilon = 1e-4);
            assert_abs_diff_eq!(n.y, diag.y, epsilon = 1e-4);
            assert_abs_diff_eq!(n.z, diag.z, epsilon = 1e-4);
        }
    }

    #[test]
    fn corners_beyond_epsilon_stay_apart() {
        let mesh = split_corner_pair(0.0, 3e-5);
        let out = generate_layer_normals(&mesh.layers()[0], Winding::CounterClockwise, &PI)
            .unwrap();

        let n0 = out.normal(0);
        assert_abs_diff_eq!(n0.y, 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(n0.z, 1.0, epsilon = 1e-4);
        // The exactly shared corner still blends.
        assert!(out.normal(1).y > 0.5);
    }

    #[test]
    fn passes_do_not_smooth_across_each_other() {
        let mut mesh = Mesh::new("split", MeshFlags::default());
        let layer = mesh.add_layer();
        mesh.add_stream(
            layer,
            StreamType::Vertices,
            3,
            vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, -1.0],
        )
        .unwrap();
        let a = mesh.add_pass(layer, MaterialId(0), 3).unwrap();
        mesh.add_pass_indices(a, StreamType::Vertices, 0, vec![0, 1, 2])
            .unwrap();
        let b = mesh.add_pass(layer, MaterialId(1), 3).unwrap();
        mesh.add_pass_indices(b, StreamType::Vertices, 0, vec![0, 1, 3])
            .unwrap();

        let out = generate_layer_normals(&mesh.layers()[0], Winding::CounterClockwise, &PI)
            .unwrap();
        assert_eq!(out.pass_ranges, vec![(0, 3), (3, 3)]);
        assert_eq!(out.normal(0), Vec3::Z);
        assert_eq!(out.normal(3), Vec3::Y);
    }

    #[test]
    fn missing_vertices_stream_fails() {
        let mut mesh = Mesh::new("empty", MeshFlags::default());
        mesh.add_layer();
        let err = generate_layer_normals(&mesh.layers()[0], Winding::CounterClockwise, &0.0_f32)
            .unwrap_err();
        assert!(matches!(err, MeshError::Integrity(_)));
    }
}
