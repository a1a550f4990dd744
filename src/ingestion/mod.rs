pub mod gltf_loader;
pub mod obj_loader;

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::{MeshError, Result};
use crate::types::{MaterialLibrary, Mesh, StreamType};

/// Result of the ingestion stage.
#[derive(Debug)]
pub struct IngestionResult {
    pub mesh: Mesh,
    pub materials: MaterialLibrary,
    pub stats: IngestionStats,
}

/// Statistics about the ingested data.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionStats {
    pub total_positions: usize,
    pub total_triangles: usize,
    pub layer_count: usize,
    pub pass_count: usize,
    pub has_normals: bool,
    pub has_uvs: bool,
    pub material_count: usize,
    pub input_format: String,
}

/// Supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Obj,
    Gltf,
    Glb,
}

impl InputFormat {
    /// Detect format from file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "obj" => Ok(InputFormat::Obj),
            "gltf" => Ok(InputFormat::Gltf),
            "glb" => Ok(InputFormat::Glb),
            _ => Err(MeshError::Input(format!("Unsupported file format: .{ext}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InputFormat::Obj => "OBJ",
            InputFormat::Gltf => "glTF",
            InputFormat::Glb => "GLB",
        }
    }
}

impl std::fmt::Display for InputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Import one input file into a mesh.
pub fn ingest(path: &Path, config: &PipelineConfig) -> Result<IngestionResult> {
    if !path.exists() {
        return Err(MeshError::Input(format!(
            "Input file not found: {}",
            path.display()
        )));
    }

    let format = InputFormat::from_path(path)?;
    info!(format = %format, path = %path.display(), "Detected input format");

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("mesh")
        .to_string();

    let (mesh, materials) = match format {
        InputFormat::Obj => obj_loader::load_obj(path, &name, config)?,
        InputFormat::Gltf | InputFormat::Glb => gltf_loader::load_gltf(path, &name, config)?,
    };

    let stats = compute_stats(&mesh, &materials, format);
    debug!(
        positions = stats.total_positions,
        triangles = stats.total_triangles,
        layers = stats.layer_count,
        passes = stats.pass_count,
        "Ingestion stats"
    );

    Ok(IngestionResult {
        mesh,
        materials,
        stats,
    })
}

/// Compute summary statistics from an imported mesh.
pub fn compute_stats(mesh: &Mesh, materials: &MaterialLibrary, format: InputFormat) -> IngestionStats {
    let layers = mesh.layers();
    IngestionStats {
        total_positions: layers
            .iter()
            .filter_map(|l| l.stream(StreamType::Vertices))
            .map(|s| s.item_count as usize)
            .sum(),
        total_triangles: mesh.triangle_count(),
        layer_count: layers.len(),
        pass_count: layers.iter().map(|l| l.passes().len()).sum(),
        has_normals: layers.iter().any(|l| l.has_stream(StreamType::Normals)),
        has_uvs: layers.iter().any(|l| l.has_stream(StreamType::TexCoords)),
        material_count: materials.len(),
        input_format: format.to_string(),
    }
}
