use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::{MeshError, Result};
use crate::export::{blob_file, glb_writer};
use crate::gpu::{GpuResource, HeadlessBackend};
use crate::ingestion::{self, IngestionStats};
use crate::types::{MaterialId, MeshInstance};

/// How long a single upload may take on the headless backend.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Summary of a completed pipeline run.
#[derive(Debug)]
pub struct ProcessingResult {
    pub meshes: Vec<MeshReport>,
    pub duration: Duration,
}

/// Per-input entry of `report.json`.
#[derive(Debug, Clone, Serialize)]
pub struct MeshReport {
    pub name: String,
    pub input: PathBuf,
    pub stats: IngestionStats,
    /// Layers that received generated normals.
    pub generated_normal_layers: usize,
    pub unique_vertices: u32,
    pub total_elements: u32,
    pub stride: u32,
    pub index_width: u8,
    pub blob_bytes: usize,
    pub outputs: Vec<PathBuf>,
}

#[derive(Debug, Serialize)]
struct RunReport<'a> {
    meshes: &'a [MeshReport],
    elapsed_secs: f64,
}

/// Pipeline orchestrator: import, normals, assembly, upload and export per input.
pub struct Pipeline;

impl Pipeline {
    /// Run the full pipeline over every input file.
    pub fn run(config: &PipelineConfig) -> Result<ProcessingResult> {
        let start = Instant::now();

        info!(
            inputs = config.inputs.len(),
            output = %config.output.display(),
            "Starting pipeline"
        );

        if config.dry_run {
            info!("--dry-run: importing inputs only");
            let reports = config
                .inputs
                .par_iter()
                .map(|path| {
                    let result = ingestion::ingest(path, config)?;
                    Ok(dry_run_report(path, result.mesh.name(), result.stats))
                })
                .collect::<Result<Vec<_>>>()?;
            print_dry_run_summary(&reports);
            return Ok(ProcessingResult {
                meshes: reports,
                duration: start.elapsed(),
            });
        }

        fs::create_dir_all(&config.output).map_err(|e| {
            MeshError::Output(format!(
                "cannot create output directory {}: {e}",
                config.output.display()
            ))
        })?;

        let backend = HeadlessBackend::new();
        let reports = config
            .inputs
            .par_iter()
            .map(|path| Self::process(path, config, &backend))
            .collect::<Result<Vec<_>>>()?;

        let duration = start.elapsed();
        if config.output_files.report {
            write_report(&config.output, &reports, duration)?;
        }

        info!(
            meshes = reports.len(),
            buffers = backend.buffer_count(),
            elapsed = ?duration,
            "Pipeline complete"
        );

        Ok(ProcessingResult {
            meshes: reports,
            duration,
        })
    }

    fn process(path: &Path, config: &PipelineConfig, backend: &HeadlessBackend) -> Result<MeshReport> {
        info!(input = %path.display(), "Stage 1/4: Ingestion");
        let ingestion::IngestionResult {
            mut mesh,
            materials,
            stats,
        } = ingestion::ingest(path, config)?;

        info!(mesh = %mesh.name(), "Stage 2/4: Normals");
        let generated_normal_layers = mesh.generate_normals(&materials)?;

        info!(mesh = %mesh.name(), "Stage 3/4: Assembly");
        let blob = mesh.assemble()?;
        info!(
            mesh = %mesh.name(),
            unique_vertices = blob.unique_vertex_count,
            elements = blob.total_elements,
            stride = blob.layout.stride,
            index_width = blob.index_width.bytes(),
            "Assembled blob"
        );

        let mut resource = GpuResource::request(backend, Arc::clone(&blob));
        let handle = resource.wait(UPLOAD_TIMEOUT)?;
        info!(mesh = %mesh.name(), buffer = handle.0, bytes = blob.len(), "Uploaded blob");

        info!(mesh = %mesh.name(), "Stage 4/4: Export");
        let mut outputs = Vec::new();
        if config.output_files.glb {
            let glb_path = config.output.join(format!("{}.glb", mesh.name()));
            let glb = glb_writer::write_glb(&mesh, Some(&materials))?;
            fs::write(&glb_path, glb)?;
            outputs.push(glb_path);
        }

        let name = mesh.name().to_string();
        let mut report = MeshReport {
            name: name.clone(),
            input: path.to_path_buf(),
            stats,
            generated_normal_layers,
            unique_vertices: blob.unique_vertex_count,
            total_elements: blob.total_elements,
            stride: blob.layout.stride,
            index_width: blob.index_width.bytes() as u8,
            blob_bytes: blob.len(),
            outputs,
        };

        if config.output_files.blob {
            let blob_path = config.output.join(format!("{name}.mwb"));
            let material_ids: HashMap<MaterialId, u32> = (0..materials.len() as u32)
                .map(|i| (MaterialId(i), i))
                .collect();
            blob_file::save(&blob_path, &MeshInstance::owned(mesh), &material_ids)?;
            report.outputs.push(blob_path);
        }

        Ok(report)
    }
}

fn dry_run_report(path: &Path, name: &str, stats: IngestionStats) -> MeshReport {
    MeshReport {
        name: name.to_string(),
        input: path.to_path_buf(),
        stats,
        generated_normal_layers: 0,
        unique_vertices: 0,
        total_elements: 0,
        stride: 0,
        index_width: 0,
        blob_bytes: 0,
        outputs: Vec::new(),
    }
}

/// Write `report.json` into the output directory.
fn write_report(output: &Path, meshes: &[MeshReport], elapsed: Duration) -> Result<()> {
    let report = RunReport {
        meshes,
        elapsed_secs: elapsed.as_secs_f64(),
    };
    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| MeshError::Output(format!("report serialization failed: {e}")))?;
    fs::write(output.join("report.json"), json)?;
    Ok(())
}

/// Print dry-run summary with per-input import stats.
fn print_dry_run_summary(reports: &[MeshReport]) {
    println!("=== Dry Run Summary ===");
    for report in reports {
        let stats = &report.stats;
        println!("  {} ({})", report.name, stats.input_format);
        println!("    Positions: {}", stats.total_positions);
        println!("    Triangles: {}", stats.total_triangles);
        println!("    Layers:    {}", stats.layer_count);
        println!("    Passes:    {}", stats.pass_count);
        println!("    Normals:   {}", if stats.has_normals { "yes" } else { "no" });
        println!("    UVs:       {}", if stats.has_uvs { "yes" } else { "no" });
        println!("    Materials: {}", stats.material_count);
    }
}
