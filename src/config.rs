use std::path::PathBuf;

use clap::Parser;

use crate::types::{MeshFlags, Winding};

/// Front-face winding accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum WindingArg {
    #[value(name = "ccw")]
    CounterClockwise,
    #[value(name = "cw")]
    Clockwise,
}

impl std::fmt::Display for WindingArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WindingArg::CounterClockwise => write!(f, "ccw"),
            WindingArg::Clockwise => write!(f, "cw"),
        }
    }
}

impl From<WindingArg> for Winding {
    fn from(arg: WindingArg) -> Self {
        match arg {
            WindingArg::CounterClockwise => Winding::CounterClockwise,
            WindingArg::Clockwise => Winding::Clockwise,
        }
    }
}

/// Normal generation parameters.
#[derive(Debug, Clone)]
pub struct NormalConfig {
    /// Smoothing angle in radians given to every imported material.
    pub smoothing_angle: f32,
    pub winding: Winding,
}

impl Default for NormalConfig {
    fn default() -> Self {
        Self {
            smoothing_angle: 60f32.to_radians(),
            winding: Winding::CounterClockwise,
        }
    }
}

/// Which artifacts are written per input.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub blob: bool,
    pub glb: bool,
    pub report: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            blob: true,
            glb: false,
            report: true,
        }
    }
}

/// Fully resolved pipeline configuration (constructed from CLI args).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    pub normals: NormalConfig,
    pub output_files: OutputConfig,
    pub mesh_flags: MeshFlags,
    pub dry_run: bool,
    pub verbose: bool,
    pub threads: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            output: PathBuf::new(),
            normals: NormalConfig::default(),
            output_files: OutputConfig::default(),
            mesh_flags: MeshFlags::default(),
            dry_run: false,
            verbose: false,
            threads: None,
        }
    }
}

/// CLI argument definition (clap derive).
#[derive(Parser, Debug)]
#[command(
    name = "meshweld",
    about = "Weld multi-index meshes into deduplicated interleaved GPU buffers",
    version
)]
pub struct CliArgs {
    /// Input files (OBJ, glTF, GLB)
    #[arg(short = 'i', long = "input", required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,

    /// Output directory
    #[arg(short = 'o', long)]
    pub output: PathBuf,

    /// Normal smoothing angle in degrees (0 = flat shading)
    #[arg(long, default_value_t = 60.0)]
    pub smoothing_angle: f32,

    /// Front-face winding of the input triangles
    #[arg(long, value_enum, default_value = "ccw")]
    pub winding: WindingArg,

    /// Keep raw streams in memory after assembly
    #[arg(long)]
    pub keep_raw_streams: bool,

    /// Also write a GLB per input
    #[arg(long)]
    pub glb: bool,

    /// Skip writing .mwb blob files
    #[arg(long)]
    pub no_blob: bool,

    /// Import inputs and report stats only
    #[arg(long)]
    pub dry_run: bool,

    /// Enable verbose logging
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Worker thread count (default: all cores)
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,
}

impl From<CliArgs> for PipelineConfig {
    fn from(args: CliArgs) -> Self {
        PipelineConfig {
            inputs: args.inputs,
            output: args.output,
            normals: NormalConfig {
                smoothing_angle: args.smoothing_angle.to_radians(),
                winding: args.winding.into(),
            },
            output_files: OutputConfig {
                blob: !args.no_blob,
                glb: args.glb,
                report: true,
            },
            mesh_flags: MeshFlags {
                keep_raw_streams: args.keep_raw_streams,
                ..Default::default()
            },
            dry_run: args.dry_run,
            verbose: args.verbose,
            threads: args.threads,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_normal_config() {
        let nc = NormalConfig::default();
        assert!((nc.smoothing_angle - 60f32.to_radians()).abs() < f32::EPSILON);
        assert_eq!(nc.winding, Winding::CounterClockwise);
    }

    #[test]
    fn default_output_config() {
        let oc = OutputConfig::default();
        assert!(oc.blob);
        assert!(!oc.glb);
        assert!(oc.report);
    }

    #[test]
    fn winding_display() {
        assert_eq!(WindingArg::CounterClockwise.to_string(), "ccw");
        assert_eq!(WindingArg::Clockwise.to_string(), "cw");
    }

    #[test]
    fn cli_args_to_pipeline_config() {
        let args = CliArgs::parse_from([
            "meshweld",
            "-i",
            "a.obj",
            "b.glb",
            "-o",
            "./out",
            "--smoothing-angle",
            "0",
            "--winding",
            "cw",
            "--keep-raw-streams",
            "--glb",
            "--no-blob",
            "--dry-run",
            "-v",
            "-j",
            "8",
        ]);

        let config: PipelineConfig = args.into();

        assert_eq!(
            config.inputs,
            vec![PathBuf::from("a.obj"), PathBuf::from("b.glb")]
        );
        assert_eq!(config.output, PathBuf::from("./out"));
        assert_eq!(config.normals.smoothing_angle, 0.0);
        assert_eq!(config.normals.winding, Winding::Clockwise);
        assert!(config.mesh_flags.keep_raw_streams);
        assert!(config.output_files.glb);
        assert!(!config.output_files.blob);
        assert!(config.dry_run);
        assert!(config.verbose);
        assert_eq!(config.threads, Some(8));
    }

    #[test]
    fn cli_args_minimal() {
        let args = CliArgs::parse_from(["meshweld", "-i", "test.glb", "-o", "output"]);
        let config: PipelineConfig = args.into();

        assert_eq!(config.inputs, vec![PathBuf::from("test.glb")]);
        assert_eq!(config.output, PathBuf::from("output"));
        assert!((config.normals.smoothing_angle - 60f32.to_radians()).abs() < 1e-6);
        assert_eq!(config.normals.winding, Winding::CounterClockwise);
        assert!(!config.mesh_flags.keep_raw_streams);
        assert!(config.output_files.blob);
        assert!(!config.output_files.glb);
        assert!(!config.dry_run);
        assert_eq!(config.threads, None);
    }

    #[test]
    fn cli_requires_input() {
        assert!(CliArgs::try_parse_from(["meshweld", "-o", "out"]).is_err());
    }
}
