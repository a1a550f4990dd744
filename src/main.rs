use anyhow::Context;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use meshweld::config::{CliArgs, PipelineConfig};
use meshweld::pipeline::Pipeline;

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // Init tracing
    let filter = if args.verbose {
        EnvFilter::new("meshweld=debug")
    } else {
        EnvFilter::new("meshweld=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config: PipelineConfig = args.into();

    // Configure rayon thread pool
    if let Some(threads) = config.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure rayon thread pool")?;
    }

    match Pipeline::run(&config) {
        Ok(result) => {
            let vertices: u64 = result.meshes.iter().map(|m| m.unique_vertices as u64).sum();
            let bytes: usize = result.meshes.iter().map(|m| m.blob_bytes).sum();
            println!(
                "Done: {} meshes, {} unique vertices, {} blob bytes in {:.2}s",
                result.meshes.len(),
                vertices,
                bytes,
                result.duration.as_secs_f64()
            );
            Ok(())
        }
        Err(e) => {
            error!(%e, "Pipeline failed");
            Err(anyhow::anyhow!(e)).context("meshweld pipeline failed")
        }
    }
}
