// CLI entry for chroma_shift: recolor one image with every palette in a JSON file.
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueHint};
use chroma_shift::{
    DirectorySink, ImageCache, OutputFormat, PaletteSpec, RecolorConfig, VariationOrchestrator, VariationResult,
    VariationSpec,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chroma_shift", version, about = "Recolor an image across many palettes at once")]
struct Cli {
    /// Base image (PNG, JPEG or WEBP)
    #[arg(value_hint = ValueHint::FilePath)]
    image: PathBuf,
    /// JSON array of palettes: [{"name": ..., "colors": ["#RRGGBB", ...]}, ...]
    #[arg(value_hint = ValueHint::FilePath)]
    palettes: PathBuf,
    /// Directory the variations are written to
    #[arg(value_hint = ValueHint::DirPath)]
    out_dir: PathBuf,

    /// JSON config file; missing fields use defaults
    #[arg(long = "config", value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,
    /// Dominant colors to extract
    #[arg(long = "num-colors")]
    num_colors: Option<usize>,
    /// Blend strength in [0, 1]
    #[arg(long = "strength")]
    strength: Option<f32>,
    /// Variations processed at once (defaults to the config value, capped at the CPU count)
    #[arg(long = "concurrency")]
    concurrency: Option<usize>,
    /// Output format: png, jpeg or webp
    #[arg(long = "format")]
    format: Option<OutputFormat>,
}

#[derive(Serialize)]
struct Summary<'a> {
    image: String,
    succeeded: usize,
    failed: usize,
    variations: &'a [VariationResult],
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RecolorConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RecolorConfig::default(),
    };
    if let Some(num_colors) = cli.num_colors {
        config.num_colors = num_colors;
    }
    if let Some(strength) = cli.strength {
        config.blend_strength = strength;
    }
    if let Some(format) = cli.format {
        config.output_format = format;
    }
    config.validate().context("invalid configuration")?;
    let concurrency = cli
        .concurrency
        .unwrap_or_else(|| config.concurrency_limit.min(num_cpus::get()));

    let image = tokio::fs::read(&cli.image)
        .await
        .with_context(|| format!("reading {}", cli.image.display()))?;
    let palettes_json = tokio::fs::read_to_string(&cli.palettes)
        .await
        .with_context(|| format!("reading {}", cli.palettes.display()))?;
    let palettes: Vec<PaletteSpec> = serde_json::from_str(&palettes_json)
        .with_context(|| format!("parsing palettes in {}", cli.palettes.display()))?;

    let specs = palettes.into_iter().map(VariationSpec::new).collect();

    let cache = ImageCache::new(config.cache_capacity);
    let cache_key = cli.image.display().to_string();
    let orchestrator = VariationOrchestrator::new(&config);
    let sink = DirectorySink::new(&cli.out_dir);
    let results = orchestrator
        .run_cached(&cache, &cache_key, &image, specs, concurrency)
        .await
        .map_err(|e| anyhow::anyhow!("{}: {e}", e.user_message()))?;
    let results = orchestrator
        .store_results(results, &sink)
        .await
        .map_err(|e| anyhow::anyhow!("{}: {e}", e.user_message()))?;

    let succeeded = results.iter().filter(|result| result.is_success()).count();
    let summary = Summary {
        image: cache_key,
        succeeded,
        failed: results.len() - succeeded,
        variations: &results,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
