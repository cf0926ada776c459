// Command-line runner for the morph engine: sample two images onto a grid,
// compute where every source pixel should fly, and write the result out.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use pixel_morph::core_modules::utils::image_helper::image_helper::{render_arrangement, save};
use pixel_morph::parallel_pipeline::match_in_background;
use pixel_morph::pipeline::{
    export_records, MatchStrategy, MorphConfig, MorphPipeline, SampleFilter, DEFAULT_GRID_SIZE,
    DEFAULT_RESOLUTION,
};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Strategy {
    /// Nearest color in CIE Lab via the bucket index
    Perceptual,
    /// Pair pixels by brightness rank
    Brightness,
}

impl From<Strategy> for MatchStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Perceptual => MatchStrategy::Perceptual,
            Strategy::Brightness => MatchStrategy::Brightness,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Filter {
    Nearest,
    Triangle,
    CatmullRom,
    Lanczos3,
}

impl From<Filter> for SampleFilter {
    fn from(filter: Filter) -> Self {
        match filter {
            Filter::Nearest => SampleFilter::Nearest,
            Filter::Triangle => SampleFilter::Triangle,
            Filter::CatmullRom => SampleFilter::CatmullRom,
            Filter::Lanczos3 => SampleFilter::Lanczos3,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "pixel_morph")]
#[command(about = "Match every pixel of one image to a pixel of another by perceptual color")]
#[command(version)]
struct Cli {
    /// Image whose pixels move.
    source: PathBuf,

    /// Image whose layout the pixels move into.
    target: PathBuf,

    /// Side length of the sampling grid.
    #[arg(long, default_value_t = DEFAULT_GRID_SIZE)]
    grid_size: u32,

    /// Bucket index cells per Lab axis.
    #[arg(long, default_value_t = DEFAULT_RESOLUTION)]
    resolution: usize,

    /// Cap on the search radius in cells. Unset searches the whole index.
    #[arg(long)]
    max_radius: Option<usize>,

    #[arg(long, value_enum, default_value = "perceptual")]
    strategy: Strategy,

    /// Drop fully transparent pixels from both grids.
    #[arg(long)]
    skip_transparent: bool,

    #[arg(long, value_enum, default_value = "triangle")]
    filter: Filter,

    /// Path to write correspondence records (JSON).
    #[arg(long)]
    out: Option<PathBuf>,

    /// Path to write the final arrangement (PNG).
    #[arg(long)]
    arrangement: Option<PathBuf>,
}

impl Cli {
    fn morph_config(&self) -> MorphConfig {
        MorphConfig {
            grid_size: self.grid_size,
            resolution: self.resolution,
            max_search_radius: self.max_radius,
            strategy: self.strategy.into(),
            skip_transparent: self.skip_transparent,
            filter: self.filter.into(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let pipeline = MorphPipeline::new(cli.morph_config()).context("invalid configuration")?;
    let (source, target) = pipeline
        .load_grids(&cli.source, &cli.target)
        .with_context(|| {
            format!(
                "failed to sample {} and {}",
                cli.source.display(),
                cli.target.display()
            )
        })?;

    let report = match_in_background(pipeline, source, target).await?;
    let stats = &report.correspondence.stats;

    println!("Pixel Morph: {:?} correspondence", report.strategy);
    println!("  records:               {}", report.records().len());
    println!("  fallback matches:      {}", stats.fallback_matches);
    println!("  max radius used:       {}", stats.max_radius_used);
    println!("  mean squared distance: {:.3}", stats.mean_distance_squared());
    if let Some(mismatch) = report.correspondence.size_mismatch {
        println!(
            "  size mismatch:         {} sources, {} targets ({} unmatched sources, {} unmatched targets)",
            mismatch.source_count,
            mismatch.target_count,
            mismatch.unmatched_sources(),
            mismatch.unmatched_targets()
        );
    }

    if let Some(path) = &cli.out {
        export_records(path, report.records())
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Records written to {}", path.display());
    }

    if let Some(path) = &cli.arrangement {
        let buffer = render_arrangement(report.records(), report.grid_size);
        save(path, report.grid_size, &buffer)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Arrangement written to {}", path.display());
    }

    Ok(())
}
