// THEORY:
// The `pipeline` module is the top-level API of the morph engine. It wires the
// data flow end to end:
//
//   sampler -> {source grid, target grid} -> color converter -> bucket index
//           -> correspondence engine -> records (for the motion/render layer)
//
// A `MorphPipeline` is built from a `MorphConfig`, validates it once, and can
// then be run any number of times. Each run is independent; nothing carries
// over from one to the next.

use crate::core_modules::brightness::correspond_by_brightness;
use crate::core_modules::correspondence::{CorrespondenceEngine, EngineConfig};
use crate::core_modules::pixel::pixel::PixelGrid;
use crate::core_modules::utils::image_helper::image_helper::{load_grid, sample_image};
use crate::error::{MorphError, Result};
use image::DynamicImage;
use std::borrow::Cow;
use std::io::{BufWriter, Write};
use std::path::Path;

// Re-export key data structures for the public API.
pub use crate::core_modules::bucket_index::DEFAULT_RESOLUTION;
pub use crate::core_modules::correspondence::{
    Correspondence, CorrespondenceRecord, MatchRun, MatchStats, SizeMismatch,
};
pub use crate::core_modules::pixel::pixel::{PixelSample, Position, Rgba};
pub use crate::core_modules::utils::image_helper::image_helper::SampleFilter;

pub const DEFAULT_GRID_SIZE: u32 = 128;

/// How source pixels are assigned to target positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchStrategy {
    /// Greedy nearest color in Lab space via the bucket index.
    #[default]
    Perceptual,
    /// Pair pixels by brightness rank.
    Brightness,
}

/// Configuration for the MorphPipeline.
#[derive(Debug, Clone)]
pub struct MorphConfig {
    /// Side length N of the sampling grid; a run matches N*N pixels.
    pub grid_size: u32,
    /// Bucket index cells per Lab axis.
    pub resolution: usize,
    /// Caps the expanding-radius search. `None` searches the whole index.
    pub max_search_radius: Option<usize>,
    pub strategy: MatchStrategy,
    /// Drop fully transparent pixels before matching. Source and target
    /// counts may then differ.
    pub skip_transparent: bool,
    pub filter: SampleFilter,
}

impl Default for MorphConfig {
    fn default() -> Self {
        Self {
            grid_size: DEFAULT_GRID_SIZE,
            resolution: DEFAULT_RESOLUTION,
            max_search_radius: None,
            strategy: MatchStrategy::default(),
            skip_transparent: false,
            filter: SampleFilter::default(),
        }
    }
}

impl MorphConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            resolution: self.resolution,
            max_search_radius: self.max_search_radius,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.grid_size == 0 {
            return Err(MorphError::InvalidGridSize(self.grid_size));
        }
        self.engine_config().validate()
    }
}

/// The result of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct MorphReport {
    pub strategy: MatchStrategy,
    /// Side length of the grids that were matched.
    pub grid_size: u32,
    pub correspondence: Correspondence,
}

impl MorphReport {
    pub fn records(&self) -> &[CorrespondenceRecord] {
        &self.correspondence.records
    }
}

/// The main, top-level struct for the morph engine.
#[derive(Debug, Clone)]
pub struct MorphPipeline {
    config: MorphConfig,
    engine: CorrespondenceEngine,
}

impl MorphPipeline {
    pub fn new(config: MorphConfig) -> Result<Self> {
        config.validate()?;
        let engine = CorrespondenceEngine::new(config.engine_config())?;
        Ok(Self { config, engine })
    }

    pub fn config(&self) -> &MorphConfig {
        &self.config
    }

    pub fn engine(&self) -> &CorrespondenceEngine {
        &self.engine
    }

    /// Applies the transparency filter if configured.
    pub fn prepare<'g>(&self, grid: &'g PixelGrid) -> Cow<'g, PixelGrid> {
        if self.config.skip_transparent {
            Cow::Owned(grid.without_transparent())
        } else {
            Cow::Borrowed(grid)
        }
    }

    /// Matches two already-sampled grids.
    pub fn run(&self, source: &PixelGrid, target: &PixelGrid) -> MorphReport {
        let source = self.prepare(source);
        let target = self.prepare(target);

        let correspondence = match self.config.strategy {
            MatchStrategy::Perceptual => self.engine.correspond(source.samples(), target.samples()),
            MatchStrategy::Brightness => correspond_by_brightness(source.samples(), target.samples()),
        };

        MorphReport {
            strategy: self.config.strategy,
            grid_size: target.side(),
            correspondence,
        }
    }

    /// Samples two decoded images onto the configured grid and matches them.
    pub fn run_images(&self, source: &DynamicImage, target: &DynamicImage) -> Result<MorphReport> {
        let source = sample_image(source, self.config.grid_size, self.config.filter)?;
        let target = sample_image(target, self.config.grid_size, self.config.filter)?;
        Ok(self.run(&source, &target))
    }

    pub fn load_grids(&self, source: impl AsRef<Path>, target: impl AsRef<Path>) -> Result<(PixelGrid, PixelGrid)> {
        let source = load_grid(source, self.config.grid_size, self.config.filter)?;
        let target = load_grid(target, self.config.grid_size, self.config.filter)?;
        Ok((source, target))
    }
}

/// Writes records as a pretty-printed JSON array.
pub fn export_records(path: impl AsRef<Path>, records: &[CorrespondenceRecord]) -> Result<()> {
    let mut writer = BufWriter::new(std::fs::File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, records)?;
    writer.flush()?;
    Ok(())
}
