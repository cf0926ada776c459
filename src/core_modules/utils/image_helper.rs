// THEORY:
// `image_helper` is the boundary between the engine and real image files. It
// plays the sampler's role (decode any image, squash it to an N x N grid of
// RGBA samples in scan order) and writes results back out as PNG. The engine
// never sees a file or a codec; only `PixelGrid`s and records cross this line.

pub mod image_helper {
    use crate::core_modules::correspondence::CorrespondenceRecord;
    use crate::core_modules::pixel::pixel::PixelGrid;
    use crate::error::{MorphError, Result};
    use image::imageops::FilterType;
    use image::{DynamicImage, ImageEncoder};
    use std::io::BufWriter;
    use std::path::Path;

    const CHANNELS: usize = 4;

    /// Resampling filter used when squashing an image onto the grid.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub enum SampleFilter {
        Nearest,
        #[default]
        Triangle,
        CatmullRom,
        Lanczos3,
    }

    impl From<SampleFilter> for FilterType {
        fn from(filter: SampleFilter) -> Self {
            match filter {
                SampleFilter::Nearest => FilterType::Nearest,
                SampleFilter::Triangle => FilterType::Triangle,
                SampleFilter::CatmullRom => FilterType::CatmullRom,
                SampleFilter::Lanczos3 => FilterType::Lanczos3,
            }
        }
    }

    /// Resizes `image` to exactly `grid_size` x `grid_size` and reads it back
    /// as RGBA samples in row-major order.
    pub fn sample_image(image: &DynamicImage, grid_size: u32, filter: SampleFilter) -> Result<PixelGrid> {
        if grid_size == 0 {
            return Err(MorphError::InvalidGridSize(grid_size));
        }
        let rgba = image
            .resize_exact(grid_size, grid_size, filter.into())
            .to_rgba8();
        PixelGrid::from_rgba_bytes(grid_size, rgba.as_raw())
    }

    pub fn load_grid(path: impl AsRef<Path>, grid_size: u32, filter: SampleFilter) -> Result<PixelGrid> {
        let path = path.as_ref();
        let image = image::open(path)?;
        tracing::debug!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            grid_size,
            "sampling image"
        );
        sample_image(&image, grid_size, filter)
    }

    /// Paints every record's source color at its target position: the last
    /// frame of the morph. Positions no record covers stay transparent.
    pub fn render_arrangement(records: &[CorrespondenceRecord], side: u32) -> Vec<u8> {
        let side = side as usize;
        let mut buffer = vec![0u8; side * side * CHANNELS];
        for record in records {
            let (x, y) = (
                record.target_position.x as usize,
                record.target_position.y as usize,
            );
            if x >= side || y >= side {
                continue;
            }
            let offset = (y * side + x) * CHANNELS;
            let bytes: [u8; CHANNELS] = record.source_color.into();
            buffer[offset..offset + CHANNELS].copy_from_slice(&bytes);
        }
        buffer
    }

    /// Writes a square RGBA8 buffer as a PNG.
    pub fn save(path: impl AsRef<Path>, side: u32, buffer: &[u8]) -> Result<()> {
        let expected = side as usize * side as usize * CHANNELS;
        if buffer.len() != expected {
            return Err(MorphError::BufferLength {
                expected,
                actual: buffer.len(),
            });
        }
        let output = BufWriter::new(std::fs::File::create(path)?);
        let encoder = image::codecs::png::PngEncoder::new(output);

        encoder.write_image(buffer, side, side, image::ExtendedColorType::Rgba8)?;

        Ok(())
    }
}
