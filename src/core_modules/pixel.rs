// THEORY:
// The `pixel` module holds the inputs of a matching run: RGBA samples with an
// implicit grid position, exactly as the sampler hands them over. These are
// "dumb" data containers. They know how to build themselves from raw RGBA bytes
// and how bright they are (the brightness-rank matcher needs that), but nothing
// about color spaces or matching.
//
// A `PixelGrid` is an N x N grid of samples in row-major scan order. Scan order
// is significant: the correspondence engine visits targets in it, and its
// exhaustion fallback hands out sources in it.

pub mod pixel {
    use crate::error::{MorphError, Result};
    use serde::{Deserialize, Serialize};

    pub type Byte = u8;
    pub type Bytes = Vec<Byte>;
    pub type Channel = Byte;
    pub type Coordinate = u32;
    pub type Brightness = f64;

    const CHANNELS: usize = 4;

    /// A single RGBA color, each channel in 0..=255.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Rgba {
        pub red: Channel,
        pub green: Channel,
        pub blue: Channel,
        pub alpha: Channel,
    }

    impl Rgba {
        pub const fn new(red: Channel, green: Channel, blue: Channel, alpha: Channel) -> Self {
            Self { red, green, blue, alpha }
        }

        pub const fn opaque(red: Channel, green: Channel, blue: Channel) -> Self {
            Self::new(red, green, blue, 255)
        }

        /// Perceived brightness (Rec. 601 luma) on the 0..255 scale.
        pub fn brightness(&self) -> Brightness {
            0.299 * self.red as f64 + 0.587 * self.green as f64 + 0.114 * self.blue as f64
        }

        pub fn is_transparent(&self) -> bool {
            self.alpha == 0
        }
    }

    impl TryFrom<&[Byte]> for Rgba {
        type Error = MorphError;

        fn try_from(bytes: &[Byte]) -> Result<Self> {
            match bytes {
                &[red, green, blue, alpha] => Ok(Rgba::new(red, green, blue, alpha)),
                _ => Err(MorphError::BufferLength {
                    expected: CHANNELS,
                    actual: bytes.len(),
                }),
            }
        }
    }

    impl From<Rgba> for [Byte; CHANNELS] {
        fn from(color: Rgba) -> Self {
            [color.red, color.green, color.blue, color.alpha]
        }
    }

    impl From<Rgba> for Bytes {
        fn from(color: Rgba) -> Self {
            vec![color.red, color.green, color.blue, color.alpha]
        }
    }

    /// An integer grid position.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Position {
        pub x: Coordinate,
        pub y: Coordinate,
    }

    impl Position {
        pub const fn new(x: Coordinate, y: Coordinate) -> Self {
            Self { x, y }
        }
    }

    /// One sampled pixel. Immutable once sampled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct PixelSample {
        pub position: Position,
        pub color: Rgba,
    }

    impl PixelSample {
        pub const fn new(position: Position, color: Rgba) -> Self {
            Self { position, color }
        }
    }

    /// The samples of an N x N grid in row-major scan order.
    ///
    /// A grid built by the sampler is always full. `without_transparent` may
    /// thin it out; the remaining samples keep their original positions and
    /// relative order.
    #[derive(Debug, Clone, PartialEq)]
    pub struct PixelGrid {
        side: Coordinate,
        samples: Vec<PixelSample>,
    }

    impl PixelGrid {
        /// Builds a grid from a tightly packed RGBA8 buffer of `side * side` pixels.
        pub fn from_rgba_bytes(side: Coordinate, bytes: &[Byte]) -> Result<Self> {
            let expected = side as usize * side as usize * CHANNELS;
            if bytes.len() != expected {
                return Err(MorphError::BufferLength {
                    expected,
                    actual: bytes.len(),
                });
            }

            let samples = bytes
                .chunks_exact(CHANNELS)
                .enumerate()
                .map(|(i, chunk)| {
                    let color = Rgba::try_from(chunk)?;
                    Ok(PixelSample::new(Self::position_of(side, i), color))
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(Self { side, samples })
        }

        /// Builds a grid from `side * side` colors in scan order.
        pub fn from_colors(side: Coordinate, colors: &[Rgba]) -> Result<Self> {
            let expected = side as usize * side as usize;
            if colors.len() != expected {
                return Err(MorphError::CountMismatch {
                    what: "colors",
                    expected,
                    actual: colors.len(),
                });
            }

            let samples = colors
                .iter()
                .enumerate()
                .map(|(i, &color)| PixelSample::new(Self::position_of(side, i), color))
                .collect();

            Ok(Self { side, samples })
        }

        fn position_of(side: Coordinate, index: usize) -> Position {
            let side = side as usize;
            Position::new((index % side) as Coordinate, (index / side) as Coordinate)
        }

        pub fn side(&self) -> Coordinate {
            self.side
        }

        pub fn samples(&self) -> &[PixelSample] {
            &self.samples
        }

        pub fn into_samples(self) -> Vec<PixelSample> {
            self.samples
        }

        pub fn len(&self) -> usize {
            self.samples.len()
        }

        pub fn is_empty(&self) -> bool {
            self.samples.is_empty()
        }

        /// Drops fully transparent samples.
        pub fn without_transparent(&self) -> Self {
            Self {
                side: self.side,
                samples: self
                    .samples
                    .iter()
                    .filter(|sample| !sample.color.is_transparent())
                    .copied()
                    .collect(),
            }
        }
    }
}
