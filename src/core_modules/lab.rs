// THEORY:
// The `lab` module is the color converter. It maps an 8-bit sRGB triple into
// CIE L*a*b* (D65 white), a perceptually uniform space in which squared
// Euclidean distance is a usable stand-in for "how different do these two
// colors look". It is a pure function over [0,255]^3; alpha never takes part.
//
// Pipeline per color:
//   sRGB byte -> linear light (256-entry LUT) -> XYZ (sRGB primaries)
//   -> white-normalized -> Lab nonlinearity -> (L, a, b)
//
// The LUT replaces the per-channel `powf` of the transfer function with a table
// lookup; it is built once, on first use.

pub mod lab {
    use crate::core_modules::pixel::pixel::{Channel, PixelSample, Rgba};
    use std::sync::OnceLock;

    static SRGB_TO_LINEAR_LUT: OnceLock<[f64; 256]> = OnceLock::new();

    /// Linear sRGB -> CIE XYZ (D65).
    const SRGB_TO_XYZ: [[f64; 3]; 3] = [
        [0.4124564, 0.3575761, 0.1804375],
        [0.2126729, 0.7151522, 0.0721750],
        [0.0193339, 0.1191920, 0.9503041],
    ];

    const WHITE_X: f64 = 0.95047;
    const WHITE_Y: f64 = 1.0;
    const WHITE_Z: f64 = 1.08883;

    const DELTA: f64 = 6.0 / 29.0;

    /// A CIE L*a*b* coordinate. L is roughly 0..100, a and b roughly -128..127.
    #[derive(Debug, Clone, Copy, PartialEq, Default)]
    pub struct Lab {
        pub l: f64,
        pub a: f64,
        pub b: f64,
    }

    impl Lab {
        pub const fn new(l: f64, a: f64, b: f64) -> Self {
            Self { l, a, b }
        }

        pub fn from_rgb(red: Channel, green: Channel, blue: Channel) -> Self {
            let r = srgb_to_linear(red);
            let g = srgb_to_linear(green);
            let b = srgb_to_linear(blue);

            let x = SRGB_TO_XYZ[0][0] * r + SRGB_TO_XYZ[0][1] * g + SRGB_TO_XYZ[0][2] * b;
            let y = SRGB_TO_XYZ[1][0] * r + SRGB_TO_XYZ[1][1] * g + SRGB_TO_XYZ[1][2] * b;
            let z = SRGB_TO_XYZ[2][0] * r + SRGB_TO_XYZ[2][1] * g + SRGB_TO_XYZ[2][2] * b;

            let fx = lab_f(x / WHITE_X);
            let fy = lab_f(y / WHITE_Y);
            let fz = lab_f(z / WHITE_Z);

            Self {
                l: 116.0 * fy - 16.0,
                a: 500.0 * (fx - fy),
                b: 200.0 * (fy - fz),
            }
        }

        pub fn distance_squared(&self, other: &Lab) -> f64 {
            let dl = self.l - other.l;
            let da = self.a - other.a;
            let db = self.b - other.b;
            dl * dl + da * da + db * db
        }
    }

    impl From<Rgba> for Lab {
        fn from(color: Rgba) -> Self {
            Lab::from_rgb(color.red, color.green, color.blue)
        }
    }

    /// Converts every sample, preserving order.
    pub fn convert_all(samples: &[PixelSample]) -> Vec<Lab> {
        samples.iter().map(|sample| Lab::from(sample.color)).collect()
    }

    #[inline]
    fn srgb_to_linear(value: Channel) -> f64 {
        let table = SRGB_TO_LINEAR_LUT.get_or_init(|| {
            let mut table = [0.0f64; 256];
            for (i, entry) in table.iter_mut().enumerate() {
                let c = i as f64 / 255.0;
                *entry = if c <= 0.04045 {
                    c / 12.92
                } else {
                    ((c + 0.055) / 1.055).powf(2.4)
                };
            }
            table
        });
        table[value as usize]
    }

    #[inline]
    fn lab_f(t: f64) -> f64 {
        if t > DELTA * DELTA * DELTA {
            t.cbrt()
        } else {
            t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
        }
    }
}
