// THEORY:
// This file is the main entry point for the `pixel_morph` library crate.
// It exposes the high-level `MorphPipeline` (plus its configuration and report
// types) as the clean interface for morphing one image into another, and keeps
// the leaf algorithms in `core_modules`:
//
// 1.  `pixel`          - the "dumb" RGBA sample containers fed in by the sampler.
// 2.  `lab`            - the color converter (sRGB bytes -> CIE Lab, D65).
// 3.  `bucket_index`   - the fixed-resolution 3D grid over Lab space.
// 4.  `correspondence` - the greedy expanding-radius matcher that produces the
//                        pixel bijection.
//
// The engine is synchronous and stateless between runs; `parallel_pipeline`
// layers background execution and cancellation on top of it.

pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use error::{MorphError, Result};
