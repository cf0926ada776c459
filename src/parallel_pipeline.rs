// THEORY:
// Matching is pure CPU work with no suspension points, so an async caller (a
// UI event handler, a server task) should not run it on its own executor
// thread. This module layers three things on top of the synchronous engine
// without changing what it computes:
//
// 1.  `match_in_background`: run a whole pipeline pass on tokio's blocking pool.
// 2.  `convert_parallel`: split Lab conversion across `num_cpus` blocking tasks
//     and stitch the parts back together in input order.
// 3.  `CancellableMatch`: drive a `MatchRun` in fixed-size chunks and check a
//     shared flag between chunks, so a caller can abandon a long run. An
//     optional progress callback sees the processed count after each chunk.
//
// All three produce exactly the output of the synchronous path.

use crate::core_modules::correspondence::{Correspondence, CorrespondenceEngine};
use crate::core_modules::lab::lab::{convert_all, Lab};
use crate::core_modules::pixel::pixel::{PixelGrid, PixelSample};
use crate::error::{MorphError, Result};
use crate::pipeline::{MorphPipeline, MorphReport};
use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::{JoinError, spawn_blocking};

const MIN_CONVERSION_CHUNK: usize = 1024;
pub const DEFAULT_MATCH_CHUNK: usize = 1024;

fn worker_error(error: JoinError) -> MorphError {
    MorphError::Worker(error.to_string())
}

/// Runs `pipeline.run` on the blocking pool.
pub async fn match_in_background(
    pipeline: MorphPipeline,
    source: PixelGrid,
    target: PixelGrid,
) -> Result<MorphReport> {
    spawn_blocking(move || pipeline.run(&source, &target))
        .await
        .map_err(worker_error)
}

/// Lab coordinates for every sample, in input order.
pub async fn convert_parallel(samples: Arc<[PixelSample]>) -> Result<Vec<Lab>> {
    let workers = num_cpus::get().max(1);
    let chunk_len = samples.len().div_ceil(workers).max(MIN_CONVERSION_CHUNK);

    let tasks = (0..samples.len()).step_by(chunk_len).map(|start| {
        let samples = Arc::clone(&samples);
        let end = (start + chunk_len).min(samples.len());
        spawn_blocking(move || convert_all(&samples[start..end]))
    });
    let parts = join_all(tasks).await;

    let mut lab = Vec::with_capacity(samples.len());
    for part in parts {
        lab.extend(part.map_err(worker_error)?);
    }
    Ok(lab)
}

/// A shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Called after every chunk with `(processed, total)` targets.
pub type ProgressFn = dyn Fn(usize, usize) + Send + Sync;

/// A perceptual matching run that can be abandoned between chunks.
pub struct CancellableMatch {
    engine: CorrespondenceEngine,
    chunk_size: usize,
    cancel: CancelHandle,
    progress: Option<Arc<ProgressFn>>,
}

impl CancellableMatch {
    pub fn new(engine: CorrespondenceEngine, chunk_size: usize) -> Self {
        Self {
            engine,
            chunk_size: chunk_size.max(1),
            cancel: CancelHandle::new(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: impl Fn(usize, usize) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub async fn run_grids(&self, source: PixelGrid, target: PixelGrid) -> Result<Correspondence> {
        self.run(source.into_samples(), target.into_samples()).await
    }

    pub async fn run(&self, source: Vec<PixelSample>, target: Vec<PixelSample>) -> Result<Correspondence> {
        let source: Arc<[PixelSample]> = source.into();
        let target: Arc<[PixelSample]> = target.into();
        let (source_lab, target_lab) = futures::try_join!(
            convert_parallel(Arc::clone(&source)),
            convert_parallel(Arc::clone(&target))
        )?;

        let engine = self.engine.clone();
        let cancel = self.cancel.clone();
        let chunk_size = self.chunk_size;
        let progress = self.progress.clone();

        spawn_blocking(move || -> Result<Correspondence> {
            let mut run = engine.start_with_lab(&source[..], source_lab, &target[..], target_lab)?;
            let total = run.remaining();
            while !run.is_complete() {
                if cancel.is_cancelled() {
                    tracing::info!(
                        processed = run.processed(),
                        remaining = run.remaining(),
                        "matching cancelled"
                    );
                    return Err(MorphError::Cancelled {
                        processed: run.processed(),
                    });
                }
                run.run_chunk(chunk_size);
                if let Some(progress) = &progress {
                    progress(run.processed(), total);
                }
            }
            Ok(run.finish())
        })
        .await
        .map_err(worker_error)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::pixel::pixel::Rgba;
    use crate::pipeline::MorphConfig;
    use rand::prelude::*;
    use std::sync::Mutex;

    fn random_grid(side: u32, seed: u64) -> PixelGrid {
        let mut rng = StdRng::seed_from_u64(seed);
        let colors: Vec<Rgba> = (0..side * side)
            .map(|_| {
                Rgba::opaque(
                    rng.gen_range(0..=255u8),
                    rng.gen_range(0..=255u8),
                    rng.gen_range(0..=255u8),
                )
            })
            .collect();
        PixelGrid::from_colors(side, &colors).unwrap()
    }

    #[tokio::test]
    async fn parallel_conversion_matches_sequential() {
        let grid = random_grid(70, 11);
        let samples: Arc<[PixelSample]> = grid.samples().to_vec().into();

        let parallel = convert_parallel(Arc::clone(&samples)).await.unwrap();
        assert_eq!(parallel, convert_all(&samples));
    }

    #[tokio::test]
    async fn parallel_conversion_of_nothing_is_empty() {
        let samples: Arc<[PixelSample]> = Vec::<PixelSample>::new().into();
        assert!(convert_parallel(samples).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn background_run_matches_synchronous_run() {
        let source = random_grid(24, 1);
        let target = random_grid(24, 2);
        let pipeline = MorphPipeline::new(MorphConfig::default()).unwrap();

        let expected = pipeline.run(&source, &target);
        let report = match_in_background(pipeline, source, target).await.unwrap();
        assert_eq!(report, expected);
    }

    #[tokio::test]
    async fn chunked_run_matches_synchronous_run() {
        let source = random_grid(40, 3);
        let target = random_grid(40, 4);
        let engine = CorrespondenceEngine::default();
        let expected = engine.correspond(source.samples(), target.samples());

        let cancellable = CancellableMatch::new(engine, 97);
        let result = cancellable.run_grids(source, target).await.unwrap();
        assert_eq!(result, expected);
    }

    #[tokio::test]
    async fn cancelled_run_stops_with_an_error() {
        let cancellable = CancellableMatch::new(CorrespondenceEngine::default(), 16);
        cancellable.cancel_handle().cancel();

        let result = cancellable.run_grids(random_grid(8, 5), random_grid(8, 6)).await;
        assert!(matches!(result, Err(MorphError::Cancelled { processed: 0 })));
    }

    #[tokio::test]
    async fn cancelling_mid_run_stops_at_the_next_chunk() {
        let cancellable = CancellableMatch::new(CorrespondenceEngine::default(), 5);
        let cancel = cancellable.cancel_handle();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let cancellable = cancellable.with_progress(move |processed, total| {
            log.lock().unwrap().push((processed, total));
            if processed >= 10 {
                cancel.cancel();
            }
        });

        let result = cancellable.run_grids(random_grid(16, 7), random_grid(16, 8)).await;

        assert!(matches!(result, Err(MorphError::Cancelled { processed: 10 })));
        assert_eq!(*seen.lock().unwrap(), vec![(5, 256), (10, 256)]);
    }

    #[tokio::test]
    async fn progress_reaches_the_total_when_not_cancelled() {
        let last = Arc::new(Mutex::new(None));
        let log = Arc::clone(&last);
        let cancellable = CancellableMatch::new(CorrespondenceEngine::default(), 30)
            .with_progress(move |processed, total| *log.lock().unwrap() = Some((processed, total)));

        let result = cancellable.run_grids(random_grid(10, 9), random_grid(10, 10)).await.unwrap();

        assert_eq!(result.records.len(), 100);
        assert_eq!(*last.lock().unwrap(), Some((100, 100)));
    }
}
