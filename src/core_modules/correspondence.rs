// THEORY:
// The correspondence engine turns two pixel sets into a bijection: every
// source pixel is assigned to exactly one target position, greedily, so that
// each target gets a perceptually close source color.
//
// Algorithm, per target pixel in target scan order:
// 1.  Quantize the target's Lab coordinate to its home cell in the bucket index.
// 2.  Grow a search radius from 0. At each radius scan the shell of cells at
//     that Chebyshev distance and keep the unmatched source with the smallest
//     squared Lab distance (first seen wins ties).
// 3.  Stop at the first radius that yields any candidate and take the best one
//     found there. A closer color one cell further out is deliberately not
//     considered; this is a locality heuristic, not a global optimum.
// 4.  If nothing is found up to the maximum radius, take the next unconsumed
//     source in scan order from a cursor that only ever moves forward.
// 5.  Mark the chosen source consumed, drop it from the index, emit a record.
//
// All run state (index, consumed flags, fallback cursor) lives in a `MatchRun`
// that is created per call and dropped afterwards. Nothing is shared between
// runs, so independent callers can match concurrently without locking.

use crate::core_modules::bucket_index::{BucketIndex, DEFAULT_RESOLUTION};
use crate::core_modules::lab::lab::{convert_all, Lab};
use crate::core_modules::pixel::pixel::{PixelSample, Position, Rgba};
use crate::error::{MorphError, Result};
use serde::{Deserialize, Serialize};

/// Tunables for the correspondence engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Cells per Lab axis (R).
    pub resolution: usize,
    /// Largest search radius, in cells. `None` searches up to R-1, which covers
    /// the whole grid from any home cell.
    pub max_search_radius: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
            max_search_radius: None,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.resolution == 0 {
            return Err(MorphError::InvalidResolution(self.resolution));
        }
        if let Some(radius) = self.max_search_radius {
            if radius >= self.resolution {
                return Err(MorphError::InvalidSearchRadius {
                    radius,
                    resolution: self.resolution,
                });
            }
        }
        Ok(())
    }

    pub fn effective_max_radius(&self) -> usize {
        self.max_search_radius
            .unwrap_or(self.resolution.saturating_sub(1))
    }
}

/// One matched pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrespondenceRecord {
    pub source_index: usize,
    pub target_index: usize,
    pub source_position: Position,
    pub target_position: Position,
    pub source_color: Rgba,
}

/// Source and target counts differed; only `min` of them were paired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeMismatch {
    pub source_count: usize,
    pub target_count: usize,
}

impl SizeMismatch {
    pub fn detect(source_count: usize, target_count: usize) -> Option<Self> {
        (source_count != target_count).then_some(Self {
            source_count,
            target_count,
        })
    }

    pub fn paired(&self) -> usize {
        self.source_count.min(self.target_count)
    }

    pub fn unmatched_sources(&self) -> usize {
        self.source_count - self.paired()
    }

    pub fn unmatched_targets(&self) -> usize {
        self.target_count - self.paired()
    }
}

/// How one pair was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MatchMethod {
    /// Found by the color search at this radius.
    Search { radius: usize },
    /// Handed out by the scan-order fallback.
    Fallback,
    /// Paired by brightness rank; no search took place.
    Rank,
}

/// Counters for one run. Each match is counted in exactly one of
/// `fallback_matches`, `rank_matches` or the searched remainder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchStats {
    pub matched: usize,
    /// Matches made by the scan-order fallback rather than the color search.
    pub fallback_matches: usize,
    /// Matches made by brightness rank. Always zero for the perceptual engine.
    pub rank_matches: usize,
    /// Largest radius at which the color search found its candidate. Only
    /// searched matches contribute.
    pub max_radius_used: usize,
    pub total_distance_squared: f64,
}

impl MatchStats {
    pub fn mean_distance_squared(&self) -> f64 {
        if self.matched == 0 {
            0.0
        } else {
            self.total_distance_squared / self.matched as f64
        }
    }

    /// Matches found by the color search.
    pub fn searched_matches(&self) -> usize {
        self.matched - self.fallback_matches - self.rank_matches
    }

    pub(crate) fn record(&mut self, distance_squared: f64, method: MatchMethod) {
        self.matched += 1;
        self.total_distance_squared += distance_squared;
        match method {
            MatchMethod::Search { radius } => self.max_radius_used = self.max_radius_used.max(radius),
            MatchMethod::Fallback => self.fallback_matches += 1,
            MatchMethod::Rank => self.rank_matches += 1,
        }
    }
}

/// The output of a matching run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Correspondence {
    /// One record per paired target, in target scan order.
    pub records: Vec<CorrespondenceRecord>,
    pub stats: MatchStats,
    pub size_mismatch: Option<SizeMismatch>,
}

/// The greedy perceptual matcher. Holds only configuration; every call builds
/// its own `MatchRun`.
#[derive(Debug, Clone, Default)]
pub struct CorrespondenceEngine {
    config: EngineConfig,
}

impl CorrespondenceEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Matches every target (up to the shorter side) to a source pixel.
    pub fn correspond(&self, source: &[PixelSample], target: &[PixelSample]) -> Correspondence {
        let mut run = self.start(source, target);
        while run.match_next().is_some() {}
        run.finish()
    }

    /// Like `correspond`, with Lab coordinates already computed (same order as the samples).
    pub fn correspond_lab(
        &self,
        source: &[PixelSample],
        source_lab: Vec<Lab>,
        target: &[PixelSample],
        target_lab: Vec<Lab>,
    ) -> Result<Correspondence> {
        let mut run = self.start_with_lab(source, source_lab, target, target_lab)?;
        while run.match_next().is_some() {}
        Ok(run.finish())
    }

    pub fn start<'a>(&self, source: &'a [PixelSample], target: &'a [PixelSample]) -> MatchRun<'a> {
        MatchRun::new(&self.config, source, convert_all(source), target, convert_all(target))
    }

    /// Fails if either Lab vector does not have one entry per sample.
    pub fn start_with_lab<'a>(
        &self,
        source: &'a [PixelSample],
        source_lab: Vec<Lab>,
        target: &'a [PixelSample],
        target_lab: Vec<Lab>,
    ) -> Result<MatchRun<'a>> {
        check_lab_len("source Lab points", source, &source_lab)?;
        check_lab_len("target Lab points", target, &target_lab)?;
        Ok(MatchRun::new(&self.config, source, source_lab, target, target_lab))
    }
}

fn check_lab_len(what: &'static str, samples: &[PixelSample], lab: &[Lab]) -> Result<()> {
    if samples.len() != lab.len() {
        return Err(MorphError::CountMismatch {
            what,
            expected: samples.len(),
            actual: lab.len(),
        });
    }
    Ok(())
}

/// The state of one matching run: the bucket index, per-source consumed
/// flags and the fallback cursor.
pub struct MatchRun<'a> {
    source: &'a [PixelSample],
    target: &'a [PixelSample],
    source_lab: Vec<Lab>,
    target_lab: Vec<Lab>,
    index: BucketIndex,
    consumed: Vec<bool>,
    fallback_cursor: usize,
    next_target: usize,
    pair_count: usize,
    max_radius: usize,
    records: Vec<CorrespondenceRecord>,
    stats: MatchStats,
    size_mismatch: Option<SizeMismatch>,
}

impl<'a> MatchRun<'a> {
    fn new(
        config: &EngineConfig,
        source: &'a [PixelSample],
        source_lab: Vec<Lab>,
        target: &'a [PixelSample],
        target_lab: Vec<Lab>,
    ) -> Self {
        let size_mismatch = SizeMismatch::detect(source.len(), target.len());
        if let Some(mismatch) = size_mismatch {
            tracing::warn!(
                source_count = mismatch.source_count,
                target_count = mismatch.target_count,
                paired = mismatch.paired(),
                "source and target pixel counts differ; excess pixels stay unmatched"
            );
        }

        let pair_count = source.len().min(target.len());
        let index = BucketIndex::build(config.resolution, &source_lab);

        Self {
            source,
            target,
            source_lab,
            target_lab,
            index,
            consumed: vec![false; source.len()],
            fallback_cursor: 0,
            next_target: 0,
            pair_count,
            max_radius: config.effective_max_radius(),
            records: Vec::with_capacity(pair_count),
            stats: MatchStats::default(),
            size_mismatch,
        }
    }

    /// Matches the next target in scan order. `None` once every pair is made.
    pub fn match_next(&mut self) -> Option<CorrespondenceRecord> {
        if self.next_target >= self.pair_count {
            return None;
        }
        let target_index = self.next_target;
        let target_lab = self.target_lab[target_index];

        let (source_index, method) = match self.nearest_unmatched(&target_lab) {
            Some((id, radius)) => (id, MatchMethod::Search { radius }),
            None => (self.next_by_scan_order()?, MatchMethod::Fallback),
        };
        self.next_target += 1;

        self.consumed[source_index] = true;
        self.index.remove(source_index);
        self.stats.record(
            self.source_lab[source_index].distance_squared(&target_lab),
            method,
        );

        let record = CorrespondenceRecord {
            source_index,
            target_index,
            source_position: self.source[source_index].position,
            target_position: self.target[target_index].position,
            source_color: self.source[source_index].color,
        };
        self.records.push(record);
        Some(record)
    }

    /// Processes up to `max_targets` targets; returns how many were matched.
    pub fn run_chunk(&mut self, max_targets: usize) -> usize {
        let mut matched = 0;
        while matched < max_targets && self.match_next().is_some() {
            matched += 1;
        }
        matched
    }

    pub fn is_complete(&self) -> bool {
        self.next_target >= self.pair_count
    }

    pub fn processed(&self) -> usize {
        self.next_target
    }

    pub fn remaining(&self) -> usize {
        self.pair_count - self.next_target
    }

    pub fn finish(self) -> Correspondence {
        tracing::info!(
            sources = self.source.len(),
            targets = self.target.len(),
            resolution = self.index.resolution(),
            matched = self.stats.matched,
            fallback = self.stats.fallback_matches,
            max_radius = self.stats.max_radius_used,
            "correspondence complete"
        );
        Correspondence {
            records: self.records,
            stats: self.stats,
            size_mismatch: self.size_mismatch,
        }
    }

    /// Best unmatched source at the smallest radius that has any, with that radius.
    fn nearest_unmatched(&self, target: &Lab) -> Option<(usize, usize)> {
        if self.index.is_empty() {
            return None;
        }
        let home = self.index.key_for(target);
        let last_radius = self.max_radius.min(self.index.reach(home));

        for radius in 0..=last_radius {
            let mut best: Option<(usize, f64)> = None;
            self.index.for_each_in_shell(home, radius, |id| {
                debug_assert!(!self.consumed[id]);
                let distance = self.source_lab[id].distance_squared(target);
                if best.is_none_or(|(_, best_distance)| distance < best_distance) {
                    best = Some((id, distance));
                }
            });
            if let Some((id, _)) = best {
                if radius > 0 {
                    tracing::trace!(target_index = self.next_target, radius, "search widened");
                }
                return Some((id, radius));
            }
        }
        None
    }

    fn next_by_scan_order(&mut self) -> Option<usize> {
        while self.fallback_cursor < self.consumed.len() {
            let candidate = self.fallback_cursor;
            self.fallback_cursor += 1;
            if !self.consumed[candidate] {
                return Some(candidate);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::pixel::pixel::PixelGrid;

    fn grid(side: u32, colors: &[(u8, u8, u8)]) -> PixelGrid {
        let colors: Vec<Rgba> = colors.iter().map(|&(r, g, b)| Rgba::opaque(r, g, b)).collect();
        PixelGrid::from_colors(side, &colors).unwrap()
    }

    #[test]
    fn config_validation() {
        assert!(EngineConfig::default().validate().is_ok());
        assert!(matches!(
            CorrespondenceEngine::new(EngineConfig {
                resolution: 0,
                max_search_radius: None
            }),
            Err(MorphError::InvalidResolution(0))
        ));
        assert!(matches!(
            CorrespondenceEngine::new(EngineConfig {
                resolution: 12,
                max_search_radius: Some(12)
            }),
            Err(MorphError::InvalidSearchRadius {
                radius: 12,
                resolution: 12
            })
        ));
        assert_eq!(EngineConfig::default().effective_max_radius(), 11);
    }

    #[test]
    fn exact_colors_are_found_at_radius_zero() {
        let source = grid(2, &[(255, 0, 0), (0, 255, 0), (0, 0, 255), (255, 255, 255)]);
        let target = grid(2, &[(255, 255, 255), (0, 0, 255), (0, 255, 0), (255, 0, 0)]);
        let result = CorrespondenceEngine::default().correspond(source.samples(), target.samples());

        let sources: Vec<usize> = result.records.iter().map(|r| r.source_index).collect();
        assert_eq!(sources, vec![3, 2, 1, 0]);
        assert_eq!(result.stats.matched, 4);
        assert_eq!(result.stats.fallback_matches, 0);
        assert_eq!(result.stats.max_radius_used, 0);
        assert_eq!(result.stats.total_distance_squared, 0.0);
        assert!(result.size_mismatch.is_none());
    }

    #[test]
    fn search_stops_at_first_nonempty_radius() {
        // Target is mid gray. One source sits in the neighbouring L cell but
        // is a strong red; the other is a gray two L cells away. The red
        // wins because its shell is reached first, even though the far gray
        // is perceptually closer.
        let engine = CorrespondenceEngine::default();
        let target_lab = vec![Lab::new(54.0, 0.0, 0.0)];
        let near_red = Lab::new(62.0, 40.0, 0.0);
        let far_gray = Lab::new(71.0, 0.0, 0.0);
        let index = BucketIndex::build(12, &[near_red, far_gray]);
        let home = index.key_for(&target_lab[0]);
        assert_eq!(index.key_for(&near_red).l, home.l + 1);
        assert_eq!(index.key_for(&far_gray).l, home.l + 2);
        assert!(target_lab[0].distance_squared(&far_gray) < target_lab[0].distance_squared(&near_red));

        let placeholder = |x| PixelSample::new(Position::new(x, 0), Rgba::default());
        let source = [placeholder(0), placeholder(1)];
        let target = [placeholder(0)];
        let result = engine
            .correspond_lab(&source, vec![near_red, far_gray], &target, target_lab)
            .unwrap();

        assert_eq!(result.records[0].source_index, 0);
        assert_eq!(result.stats.max_radius_used, 1);
    }

    #[test]
    fn precomputed_lab_of_wrong_length_is_rejected() {
        let engine = CorrespondenceEngine::default();
        let source = grid(1, &[(10, 20, 30)]).into_samples();
        let pair = grid(2, &[(1, 1, 1), (2, 2, 2), (3, 3, 3), (4, 4, 4)]).into_samples();
        let (s, t) = (&pair[..2], &pair[2..]);

        let short_source = engine.correspond_lab(s, vec![Lab::default()], t, vec![Lab::default(); 2]);
        assert!(matches!(
            short_source,
            Err(MorphError::CountMismatch {
                what: "source Lab points",
                expected: 2,
                actual: 1
            })
        ));

        let long_target = engine.start_with_lab(s, convert_all(s), t, vec![Lab::default(); 3]);
        assert!(matches!(
            long_target,
            Err(MorphError::CountMismatch {
                what: "target Lab points",
                expected: 2,
                actual: 3
            })
        ));

        let matched = engine
            .correspond_lab(&source, convert_all(&source), &source, convert_all(&source))
            .unwrap();
        assert_eq!(matched.records.len(), 1);
    }

    #[test]
    fn ties_go_to_the_first_candidate_in_cell_order() {
        let source = grid(2, &[(9, 9, 9), (9, 9, 9), (9, 9, 9), (9, 9, 9)]);
        let target = grid(2, &[(9, 9, 9), (9, 9, 9), (9, 9, 9), (9, 9, 9)]);
        let result = CorrespondenceEngine::default().correspond(source.samples(), target.samples());

        // Cell starts [0,1,2,3]; taking 0 swap-removes 3 into its slot.
        let sources: Vec<usize> = result.records.iter().map(|r| r.source_index).collect();
        assert_eq!(sources, vec![0, 3, 2, 1]);
    }

    #[test]
    fn bounded_radius_falls_back_to_scan_order() {
        let source = grid(2, &[(0, 0, 0), (1, 1, 1), (2, 2, 2), (3, 3, 3)]);
        let target = grid(2, &[(255, 255, 255), (250, 250, 250), (0, 0, 0), (245, 245, 245)]);
        let engine = CorrespondenceEngine::new(EngineConfig {
            resolution: 12,
            max_search_radius: Some(2),
        })
        .unwrap();
        let result = engine.correspond(source.samples(), target.samples());

        let sources: Vec<usize> = result.records.iter().map(|r| r.source_index).collect();
        // Targets 0 and 1 fall back to sources 0 and 1; target 2 (black) is
        // found by search among {2,3}; target 3 falls back past consumed ids.
        assert_eq!(sources[0], 0);
        assert_eq!(sources[1], 1);
        assert!(sources[2] == 2 || sources[2] == 3);
        assert_eq!(result.stats.fallback_matches, 3);
        assert_eq!(result.stats.searched_matches(), 1);
        assert_eq!(result.stats.rank_matches, 0);
        let mut sorted = sources.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3]);
    }

    #[test]
    fn run_chunk_matches_in_steps() {
        let source = grid(2, &[(10, 0, 0), (0, 10, 0), (0, 0, 10), (10, 10, 10)]);
        let target = grid(2, &[(0, 0, 10), (10, 10, 10), (10, 0, 0), (0, 10, 0)]);
        let engine = CorrespondenceEngine::default();

        let mut run = engine.start(source.samples(), target.samples());
        assert_eq!(run.run_chunk(3), 3);
        assert_eq!(run.processed(), 3);
        assert_eq!(run.remaining(), 1);
        assert!(!run.is_complete());
        assert_eq!(run.run_chunk(3), 1);
        assert!(run.is_complete());
        assert!(run.match_next().is_none());

        let stepped = run.finish();
        assert_eq!(stepped, engine.correspond(source.samples(), target.samples()));
    }

    #[test]
    fn unequal_sizes_pair_the_shorter_side() {
        let source = grid(2, &[(10, 0, 0), (0, 10, 0), (0, 0, 10), (10, 10, 10)]);
        let target = grid(1, &[(0, 10, 0)]);
        let result = CorrespondenceEngine::default().correspond(source.samples(), target.samples());

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].source_index, 1);
        let mismatch = result.size_mismatch.expect("mismatch reported");
        assert_eq!(mismatch.paired(), 1);
        assert_eq!(mismatch.unmatched_sources(), 3);
        assert_eq!(mismatch.unmatched_targets(), 0);
    }

    #[test]
    fn empty_inputs_produce_no_records() {
        let result = CorrespondenceEngine::default().correspond(&[], &[]);
        assert!(result.records.is_empty());
        assert_eq!(result.stats, MatchStats::default());
        assert_eq!(result.stats.mean_distance_squared(), 0.0);
    }
}
