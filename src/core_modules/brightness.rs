// THEORY:
// Brightness-rank matching is the simple alternative to the perceptual engine:
// sort both pixel sets by Rec. 601 brightness and pair them rank for rank, so
// the darkest source pixel flies to the darkest target position and so on.
// It ignores hue entirely, which makes it cheap (two sorts) and gives the morph
// a recognisable "light flows to light" look.
//
// Sorting is stable, so equally bright pixels keep their scan order and the
// result is deterministic. Records come out in target scan order, the same
// ordering the perceptual engine uses.

use crate::core_modules::correspondence::{
    Correspondence, CorrespondenceRecord, MatchMethod, MatchStats, SizeMismatch,
};
use crate::core_modules::lab::lab::Lab;
use crate::core_modules::pixel::pixel::PixelSample;

fn brightness_order(samples: &[PixelSample]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..samples.len()).collect();
    order.sort_by(|&i, &j| {
        samples[i]
            .color
            .brightness()
            .total_cmp(&samples[j].color.brightness())
    });
    order
}

pub fn correspond_by_brightness(source: &[PixelSample], target: &[PixelSample]) -> Correspondence {
    let size_mismatch = SizeMismatch::detect(source.len(), target.len());
    if let Some(mismatch) = size_mismatch {
        tracing::warn!(
            source_count = mismatch.source_count,
            target_count = mismatch.target_count,
            paired = mismatch.paired(),
            "source and target pixel counts differ; excess pixels stay unmatched"
        );
    }

    let source_order = brightness_order(source);
    let target_order = brightness_order(target);

    let mut pairs: Vec<(usize, usize)> = target_order
        .into_iter()
        .zip(source_order)
        .collect();
    pairs.sort_unstable_by_key(|&(target_index, _)| target_index);

    let mut stats = MatchStats::default();
    let records = pairs
        .into_iter()
        .map(|(target_index, source_index)| {
            let from = source[source_index];
            let to = target[target_index];
            stats.record(
                Lab::from(from.color).distance_squared(&Lab::from(to.color)),
                MatchMethod::Rank,
            );
            CorrespondenceRecord {
                source_index,
                target_index,
                source_position: from.position,
                target_position: to.position,
                source_color: from.color,
            }
        })
        .collect();

    tracing::info!(
        sources = source.len(),
        targets = target.len(),
        matched = stats.matched,
        "brightness-rank correspondence complete"
    );

    Correspondence {
        records,
        stats,
        size_mismatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::pixel::pixel::{PixelGrid, Rgba};

    fn gray_grid(side: u32, levels: &[u8]) -> PixelGrid {
        let colors: Vec<Rgba> = levels.iter().map(|&v| Rgba::opaque(v, v, v)).collect();
        PixelGrid::from_colors(side, &colors).unwrap()
    }

    #[test]
    fn pairs_by_brightness_rank() {
        let source = gray_grid(2, &[200, 10, 90, 250]);
        let target = gray_grid(2, &[0, 255, 100, 50]);
        let result = correspond_by_brightness(source.samples(), target.samples());

        let pairs: Vec<(usize, usize)> = result
            .records
            .iter()
            .map(|r| (r.target_index, r.source_index))
            .collect();
        // target ranks: 0 < 3 < 2 < 1 ; source ranks: 1 < 2 < 0 < 3
        assert_eq!(pairs, vec![(0, 1), (1, 3), (2, 0), (3, 2)]);
        assert_eq!(result.stats.matched, 4);
        assert_eq!(result.stats.rank_matches, 4);
        assert_eq!(result.stats.fallback_matches, 0);
        assert_eq!(result.stats.searched_matches(), 0);
        assert_eq!(result.stats.max_radius_used, 0);
    }

    #[test]
    fn equal_brightness_keeps_scan_order() {
        let source = gray_grid(2, &[7, 7, 7, 7]);
        let target = gray_grid(2, &[7, 7, 7, 7]);
        let result = correspond_by_brightness(source.samples(), target.samples());
        let sources: Vec<usize> = result.records.iter().map(|r| r.source_index).collect();
        assert_eq!(sources, vec![0, 1, 2, 3]);
        assert_eq!(result.stats.total_distance_squared, 0.0);
    }

    #[test]
    fn mismatched_sizes_pair_the_darkest() {
        let source = gray_grid(2, &[200, 10, 90, 250]);
        let target = gray_grid(1, &[128]);
        let result = correspond_by_brightness(source.samples(), target.samples());
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].source_index, 1);
        assert!(result.size_mismatch.is_some());
    }
}
