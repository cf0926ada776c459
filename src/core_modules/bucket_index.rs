// THEORY:
// The `BucketIndex` is a fixed-resolution 3D grid laid over Lab space. Each of
// its R^3 cells holds the ids of the source pixels that are still unmatched and
// whose color quantizes into that cell. It is built once per matching run and
// only ever shrinks.
//
// Key properties:
// 1.  **Quantization**: each axis is clamped to its nominal range (L to 0..100,
//     a and b to -128..127) and scaled onto 0..R. The top edge folds into R-1.
// 2.  **Exact removal in O(1)**: a cell is a plain `Vec<usize>`. Removing an id
//     swap-removes it and patches the slot of the id that moved into its place,
//     using a per-id location table. Consumed ids never linger in a cell, so a
//     scan only ever sees unmatched candidates.
// 3.  **Shell queries**: `for_each_in_shell` visits the ids in the cells at
//     Chebyshev distance exactly `radius` from a home cell, clamped to the grid,
//     in ascending (l, a, b) order. Growing the radius one step at a time
//     therefore touches every cell at most once per query.

use crate::core_modules::lab::lab::Lab;

pub const DEFAULT_RESOLUTION: usize = 12;

const L_MIN: f64 = 0.0;
const L_MAX: f64 = 100.0;
const AB_MIN: f64 = -128.0;
const AB_MAX: f64 = 127.0;

/// The address of one cell: (L-bucket, a-bucket, b-bucket).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub l: usize,
    pub a: usize,
    pub b: usize,
}

/// Where an indexed id currently lives.
#[derive(Debug, Clone, Copy)]
struct Location {
    cell: usize,
    slot: usize,
}

pub struct BucketIndex {
    resolution: usize,
    cells: Vec<Vec<usize>>,
    /// `Some` while the id is still indexed.
    locations: Vec<Option<Location>>,
    remaining: usize,
}

impl BucketIndex {
    /// Indexes every point; the id of a point is its position in `points`.
    pub fn build(resolution: usize, points: &[Lab]) -> Self {
        let resolution = resolution.max(1);
        let mut index = Self {
            resolution,
            cells: vec![Vec::new(); resolution * resolution * resolution],
            locations: Vec::with_capacity(points.len()),
            remaining: points.len(),
        };

        for (id, point) in points.iter().enumerate() {
            let cell = index.flat(index.key_for(point));
            let bucket = &mut index.cells[cell];
            index.locations.push(Some(Location {
                cell,
                slot: bucket.len(),
            }));
            bucket.push(id);
        }

        tracing::debug!(
            points = points.len(),
            resolution,
            occupied_cells = index.occupied_cells(),
            "bucket index built"
        );
        index
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// The cell a Lab coordinate quantizes into.
    pub fn key_for(&self, lab: &Lab) -> BucketKey {
        BucketKey {
            l: quantize(lab.l, L_MIN, L_MAX, self.resolution),
            a: quantize(lab.a, AB_MIN, AB_MAX, self.resolution),
            b: quantize(lab.b, AB_MIN, AB_MAX, self.resolution),
        }
    }

    fn flat(&self, key: BucketKey) -> usize {
        (key.l * self.resolution + key.a) * self.resolution + key.b
    }

    /// The ids currently held by a cell, in their current in-cell order.
    pub fn cell(&self, key: BucketKey) -> &[usize] {
        &self.cells[self.flat(key)]
    }

    /// Removes an id from its cell. Returns `false` if it was not indexed.
    pub fn remove(&mut self, id: usize) -> bool {
        let Some(Location { cell, slot }) = self.locations.get_mut(id).and_then(Option::take) else {
            return false;
        };

        let bucket = &mut self.cells[cell];
        bucket.swap_remove(slot);
        if let Some(&moved) = bucket.get(slot) {
            self.locations[moved] = Some(Location { cell, slot });
        }
        self.remaining -= 1;
        true
    }

    pub fn contains(&self, id: usize) -> bool {
        matches!(self.locations.get(id), Some(Some(_)))
    }

    /// Number of ids still indexed.
    pub fn len(&self) -> usize {
        self.remaining
    }

    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    pub fn occupied_cells(&self) -> usize {
        self.cells.iter().filter(|cell| !cell.is_empty()).count()
    }

    /// The largest radius at which a shell around `home` still contains any cell.
    pub fn reach(&self, home: BucketKey) -> usize {
        let last = self.resolution - 1;
        [home.l, home.a, home.b]
            .into_iter()
            .map(|c| c.max(last - c))
            .max()
            .unwrap_or(0)
    }

    /// Visits every id in the cells at Chebyshev distance exactly `radius`
    /// from `home`, in ascending (l, a, b) cell order.
    pub fn for_each_in_shell(&self, home: BucketKey, radius: usize, mut visit: impl FnMut(usize)) {
        let last = self.resolution - 1;
        let span = |center: usize| (center.saturating_sub(radius), (center + radius).min(last));
        let (l_lo, l_hi) = span(home.l);
        let (a_lo, a_hi) = span(home.a);
        let (b_lo, b_hi) = span(home.b);

        let mut visit_cell = |l: usize, a: usize, b: usize| {
            for &id in self.cell(BucketKey { l, a, b }) {
                visit(id);
            }
        };

        for l in l_lo..=l_hi {
            let l_on_face = l.abs_diff(home.l) == radius;
            for a in a_lo..=a_hi {
                if l_on_face || a.abs_diff(home.a) == radius {
                    for b in b_lo..=b_hi {
                        visit_cell(l, a, b);
                    }
                } else {
                    // Interior column: only its two b-faces lie on the shell.
                    if home.b >= radius {
                        visit_cell(l, a, home.b - radius);
                    }
                    if home.b + radius <= last {
                        visit_cell(l, a, home.b + radius);
                    }
                }
            }
        }
    }
}

fn quantize(value: f64, min: f64, max: f64, resolution: usize) -> usize {
    let t = (value.clamp(min, max) - min) / (max - min);
    ((t * resolution as f64) as usize).min(resolution - 1)
}
