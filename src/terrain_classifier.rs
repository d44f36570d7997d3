use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

use crate::error::{MapError, Result, Stage};
use crate::geometry::{Coord, NEIGHBORHOOD};
use crate::grid::{Grid, Terrain};
use crate::settings::GenerationSettings;

/// Fixed-point factor for smoothed values. Means of a sparse field mostly round
/// to a handful of integers, which would leave the mountain histogram with a
/// few huge buckets.
pub const SMOOTHING_SCALE: i32 = 64;

/// Min and max smoothed value seen on each side of the coast, in
/// [`SMOOTHING_SCALE`] units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Extremes {
    pub land: Option<(i32, i32)>,
    pub sea: Option<(i32, i32)>,
}

impl Extremes {
    fn record(range: &mut Option<(i32, i32)>, value: i32) {
        *range = Some(match *range {
            Some((lo, hi)) => (lo.min(value), hi.max(value)),
            None => (value, value),
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Land cells counted right after the sea/land split, mountains included
    pub land_cells: usize,
    pub sea_cells: usize,
    pub mountain_cells: usize,
    /// Highest elevation turned into mountain, if any
    pub mountain_threshold: Option<i32>,
    /// Sign flips made by isolation repair
    pub flips: usize,
    pub extremes: Extremes,
}

/// Turns the signed field held in `grid` into sea, land and mountains with
/// elevations in 0..=255.
pub fn classify(
    grid: &mut Grid,
    settings: &GenerationSettings,
    rng: &mut impl Rng,
) -> Result<Classification> {
    let flips = repair_isolated(grid, settings.max_iterations)?;
    let (land_cells, sea_cells) = split_sea_land(grid);
    info!(
        "Land: {} Sea: {} Land%: {}",
        land_cells,
        sea_cells,
        land_cells * 100 / grid.len().max(1)
    );

    let extremes = smooth(grid, settings.max_value, rng);
    normalize(grid, &extremes);
    let (mountain_threshold, mountain_cells) =
        raise_mountains(grid, land_cells, settings.mountain_percentage);
    debug!(?extremes, ?mountain_threshold, mountain_cells, "classified");

    Ok(Classification {
        land_cells,
        sea_cells,
        mountain_cells,
        mountain_threshold,
        flips,
        extremes,
    })
}

/// Flips every cell whose sign disagrees with the sum of its neighborhood,
/// pass after pass, until a pass flips nothing.
pub fn repair_isolated(grid: &mut Grid, max_passes: usize) -> Result<usize> {
    let mut flips = 0;
    for _ in 0..max_passes {
        let mut flipped = false;
        for row in 0..grid.height() {
            for col in 0..grid.width() {
                let around: i32 = grid
                    .neighbors((row, col), &NEIGHBORHOOD)
                    .map(|n| grid.get(n).value)
                    .sum();
                let cell = grid.get_mut((row, col));
                if around.signum() * cell.value.signum() < 0 {
                    cell.value = -cell.value;
                    flips += 1;
                    flipped = true;
                }
            }
        }
        if !flipped {
            return Ok(flips);
        }
    }
    Err(MapError::NonConvergent {
        stage: Stage::IsolationRepair,
        iterations: max_passes,
    })
}

/// Non-positive cells become sea holding their magnitude, the rest land.
/// Returns (land, sea) counts.
pub fn split_sea_land(grid: &mut Grid) -> (usize, usize) {
    let (mut land, mut sea) = (0, 0);
    for row in 0..grid.height() {
        for col in 0..grid.width() {
            let cell = grid.get_mut((row, col));
            if cell.value <= 0 {
                cell.terrain = Terrain::Sea;
                cell.value = -cell.value;
                sea += 1;
            } else {
                cell.terrain = Terrain::Land;
                land += 1;
            }
        }
    }
    (land, sea)
}

/// Replaces each value, in random order, with the mean of itself and its
/// neighborhood, capped below `max_value`. Values come out in
/// [`SMOOTHING_SCALE`] fixed point.
pub fn smooth(grid: &mut Grid, max_value: i32, rng: &mut impl Rng) -> Extremes {
    for coord in grid.coords().collect::<Vec<_>>() {
        grid.get_mut(coord).value *= SMOOTHING_SCALE;
    }
    let cap = (max_value - 1) * SMOOTHING_SCALE;

    let mut extremes = Extremes::default();
    let mut rows: Vec<usize> = (0..grid.height()).collect();
    rows.shuffle(rng);
    for row in rows {
        let mut cols: Vec<usize> = (0..grid.width()).collect();
        cols.shuffle(rng);
        for col in cols {
            let coord: Coord = (row, col);
            let sum: i32 = grid.get(coord).value
                + grid
                    .neighbors(coord, &NEIGHBORHOOD)
                    .map(|n| grid.get(n).value)
                    .sum::<i32>();
            let cell = grid.get_mut(coord);
            cell.value = (sum / (1 + NEIGHBORHOOD.len() as i32)).min(cap);
            match cell.terrain {
                Terrain::Land => Extremes::record(&mut extremes.land, cell.value),
                Terrain::Sea => Extremes::record(&mut extremes.sea, cell.value),
                _ => {}
            }
        }
    }
    extremes
}

/// Rescales land and sea values separately onto 0..=255.
pub fn normalize(grid: &mut Grid, extremes: &Extremes) {
    let top = |range: Option<(i32, i32)>| range.map_or(0, |(_, hi)| hi);
    let (land_max, sea_max) = (top(extremes.land), top(extremes.sea));
    for row in 0..grid.height() {
        for col in 0..grid.width() {
            let cell = grid.get_mut((row, col));
            let max = match cell.terrain {
                Terrain::Land => land_max,
                Terrain::Sea => sea_max,
                _ => continue,
            };
            cell.value = if max > 0 { cell.value * 255 / max } else { 0 };
        }
    }
}

/// Turns the lowest `percentage` of land into mountains, judged on a 256-bucket
/// histogram of land elevations. Returns the threshold and the mountain count.
pub fn raise_mountains(grid: &mut Grid, land_cells: usize, percentage: usize) -> (Option<i32>, usize) {
    if percentage == 0 || land_cells == 0 {
        return (None, 0);
    }

    let mut histogram = [0usize; 256];
    for cell in grid.cells().filter(|c| c.terrain == Terrain::Land) {
        histogram[cell.value.clamp(0, 255) as usize] += 1;
    }

    let quota = land_cells * percentage / 100;
    let mut seen = 0;
    let mut threshold = None;
    for (elevation, count) in histogram.iter().enumerate() {
        seen += count;
        if seen >= quota {
            threshold = Some(elevation as i32);
            break;
        }
    }
    let Some(threshold) = threshold else {
        return (None, 0);
    };

    let mut mountains = 0;
    for row in 0..grid.height() {
        for col in 0..grid.width() {
            let cell = grid.get_mut((row, col));
            if cell.terrain == Terrain::Land && cell.value <= threshold {
                cell.terrain = Terrain::Mountain;
                mountains += 1;
            }
        }
    }
    (Some(threshold), mountains)
}
