//! River carving: steepest-ascent walks from mountain sources to the sea.
//!
//! A river is an undo-capable path. The walk advances onto the highest
//! orthogonal neighbor at or above its energy level, backs up when it is
//! boxed in, and stops as soon as it touches sea or another river. It never
//! revisits a cell and never steps next to its own live path, so every
//! finished river is a simple path.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::error::{MapError, Result, Stage};
use crate::geometry::{Coord, ORTHOGONAL};
use crate::grid::{Feature, Grid, Terrain};
use crate::settings::GenerationSettings;

#[derive(Debug, Clone, PartialEq)]
pub struct River {
    /// Every cell the walk ever stepped on, in order
    trail: Vec<Coord>,
    /// Indices into `trail` of the current path, source first
    live: Vec<usize>,
    visited: HashSet<Coord>,
    on_path: HashSet<Coord>,
    /// Energy left; tracks the elevation of the head while the walk moves
    pub level: i32,
}

impl River {
    pub fn new(source: Coord, level: i32) -> Self {
        River {
            trail: vec![source],
            live: vec![0],
            visited: HashSet::from([source]),
            on_path: HashSet::from([source]),
            level,
        }
    }

    pub fn head(&self) -> Coord {
        self.trail[self.live[self.live.len() - 1]]
    }

    pub fn source(&self) -> Coord {
        self.trail[0]
    }

    /// Length of the live path.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn is_live(&self, coord: Coord) -> bool {
        self.on_path.contains(&coord)
    }

    pub fn was_at(&self, coord: Coord) -> bool {
        self.visited.contains(&coord)
    }

    pub fn advance(&mut self, coord: Coord) {
        self.live.push(self.trail.len());
        self.trail.push(coord);
        self.visited.insert(coord);
        self.on_path.insert(coord);
    }

    /// Drops the head from the live path and returns it. The source is never
    /// dropped.
    pub fn retreat(&mut self) -> Option<Coord> {
        if self.live.len() < 2 {
            return None;
        }
        let dropped = self.trail[self.live.pop()?];
        self.on_path.remove(&dropped);
        Some(dropped)
    }

    /// The live path, source first.
    pub fn path(&self) -> Vec<Coord> {
        self.live.iter().map(|&i| self.trail[i]).collect()
    }
}

/// Outcome of looking around the head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Seek {
    /// Sea or another river is one step away
    Mouth,
    Toward(Coord),
    Blocked,
}

fn seek(grid: &Grid, river: &River, rng: &mut impl Rng) -> Seek {
    let head = river.head();
    let mut best: Option<Coord> = None;
    let mut best_level = river.level;

    let mut directions = ORTHOGONAL;
    directions.shuffle(rng);
    for delta in directions {
        let next = grid.offset(head, delta);
        if river.was_at(next) {
            continue;
        }
        let tight = grid
            .neighbors(next, &ORTHOGONAL)
            .any(|around| around != head && river.is_live(around));
        if tight {
            continue;
        }

        let cell = grid.get(next);
        if cell.terrain == Terrain::MapBorder {
            continue;
        }
        if cell.terrain == Terrain::Sea || cell.feature == Feature::River {
            return Seek::Mouth;
        }
        if cell.value >= best_level {
            best = Some(next);
            best_level = cell.value;
        }
    }

    best.map_or(Seek::Blocked, Seek::Toward)
}

/// Picks a fresh source among mountain cells that carry no feature and were
/// never tried before.
fn spawn(grid: &mut Grid, tried: &mut HashSet<Coord>, rng: &mut impl Rng) -> Option<River> {
    let candidates: Vec<Coord> = grid
        .coords()
        .filter(|c| !tried.contains(c))
        .filter(|&c| {
            let cell = grid.get(c);
            cell.terrain == Terrain::Mountain && cell.feature == Feature::None
        })
        .collect();
    let source = *candidates.choose(rng)?;

    tried.insert(source);
    let cell = grid.get_mut(source);
    cell.feature = Feature::River;
    Some(River::new(source, cell.value))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RiverNetwork {
    /// Rivers that reached sea or a confluence
    pub rivers: Vec<River>,
    /// Cells the network was meant to carve
    pub target: usize,
    /// Sum of their path lengths
    pub carved: usize,
    /// Sources that dried up before moving
    pub abandoned: usize,
}

/// Carves rivers one after the other until their total length reaches
/// `river_percentage` of `land_cells`, or until every mountain has been tried
/// as a source. Fails only when there is no mountain to start from.
pub fn carve_rivers(
    grid: &mut Grid,
    land_cells: usize,
    settings: &GenerationSettings,
    rng: &mut impl Rng,
) -> Result<RiverNetwork> {
    let target = land_cells * settings.river_percentage / 100;
    let mut network = RiverNetwork::default();
    if target == 0 {
        info!("River target is zero, no river carved");
        return Ok(network);
    }

    network.target = target;
    let mut tried = HashSet::new();
    let mut river = spawn(grid, &mut tried, rng).ok_or(MapError::NoRiverSource)?;
    let mut steps = 0;
    while network.carved < target {
        steps += 1;
        if steps > settings.max_iterations {
            return Err(MapError::NonConvergent {
                stage: Stage::Rivers,
                iterations: settings.max_iterations,
            });
        }

        match seek(grid, &river, rng) {
            Seek::Mouth => {
                debug!(source = ?river.source(), len = river.len(), "river reached its mouth");
                network.carved += river.len();
                network.rivers.push(river);
                if network.carved >= target {
                    break;
                }
                match spawn(grid, &mut tried, rng) {
                    Some(next) => river = next,
                    None => break,
                }
            }
            Seek::Toward(next) => {
                let climb = grid.get(next).value - grid.get(river.head()).value;
                grid.get_mut(next).feature = Feature::River;
                river.level += climb;
                river.advance(next);
            }
            Seek::Blocked => {
                if let Some(dropped) = river.retreat() {
                    grid.get_mut(dropped).feature = Feature::None;
                    river.level -= grid.get(dropped).value - grid.get(river.head()).value;
                } else if river.level >= 0 {
                    river.level -= 1;
                } else {
                    warn!(source = ?river.source(), "river source dried up");
                    grid.get_mut(river.source()).feature = Feature::None;
                    network.abandoned += 1;
                    match spawn(grid, &mut tried, rng) {
                        Some(next) => river = next,
                        None => break,
                    }
                }
            }
        }
    }

    if network.carved < target {
        warn!(
            "River target {} not reached, every mountain source was tried",
            target
        );
    }
    info!(
        "{} rivers: {} cells carved, {} sources abandoned",
        network.rivers.len(),
        network.carved,
        network.abandoned
    );
    Ok(network)
}
