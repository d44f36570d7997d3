//! Particle automaton that forms the signed elevation field.
//!
//! Positive and negative particles share one grid. Within a frame every occupied
//! cell is a unit of work on the rayon pool: it feels the same-signed cells around
//! it, walks toward them and either annihilates with an opposite-signed cell,
//! migrates into an empty one, or exchanges with a random neighbor. Workers touch
//! neighbors through relaxed atomics without any other coordination, so a frame's
//! outcome depends on scheduling. Every mutation is a paired subtract/add of the
//! same amount, which keeps the total signed mass exact regardless.
//!
//! Migration and exchange both grow the mover by one unit and leave an opposite
//! unit behind. Once a frame is done, whatever a cell holds beyond `max_value`
//! spills onto cells with room, so the field stays within `±max_value`.

use std::sync::atomic::{AtomicI32, Ordering};

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::geometry::{self, same_sign, AxisWrap, Coord, NEIGHBORHOOD};
use crate::settings::{FormationMode, GenerationSettings};

/// What a cell did during one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Move {
    /// Empty cell, nothing to do
    Idle,
    /// Both cells lost one unit
    Annihilated(Coord),
    /// The mover shifted into an empty cell, grown by one, leaving one opposite
    /// unit behind
    Migrated(Coord),
    /// Random move: the target took the mover's value plus one
    Exchanged(Coord),
    /// Surrounded by its own sign
    Stuck,
}

/// What a frame did, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub annihilations: usize,
    /// Units moved off cells that went past `max_value`
    pub spilled: i64,
}

pub struct ParticleField {
    height: usize,
    width: usize,
    wrap: AxisWrap,
    cells: Vec<AtomicI32>,
}

impl ParticleField {
    pub fn new(height: usize, width: usize, wrap: AxisWrap) -> Self {
        Self::from_values(height, width, wrap, &vec![0; height * width])
    }

    pub fn from_values(height: usize, width: usize, wrap: AxisWrap, values: &[i32]) -> Self {
        ParticleField {
            height,
            width,
            wrap,
            cells: values.iter().map(|&v| AtomicI32::new(v)).collect(),
        }
    }

    pub fn value(&self, coord: Coord) -> i32 {
        self.cells[self.index(coord)].load(Ordering::Relaxed)
    }

    pub fn values(&self) -> Vec<i32> {
        self.cells.iter().map(|c| c.load(Ordering::Relaxed)).collect()
    }

    pub fn into_values(self) -> Vec<i32> {
        self.cells.into_iter().map(AtomicI32::into_inner).collect()
    }

    pub fn signed_mass(&self) -> i64 {
        self.cells
            .iter()
            .map(|c| c.load(Ordering::Relaxed) as i64)
            .sum()
    }

    pub fn absolute_mass(&self) -> i64 {
        self.cells
            .iter()
            .map(|c| (c.load(Ordering::Relaxed) as i64).abs())
            .sum()
    }

    /// Drops `spawn_power` deposits of `max_value` along a random walk, skipping
    /// cells already occupied. Returns the number of deposits that landed.
    pub fn deposit_seeds(&self, max_value: i32, spawn_power: usize, rng: &mut impl Rng) -> usize {
        let mut at = (rng.gen_range(0..self.height), rng.gen_range(0..self.width));
        let mut placed = 0;
        for _ in 0..spawn_power {
            let cell = &self.cells[self.index(at)];
            if cell.load(Ordering::Relaxed) == 0 {
                cell.store(max_value, Ordering::Relaxed);
                placed += 1;
            }
            at = self.shift(at, rng.gen_range(0..max_value), rng.gen_range(0..max_value));
        }
        placed
    }

    /// Processes every cell once, in a shuffled order, then spills the excess.
    /// All work of the frame has finished when this returns.
    pub fn run_frame(&self, max_value: i32, parallel: bool, rng: &mut ChaCha8Rng) -> FrameReport {
        let mut order: Vec<usize> = (0..self.cells.len()).collect();
        order.shuffle(rng);
        let frame_seed: u64 = rng.gen();

        let work = |&index: &usize| {
            let mut cell_rng = ChaCha8Rng::seed_from_u64(frame_seed.wrapping_add(index as u64));
            self.advance_cell(
                (index / self.width, index % self.width),
                max_value,
                &mut cell_rng,
            )
        };
        let annihilated = |m: &Move| matches!(m, Move::Annihilated(_));

        let annihilations = if parallel {
            order.par_iter().map(work).filter(annihilated).count()
        } else {
            order.iter().map(work).filter(annihilated).count()
        };
        FrameReport {
            annihilations,
            spilled: self.spill_excess(max_value),
        }
    }

    /// Moves whatever a cell holds beyond `max_value` onto cells with room:
    /// its neighborhood first, in table order, then the first cells of the grid.
    /// Returns the number of units moved.
    pub fn spill_excess(&self, max_value: i32) -> i64 {
        let mut moved = 0;
        for index in 0..self.cells.len() {
            let coord = (index / self.width, index % self.width);
            let sign = self.value(coord).signum();
            if self.value(coord).abs() <= max_value {
                continue;
            }

            let near = NEIGHBORHOOD
                .iter()
                .map(|&(dy, dx)| self.shift(coord, dy as i32, dx as i32));
            let anywhere = (0..self.cells.len()).map(|i| (i / self.width, i % self.width));
            for target in near.chain(anywhere) {
                let excess = self.value(coord).abs() - max_value;
                if excess <= 0 {
                    break;
                }
                let room = max_value - self.value(target) * sign;
                if target == coord || room <= 0 {
                    continue;
                }
                let amount = excess.min(room);
                self.transfer(coord, target, amount * sign);
                moved += amount as i64;
            }
        }
        moved
    }

    /// One unit of work for the particle stack at `coord`.
    pub fn advance_cell(&self, coord: Coord, max_value: i32, rng: &mut impl Rng) -> Move {
        let c = self.value(coord);
        if c == 0 {
            return Move::Idle;
        }
        let sign = c.signum();

        // larger stacks look further; the truncating remainder makes the radius
        // negative (no pull at all) for most negative stacks
        let dist = (c * 2 + max_value) % max_value;
        let (mut dy, mut dx) = self.pull(coord, c, dist);
        let (ry, rx) = (dy.abs(), dx.abs());
        if c < 0 {
            dy /= -c;
            dx /= -c;
        } else if dist > 0 {
            dy /= dist;
            dx /= dist;
        }

        let mut target = self.shift(coord, dy, dx);
        while (dy != 0 || dx != 0) && same_sign(self.value(target), c) {
            if rng.gen_range(0..ry + rx) < ry {
                dy -= dy.signum();
            } else {
                dx -= dx.signum();
            }
            target = self.shift(coord, dy, dx);
        }

        if dy != 0 || dx != 0 {
            let t = self.value(target);
            if t == 0 {
                self.transfer(coord, target, c + sign);
                return Move::Migrated(target);
            }
            if !same_sign(t, c) {
                self.transfer(coord, target, sign);
                return Move::Annihilated(target);
            }
        }

        let mut directions = NEIGHBORHOOD;
        directions.shuffle(rng);
        for (ddy, ddx) in directions {
            let target = self.shift(coord, ddy as i32, ddx as i32);
            let t = self.value(target);
            if !same_sign(t, c) {
                self.transfer(coord, target, c + sign - t);
                return Move::Exchanged(target);
            }
        }
        Move::Stuck
    }

    /// Sum of offsets to same-signed cells strictly inside radius `dist`. An
    /// offset's component along an axis that does not wrap only counts when it
    /// stays on the grid.
    fn pull(&self, (row, col): Coord, c: i32, dist: i32) -> (i32, i32) {
        let (mut dy, mut dx) = (0, 0);
        for yo in -dist..=dist {
            for xo in -dist..=dist {
                if yo * yo + xo * xo >= dist * dist {
                    continue;
                }
                let (ry, rx) = (row as isize + yo as isize, col as isize + xo as isize);
                let (iy, ix) = geometry::wrap(ry, rx, self.height, self.width);
                if !same_sign(self.value((iy, ix)), c) {
                    continue;
                }
                if self.wrap.rows || iy as isize == ry {
                    dy += yo;
                }
                if self.wrap.columns || ix as isize == rx {
                    dx += xo;
                }
            }
        }
        (dy, dx)
    }

    fn transfer(&self, from: Coord, to: Coord, amount: i32) {
        self.cells[self.index(from)].fetch_sub(amount, Ordering::Relaxed);
        self.cells[self.index(to)].fetch_add(amount, Ordering::Relaxed);
    }

    fn shift(&self, coord: Coord, dy: i32, dx: i32) -> Coord {
        geometry::offset(coord, (dy as isize, dx as isize), self.height, self.width)
    }

    fn index(&self, (row, col): Coord) -> usize {
        row * self.width + col
    }
}

/// Random signs, each averaged once with the signs around it.
pub fn quick_field(height: usize, width: usize, rng: &mut impl Rng) -> Vec<i32> {
    let spread = NEIGHBORHOOD.len() as i32;
    let mut values: Vec<i32> = (0..height * width)
        .map(|_| rng.gen_range(0..spread) - spread / 2)
        .collect();

    let mut order: Vec<usize> = (0..values.len()).collect();
    order.shuffle(rng);
    for index in order {
        let coord = (index / width, index % width);
        let around: i32 = NEIGHBORHOOD
            .iter()
            .map(|&d| {
                let (r, c) = geometry::offset(coord, d, height, width);
                values[r * width + c].signum()
            })
            .sum();
        values[index] = (values[index] + around) / 2;
    }
    values
}

/// Runs the configured formation to completion and returns the field, row-major.
pub fn form_elevation(settings: &GenerationSettings, rng: &mut ChaCha8Rng) -> Vec<i32> {
    let parallel = match settings.formation {
        FormationMode::Quick => {
            info!("Quick elevation field {}x{}", settings.height, settings.width);
            let bound = settings.max_value;
            return quick_field(settings.height, settings.width, rng)
                .into_iter()
                .map(|v| v.clamp(-bound, bound))
                .collect();
        }
        FormationMode::Parallel => true,
        FormationMode::Sequential => false,
    };

    let field = ParticleField::new(settings.height, settings.width, settings.wrap);
    let placed = field.deposit_seeds(settings.max_value, settings.spawn_power, rng);
    info!(
        "Elevation {}x{}: {} seed deposits, {} frames",
        settings.height, settings.width, placed, settings.frames
    );

    for frame in 1..=settings.frames {
        let report = field.run_frame(settings.max_value, parallel, rng);
        debug!(
            frame,
            annihilations = report.annihilations,
            spilled = report.spilled,
            absolute_mass = field.absolute_mass(),
            "frame done"
        );
    }
    field.into_values()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_with(values: &[(Coord, i32)]) -> ParticleField {
        let field = ParticleField::new(9, 9, AxisWrap::TORUS);
        for &(coord, v) in values {
            field.cells[field.index(coord)].store(v, Ordering::Relaxed);
        }
        field
    }

    #[test]
    fn test_lone_particle_exchanges_with_empty_neighbor() {
        let field = field_with(&[((3, 3), 1)]);
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let moved = field.advance_cell((3, 3), 8, &mut rng);

        let Move::Exchanged(target) = moved else {
            panic!("expected an exchange, got {moved:?}");
        };
        assert_eq!(field.value(target), 2);
        assert_eq!(field.value((3, 3)), -1);
        assert_eq!(field.signed_mass(), 1);
    }

    #[test]
    fn test_collision_annihilates_one_unit_each() {
        // the negative stack is pulled right, runs into its own kind at (3, 5)
        // and falls back onto the positive cell in between
        let field = field_with(&[((3, 3), -1), ((3, 4), 3), ((3, 5), -1)]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let before = (field.signed_mass(), field.absolute_mass());

        assert_eq!(field.advance_cell((3, 3), 8, &mut rng), Move::Annihilated((3, 4)));

        assert_eq!(field.value((3, 3)), 0);
        assert_eq!(field.value((3, 4)), 2);
        assert_eq!(field.value((3, 5)), -1);
        assert_eq!(field.signed_mass(), before.0);
        assert_eq!(field.absolute_mass(), before.1 - 2);
    }

    #[test]
    fn test_directed_move_into_empty_cell_migrates() {
        let field = field_with(&[((3, 3), -2), ((3, 5), -1), ((3, 6), -1)]);
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        assert_eq!(field.advance_cell((3, 3), 8, &mut rng), Move::Migrated((3, 4)));

        // the stack moved on grown by one and left an opposite unit behind
        assert_eq!(field.value((3, 3)), 1);
        assert_eq!(field.value((3, 4)), -3);
        assert_eq!(field.signed_mass(), -4);
        assert_eq!(field.absolute_mass(), 6);
    }

    #[test]
    fn test_absolute_mass_grows_only_on_migration_and_exchange() {
        let field = ParticleField::new(12, 12, AxisWrap::TORUS);
        let mut rng = ChaCha8Rng::seed_from_u64(17);
        field.deposit_seeds(9, 9, &mut rng);

        let mut exchanges = 0;
        for _ in 0..4 {
            for index in 0..144 {
                let before = field.absolute_mass();
                let moved = field.advance_cell((index / 12, index % 12), 9, &mut rng);
                let delta = field.absolute_mass() - before;
                let expected = match moved {
                    Move::Idle | Move::Stuck => 0,
                    Move::Annihilated(_) => -2,
                    Move::Migrated(_) => 2,
                    Move::Exchanged(_) => {
                        exchanges += 1;
                        2
                    }
                };
                assert_eq!(delta, expected, "{moved:?} at index {index}");
            }
            field.spill_excess(9);
        }
        assert!(exchanges > 0);
    }

    #[test]
    fn test_spill_fills_neighbors_in_table_order() {
        let field = field_with(&[((3, 3), 12), ((3, 4), 9), ((3, 2), -1)]);

        assert_eq!(field.spill_excess(9), 3);

        assert_eq!(field.value((3, 3)), 9);
        assert_eq!(field.value((3, 4)), 9);
        assert_eq!(field.value((3, 2)), 2);
        assert_eq!(field.signed_mass(), 20);
    }

    #[test]
    fn test_spill_reaches_past_a_full_neighborhood() {
        let mut values = vec![((4, 4), -11)];
        for (dy, dx) in NEIGHBORHOOD {
            values.push((((4 + dy) as usize, (4 + dx) as usize), -9));
        }
        let field = field_with(&values);
        let mass = field.signed_mass();

        assert_eq!(field.spill_excess(9), 2);

        assert_eq!(field.value((4, 4)), -9);
        assert_eq!(field.value((0, 0)), -2);
        assert_eq!(field.signed_mass(), mass);
        assert!(field.values().iter().all(|v| v.abs() <= 9));
    }

    #[test]
    fn test_empty_cell_is_idle() {
        let field = field_with(&[]);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert_eq!(field.advance_cell((0, 0), 8, &mut rng), Move::Idle);
        assert_eq!(field.absolute_mass(), 0);
    }

    #[test]
    fn test_seed_deposits_have_max_magnitude() {
        let field = ParticleField::new(20, 20, AxisWrap::TORUS);
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let placed = field.deposit_seeds(12, 12, &mut rng);

        assert!(placed >= 1 && placed <= 12);
        let values = field.values();
        assert_eq!(values.iter().filter(|&&v| v == 12).count(), placed);
        assert!(values.iter().all(|&v| v == 0 || v == 12));
    }

    #[test]
    fn test_frames_conserve_signed_mass() {
        for parallel in [false, true] {
            let field = ParticleField::new(16, 16, AxisWrap { rows: false, columns: true });
            let mut rng = ChaCha8Rng::seed_from_u64(5);
            field.deposit_seeds(11, 11, &mut rng);
            let mass = field.signed_mass();

            for _ in 0..6 {
                field.run_frame(11, parallel, &mut rng);
                assert_eq!(field.signed_mass(), mass, "parallel = {parallel}");
                assert!(field.values().iter().all(|v| v.abs() <= 11));
            }
            assert!(field.values().iter().any(|&v| v < 0), "no sea particles formed");
        }
    }

    #[test]
    fn test_sequential_frames_are_reproducible() {
        let run = || {
            let field = ParticleField::new(12, 12, AxisWrap::TORUS);
            let mut rng = ChaCha8Rng::seed_from_u64(99);
            field.deposit_seeds(9, 9, &mut rng);
            for _ in 0..4 {
                field.run_frame(9, false, &mut rng);
            }
            field.into_values()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_form_elevation_keeps_seed_mass() {
        let mut settings = GenerationSettings::for_grid(16, 16);
        settings.frames = 5;
        let mut rng = ChaCha8Rng::seed_from_u64(21);

        let values = form_elevation(&settings, &mut rng);

        assert_eq!(values.len(), 256);
        let mass: i64 = values.iter().map(|&v| v as i64).sum();
        assert!(mass > 0);
        assert_eq!(mass % settings.max_value as i64, 0);
    }

    #[test]
    fn test_formed_field_stays_within_max_value() {
        for formation in [FormationMode::Sequential, FormationMode::Parallel, FormationMode::Quick] {
            let mut settings = GenerationSettings::for_grid(24, 24);
            settings.formation = formation;
            let mut rng = ChaCha8Rng::seed_from_u64(8);

            let values = form_elevation(&settings, &mut rng);

            let max_value = settings.max_value;
            assert!(
                values.iter().all(|v| v.abs() <= max_value),
                "{formation:?} went past {max_value}"
            );
        }
    }

    #[test]
    fn test_formed_field_is_dense() {
        let mut settings = GenerationSettings::for_grid(32, 32);
        settings.formation = FormationMode::Sequential;
        let mut rng = ChaCha8Rng::seed_from_u64(13);

        let values = form_elevation(&settings, &mut rng);

        let empty = values.iter().filter(|&&v| v == 0).count();
        assert!(empty * 3 < values.len(), "{empty} of {} cells empty", values.len());
    }

    #[test]
    fn test_quick_field_is_bounded() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let values = quick_field(10, 12, &mut rng);
        assert_eq!(values.len(), 120);
        assert!(values.iter().all(|v| v.abs() <= 15));
    }
}
