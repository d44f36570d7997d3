//! Territory partitioning: countries seeded on cities flood over the land.
//!
//! Ownership lives on each cell's `territory` id. A territory keeps its cell
//! list and border set as a cache next to it; the border set is the growth
//! frontier and is sharpened before every pass. Contention is first claim
//! wins: an owned cell is never handed over.

use std::collections::HashMap;

use image::Rgba;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

use crate::cities::City;
use crate::error::{MapError, Result, Stage};
use crate::geometry::{Coord, ORTHOGONAL};
use crate::grid::{Feature, Grid, Terrain};
use crate::settings::GenerationSettings;

#[derive(Debug, Clone, PartialEq)]
pub struct Territory {
    pub id: usize,
    /// Indices into the city list
    cities: Vec<usize>,
    cells: Vec<Coord>,
    border: Vec<Coord>,
    pub color: Rgba<u8>,
}

impl Territory {
    pub fn new(id: usize, color: Rgba<u8>) -> Self {
        Territory {
            id,
            cities: Vec::new(),
            cells: Vec::new(),
            border: Vec::new(),
            color,
        }
    }

    pub fn surface(&self) -> usize {
        self.cells.len()
    }

    pub fn cells(&self) -> &[Coord] {
        &self.cells
    }

    pub fn border(&self) -> &[Coord] {
        &self.border
    }

    pub fn cities(&self) -> &[usize] {
        &self.cities
    }

    /// Mean owned coordinate, not corrected for wrap-around.
    pub fn center(&self) -> Option<Coord> {
        if self.cells.is_empty() {
            return None;
        }
        let (rows, cols) = self
            .cells
            .iter()
            .fold((0, 0), |(r, c), &(row, col)| (r + row, c + col));
        Some((rows / self.cells.len(), cols / self.cells.len()))
    }

    /// Claims a free cell and puts it on the frontier.
    pub fn take(&mut self, grid: &mut Grid, coord: Coord) {
        let cell = grid.get_mut(coord);
        if cell.territory.is_some() {
            return;
        }
        cell.territory = Some(self.id);
        self.cells.push(coord);
        self.border.push(coord);
    }

    /// Claims every member of a city at once.
    pub fn take_city(&mut self, grid: &mut Grid, index: usize, city: &City) {
        self.cities.push(index);
        for &member in city.members() {
            self.take(grid, member);
        }
    }

    /// Gives a cell up, keeping the cell list and border set consistent.
    pub fn leave(&mut self, grid: &mut Grid, coord: Coord) {
        self.cells.retain(|&c| c != coord);
        self.border.retain(|&c| c != coord);
        let cell = grid.get_mut(coord);
        if cell.territory == Some(self.id) {
            cell.territory = None;
        }
    }

    /// Keeps only border cells with an orthogonal neighbor this territory does
    /// not own.
    pub fn sharpen_border(&mut self, grid: &Grid) {
        let id = self.id;
        self.border.retain(|&coord| {
            grid.neighbors(coord, &ORTHOGONAL)
                .any(|n| grid.get(n).territory != Some(id))
        });
    }
}

/// Converts a hue in degrees plus saturation and value in 0..=1.
pub fn hsv_to_rgba(hue: usize, saturation: f64, value: f64) -> Rgba<u8> {
    let sector = (hue % 360) as f64 / 60.0;
    let chroma = value * saturation;
    let x = chroma * (1.0 - (sector % 2.0 - 1.0).abs());
    let (r, g, b) = match sector as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let base = value - chroma;
    let channel = |v: f64| ((v + base) * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba([channel(r), channel(g), channel(b), 255])
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TerritoryGroup {
    territories: Vec<Territory>,
    /// Owning city of every city member cell
    city_of: HashMap<Coord, usize>,
}

impl TerritoryGroup {
    /// One territory per city, for up to `country_count` cities picked at random.
    pub fn seed(grid: &mut Grid, cities: &[City], country_count: usize, rng: &mut impl Rng) -> Self {
        let city_of = cities
            .iter()
            .enumerate()
            .flat_map(|(i, city)| city.members().iter().map(move |&m| (m, i)))
            .collect();

        let mut order: Vec<usize> = (0..cities.len()).collect();
        order.shuffle(rng);
        order.truncate(country_count);

        let count = order.len();
        let territories = order
            .into_iter()
            .enumerate()
            .map(|(id, city)| {
                let mut territory = Territory::new(id, hsv_to_rgba(id * 240 / count, 0.5, 0.5));
                territory.take_city(grid, city, &cities[city]);
                territory.sharpen_border(grid);
                territory
            })
            .collect();

        TerritoryGroup {
            territories,
            city_of,
        }
    }

    pub fn len(&self) -> usize {
        self.territories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.territories.is_empty()
    }

    pub fn get(&self, id: usize) -> Option<&Territory> {
        self.territories.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Territory> {
        self.territories.iter()
    }

    /// Cells owned by any territory.
    pub fn surface(&self) -> usize {
        self.territories.iter().map(Territory::surface).sum()
    }

    /// Grows every territory pass after pass until a full pass claims nothing.
    /// Each frontier cell claims at most one neighbor per pass. Returns the
    /// number of passes.
    pub fn grow(
        &mut self,
        grid: &mut Grid,
        cities: &[City],
        max_passes: usize,
        rng: &mut impl Rng,
    ) -> Result<usize> {
        for pass in 1..=max_passes {
            let mut changed = false;
            for id in 0..self.territories.len() {
                self.territories[id].sharpen_border(grid);
                let mut frontier = self.territories[id].border.clone();
                frontier.shuffle(rng);

                for coord in frontier {
                    let claim = grid.neighbors(coord, &ORTHOGONAL).find(|&n| {
                        let cell = grid.get(n);
                        !cell.is_water()
                            && cell.terrain != Terrain::MapBorder
                            && cell.territory.is_none()
                    });
                    let Some(next) = claim else {
                        continue;
                    };

                    let city = match grid.get(next).feature {
                        Feature::City => self.city_of.get(&next).copied(),
                        _ => None,
                    };
                    let territory = &mut self.territories[id];
                    match city {
                        Some(index) => territory.take_city(grid, index, &cities[index]),
                        None => territory.take(grid, next),
                    }
                    changed = true;
                }
            }

            debug!(pass, surface = self.surface(), "growth pass");
            if !changed {
                return Ok(pass);
            }
        }
        Err(MapError::NonConvergent {
            stage: Stage::Territories,
            iterations: max_passes,
        })
    }

    /// Marks border cells as country border, skipping cities, cells next to
    /// water, and cells facing another territory's marked border. Returns the
    /// number of cells marked.
    pub fn trace_borders(&self, grid: &mut Grid) -> usize {
        let mut marked = 0;
        for territory in &self.territories {
            for &coord in &territory.border {
                if grid.get(coord).feature == Feature::City {
                    continue;
                }
                let blocked = grid.neighbors(coord, &ORTHOGONAL).any(|n| {
                    let cell = grid.get(n);
                    cell.is_water()
                        || (cell.territory != Some(territory.id)
                            && cell.feature == Feature::CountryBorder)
                });
                if !blocked {
                    grid.get_mut(coord).feature = Feature::CountryBorder;
                    marked += 1;
                }
            }
        }
        marked
    }
}

/// Seeds, grows and traces the territories of a settled grid.
pub fn partition(
    grid: &mut Grid,
    cities: &[City],
    settings: &GenerationSettings,
    rng: &mut impl Rng,
) -> Result<TerritoryGroup> {
    let mut group = TerritoryGroup::seed(grid, cities, settings.country_count, rng);
    let passes = group.grow(grid, cities, settings.max_iterations, rng)?;
    let traced = group.trace_borders(grid);

    let claimable = grid
        .cells()
        .filter(|c| !c.is_water() && c.terrain != Terrain::MapBorder)
        .count();
    info!(
        "{} countries: {}% claimed after {} passes, {} border cells",
        group.len(),
        100 * group.surface() / claimable.max(1),
        passes,
        traced
    );
    Ok(group)
}
