use rand::Rng;
use tracing::{debug, info};

use crate::error::{MapError, Result, Stage};
use crate::geometry::{Coord, Offset, NEIGHBORHOOD, SQUARE};
use crate::grid::{Cell, Feature, Grid, Terrain};
use crate::settings::GenerationSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct City {
    pub center: Coord,
    members: Vec<Coord>,
    /// 0 for a village up to 3 for a river port
    pub size: u8,
}

impl City {
    pub fn new(center: Coord) -> Self {
        City {
            center,
            members: vec![center],
            size: 0,
        }
    }

    pub fn has(&self, coord: Coord) -> bool {
        self.members.contains(&coord)
    }

    pub fn add_square(&mut self, coord: Coord) {
        if !self.has(coord) {
            self.members.push(coord);
        }
    }

    /// Center first.
    pub fn members(&self) -> &[Coord] {
        &self.members
    }

    /// Offsets a city of `size` spreads over around its center.
    pub fn footprint(size: u8) -> &'static [Offset] {
        match size {
            2 => &SQUARE,
            3 => &NEIGHBORHOOD,
            _ => &[],
        }
    }
}

fn is_site(cell: &Cell) -> bool {
    cell.terrain == Terrain::Land && cell.feature == Feature::None
}

fn size_class(grid: &Grid, center: Coord, settings: &GenerationSettings, rng: &mut impl Rng) -> u8 {
    let near = |test: fn(&Cell) -> bool| {
        grid.neighbors(center, &NEIGHBORHOOD)
            .any(|n| test(grid.get(n)))
    };
    let mut size = 0;
    if near(|c| c.terrain == Terrain::Sea) {
        size += 1;
    }
    if near(|c| c.feature == Feature::River) {
        size += 1;
    }
    if rng.gen_range(0..settings.city_bonus_odds) == 0 {
        size += 1;
    }
    size
}

/// Samples land until `city_count` cities stand on the map.
pub fn place_cities(
    grid: &mut Grid,
    settings: &GenerationSettings,
    rng: &mut impl Rng,
) -> Result<Vec<City>> {
    let mut cities = Vec::with_capacity(settings.city_count);
    let mut attempts = 0;

    while cities.len() < settings.city_count {
        if !grid.cells().any(is_site) {
            return Err(MapError::NoSettlementSite);
        }
        attempts += 1;
        if attempts > settings.max_iterations {
            return Err(MapError::NonConvergent {
                stage: Stage::Settlements,
                iterations: settings.max_iterations,
            });
        }

        let center = (rng.gen_range(0..grid.height()), rng.gen_range(0..grid.width()));
        if !is_site(grid.get(center)) {
            continue;
        }
        let size = size_class(grid, center, settings, rng);
        if size == 0 && rng.gen_range(0..100) >= settings.settle_chance_percent {
            continue;
        }

        let mut city = City::new(center);
        city.size = size;
        grid.get_mut(center).feature = Feature::City;
        for coord in grid.neighbors(center, City::footprint(size)).collect::<Vec<_>>() {
            let cell = grid.get_mut(coord);
            if is_site(cell) {
                cell.feature = Feature::City;
                city.add_square(coord);
            }
        }
        debug!(center = ?center, size, members = city.members().len(), "city founded");
        cities.push(city);
    }

    info!("{} cities after {} attempts", cities.len(), attempts);
    Ok(cities)
}
