use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cities::{place_cities, City};
use crate::elevation::form_elevation;
use crate::error::{MapError, Result};
use crate::grid::{Feature, Grid, Terrain};
use crate::rivers::{carve_rivers, RiverNetwork};
use crate::settings::GenerationSettings;
use crate::terrain_classifier::{classify, Classification};
use crate::terrain_renderer::TerrainRenderer;
use crate::territories::{partition, TerritoryGroup};

/// Cell counts of a finished map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapStats {
    pub land_cells: usize,
    pub mountain_cells: usize,
    pub sea_cells: usize,
    pub map_border_cells: usize,
    pub rivers: usize,
    pub river_target: usize,
    pub river_cells: usize,
    pub abandoned_sources: usize,
    pub cities: usize,
    pub city_cells: usize,
    pub territories: usize,
    pub claimed_cells: usize,
    pub country_border_cells: usize,
}

impl MapStats {
    pub fn collect(
        grid: &Grid,
        rivers: &RiverNetwork,
        cities: &[City],
        territories: &TerritoryGroup,
    ) -> Self {
        MapStats {
            land_cells: grid.count_terrain(Terrain::Land),
            mountain_cells: grid.count_terrain(Terrain::Mountain),
            sea_cells: grid.count_terrain(Terrain::Sea),
            map_border_cells: grid.count_terrain(Terrain::MapBorder),
            rivers: rivers.rivers.len(),
            river_target: rivers.target,
            river_cells: grid.count_feature(Feature::River),
            abandoned_sources: rivers.abandoned,
            cities: cities.len(),
            city_cells: grid.count_feature(Feature::City),
            territories: territories.len(),
            claimed_cells: territories.surface(),
            country_border_cells: grid.count_feature(Feature::CountryBorder),
        }
    }
}

/// A generated map: the painted grid plus everything placed on it.
#[derive(Debug, Clone)]
pub struct TerrainMap {
    pub width: usize,
    pub height: usize,
    pub grid: Grid,
    pub classification: Classification,
    pub rivers: RiverNetwork,
    pub cities: Vec<City>,
    pub territories: TerritoryGroup,
    pub stats: MapStats,
}

pub struct TerrainGenerator {
    rng: ChaCha8Rng,
    settings: GenerationSettings,
}

impl TerrainGenerator {
    pub fn new(seed: u32) -> Self {
        Self::new_with_settings(seed, GenerationSettings::default())
    }

    pub fn new_with_settings(seed: u32, settings: GenerationSettings) -> Self {
        TerrainGenerator {
            rng: ChaCha8Rng::seed_from_u64(seed as u64),
            settings,
        }
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: GenerationSettings) {
        self.settings = settings;
    }

    /// Runs every stage, from particle formation to painted color blocks.
    pub fn generate(&mut self) -> Result<TerrainMap> {
        self.settings.validate()?;
        let values = form_elevation(&self.settings, &mut self.rng);
        self.build(&values)
    }

    /// Same as [`generate`](Self::generate) on a given signed field, row-major.
    pub fn generate_from_field(&mut self, values: &[i32]) -> Result<TerrainMap> {
        self.settings.validate()?;
        if values.len() != self.settings.cell_count() {
            return Err(MapError::InvalidShape {
                expected: self.settings.cell_count(),
                actual: values.len(),
            });
        }
        self.build(values)
    }

    fn build(&mut self, values: &[i32]) -> Result<TerrainMap> {
        let TerrainGenerator { rng, settings } = self;
        let mut grid = Grid::from_values(
            settings.height,
            settings.width,
            settings.wrap,
            values,
            (settings.block_height, settings.block_width),
        );

        let classification = classify(&mut grid, settings, rng)?;
        let framed = grid.mark_map_border();
        if framed > 0 {
            info!("Map border: {} cells", framed);
        }

        let land = grid.count_terrain(Terrain::Land) + grid.count_terrain(Terrain::Mountain);
        let rivers = carve_rivers(&mut grid, land, settings, rng)?;
        let cities = place_cities(&mut grid, settings, rng)?;
        let territories = partition(&mut grid, &cities, settings, rng)?;
        TerrainRenderer::paint(&mut grid, &cities, &territories, settings)?;

        let stats = MapStats::collect(&grid, &rivers, &cities, &territories);
        info!(
            "Map {}x{} done: {} land, {} rivers, {} cities, {} territories",
            settings.height, settings.width, land, stats.rivers, stats.cities, stats.territories
        );

        Ok(TerrainMap {
            width: settings.width,
            height: settings.height,
            grid,
            classification,
            rivers,
            cities,
            territories,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elevation::ParticleField;
    use crate::geometry::{AxisWrap, Coord};
    use crate::settings::FormationMode;
    use std::collections::HashSet;

    /// Sea on the first `sea_rows` rows, uneven land on the rest.
    fn banded_field(height: usize, width: usize, sea_rows: usize) -> Vec<i32> {
        (0..height * width)
            .map(|i| {
                let (row, col) = (i / width, i % width);
                if row < sea_rows {
                    -10
                } else {
                    ((row * 7 + col * 13) % 5) as i32 + 9
                }
            })
            .collect()
    }

    fn small_torus_settings() -> GenerationSettings {
        let mut settings = GenerationSettings::for_grid(8, 8);
        settings.wrap = AxisWrap::TORUS;
        settings.formation = FormationMode::Sequential;
        settings.frames = 4;
        settings.spawn_power = 1;
        settings.river_percentage = 0;
        settings.city_count = 1;
        settings.country_count = 1;
        settings
    }

    #[test]
    fn test_single_seed_formation_on_small_torus() {
        let settings = small_torus_settings();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let values = form_elevation(&settings, &mut rng);

        assert_eq!(values.len(), 64);
        let field = ParticleField::from_values(8, 8, settings.wrap, &values);
        assert_eq!(field.signed_mass(), settings.max_value as i64);
    }

    #[test]
    fn test_small_torus_one_country_owns_all_land() {
        let mut generator = TerrainGenerator::new_with_settings(42, small_torus_settings());

        let map = generator.generate_from_field(&banded_field(8, 8, 3)).unwrap();

        assert_eq!(map.stats.rivers, 0);
        assert_eq!(map.grid.count_feature(Feature::River), 0);
        assert_eq!(map.cities.len(), 1);
        assert_eq!(map.territories.len(), 1);
        for coord in map.grid.coords() {
            let cell = map.grid.get(coord);
            let expected = (cell.terrain != Terrain::Sea).then_some(0);
            assert_eq!(cell.territory, expected, "at {coord:?}");
        }

        let city = &map.cities[0];
        let settled: HashSet<Coord> = map
            .grid
            .coords()
            .filter(|&c| map.grid.get(c).feature == Feature::City)
            .collect();
        let members: HashSet<Coord> = city.members().iter().copied().collect();
        assert_eq!(settled, members);
        let footprint: HashSet<Coord> = map
            .grid
            .neighbors(city.center, City::footprint(city.size))
            .chain([city.center])
            .collect();
        assert!(members.is_subset(&footprint));

        let image = TerrainRenderer::render_to_image(&map).unwrap();
        assert_eq!(image.dimensions(), (64, 64));
    }

    #[test]
    fn test_bordered_map_keeps_its_frame() {
        let mut settings = GenerationSettings::for_grid(12, 12);
        settings.formation = FormationMode::Sequential;
        settings.river_percentage = 0;
        settings.city_count = 2;
        settings.country_count = 2;
        let mut generator = TerrainGenerator::new_with_settings(7, settings.clone());

        let map = generator.generate_from_field(&banded_field(12, 12, 4)).unwrap();

        let mut tones = HashSet::new();
        for coord @ (row, col) in map.grid.coords() {
            let cell = map.grid.get(coord);
            let edge = row == 0 || row == 11 || col == 0 || col == 11;
            assert_eq!(cell.terrain == Terrain::MapBorder, edge, "at {coord:?}");
            if edge {
                assert_eq!(cell.feature, Feature::None);
                assert_eq!(cell.territory, None);
                let tone = TerrainRenderer::border_tone(&map.grid, coord, settings.border_period);
                assert!(cell.block.pixels().iter().all(|&p| p == tone));
                tones.insert(tone);
            }
        }
        assert_eq!(tones.len(), 2);
        assert_eq!(map.stats.map_border_cells, 44);
    }

    #[test]
    fn test_sequential_generation_is_reproducible() {
        let mut settings = GenerationSettings::for_grid(24, 24);
        settings.formation = FormationMode::Sequential;
        settings.city_count = 3;
        settings.country_count = 2;

        let a = TerrainGenerator::new_with_settings(5, settings.clone())
            .generate()
            .unwrap();
        let b = TerrainGenerator::new_with_settings(5, settings).generate().unwrap();

        assert_eq!(a.grid, b.grid);
        assert_eq!(a.stats, b.stats);
        assert_eq!(a.stats.cities, 3);
    }

    #[test]
    fn test_mountain_share_follows_percentage() {
        let mut settings = GenerationSettings::for_grid(40, 80);
        settings.formation = FormationMode::Sequential;
        settings.city_count = 4;
        settings.country_count = 2;
        let mut generator = TerrainGenerator::new_with_settings(31, settings.clone());

        let map = generator.generate().unwrap();

        let summary = &map.classification;
        let land = summary.land_cells;
        let quota = land * settings.mountain_percentage / 100;
        assert!(land > 0);
        assert!(summary.mountain_threshold.is_some_and(|t| t > 0));
        assert!(summary.mountain_cells >= quota);
        assert!(
            summary.mountain_cells <= 2 * quota,
            "{} mountains for {} land cells",
            summary.mountain_cells,
            land
        );
        assert!(map.stats.rivers > 0);
    }

    #[test]
    fn test_full_run_properties() {
        let mut settings = GenerationSettings::for_grid(32, 32);
        settings.formation = FormationMode::Sequential;
        settings.city_count = 4;
        settings.country_count = 2;
        let mut generator = TerrainGenerator::new_with_settings(2024, settings);

        let map = generator.generate().unwrap();

        assert_eq!(map.stats.cities, 4);
        assert_eq!(map.stats.territories, 2);
        assert!(map.stats.land_cells + map.stats.mountain_cells > 0);
        for river in &map.rivers.rivers {
            let path = river.path();
            let unique: HashSet<_> = path.iter().collect();
            assert_eq!(unique.len(), path.len());
            assert!(path.iter().all(|&c| map.grid.get(c).feature == Feature::River));
        }
        for cell in map.grid.cells() {
            if cell.territory.is_some() {
                assert!(!cell.is_water());
                assert_ne!(cell.terrain, Terrain::MapBorder);
            }
        }
        let json = serde_json::to_string(&map.stats).unwrap();
        assert!(json.contains("\"territories\":2"));
    }

    #[test]
    fn test_rejects_bad_input() {
        let mut generator = TerrainGenerator::new_with_settings(1, small_torus_settings());
        let err = generator.generate_from_field(&[1; 10]).unwrap_err();
        assert!(matches!(err, MapError::InvalidShape { expected: 64, actual: 10 }));

        let mut settings = small_torus_settings();
        settings.height = 3;
        generator.set_settings(settings);
        assert!(matches!(generator.generate(), Err(MapError::InvalidSettings(_))));
    }
}
