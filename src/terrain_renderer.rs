use image::{Rgba, RgbaImage};

use crate::cities::City;
use crate::error::{MapError, Result};
use crate::geometry::Coord;
use crate::grid::{Cell, Feature, Grid, Terrain};
use crate::settings::GenerationSettings;
use crate::terrain_generator::TerrainMap;
use crate::territories::TerritoryGroup;

const BORDER_DARK: Rgba<u8> = Rgba([45, 45, 45, 255]);
const BORDER_LIGHT: Rgba<u8> = Rgba([150, 150, 150, 255]);
const MARKER_INK: Rgba<u8> = Rgba([20, 20, 20, 255]);
const MARKER_FILL: Rgba<u8> = Rgba([235, 235, 235, 255]);

pub struct TerrainRenderer;

impl TerrainRenderer {
    /// Base color of a cell from its terrain and elevation.
    pub fn terrain_color(cell: &Cell) -> Rgba<u8> {
        let v = cell.value.clamp(0, 255) as u32;
        match cell.terrain {
            Terrain::Land => Rgba([(v / 2) as u8, v as u8, 0, 255]),
            Terrain::Mountain => Rgba([
                (v * 224 / 255) as u8,
                (v * 228 / 255) as u8,
                (v * 170 / 255) as u8,
                255,
            ]),
            Terrain::Sea => Rgba([0, 0, (255 - v * 3 / 4) as u8, 255]),
            Terrain::MapBorder => BORDER_DARK,
        }
    }

    pub fn river_color(cell: &Cell) -> Rgba<u8> {
        let v = cell.value.clamp(0, 255) as u32;
        Rgba([(v / 4) as u8, (v / 2) as u8, v as u8, 255])
    }

    /// Two-tone frame: top and bottom rows alternate in opposite phase along the
    /// columns, left and right columns along the rows. Columns win at corners.
    pub fn border_tone(grid: &Grid, (row, col): Coord, period: usize) -> Rgba<u8> {
        let lead = |i: usize| i % period < period / 2;
        if !grid.wrap().columns && (col == 0 || col == grid.width() - 1) {
            return if (col == 0) == lead(row) {
                BORDER_LIGHT
            } else {
                BORDER_DARK
            };
        }
        if (row == 0) == lead(col) {
            BORDER_DARK
        } else {
            BORDER_LIGHT
        }
    }

    /// Round marker sized to a block: `#` outline around an `o` core, `.` left
    /// untouched.
    pub fn city_marker(height: usize, width: usize) -> Vec<u8> {
        let (cy, cx) = ((height as f64 - 1.0) / 2.0, (width as f64 - 1.0) / 2.0);
        let outer = height.min(width) as f64 / 2.0 - 0.5;
        let inner = outer * 0.6;
        let mut shape = Vec::with_capacity(height * width);
        for sy in 0..height {
            for sx in 0..width {
                let d = ((sy as f64 - cy).powi(2) + (sx as f64 - cx).powi(2)).sqrt();
                shape.push(if d <= inner {
                    b'o'
                } else if d <= outer {
                    b'#'
                } else {
                    b'.'
                });
            }
        }
        shape
    }

    /// Fills every cell's color block, then stamps a marker on each city center.
    pub fn paint(
        grid: &mut Grid,
        cities: &[City],
        territories: &TerritoryGroup,
        settings: &GenerationSettings,
    ) -> Result<()> {
        for coord in grid.coords().collect::<Vec<_>>() {
            let color = {
                let cell = grid.get(coord);
                let actual = cell.block.pixels().len();
                if actual != settings.block_len() {
                    return Err(MapError::InvalidShape {
                        expected: settings.block_len(),
                        actual,
                    });
                }
                match (cell.terrain, cell.feature) {
                    (Terrain::MapBorder, _) => {
                        Self::border_tone(grid, coord, settings.border_period)
                    }
                    (_, Feature::River) => Self::river_color(cell),
                    (_, Feature::CountryBorder) => cell
                        .territory
                        .and_then(|id| territories.get(id))
                        .map_or_else(|| Self::terrain_color(cell), |t| t.color),
                    _ => Self::terrain_color(cell),
                }
            };
            grid.get_mut(coord).block.fill(color);
        }

        let marker = Self::city_marker(settings.block_height, settings.block_width);
        let palette = [(b'#', MARKER_INK), (b'o', MARKER_FILL)];
        for city in cities {
            grid.get_mut(city.center).block.overlay(&marker, &palette)?;
        }
        Ok(())
    }

    /// Lays the color blocks of a painted map side by side.
    pub fn render_to_image(map: &TerrainMap) -> Result<RgbaImage> {
        let grid = &map.grid;
        if grid.is_empty() {
            return Ok(RgbaImage::new(0, 0));
        }
        let first = &grid.get((0, 0)).block;
        let (block_height, block_width) = (first.height(), first.width());

        let mut img = RgbaImage::new(
            (grid.width() * block_width) as u32,
            (grid.height() * block_height) as u32,
        );
        for (row, col) in grid.coords() {
            let block = &grid.get((row, col)).block;
            if block.height() != block_height || block.width() != block_width {
                return Err(MapError::InvalidShape {
                    expected: block_height * block_width,
                    actual: block.height() * block.width(),
                });
            }
            for sy in 0..block_height {
                for sx in 0..block_width {
                    img.put_pixel(
                        (col * block_width + sx) as u32,
                        (row * block_height + sy) as u32,
                        block.get(sy, sx),
                    );
                }
            }
        }
        Ok(img)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::AxisWrap;
    use crate::grid::ColorBlock;

    fn cell(terrain: Terrain, value: i32) -> Cell {
        Cell {
            value,
            terrain,
            feature: Feature::None,
            territory: None,
            block: ColorBlock::new(8, 8),
        }
    }

    #[test]
    fn test_terrain_colors() {
        assert_eq!(TerrainRenderer::terrain_color(&cell(Terrain::Land, 200)), Rgba([100, 200, 0, 255]));
        assert_eq!(TerrainRenderer::terrain_color(&cell(Terrain::Sea, 0)), Rgba([0, 0, 255, 255]));
        assert_eq!(TerrainRenderer::terrain_color(&cell(Terrain::Sea, 255)), Rgba([0, 0, 64, 255]));
        assert_eq!(
            TerrainRenderer::terrain_color(&cell(Terrain::Mountain, 255)),
            Rgba([224, 228, 170, 255])
        );
        assert_eq!(TerrainRenderer::river_color(&cell(Terrain::Land, 200)), Rgba([50, 100, 200, 255]));
    }

    #[test]
    fn test_border_tone_alternates_in_opposite_phase() {
        let grid = Grid::from_values(10, 12, AxisWrap::BORDERED, &[0; 120], (8, 8));
        let tone = |coord| TerrainRenderer::border_tone(&grid, coord, 4);

        assert_eq!(tone((0, 1)), BORDER_DARK);
        assert_eq!(tone((9, 1)), BORDER_LIGHT);
        assert_eq!(tone((0, 2)), BORDER_LIGHT);
        assert_eq!(tone((9, 2)), BORDER_DARK);
        assert_eq!(tone((1, 0)), BORDER_LIGHT);
        assert_eq!(tone((1, 11)), BORDER_DARK);
        assert_eq!(tone((3, 0)), BORDER_DARK);
        assert_eq!(tone((3, 11)), BORDER_LIGHT);
    }

    #[test]
    fn test_city_marker_fits_any_block() {
        for (h, w) in [(8, 8), (5, 7), (1, 1)] {
            let shape = TerrainRenderer::city_marker(h, w);
            assert_eq!(shape.len(), h * w);
            assert!(shape.iter().all(|b| b"#o.".contains(b)));
            assert!(ColorBlock::new(h, w).overlay(&shape, &[]).is_ok());
        }
        let shape = TerrainRenderer::city_marker(8, 8);
        assert_eq!(shape[0], b'.');
        assert_eq!(shape[3 * 8 + 3], b'o');
    }

    #[test]
    fn test_paint_rejects_wrong_block_size() {
        let mut grid = Grid::from_values(6, 6, AxisWrap::TORUS, &[10; 36], (4, 4));
        let settings = GenerationSettings::for_grid(6, 6);

        let err = TerrainRenderer::paint(&mut grid, &[], &TerritoryGroup::default(), &settings)
            .unwrap_err();

        assert!(matches!(err, MapError::InvalidShape { expected: 64, actual: 16 }));
    }
}
