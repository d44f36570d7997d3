use image::Rgba;
use serde::{Deserialize, Serialize};

use crate::error::{MapError, Result};
use crate::geometry::{self, AxisWrap, Coord, Offset};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Terrain {
    Sea,
    Land,
    Mountain,
    /// Painted frame along an axis that does not wrap
    MapBorder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    None,
    River,
    City,
    CountryBorder,
}

/// Sub-pixel colors of one cell, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorBlock {
    height: usize,
    width: usize,
    pixels: Vec<Rgba<u8>>,
}

impl ColorBlock {
    pub fn new(height: usize, width: usize) -> Self {
        ColorBlock {
            height,
            width,
            pixels: vec![Rgba([0, 0, 0, 255]); height * width],
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn pixels(&self) -> &[Rgba<u8>] {
        &self.pixels
    }

    pub fn get(&self, sy: usize, sx: usize) -> Rgba<u8> {
        self.pixels[sy * self.width + sx]
    }

    pub fn fill(&mut self, color: Rgba<u8>) {
        self.pixels.iter_mut().for_each(|p| *p = color);
    }

    /// Paints `shape` over the block. Each byte of `shape` is looked up in
    /// `palette`; bytes without an entry leave the pixel untouched.
    pub fn overlay(&mut self, shape: &[u8], palette: &[(u8, Rgba<u8>)]) -> Result<()> {
        self.check_len(shape.len())?;
        for (pixel, key) in self.pixels.iter_mut().zip(shape) {
            if let Some((_, color)) = palette.iter().find(|(k, _)| k == key) {
                *pixel = *color;
            }
        }
        Ok(())
    }

    /// Fails unless a shape of `actual` sub-pixels fits the block exactly.
    pub fn check_len(&self, actual: usize) -> Result<()> {
        if self.pixels.len() != actual || self.height * self.width != actual {
            return Err(MapError::InvalidShape {
                expected: self.height * self.width,
                actual,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// Signed particle count before classification, elevation in 0..=255 after
    pub value: i32,
    pub terrain: Terrain,
    pub feature: Feature,
    pub territory: Option<usize>,
    pub block: ColorBlock,
}

impl Cell {
    /// Water blocks territory growth and border tracing.
    pub fn is_water(&self) -> bool {
        self.terrain == Terrain::Sea || self.feature == Feature::River
    }
}

/// Fixed-size wrap-around grid of cells. Cells are only ever mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    height: usize,
    width: usize,
    wrap: AxisWrap,
    cells: Vec<Cell>,
}

impl Grid {
    /// A grid holding `values`, row-major, everything else unset.
    pub fn from_values(
        height: usize,
        width: usize,
        wrap: AxisWrap,
        values: &[i32],
        block: (usize, usize),
    ) -> Self {
        let cells = values
            .iter()
            .map(|&value| Cell {
                value,
                terrain: Terrain::Sea,
                feature: Feature::None,
                territory: None,
                block: ColorBlock::new(block.0, block.1),
            })
            .collect();
        Grid {
            height,
            width,
            wrap,
            cells,
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn wrap(&self) -> AxisWrap {
        self.wrap
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, (row, col): Coord) -> &Cell {
        &self.cells[row * self.width + col]
    }

    pub fn get_mut(&mut self, (row, col): Coord) -> &mut Cell {
        &mut self.cells[row * self.width + col]
    }

    pub fn offset(&self, coord: Coord, delta: Offset) -> Coord {
        geometry::offset(coord, delta, self.height, self.width)
    }

    /// Cells reached from `coord` through each offset of `table`.
    pub fn neighbors<'a>(
        &'a self,
        coord: Coord,
        table: &'a [Offset],
    ) -> impl Iterator<Item = Coord> + 'a {
        table.iter().map(move |&d| self.offset(coord, d))
    }

    /// Every coordinate in row-major order.
    pub fn coords(&self) -> impl Iterator<Item = Coord> {
        let width = self.width;
        (0..self.height).flat_map(move |row| (0..width).map(move |col| (row, col)))
    }

    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }

    pub fn count_terrain(&self, terrain: Terrain) -> usize {
        self.cells.iter().filter(|c| c.terrain == terrain).count()
    }

    pub fn count_feature(&self, feature: Feature) -> usize {
        self.cells.iter().filter(|c| c.feature == feature).count()
    }

    /// Whether `coord` lies on an edge that does not wrap.
    pub fn on_map_border(&self, (row, col): Coord) -> bool {
        (!self.wrap.rows && (row == 0 || row == self.height - 1))
            || (!self.wrap.columns && (col == 0 || col == self.width - 1))
    }

    /// Turns the first and last row and/or column of each unwrapped axis into map
    /// border. Returns the number of cells marked.
    pub fn mark_map_border(&mut self) -> usize {
        let border: Vec<Coord> = self.coords().filter(|&c| self.on_map_border(c)).collect();
        for &coord in &border {
            let cell = self.get_mut(coord);
            cell.terrain = Terrain::MapBorder;
            cell.feature = Feature::None;
            cell.territory = None;
        }
        border.len()
    }
}
