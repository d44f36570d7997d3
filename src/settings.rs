use serde::{Deserialize, Serialize};

use crate::error::{MapError, Result};
use crate::geometry::AxisWrap;

/// How the elevation field is formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormationMode {
    /// Particle automaton on the rayon pool; cells race on shared state
    Parallel,
    /// Same automaton on one thread, reproducible from the seed
    Sequential,
    /// Random signs smoothed once, no particles
    Quick,
}

/// Everything a generation run needs, fixed before the first stage starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub height: usize,
    pub width: usize,
    pub wrap: AxisWrap,
    pub formation: FormationMode,
    /// Seed deposit magnitude; also the pull-radius modulus and smoothing cap
    pub max_value: i32,
    pub frames: usize,
    /// Number of steps in the seed deposit walk
    pub spawn_power: usize,
    /// Share of land cells (lowest first) that become mountains
    pub mountain_percentage: usize,
    /// Carved river length to reach, as a share of land cells
    pub river_percentage: usize,
    pub city_count: usize,
    pub country_count: usize,
    /// Chance that a site with no water nearby is settled anyway
    pub settle_chance_percent: u32,
    /// One in `city_bonus_odds` sites grows a size class
    pub city_bonus_odds: u32,
    pub block_height: usize,
    pub block_width: usize,
    /// Period of the two-tone map border
    pub border_period: usize,
    /// Bound on every loop that has no natural termination guarantee
    pub max_iterations: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        GenerationSettings::for_grid(100, 200)
    }
}

impl GenerationSettings {
    /// Settings for a grid, with every magnitude derived from its size.
    pub fn for_grid(height: usize, width: usize) -> Self {
        let magic = Self::magic(height, width);
        GenerationSettings {
            height,
            width,
            wrap: AxisWrap::BORDERED,
            formation: FormationMode::Parallel,
            max_value: magic as i32,
            frames: magic,
            spawn_power: magic,
            mountain_percentage: 5,
            river_percentage: 8,
            city_count: magic,
            country_count: (magic / 5).max(1),
            settle_chance_percent: 10,
            city_bonus_odds: 5,
            block_height: 8,
            block_width: 8,
            border_period: magic.max(2),
            max_iterations: 100 * height * width,
        }
    }

    /// `2 * sqrt(height + width)`, the scale every default derives from.
    pub fn magic(height: usize, width: usize) -> usize {
        (2.0 * ((height + width) as f64).sqrt()) as usize
    }

    pub fn cell_count(&self) -> usize {
        self.height * self.width
    }

    pub fn block_len(&self) -> usize {
        self.block_height * self.block_width
    }

    pub fn validate(&self) -> Result<()> {
        if self.height < 5 || self.width < 5 {
            return Err(MapError::InvalidSettings(format!(
                "grid {}x{} is smaller than 5x5",
                self.height, self.width
            )));
        }
        if self.max_value <= 0 {
            return Err(MapError::InvalidSettings(
                "max_value must be positive".to_string(),
            ));
        }
        if self.mountain_percentage > 100 || self.river_percentage > 100 {
            return Err(MapError::InvalidSettings(
                "percentages cannot exceed 100".to_string(),
            ));
        }
        if self.settle_chance_percent > 100 || self.city_bonus_odds == 0 {
            return Err(MapError::InvalidSettings(
                "settlement odds out of range".to_string(),
            ));
        }
        if self.block_height == 0 || self.block_width == 0 || self.border_period == 0 {
            return Err(MapError::InvalidSettings(
                "block and border dimensions must be positive".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(MapError::InvalidSettings(
                "max_iterations must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
