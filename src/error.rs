//! Error types for map generation.

use std::fmt;

use thiserror::Error;

/// Loops that can fail to settle within the configured iteration bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    IsolationRepair,
    Rivers,
    Settlements,
    Territories,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::IsolationRepair => "isolation repair",
            Stage::Rivers => "river carving",
            Stage::Settlements => "settlement placement",
            Stage::Territories => "territory growth",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum MapError {
    /// Settings that no stage can work with
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// A stage hit the iteration bound before settling
    #[error("{stage} did not converge after {iterations} iterations")]
    NonConvergent { stage: Stage, iterations: usize },

    /// Rivers were asked for but the map has no mountain to start one from
    #[error("no mountain cell to spawn a river from")]
    NoRiverSource,

    /// No free land cell is left for the next city
    #[error("no free land cell left to settle")]
    NoSettlementSite,

    /// A color block or overlay with the wrong number of sub-pixels
    #[error("invalid shape size {actual}, expected {expected}")]
    InvalidShape { expected: usize, actual: usize },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, MapError>;
