//! Procedural generation of wrap-around maps.
//!
//! A particle automaton forms a signed elevation field, which is classified into
//! sea, land and mountains, carved with rivers, settled with cities and finally
//! partitioned into territories. Every stage mutates one shared [`Grid`].

pub mod cities;
pub mod elevation;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod rivers;
pub mod settings;
pub mod terrain_classifier;
pub mod terrain_generator;
pub mod terrain_renderer;
pub mod territories;

pub use error::{MapError, Result, Stage};
pub use grid::{Cell, ColorBlock, Feature, Grid, Terrain};
pub use settings::{FormationMode, GenerationSettings};
pub use terrain_generator::{MapStats, TerrainGenerator, TerrainMap};
pub use terrain_renderer::TerrainRenderer;
