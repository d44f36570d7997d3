use serde::{Deserialize, Serialize};

/// Grid position as (row, column).
pub type Coord = (usize, usize);

/// Row/column offset.
pub type Offset = (isize, isize);

/// The four orthogonal steps, used by rivers and territory growth.
pub const ORTHOGONAL: [Offset; 4] = [(0, 1), (1, 0), (0, -1), (-1, 0)];

/// The 8-neighborhood, used for mid-sized city footprints.
pub const SQUARE: [Offset; 8] = [
    (0, 1), (1, 0), (0, -1), (-1, 0),
    (-1, -1), (-1, 1), (1, -1), (1, 1),
];

/// Every offset within radius 2 except the origin and the four far diagonals.
/// Drives diffusion, isolation repair, smoothing and settlement scoring.
pub const NEIGHBORHOOD: [Offset; 20] = [
    (0, 1), (0, -1), (1, 0), (-1, 0),
    (0, 2), (0, -2), (2, 0), (-2, 0),
    (-1, -1), (-1, 1), (1, -1), (1, 1),
    (-2, -1), (-2, 1), (-1, 2), (1, 2),
    (2, 1), (2, -1), (1, -2), (-1, -2),
];

/// Which axes connect their opposite edges.
///
/// Storage always wraps; an unwrapped axis only stops particles from feeling each
/// other across the edge and gets a painted map border.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AxisWrap {
    /// Top and bottom rows are adjacent
    pub rows: bool,
    /// Left and right columns are adjacent
    pub columns: bool,
}

impl AxisWrap {
    pub const TORUS: AxisWrap = AxisWrap { rows: true, columns: true };
    pub const BORDERED: AxisWrap = AxisWrap { rows: false, columns: false };
}

/// Maps any integer pair onto a `height` x `width` torus.
pub fn wrap(row: isize, col: isize, height: usize, width: usize) -> Coord {
    (
        row.rem_euclid(height as isize) as usize,
        col.rem_euclid(width as isize) as usize,
    )
}

/// `coord` moved by `offset`, wrapped.
pub fn offset(coord: Coord, delta: Offset, height: usize, width: usize) -> Coord {
    wrap(
        coord.0 as isize + delta.0,
        coord.1 as isize + delta.1,
        height,
        width,
    )
}

/// Orthogonally adjacent on the torus.
pub fn touches(a: Coord, b: Coord, height: usize, width: usize) -> bool {
    ORTHOGONAL
        .iter()
        .any(|&d| offset(a, d, height, width) == b)
}

/// Whether `a` and `b` pull the same way (both non-zero, same sign).
pub fn same_sign(a: i32, b: i32) -> bool {
    a.signum() * b.signum() > 0
}
