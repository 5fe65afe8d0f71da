//! Uniform spatial grid over the arena bounds.
//!
//! The arena `[0, width] x [0, height]` is divided into
//! `x_divisions x y_divisions` equal cells. Every agent is listed in each cell
//! its bounding [`Range`] touches. Cell lookup divides a coordinate by the
//! cell size, truncates, and clamps into the valid index range, so shapes that
//! poke outside the arena land in the border cells instead of being rejected.
//!
//! Cells keep insertion order, so iteration is deterministic for a given
//! sequence of operations.

use std::collections::HashSet;

use crate::agent::AgentCode;
use crate::geometry::{Point, Range, Shape};
use crate::CoreError;

// ---------------------------------------------------------------------------
// CellSpan
// ---------------------------------------------------------------------------

/// An inclusive rectangle of cell indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellSpan {
    pub min_x: usize,
    pub min_y: usize,
    pub max_x: usize,
    pub max_y: usize,
}

impl CellSpan {
    /// Every `(x, y)` cell in the span, row by row.
    pub fn iter(self) -> impl Iterator<Item = (usize, usize)> {
        (self.min_y..=self.max_y).flat_map(move |y| (self.min_x..=self.max_x).map(move |x| (x, y)))
    }

    /// Number of cells in the span. Never zero.
    pub fn cell_count(&self) -> usize {
        (self.max_x - self.min_x + 1) * (self.max_y - self.min_y + 1)
    }
}

// ---------------------------------------------------------------------------
// SpatialGrid
// ---------------------------------------------------------------------------

/// Maps grid cells to the agents whose bounding range overlaps them.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    x_divisions: usize,
    y_divisions: usize,
    cell_width: f64,
    cell_height: f64,
    /// Row-major: `cells[y * x_divisions + x]`.
    cells: Vec<Vec<AgentCode>>,
}

impl SpatialGrid {
    /// Create an empty grid covering `[0, width] x [0, height]`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidGrid`] if either dimension is not a
    /// positive finite number or either division count is zero.
    pub fn new(
        width: f64,
        height: f64,
        x_divisions: usize,
        y_divisions: usize,
    ) -> Result<Self, CoreError> {
        if !(width.is_finite() && width > 0.0 && height.is_finite() && height > 0.0) {
            return Err(CoreError::InvalidGrid {
                detail: format!("bounds must be positive and finite, got {width} x {height}"),
            });
        }
        if x_divisions == 0 || y_divisions == 0 {
            return Err(CoreError::InvalidGrid {
                detail: format!("divisions must be non-zero, got {x_divisions} x {y_divisions}"),
            });
        }
        Ok(Self {
            x_divisions,
            y_divisions,
            cell_width: width / x_divisions as f64,
            cell_height: height / y_divisions as f64,
            cells: vec![Vec::new(); x_divisions * y_divisions],
        })
    }

    pub fn divisions(&self) -> (usize, usize) {
        (self.x_divisions, self.y_divisions)
    }

    /// The cell containing `p`, clamped into the grid.
    pub fn cell_of(&self, p: Point) -> (usize, usize) {
        (
            clamp_index(p.x / self.cell_width, self.x_divisions),
            clamp_index(p.y / self.cell_height, self.y_divisions),
        )
    }

    /// The cells touched by `range`.
    pub fn covering_cells(&self, range: &Range) -> CellSpan {
        let (min_x, min_y) = self.cell_of(range.min);
        let (max_x, max_y) = self.cell_of(range.max);
        CellSpan {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        y * self.x_divisions + x
    }

    /// The agents listed in cell `(x, y)`.
    pub fn cell(&self, x: usize, y: usize) -> &[AgentCode] {
        &self.cells[self.index(x, y)]
    }

    /// List `code` in every cell covering `shape`.
    pub fn insert(&mut self, code: AgentCode, shape: &Shape) {
        for (x, y) in self.covering_cells(&shape.range()).iter() {
            let i = self.index(x, y);
            let cell = &mut self.cells[i];
            if !cell.contains(&code) {
                cell.push(code);
            }
        }
    }

    /// Drop `code` from every cell covering `shape`.
    pub fn remove(&mut self, code: AgentCode, shape: &Shape) {
        for (x, y) in self.covering_cells(&shape.range()).iter() {
            let i = self.index(x, y);
            self.cells[i].retain(|c| *c != code);
        }
    }

    /// Move `code` from the cells of `current` to the cells of `next`, then
    /// commit `next` into `current`.
    pub fn relocate(&mut self, code: AgentCode, current: &mut Shape, next: Shape) {
        self.remove(code, current);
        self.insert(code, &next);
        *current = next;
    }

    /// Every agent listed in a cell touched by `probe`, each yielded once.
    ///
    /// Agents are not filtered by their actual extent; callers narrow the
    /// candidates down.
    pub fn candidates(&self, probe: &Range) -> impl Iterator<Item = AgentCode> + '_ {
        let mut seen = HashSet::new();
        self.covering_cells(probe)
            .iter()
            .flat_map(move |(x, y)| self.cell(x, y).iter().copied())
            .filter(move |code| seen.insert(*code))
    }

    /// The cells that currently list `code`. Linear in the grid size; meant
    /// for consistency checks.
    pub fn cells_listing(&self, code: AgentCode) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        for y in 0..self.y_divisions {
            for x in 0..self.x_divisions {
                if self.cell(x, y).contains(&code) {
                    out.push((x, y));
                }
            }
        }
        out
    }

    /// Total number of listings across all cells.
    pub fn listing_count(&self) -> usize {
        self.cells.iter().map(Vec::len).sum()
    }
}

fn clamp_index(scaled: f64, divisions: usize) -> usize {
    if scaled.is_nan() || scaled <= 0.0 {
        return 0;
    }
    (scaled as usize).min(divisions - 1)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> SpatialGrid {
        SpatialGrid::new(10.0, 10.0, 10, 10).unwrap()
    }

    #[test]
    fn rejects_degenerate_configuration() {
        assert!(SpatialGrid::new(0.0, 10.0, 10, 10).is_err());
        assert!(SpatialGrid::new(10.0, f64::NAN, 10, 10).is_err());
        assert!(SpatialGrid::new(10.0, 10.0, 0, 10).is_err());
    }

    #[test]
    fn cell_lookup_clamps_out_of_bounds() {
        let g = grid();
        assert_eq!(g.cell_of(Point::new(-3.0, 4.5)), (0, 4));
        assert_eq!(g.cell_of(Point::new(42.0, 10.0)), (9, 9));
        assert_eq!(g.cell_of(Point::new(9.99, 0.0)), (9, 0));
    }

    #[test]
    fn shape_on_cell_corner_covers_four_cells() {
        let mut g = grid();
        let shape = Shape::rect(Point::new(5.0, 5.0), 1.0, 1.0);
        g.insert(AgentCode(7), &shape);
        let mut cells = g.cells_listing(AgentCode(7));
        cells.sort();
        assert_eq!(cells, vec![(4, 4), (4, 5), (5, 4), (5, 5)]);
    }

    #[test]
    fn relocate_moves_listings_and_commits_shape() {
        let mut g = grid();
        let mut shape = Shape::rect(Point::new(1.5, 1.5), 0.5, 0.5);
        g.insert(AgentCode(1), &shape);
        let next = shape.translated_to(Point::new(8.5, 8.5));
        g.relocate(AgentCode(1), &mut shape, next);
        assert_eq!(shape.center(), Point::new(8.5, 8.5));
        assert_eq!(g.cells_listing(AgentCode(1)), vec![(8, 8)]);
        assert_eq!(g.listing_count(), 1);
    }

    #[test]
    fn candidates_are_deduplicated() {
        let mut g = grid();
        // Spans a 3x3 block of cells.
        let big = Shape::rect(Point::new(5.0, 5.0), 2.5, 2.5);
        g.insert(AgentCode(3), &big);
        let found: Vec<_> = g.candidates(&Range::around(Point::new(5.0, 5.0), 3.0)).collect();
        assert_eq!(found, vec![AgentCode(3)]);
    }

    #[test]
    fn remove_clears_every_cell() {
        let mut g = grid();
        let big = Shape::rect(Point::new(5.0, 5.0), 4.0, 4.0);
        g.insert(AgentCode(9), &big);
        assert!(g.listing_count() > 1);
        g.remove(AgentCode(9), &big);
        assert_eq!(g.listing_count(), 0);
    }
}
