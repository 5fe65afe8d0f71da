//! Membership collections and spatial placement of every agent in an arena.
//!
//! A [`Population`] owns the [`AgentRecord`]s, the three per-[`Kind`]
//! membership lists and the [`SpatialGrid`]. Keeping all three behind one
//! type is what upholds the membership invariant: every agent is in exactly
//! one list, and is listed in exactly the grid cells its current bounding
//! range covers. Shapes only change through [`Population::relocate`].
//!
//! # Example
//!
//! ```
//! use arena_core::prelude::*;
//!
//! let mut pop = Population::new(10.0, 10.0, 10, 10).unwrap();
//! let rock = AgentRecord::new(
//!     AgentCode(0),
//!     "obstacle",
//!     Kind::Stationary,
//!     1,
//!     AssetCode(0),
//!     Passability::Solid,
//!     Shape::rect(Point::new(5.0, 5.0), 1.0, 1.0),
//! );
//! pop.insert(rock).unwrap();
//!
//! let near: Vec<_> = pop
//!     .query_nearby(Point::new(5.0, 5.0), 0.6, Filter::Name("obstacle"))
//!     .map(|r| r.code)
//!     .collect();
//! assert_eq!(near, vec![AgentCode(0)]);
//! ```

use std::collections::BTreeMap;

use crate::agent::{AgentCode, AgentRecord, Kind};
use crate::geometry::{Point, Range, Shape};
use crate::grid::SpatialGrid;
use crate::registry::AssetCode;
use crate::CoreError;

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Narrows queries to a subset of agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter<'a> {
    /// Every agent.
    Any,
    /// Agents that can block or be met: stationary and moving.
    Interacting,
    /// Agents of one kind.
    Kind(Kind),
    /// Agents with the given name.
    Name(&'a str),
}

impl Filter<'_> {
    pub fn matches(&self, record: &AgentRecord) -> bool {
        match self {
            Filter::Any => true,
            Filter::Interacting => record.kind != Kind::Background,
            Filter::Kind(kind) => record.kind == *kind,
            Filter::Name(name) => record.name == *name,
        }
    }
}

// ---------------------------------------------------------------------------
// Population
// ---------------------------------------------------------------------------

/// The authoritative set of agents held by an arena.
#[derive(Debug, Clone)]
pub struct Population {
    bounds: Range,
    records: BTreeMap<AgentCode, AgentRecord>,
    /// Membership lists indexed by [`Kind::slot`], in insertion order.
    members: [Vec<AgentCode>; 3],
    grid: SpatialGrid,
}

impl Population {
    /// An empty population over `[0, width] x [0, height]`.
    pub fn new(
        width: f64,
        height: f64,
        x_divisions: usize,
        y_divisions: usize,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            bounds: Range::new(Point::new(0.0, 0.0), Point::new(width, height)),
            records: BTreeMap::new(),
            members: [Vec::new(), Vec::new(), Vec::new()],
            grid: SpatialGrid::new(width, height, x_divisions, y_divisions)?,
        })
    }

    pub fn bounds(&self) -> Range {
        self.bounds
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    // -- structural changes -------------------------------------------------

    /// Add `record` to its membership list and to the grid.
    pub fn insert(&mut self, record: AgentRecord) -> Result<(), CoreError> {
        if self.records.contains_key(&record.code) {
            return Err(CoreError::DuplicateAgent { code: record.code });
        }
        self.grid.insert(record.code, &record.shape);
        self.members[record.kind.slot()].push(record.code);
        self.records.insert(record.code, record);
        Ok(())
    }

    /// Take `code` out of its membership list and the grid, returning its
    /// record.
    pub fn remove(&mut self, code: AgentCode) -> Result<AgentRecord, CoreError> {
        let record = self
            .records
            .remove(&code)
            .ok_or(CoreError::UnknownAgent { code })?;
        self.grid.remove(code, &record.shape);
        self.members[record.kind.slot()].retain(|c| *c != code);
        Ok(record)
    }

    /// Replace the shape of `code`, moving its grid listings along.
    pub fn relocate(&mut self, code: AgentCode, next: Shape) -> Result<(), CoreError> {
        let record = self
            .records
            .get_mut(&code)
            .ok_or(CoreError::UnknownAgent { code })?;
        self.grid.relocate(code, &mut record.shape, next);
        Ok(())
    }

    /// Point `code` at a different asset.
    pub fn set_asset(&mut self, code: AgentCode, asset: AssetCode) -> Result<(), CoreError> {
        let record = self
            .records
            .get_mut(&code)
            .ok_or(CoreError::UnknownAgent { code })?;
        record.asset = asset;
        Ok(())
    }

    // -- lookups ------------------------------------------------------------

    pub fn get(&self, code: AgentCode) -> Option<&AgentRecord> {
        self.records.get(&code)
    }

    pub fn contains(&self, code: AgentCode) -> bool {
        self.records.contains_key(&code)
    }

    /// Every record in code order, which is also insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &AgentRecord> + '_ {
        self.records.values()
    }

    /// The membership list for `kind`, in insertion order.
    pub fn members(&self, kind: Kind) -> &[AgentCode] {
        &self.members[kind.slot()]
    }

    /// Records matching `filter`, in code order.
    pub fn matching<'a>(&'a self, filter: Filter<'a>) -> impl Iterator<Item = &'a AgentRecord> + 'a {
        self.records.values().filter(move |r| filter.matches(r))
    }

    pub fn count(&self, filter: Filter<'_>) -> usize {
        self.records.values().filter(|r| filter.matches(r)).count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    // -- spatial queries ----------------------------------------------------

    /// Agents matching `filter` whose bounding range overlaps the square of
    /// side `2 * radius` centered on `point`.
    ///
    /// The iterator is lazy and yields each agent once.
    pub fn query_nearby<'a>(
        &'a self,
        point: Point,
        radius: f64,
        filter: Filter<'a>,
    ) -> impl Iterator<Item = &'a AgentRecord> + 'a {
        self.query_range(Range::around(point, radius), filter)
    }

    /// Agents matching `filter` whose bounding range overlaps `probe`.
    pub fn query_range<'a>(
        &'a self,
        probe: Range,
        filter: Filter<'a>,
    ) -> impl Iterator<Item = &'a AgentRecord> + 'a {
        self.grid
            .candidates(&probe)
            .filter_map(move |code| self.records.get(&code))
            .filter(move |r| filter.matches(r) && r.shape.range().overlaps(&probe))
    }

    // -- invariants ---------------------------------------------------------

    /// Verify the membership invariant in full. Linear in agents times grid
    /// size, so only for tests and debug checks.
    pub fn check_invariants(&self) -> Result<(), CoreError> {
        let listed: usize = self.members.iter().map(Vec::len).sum();
        if listed != self.records.len() {
            return Err(CoreError::InvariantViolation {
                detail: format!(
                    "{listed} membership entries for {} agents",
                    self.records.len()
                ),
            });
        }
        for kind in Kind::ALL {
            for code in self.members(kind) {
                match self.records.get(code) {
                    Some(r) if r.kind == kind => {}
                    Some(r) => {
                        return Err(CoreError::InvariantViolation {
                            detail: format!("{code} is {:?} but listed as {kind:?}", r.kind),
                        })
                    }
                    None => {
                        return Err(CoreError::InvariantViolation {
                            detail: format!("{code} listed as {kind:?} but has no record"),
                        })
                    }
                }
            }
        }

        let mut expected_listings = 0;
        for record in self.records.values() {
            let mut expected: Vec<_> = self.grid.covering_cells(&record.shape.range()).iter().collect();
            expected.sort_unstable();
            let mut actual = self.grid.cells_listing(record.code);
            actual.sort_unstable();
            if expected != actual {
                return Err(CoreError::InvariantViolation {
                    detail: format!(
                        "{} covers {expected:?} but is listed in {actual:?}",
                        record.code
                    ),
                });
            }
            expected_listings += expected.len();
        }
        if expected_listings != self.grid.listing_count() {
            return Err(CoreError::InvariantViolation {
                detail: "grid lists agents that are not held".to_owned(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Passability;

    fn agent(code: u32, name: &str, kind: Kind, at: Point, size: f64) -> AgentRecord {
        AgentRecord::new(
            AgentCode(code),
            name,
            kind,
            1,
            AssetCode(0),
            Passability::Solid,
            Shape::rect(at, size, size),
        )
    }

    fn populated() -> Population {
        let mut pop = Population::new(10.0, 10.0, 10, 10).unwrap();
        pop.insert(agent(0, "backdrop", Kind::Background, Point::new(5.0, 5.0), 0.0))
            .unwrap();
        pop.insert(agent(1, "obstacle", Kind::Stationary, Point::new(5.0, 5.0), 1.0))
            .unwrap();
        pop.insert(agent(2, "hare", Kind::Moving, Point::new(5.0, 3.0), 0.1))
            .unwrap();
        pop.insert(agent(3, "hare", Kind::Moving, Point::new(9.0, 9.0), 0.1))
            .unwrap();
        pop
    }

    #[test]
    fn insert_routes_by_kind() {
        let pop = populated();
        assert_eq!(pop.members(Kind::Background), &[AgentCode(0)]);
        assert_eq!(pop.members(Kind::Stationary), &[AgentCode(1)]);
        assert_eq!(pop.members(Kind::Moving), &[AgentCode(2), AgentCode(3)]);
        pop.check_invariants().unwrap();
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut pop = populated();
        let err = pop
            .insert(agent(1, "obstacle", Kind::Stationary, Point::new(1.0, 1.0), 1.0))
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateAgent { .. }));
    }

    #[test]
    fn remove_clears_membership_and_grid() {
        let mut pop = populated();
        let removed = pop.remove(AgentCode(2)).unwrap();
        assert_eq!(removed.name, "hare");
        assert_eq!(pop.members(Kind::Moving), &[AgentCode(3)]);
        assert!(pop.grid().cells_listing(AgentCode(2)).is_empty());
        assert!(matches!(
            pop.remove(AgentCode(2)),
            Err(CoreError::UnknownAgent { .. })
        ));
        pop.check_invariants().unwrap();
    }

    #[test]
    fn query_by_name_finds_obstacle() {
        let pop = populated();
        let found: Vec<_> = pop
            .query_nearby(Point::new(5.0, 5.0), 0.6, Filter::Name("obstacle"))
            .map(|r| r.code)
            .collect();
        assert_eq!(found, vec![AgentCode(1)]);
    }

    #[test]
    fn query_excludes_agents_outside_probe() {
        let pop = populated();
        let hares: Vec<_> = pop
            .query_nearby(Point::new(5.0, 3.0), 0.5, Filter::Name("hare"))
            .map(|r| r.code)
            .collect();
        assert_eq!(hares, vec![AgentCode(2)]);
        assert_eq!(pop.query_nearby(Point::new(1.0, 1.0), 0.2, Filter::Any).count(), 0);
    }

    #[test]
    fn relocate_updates_queries() {
        let mut pop = populated();
        let moved = pop.get(AgentCode(3)).unwrap().shape().translated_to(Point::new(1.0, 1.0));
        pop.relocate(AgentCode(3), moved).unwrap();
        assert_eq!(pop.get(AgentCode(3)).unwrap().position(), Point::new(1.0, 1.0));
        assert_eq!(
            pop.query_nearby(Point::new(1.0, 1.0), 0.2, Filter::Kind(Kind::Moving))
                .count(),
            1
        );
        pop.check_invariants().unwrap();
    }

    #[test]
    fn counts_by_filter() {
        let pop = populated();
        assert_eq!(pop.count(Filter::Any), 4);
        assert_eq!(pop.count(Filter::Interacting), 3);
        assert_eq!(pop.count(Filter::Name("hare")), 2);
        assert_eq!(pop.count(Filter::Kind(Kind::Background)), 1);
    }
}
