//! Spatial partition collaborator
//!
//! The partition owns cell geometry. The visibility index only asks it which
//! cells a box overlaps, which area a set of cells belongs to, and whether any
//! of a set of cells is potentially visible.

use super::bounds::Aabb;
use crate::foundation::math::Vec3;
use std::sync::{PoisonError, RwLock};

/// Index of a cell in the current level's partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(pub u32);

impl CellId {
    /// Position in per-cell arrays
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Portal area a group of cells belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AreaId(pub u16);

/// Query interface of the level's spatial partition
pub trait SpatialPartition: Send + Sync {
    /// Number of cells in the level
    fn cell_count(&self) -> usize;

    /// Append every cell overlapping `bounds` to `out`
    fn cells_in_box(&self, bounds: &Aabb, out: &mut Vec<CellId>);

    /// The single area all `cells` lie in, or `None` if they span several
    fn area_of_cells(&self, cells: &[CellId]) -> Option<AreaId>;

    /// Potentially-visible-set test for the current view
    fn any_cells_visible(&self, cells: &[CellId]) -> bool;

    /// Append the cells visible from `origin` to `out`, nearest first
    fn visible_cells_from(&self, origin: Vec3, out: &mut Vec<CellId>);
}

/// Regular grid of cubic cells
///
/// Used by tests and tools that need a partition without level data. Every
/// cell starts in area 0 and potentially visible.
#[derive(Debug)]
pub struct UniformGridPartition {
    origin: Vec3,
    cell_size: f32,
    dims: [u32; 3],
    areas: Vec<AreaId>,
    pvs: RwLock<Vec<bool>>,
}

impl UniformGridPartition {
    /// Create a grid of `dims` cells of `cell_size` starting at `origin`
    pub fn new(origin: Vec3, cell_size: f32, dims: [u32; 3]) -> Self {
        let count = dims.iter().map(|&d| d as usize).product();
        Self {
            origin,
            cell_size,
            dims,
            areas: vec![AreaId(0); count],
            pvs: RwLock::new(vec![true; count]),
        }
    }

    /// Cell containing a point, if inside the grid
    pub fn cell_at(&self, point: Vec3) -> Option<CellId> {
        let mut coords = [0u32; 3];
        for axis in 0..3 {
            let t = ((point[axis] - self.origin[axis]) / self.cell_size).floor();
            if t < 0.0 || t >= self.dims[axis] as f32 {
                return None;
            }
            coords[axis] = t as u32;
        }
        Some(self.cell_of(coords))
    }

    /// World bounds of a cell
    pub fn cell_bounds(&self, cell: CellId) -> Aabb {
        let [x, y, z] = self.coords_of(cell);
        let min = self.origin + Vec3::new(x as f32, y as f32, z as f32) * self.cell_size;
        Aabb::new(min, min + Vec3::repeat(self.cell_size))
    }

    /// Assign a cell to an area
    pub fn set_area(&mut self, cell: CellId, area: AreaId) {
        if let Some(slot) = self.areas.get_mut(cell.index()) {
            *slot = area;
        }
    }

    /// Replace the potentially visible set; cells not listed become hidden
    pub fn set_visible_cells(&self, cells: &[CellId]) {
        let mut pvs = self.pvs.write().unwrap_or_else(PoisonError::into_inner);
        pvs.iter_mut().for_each(|v| *v = false);
        for cell in cells {
            if let Some(slot) = pvs.get_mut(cell.index()) {
                *slot = true;
            }
        }
    }

    /// Mark every cell potentially visible
    pub fn reset_visibility(&self) {
        let mut pvs = self.pvs.write().unwrap_or_else(PoisonError::into_inner);
        pvs.iter_mut().for_each(|v| *v = true);
    }

    fn cell_of(&self, [x, y, z]: [u32; 3]) -> CellId {
        CellId(x + self.dims[0] * (y + self.dims[1] * z))
    }

    fn coords_of(&self, cell: CellId) -> [u32; 3] {
        let x = cell.0 % self.dims[0];
        let y = (cell.0 / self.dims[0]) % self.dims[1];
        let z = cell.0 / (self.dims[0] * self.dims[1]);
        [x, y, z]
    }

    /// Inclusive cell index range covered by `[min, max)` on one axis
    fn axis_range(&self, axis: usize, min: f32, max: f32) -> Option<(u32, u32)> {
        let limit = self.dims[axis] as f32;
        let lo = ((min - self.origin[axis]) / self.cell_size).floor();
        let hi = (((max - self.origin[axis]) / self.cell_size).ceil() - 1.0).max(lo);
        if hi < 0.0 || lo >= limit {
            return None;
        }
        Some((lo.max(0.0) as u32, hi.min(limit - 1.0) as u32))
    }
}

impl SpatialPartition for UniformGridPartition {
    fn cell_count(&self) -> usize {
        self.areas.len()
    }

    fn cells_in_box(&self, bounds: &Aabb, out: &mut Vec<CellId>) {
        if bounds.is_empty() {
            return;
        }
        let Some((x0, x1)) = self.axis_range(0, bounds.min.x, bounds.max.x) else { return };
        let Some((y0, y1)) = self.axis_range(1, bounds.min.y, bounds.max.y) else { return };
        let Some((z0, z1)) = self.axis_range(2, bounds.min.z, bounds.max.z) else { return };

        for z in z0..=z1 {
            for y in y0..=y1 {
                for x in x0..=x1 {
                    out.push(self.cell_of([x, y, z]));
                }
            }
        }
    }

    fn area_of_cells(&self, cells: &[CellId]) -> Option<AreaId> {
        let (first, rest) = cells.split_first()?;
        let area = *self.areas.get(first.index())?;
        rest.iter()
            .all(|c| self.areas.get(c.index()) == Some(&area))
            .then_some(area)
    }

    fn any_cells_visible(&self, cells: &[CellId]) -> bool {
        let pvs = self.pvs.read().unwrap_or_else(PoisonError::into_inner);
        cells.iter().any(|c| pvs.get(c.index()).copied().unwrap_or(false))
    }

    fn visible_cells_from(&self, origin: Vec3, out: &mut Vec<CellId>) {
        let start = out.len();
        {
            let pvs = self.pvs.read().unwrap_or_else(PoisonError::into_inner);
            out.extend(
                pvs.iter()
                    .enumerate()
                    .filter(|(_, visible)| **visible)
                    .filter_map(|(i, _)| u32::try_from(i).ok().map(CellId)),
            );
        }
        out[start..].sort_by(|a, b| {
            let da = self.cell_bounds(*a).distance_squared_to_point(origin);
            let db = self.cell_bounds(*b).distance_squared_to_point(origin);
            da.total_cmp(&db).then(a.cmp(b))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> UniformGridPartition {
        UniformGridPartition::new(Vec3::zeros(), 64.0, [4, 4, 1])
    }

    #[test]
    fn test_cells_in_box_half_open() {
        let grid = grid();
        let mut cells = Vec::new();

        grid.cells_in_box(&Aabb::new(Vec3::zeros(), Vec3::repeat(64.0)), &mut cells);
        assert_eq!(cells, vec![CellId(0)]);

        cells.clear();
        grid.cells_in_box(&Aabb::new(Vec3::new(60.0, 0.0, 0.0), Vec3::new(70.0, 1.0, 1.0)), &mut cells);
        assert_eq!(cells, vec![CellId(0), CellId(1)]);

        cells.clear();
        grid.cells_in_box(&Aabb::new(Vec3::repeat(-500.0), Vec3::repeat(-400.0)), &mut cells);
        assert!(cells.is_empty());
    }

    #[test]
    fn test_area_of_cells() {
        let mut grid = grid();
        grid.set_area(CellId(1), AreaId(2));

        assert_eq!(grid.area_of_cells(&[CellId(0), CellId(4)]), Some(AreaId(0)));
        assert_eq!(grid.area_of_cells(&[CellId(0), CellId(1)]), None);
        assert_eq!(grid.area_of_cells(&[]), None);
    }

    #[test]
    fn test_visibility_and_ordering() {
        let grid = grid();
        grid.set_visible_cells(&[CellId(3), CellId(0)]);

        assert!(grid.any_cells_visible(&[CellId(1), CellId(3)]));
        assert!(!grid.any_cells_visible(&[CellId(1), CellId(2)]));

        let mut order = Vec::new();
        grid.visible_cells_from(Vec3::new(250.0, 10.0, 10.0), &mut order);
        assert_eq!(order, vec![CellId(3), CellId(0)]);

        grid.reset_visibility();
        assert!(grid.any_cells_visible(&[CellId(2)]));
    }

    #[test]
    fn test_cell_at() {
        let grid = grid();
        assert_eq!(grid.cell_at(Vec3::new(65.0, 1.0, 1.0)), Some(CellId(1)));
        assert_eq!(grid.cell_at(Vec3::new(-1.0, 1.0, 1.0)), None);
    }
}
