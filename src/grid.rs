//! Decomposition of a virtual N-dimensional array into fixed-size cells.
//!
//! A [`CellGrid`] is immutable: the array dimensions and the nominal cell
//! dimensions are fixed at construction. Every cell key in `[0, num_cells)`
//! maps to exactly one box of element positions, and the boxes tile the
//! array without overlap.
//!
//! ## Layout
//!
//! ```text
//!   dimensions      = [10, 7]
//!   cell_dimensions = [4, 4]
//!   grid_dimensions = [3, 2]        (ceil(10/4), ceil(7/4))
//!
//!        x: 0   4   8  10
//!   y: 0 ┌───┬───┬─┐
//!        │ 0 │ 1 │2│     keys are linearized with axis 0 varying fastest
//!      4 ├───┼───┼─┤
//!        │ 3 │ 4 │5│     cells 2 and 5 are truncated to width 2,
//!      7 └───┴───┴─┘     cells 3, 4 and 5 to height 3
//! ```
//!
//! Truncated boundary cells are not an error; callers must honour the bounds
//! returned by [`CellGrid::bounds`] and [`CellGrid::cell_size`].
//!
//! ## Example Usage
//!
//! ```
//! use cellcache::grid::CellGrid;
//!
//! let grid = CellGrid::try_new(&[640, 640, 640], &[64, 64, 64]).unwrap();
//! assert_eq!(grid.num_cells(), 1000);
//!
//! let bounds = grid.bounds(999).unwrap();
//! assert_eq!(bounds.min, vec![576, 576, 576]);
//! assert_eq!(bounds.max, vec![639, 639, 639]);
//! ```

use crate::error::{CellCacheError, ConfigError};

/// Inclusive bounding box of a cell in array coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellBounds {
    /// Smallest element position covered by the cell.
    pub min: Vec<u64>,
    /// Largest element position covered by the cell (inclusive).
    pub max: Vec<u64>,
}

impl CellBounds {
    /// Per-axis extent of the box.
    pub fn size(&self) -> Vec<usize> {
        self.min
            .iter()
            .zip(&self.max)
            .map(|(lo, hi)| (hi - lo + 1) as usize)
            .collect()
    }

    /// Number of elements inside the box.
    pub fn element_count(&self) -> usize {
        self.size().iter().product()
    }

    /// Returns `true` if `pos` lies inside the box.
    pub fn contains(&self, pos: &[u64]) -> bool {
        pos.len() == self.min.len()
            && pos
                .iter()
                .zip(self.min.iter().zip(&self.max))
                .all(|(p, (lo, hi))| p >= lo && p <= hi)
    }

    /// Returns `true` if the two boxes share at least one element.
    pub fn intersects(&self, other: &CellBounds) -> bool {
        self.min.len() == other.min.len()
            && (0..self.min.len())
                .all(|d| self.min[d] <= other.max[d] && other.min[d] <= self.max[d])
    }
}

/// Grid of cells over a virtual array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellGrid {
    dimensions: Vec<u64>,
    cell_dimensions: Vec<u32>,
    grid_dimensions: Vec<u64>,
    num_cells: u64,
}

impl CellGrid {
    /// Creates a grid, validating that both shapes agree and are non-empty.
    pub fn try_new(dimensions: &[u64], cell_dimensions: &[u32]) -> Result<Self, ConfigError> {
        if dimensions.is_empty() {
            return Err(ConfigError::new("grid must have at least one axis"));
        }
        if dimensions.len() != cell_dimensions.len() {
            return Err(ConfigError::new(format!(
                "dimensions have {} axes but cell_dimensions have {}",
                dimensions.len(),
                cell_dimensions.len()
            )));
        }
        if let Some(d) = dimensions.iter().position(|&n| n == 0) {
            return Err(ConfigError::new(format!("dimension {d} is zero")));
        }
        if let Some(d) = cell_dimensions.iter().position(|&n| n == 0) {
            return Err(ConfigError::new(format!("cell dimension {d} is zero")));
        }

        let grid_dimensions: Vec<u64> = dimensions
            .iter()
            .zip(cell_dimensions)
            .map(|(&n, &c)| n.div_ceil(u64::from(c)))
            .collect();
        let num_cells = grid_dimensions
            .iter()
            .try_fold(1u64, |acc, &g| acc.checked_mul(g))
            .ok_or_else(|| ConfigError::new("number of cells overflows u64"))?;

        Ok(Self {
            dimensions: dimensions.to_vec(),
            cell_dimensions: cell_dimensions.to_vec(),
            grid_dimensions,
            num_cells,
        })
    }

    pub fn num_dimensions(&self) -> usize {
        self.dimensions.len()
    }

    /// Array extent per axis.
    pub fn dimensions(&self) -> &[u64] {
        &self.dimensions
    }

    /// Nominal cell extent per axis.
    pub fn cell_dimensions(&self) -> &[u32] {
        &self.cell_dimensions
    }

    /// Number of cells per axis (boundary cells included).
    pub fn grid_dimensions(&self) -> &[u64] {
        &self.grid_dimensions
    }

    pub fn num_cells(&self) -> u64 {
        self.num_cells
    }

    /// Element count of a full, untruncated cell.
    pub fn nominal_cell_element_count(&self) -> usize {
        self.cell_dimensions.iter().map(|&c| c as usize).product()
    }

    /// Position of `key` in the grid of cells.
    pub fn cell_grid_position(&self, key: u64) -> Result<Vec<u64>, CellCacheError> {
        self.check_key(key)?;
        let mut rest = key;
        Ok(self
            .grid_dimensions
            .iter()
            .map(|&g| {
                let p = rest % g;
                rest /= g;
                p
            })
            .collect())
    }

    /// Inverse of [`cell_grid_position`](Self::cell_grid_position).
    pub fn key_for_grid_position(&self, grid_pos: &[u64]) -> Result<u64, CellCacheError> {
        if grid_pos.len() != self.num_dimensions()
            || grid_pos.iter().zip(&self.grid_dimensions).any(|(p, g)| p >= g)
        {
            return Err(CellCacheError::out_of_bounds(format!(
                "grid position {grid_pos:?}"
            )));
        }
        let mut key = 0u64;
        for (p, g) in grid_pos.iter().zip(&self.grid_dimensions).rev() {
            key = key * g + p;
        }
        Ok(key)
    }

    /// Key of the cell containing the element at `pos`.
    pub fn key_for_element(&self, pos: &[u64]) -> Result<u64, CellCacheError> {
        self.check_position(pos)?;
        let grid_pos: Vec<u64> = pos
            .iter()
            .zip(&self.cell_dimensions)
            .map(|(&p, &c)| p / u64::from(c))
            .collect();
        self.key_for_grid_position(&grid_pos)
    }

    /// Minimum corner of cell `key`.
    pub fn cell_min(&self, key: u64) -> Result<Vec<u64>, CellCacheError> {
        Ok(self
            .cell_grid_position(key)?
            .iter()
            .zip(&self.cell_dimensions)
            .map(|(&g, &c)| g * u64::from(c))
            .collect())
    }

    /// Extent of cell `key`, truncated at the array boundary.
    pub fn cell_size(&self, key: u64) -> Result<Vec<usize>, CellCacheError> {
        let min = self.cell_min(key)?;
        Ok(min
            .iter()
            .zip(self.dimensions.iter().zip(&self.cell_dimensions))
            .map(|(&lo, (&n, &c))| (n - lo).min(u64::from(c)) as usize)
            .collect())
    }

    pub fn cell_element_count(&self, key: u64) -> Result<usize, CellCacheError> {
        Ok(self.cell_size(key)?.iter().product())
    }

    /// Inclusive bounds of cell `key`.
    pub fn bounds(&self, key: u64) -> Result<CellBounds, CellCacheError> {
        let min = self.cell_min(key)?;
        let size = self.cell_size(key)?;
        let max = min
            .iter()
            .zip(&size)
            .map(|(&lo, &s)| lo + s as u64 - 1)
            .collect();
        Ok(CellBounds { min, max })
    }

    /// Returns `true` if the cell is smaller than the nominal cell size.
    pub fn is_truncated(&self, key: u64) -> Result<bool, CellCacheError> {
        Ok(self
            .cell_size(key)?
            .iter()
            .zip(&self.cell_dimensions)
            .any(|(&s, &c)| s < c as usize))
    }

    fn check_key(&self, key: u64) -> Result<(), CellCacheError> {
        if key >= self.num_cells {
            return Err(CellCacheError::out_of_bounds(format!(
                "cell key {key} (grid has {} cells)",
                self.num_cells
            )));
        }
        Ok(())
    }

    fn check_position(&self, pos: &[u64]) -> Result<(), CellCacheError> {
        if pos.len() != self.num_dimensions()
            || pos.iter().zip(&self.dimensions).any(|(p, n)| p >= n)
        {
            return Err(CellCacheError::out_of_bounds(format!("position {pos:?}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_multiple_has_no_truncated_cells() {
        let grid = CellGrid::try_new(&[640, 640, 640], &[64, 64, 64]).unwrap();
        assert_eq!(grid.grid_dimensions(), &[10, 10, 10]);
        assert_eq!(grid.num_cells(), 1000);
        for key in 0..grid.num_cells() {
            assert_eq!(grid.cell_size(key).unwrap(), vec![64, 64, 64]);
            assert!(!grid.is_truncated(key).unwrap());
        }
    }

    #[test]
    fn boundary_cells_are_truncated() {
        let grid = CellGrid::try_new(&[10, 7], &[4, 4]).unwrap();
        assert_eq!(grid.grid_dimensions(), &[3, 2]);
        assert_eq!(grid.cell_size(0).unwrap(), vec![4, 4]);
        assert_eq!(grid.cell_size(2).unwrap(), vec![2, 4]);
        assert_eq!(grid.cell_size(5).unwrap(), vec![2, 3]);

        let bounds = grid.bounds(5).unwrap();
        assert_eq!(bounds.min, vec![8, 4]);
        assert_eq!(bounds.max, vec![9, 6]);
        assert_eq!(bounds.element_count(), 6);
    }

    #[test]
    fn axis_zero_varies_fastest() {
        let grid = CellGrid::try_new(&[10, 7], &[4, 4]).unwrap();
        assert_eq!(grid.cell_grid_position(1).unwrap(), vec![1, 0]);
        assert_eq!(grid.cell_grid_position(3).unwrap(), vec![0, 1]);
        assert_eq!(grid.key_for_grid_position(&[2, 1]).unwrap(), 5);
    }

    #[test]
    fn key_for_element_matches_bounds() {
        let grid = CellGrid::try_new(&[10, 7, 5], &[4, 3, 2]).unwrap();
        for key in 0..grid.num_cells() {
            let bounds = grid.bounds(key).unwrap();
            assert_eq!(grid.key_for_element(&bounds.min).unwrap(), key);
            assert_eq!(grid.key_for_element(&bounds.max).unwrap(), key);
        }
    }

    #[test]
    fn out_of_range_inputs_are_rejected() {
        let grid = CellGrid::try_new(&[10, 7], &[4, 4]).unwrap();
        assert!(grid.bounds(6).is_err());
        assert!(grid.key_for_element(&[10, 0]).is_err());
        assert!(grid.key_for_element(&[1]).is_err());
        assert!(grid.key_for_grid_position(&[3, 0]).is_err());
    }

    #[test]
    fn invalid_shapes_are_config_errors() {
        assert!(CellGrid::try_new(&[], &[]).is_err());
        assert!(CellGrid::try_new(&[10, 10], &[4]).is_err());
        assert!(CellGrid::try_new(&[10, 0], &[4, 4]).is_err());
        let err = CellGrid::try_new(&[10, 10], &[4, 0]).unwrap_err();
        assert!(err.message().contains("cell dimension 1"));
    }

    #[test]
    fn bounds_contains_and_intersects() {
        let a = CellBounds {
            min: vec![0, 0],
            max: vec![3, 3],
        };
        let b = CellBounds {
            min: vec![4, 0],
            max: vec![7, 3],
        };
        assert!(a.contains(&[3, 3]));
        assert!(!a.contains(&[4, 3]));
        assert!(!a.intersects(&b));
        assert!(a.intersects(&a));
    }
}
