//! Cells: typed element buffers with a dirty flag.
//!
//! A [`Cell`] is the unit of caching and persistence. It is shared as
//! `Arc<Cell<T>>` between the cache, its consumers and the write-back path,
//! so element storage sits behind a `parking_lot::RwLock` and the dirty flag
//! is atomic.
//!
//! ```text
//!   Cell<T>
//!   ┌──────────────────────────────────────┐
//!   │ key: u64                             │
//!   │ min: [u64; n]      (array coords)    │
//!   │ size: [usize; n]   (maybe truncated) │
//!   │ data: RwLock<Vec<T>>                 │
//!   │ dirty: AtomicBool                    │
//!   │ valid: bool        (false = placeholder)
//!   └──────────────────────────────────────┘
//!
//!   write()  ──► sets dirty, returns guard over [T]
//!   persist  ──► mark_clean()
//! ```

pub mod codec;
pub mod primitive;

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use crate::grid::{CellBounds, CellGrid};
pub use primitive::Primitive;

/// A block of a cached array.
#[derive(Debug)]
pub struct Cell<T> {
    key: u64,
    min: Vec<u64>,
    size: Vec<usize>,
    data: RwLock<Vec<T>>,
    dirty: AtomicBool,
    valid: bool,
}

impl<T: Primitive> Cell<T> {
    /// Creates a clean, valid cell that owns `data`.
    ///
    /// `data.len()` must equal the product of `size`.
    pub fn new(key: u64, min: Vec<u64>, size: Vec<usize>, data: Vec<T>) -> Self {
        debug_assert_eq!(data.len(), size.iter().product::<usize>());
        Self {
            key,
            min,
            size,
            data: RwLock::new(data),
            dirty: AtomicBool::new(false),
            valid: true,
        }
    }

    /// Creates a zero-filled cell shaped like grid cell `key`.
    pub fn zeroed(grid: &CellGrid, key: u64) -> Result<Self, crate::error::CellCacheError> {
        let min = grid.cell_min(key)?;
        let size = grid.cell_size(key)?;
        let len = size.iter().product();
        Ok(Self::new(key, min, size, vec![T::default(); len]))
    }

    /// Creates an invalid stand-in returned by volatile reads.
    pub fn placeholder(key: u64, min: Vec<u64>, size: Vec<usize>, data: Vec<T>) -> Self {
        Self {
            valid: false,
            ..Self::new(key, min, size, data)
        }
    }

    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn min(&self) -> &[u64] {
        &self.min
    }

    pub fn size(&self) -> &[usize] {
        &self.size
    }

    pub fn bounds(&self) -> CellBounds {
        let max = self
            .min
            .iter()
            .zip(&self.size)
            .map(|(&lo, &s)| lo + s as u64 - 1)
            .collect();
        CellBounds {
            min: self.min.clone(),
            max,
        }
    }

    pub fn len(&self) -> usize {
        self.size.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `false` for placeholders.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn mark_clean(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    /// Shared access to the elements.
    pub fn read(&self) -> MappedRwLockReadGuard<'_, [T]> {
        RwLockReadGuard::map(self.data.read(), |data| data.as_slice())
    }

    /// Exclusive access to the elements; marks the cell dirty.
    pub fn write(&self) -> MappedRwLockWriteGuard<'_, [T]> {
        let guard = RwLockWriteGuard::map(self.data.write(), |data| data.as_mut_slice());
        self.mark_dirty();
        guard
    }

    /// Copy of the elements.
    pub fn to_vec(&self) -> Vec<T> {
        self.data.read().clone()
    }

    /// Linear index of array position `pos` inside this cell.
    pub fn index_of(&self, pos: &[u64]) -> Option<usize> {
        if pos.len() != self.min.len() {
            return None;
        }
        let mut index = 0usize;
        let mut stride = 1usize;
        for ((&p, &lo), &s) in pos.iter().zip(&self.min).zip(&self.size) {
            if p < lo || p - lo >= s as u64 {
                return None;
            }
            index += (p - lo) as usize * stride;
            stride *= s;
        }
        Some(index)
    }

    /// Element at array position `pos`, if inside this cell.
    pub fn get(&self, pos: &[u64]) -> Option<T> {
        let index = self.index_of(pos)?;
        self.data.read().get(index).copied()
    }

    /// Stores `value` at array position `pos`; returns `false` if outside.
    pub fn set(&self, pos: &[u64], value: T) -> bool {
        match self.index_of(pos) {
            Some(index) => {
                self.write()[index] = value;
                true
            }
            None => false,
        }
    }
}

/// Mutable view of a freshly allocated cell handed to a
/// [`CellLoader`](crate::traits::CellLoader).
#[derive(Debug)]
pub struct CellView<'a, T> {
    key: u64,
    bounds: &'a CellBounds,
    size: &'a [usize],
    grid: &'a CellGrid,
    data: &'a mut [T],
}

impl<'a, T: Primitive> CellView<'a, T> {
    pub fn new(
        key: u64,
        bounds: &'a CellBounds,
        size: &'a [usize],
        grid: &'a CellGrid,
        data: &'a mut [T],
    ) -> Self {
        Self {
            key,
            bounds,
            size,
            grid,
            data,
        }
    }

    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn bounds(&self) -> &CellBounds {
        self.bounds
    }

    /// Minimum array coordinate along axis `d`.
    pub fn min(&self, d: usize) -> u64 {
        self.bounds.min[d]
    }

    pub fn size(&self) -> &[usize] {
        self.size
    }

    pub fn grid(&self) -> &CellGrid {
        self.grid
    }

    pub fn data(&self) -> &[T] {
        &*self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut *self.data
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Visits every element with its array position, axis 0 fastest.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(&[u64], &mut T)) {
        let mut pos = self.bounds.min.clone();
        for value in self.data.iter_mut() {
            f(&pos, value);
            for d in 0..pos.len() {
                if pos[d] < self.bounds.max[d] {
                    pos[d] += 1;
                    break;
                }
                pos[d] = self.bounds.min[d];
            }
        }
    }
}
