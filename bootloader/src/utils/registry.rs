//! Append-only growable registry
//!
//! Backs the module list and the memory reservation list. Capacity starts at
//! [`MIN_CAPACITY`] and only ever doubles; records are never removed, so an
//! index handed out by [`Registry::append`] stays valid for the lifetime of
//! the loader.

use crate::error::{BootError, Result};
use alloc::vec::Vec;
use core::ops::Index;
use core::slice;

/// Capacity of the first buffer
pub const MIN_CAPACITY: usize = 16;

pub struct Registry<T> {
    items: Vec<T>,
    capacity: usize,
    /// Largest capacity growth may reach
    limit: usize,
    what: &'static str,
}

impl<T> Registry<T> {
    /// Create an empty registry. `what` names it in allocation errors.
    pub const fn new(what: &'static str) -> Self {
        Self::with_limit(what, usize::MAX)
    }

    /// Create an empty registry that never grows past `limit` records
    pub const fn with_limit(what: &'static str, limit: usize) -> Self {
        Self {
            items: Vec::new(),
            capacity: 0,
            limit,
            what,
        }
    }

    /// Append a record and return its index.
    ///
    /// Growing to a new buffer may fail with [`BootError::Allocation`]; the
    /// existing records are left untouched in that case.
    pub fn append(&mut self, item: T) -> Result<usize> {
        if self.items.len() == self.capacity {
            self.grow()?;
        }

        let index = self.items.len();
        self.items.push(item);
        Ok(index)
    }

    fn grow(&mut self) -> Result<()> {
        let new_capacity = self
            .capacity
            .checked_mul(2)
            .map(|doubled| doubled.max(MIN_CAPACITY))
            .filter(|&capacity| capacity <= self.limit)
            .ok_or(BootError::Allocation(self.what))?;

        self.items
            .try_reserve_exact(new_capacity - self.items.len())
            .map_err(|_| BootError::Allocation(self.what))?;
        self.capacity = new_capacity;

        log::trace!("{} grown to {} records", self.what, new_capacity);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Base address of the contiguous record array
    pub fn as_ptr(&self) -> *const T {
        self.items.as_ptr()
    }
}

impl<T> Index<usize> for Registry<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.items[index]
    }
}

impl<'a, T> IntoIterator for &'a Registry<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
