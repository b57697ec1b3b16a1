//! Sparse Transition Matrix
//!
//! Row-major sparse storage keyed by object ID. Only non-zero cells are
//! stored; reading an absent cell yields the zero value.

use std::collections::HashMap;

use super::element::ObjectId;

/// Sparse `(row, column) -> value` mapping
#[derive(Debug, Clone, Default)]
pub struct SparseMatrix<T> {
    rows: HashMap<ObjectId, HashMap<ObjectId, T>>,
}

impl<T> SparseMatrix<T>
where
    T: Copy + Default + PartialEq,
{
    /// Create an empty matrix
    pub fn new() -> Self {
        Self {
            rows: HashMap::new(),
        }
    }

    /// Read a cell, zero when absent
    #[inline]
    pub fn get(&self, row: ObjectId, col: ObjectId) -> T {
        self.rows
            .get(&row)
            .and_then(|cells| cells.get(&col))
            .copied()
            .unwrap_or_default()
    }

    /// Write a cell. Writing zero removes it.
    pub fn set(&mut self, row: ObjectId, col: ObjectId, value: T) {
        if value == T::default() {
            if let Some(cells) = self.rows.get_mut(&row) {
                cells.remove(&col);
                if cells.is_empty() {
                    self.rows.remove(&row);
                }
            }
        } else {
            self.rows.entry(row).or_default().insert(col, value);
        }
    }

    /// Mutable access to a cell, inserting zero first when absent
    pub fn cell_mut(&mut self, row: ObjectId, col: ObjectId) -> &mut T {
        self.rows.entry(row).or_default().entry(col).or_default()
    }

    /// Non-zero cells of one row, in arbitrary order
    pub fn row(&self, row: ObjectId) -> impl Iterator<Item = (ObjectId, T)> + '_ {
        self.rows
            .get(&row)
            .into_iter()
            .flat_map(|cells| cells.iter().map(|(&col, &value)| (col, value)))
    }

    /// Number of stored cells in a row
    pub fn row_len(&self, row: ObjectId) -> usize {
        self.rows.get(&row).map(HashMap::len).unwrap_or(0)
    }

    /// Number of rows holding at least one cell
    pub fn populated_rows(&self) -> usize {
        self.rows.len()
    }

    /// Total stored cells
    pub fn cell_count(&self) -> usize {
        self.rows.values().map(HashMap::len).sum()
    }
}
