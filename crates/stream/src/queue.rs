use std::collections::VecDeque;

use pregen_common::CellCoord;

/// FIFO of cells still to be drained for one region.
///
/// Filled once at construction; afterwards it can only shrink.
#[derive(Debug, Clone, Default)]
pub struct WorkQueue {
    cells: VecDeque<CellCoord>,
    total: usize,
}

impl WorkQueue {
    pub fn new(cells: Vec<CellCoord>) -> Self {
        let total = cells.len();
        Self {
            cells: cells.into(),
            total,
        }
    }

    /// Take the next cell, oldest first.
    pub fn pop(&mut self) -> Option<CellCoord> {
        self.cells.pop_front()
    }

    /// Cells still queued.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cells queued at construction.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Cells popped so far.
    pub fn drained(&self) -> usize {
        self.total - self.cells.len()
    }

    /// Peek at the remaining cells in drain order.
    pub fn iter(&self) -> impl Iterator<Item = &CellCoord> {
        self.cells.iter()
    }
}

impl From<Vec<CellCoord>> for WorkQueue {
    fn from(cells: Vec<CellCoord>) -> Self {
        Self::new(cells)
    }
}
