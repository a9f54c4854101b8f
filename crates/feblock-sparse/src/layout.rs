//! Immutable sparsity patterns
//!
//! A [`SparseLayout`] is the row pointer and column index description of
//! which blocks of a `rows × columns` block grid are stored. Matrices hold
//! it through an `Arc`, so any number of value arrays can share one pattern;
//! a layout is never mutated once built.

use crate::error::{SparseResult, ValidationError};
use crate::graph::Graph;
use feblock_core::{CoreError, IndexType};

/// Block sparsity pattern in CSR form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparseLayout<I> {
    rows: usize,
    columns: usize,
    row_ptr: Vec<I>,
    col_ind: Vec<I>,
}

pub(crate) fn index_vec<I: IndexType>(values: &[usize]) -> SparseResult<Vec<I>> {
    values
        .iter()
        .map(|&v| {
            I::try_from_usize(v).ok_or_else(|| {
                CoreError::IndexOverflow {
                    value: v as u64,
                    target: I::NAME,
                }
                .into()
            })
        })
        .collect()
}

impl<I: IndexType> SparseLayout<I> {
    /// Pattern with no stored blocks
    pub fn empty(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            row_ptr: vec![I::zero(); rows + 1],
            col_ind: Vec::new(),
        }
    }

    /// Pattern from raw arrays
    ///
    /// Only the array lengths and the row pointer end points are checked;
    /// call [`SparseLayout::validate`] for a full consistency check.
    ///
    /// # Errors
    ///
    /// - `RowPtrLength` if `row_ptr.len() != rows + 1`
    /// - `RowPtrBounds` if `row_ptr` does not span `0..col_ind.len()`
    pub fn new(rows: usize, columns: usize, row_ptr: Vec<I>, col_ind: Vec<I>) -> SparseResult<Self> {
        if rows.checked_add(1) != Some(row_ptr.len()) {
            return Err(ValidationError::RowPtrLength {
                len: row_ptr.len(),
                expected: rows.saturating_add(1),
            }
            .into());
        }
        let (first, last) = (row_ptr[0].index(), row_ptr[rows].index());
        if first != 0 || last != col_ind.len() {
            return Err(ValidationError::RowPtrBounds {
                first,
                last,
                used: col_ind.len(),
            }
            .into());
        }
        Ok(Self {
            rows,
            columns,
            row_ptr,
            col_ind,
        })
    }

    /// Pattern with one block per graph edge
    ///
    /// Neighbour lists may come in any order and are sorted per row.
    ///
    /// # Errors
    ///
    /// `UnsortedColumns` if a node lists the same neighbour twice.
    pub fn from_graph(graph: &Graph) -> SparseResult<Self> {
        let mut image = graph.image_idx().to_vec();
        for w in graph.domain_ptr().windows(2) {
            image[w[0]..w[1]].sort_unstable();
        }
        let layout = Self::new(
            graph.num_nodes_domain(),
            graph.num_nodes_image(),
            index_vec(graph.domain_ptr())?,
            index_vec(&image)?,
        )?;
        layout.validate()?;
        Ok(layout)
    }

    /// Full consistency check
    ///
    /// Verifies a non-decreasing row pointer, in-range column indices and
    /// strictly ascending columns within every row.
    pub fn validate(&self) -> SparseResult<()> {
        // monotone with fixed end points keeps every row range inside col_ind
        for row in 0..self.rows {
            let (curr, next) = (self.row_ptr[row].index(), self.row_ptr[row + 1].index());
            if curr > next {
                return Err(ValidationError::RowPtrNotSorted { row, curr, next }.into());
            }
        }
        for row in 0..self.rows {
            let cols = &self.col_ind[self.row_range(row)];
            for (position, c) in cols.iter().enumerate() {
                if c.index() >= self.columns {
                    return Err(ValidationError::ColumnOutOfBounds {
                        row,
                        col: c.index(),
                        columns: self.columns,
                    }
                    .into());
                }
                if position > 0 && cols[position - 1] >= *c {
                    return Err(ValidationError::UnsortedColumns { row, position }.into());
                }
            }
        }
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Number of stored blocks
    pub fn used_elements(&self) -> usize {
        self.col_ind.len()
    }

    pub fn row_ptr(&self) -> &[I] {
        &self.row_ptr
    }

    pub fn col_ind(&self) -> &[I] {
        &self.col_ind
    }

    /// Storage range of row `row` in `col_ind` and the value array
    #[inline]
    pub fn row_range(&self, row: usize) -> std::ops::Range<usize> {
        self.row_ptr[row].index()..self.row_ptr[row + 1].index()
    }

    /// Storage position of block `(row, col)`, if stored
    ///
    /// Binary search; columns within a row must be ascending.
    pub fn find(&self, row: usize, col: usize) -> Option<usize> {
        let range = self.row_range(row);
        let start = range.start;
        self.col_ind[range]
            .binary_search_by(|c| c.index().cmp(&col))
            .ok()
            .map(|k| start + k)
    }

    /// Index array footprint in bytes
    pub fn bytes(&self) -> usize {
        (self.row_ptr.len() + self.col_ind.len()) * std::mem::size_of::<I>()
    }

    /// Adjacency graph of the pattern
    pub fn to_graph(&self) -> SparseResult<Graph> {
        Graph::new(
            self.rows,
            self.columns,
            self.row_ptr.iter().map(|p| p.index()).collect(),
            self.col_ind.iter().map(|c| c.index()).collect(),
        )
    }

    /// The same pattern with another index type
    pub fn convert<I2: IndexType>(&self) -> SparseResult<SparseLayout<I2>> {
        let widen = |v: &[I]| -> SparseResult<Vec<I2>> {
            v.iter()
                .map(|i| Ok(I2::from_u64(i.index() as u64)?))
                .collect()
        };
        Ok(SparseLayout {
            rows: self.rows,
            columns: self.columns,
            row_ptr: widen(&self.row_ptr)?,
            col_ind: widen(&self.col_ind)?,
        })
    }
}
