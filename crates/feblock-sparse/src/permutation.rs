//! Permutations of block indices and bandwidth-reducing orderings
//!
//! A [`Permutation`] stores its forward map `perm` together with the
//! inverse. Containers apply it as a *gather*: permuting a vector yields
//! `new[i] = old[perm[i]]`, so a block moves as a unit and
//! `x.permute(p)` followed by `x.permute(&p.inverse())` restores `x`.
//!
//! [`reverse_cuthill_mckee`] computes such a permutation from an adjacency
//! graph to reduce the bandwidth of matrices built on it.
//!
//! # Examples
//!
//! ```rust
//! use feblock_sparse::Permutation;
//!
//! let p = Permutation::from_perm(vec![2, 0, 1]).unwrap();
//! assert_eq!(p.apply_gather(&['a', 'b', 'c']), vec!['c', 'a', 'b']);
//!
//! let mut data = ['a', 'b', 'c'];
//! p.apply_in_place(&mut data);
//! assert_eq!(data, ['c', 'a', 'b']);
//! p.inverse().apply_in_place(&mut data);
//! assert_eq!(data, ['a', 'b', 'c']);
//! ```

use crate::error::{SparseResult, ValidationError};
use crate::graph::Graph;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::VecDeque;

/// Bijection on `0..n`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permutation {
    perm: Vec<usize>,
    inverse: Vec<usize>,
}

fn invert(perm: &[usize]) -> SparseResult<Vec<usize>> {
    let n = perm.len();
    let mut inverse = vec![usize::MAX; n];
    for (i, &p) in perm.iter().enumerate() {
        if p >= n {
            return Err(ValidationError::InvalidPermutation {
                reason: format!("entry {p} at position {i} out of range for size {n}"),
            }
            .into());
        }
        if inverse[p] != usize::MAX {
            return Err(ValidationError::InvalidPermutation {
                reason: format!("entry {p} appears more than once"),
            }
            .into());
        }
        inverse[p] = i;
    }
    Ok(inverse)
}

impl Permutation {
    pub fn identity(n: usize) -> Self {
        let perm: Vec<usize> = (0..n).collect();
        Self {
            inverse: perm.clone(),
            perm,
        }
    }

    /// Permutation with forward map `perm`
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidPermutation` unless `perm` contains
    /// every index in `0..perm.len()` exactly once.
    pub fn from_perm(perm: Vec<usize>) -> SparseResult<Self> {
        let inverse = invert(&perm)?;
        Ok(Self { perm, inverse })
    }

    /// Permutation whose inverse map is `inverse`
    pub fn from_inverse(inverse: Vec<usize>) -> SparseResult<Self> {
        let perm = invert(&inverse)?;
        Ok(Self { perm, inverse })
    }

    /// Uniformly random permutation of `0..n`
    pub fn random<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Self {
        let mut perm: Vec<usize> = (0..n).collect();
        perm.shuffle(rng);
        let mut inverse = vec![0; n];
        for (i, &p) in perm.iter().enumerate() {
            inverse[p] = i;
        }
        Self { perm, inverse }
    }

    pub fn len(&self) -> usize {
        self.perm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.perm.is_empty()
    }

    /// Forward map
    #[inline]
    pub fn map(&self, i: usize) -> usize {
        self.perm[i]
    }

    /// Inverse map
    #[inline]
    pub fn map_inverse(&self, i: usize) -> usize {
        self.inverse[i]
    }

    pub fn perm(&self) -> &[usize] {
        &self.perm
    }

    pub fn inverse_perm(&self) -> &[usize] {
        &self.inverse
    }

    pub fn inverse(&self) -> Self {
        Self {
            perm: self.inverse.clone(),
            inverse: self.perm.clone(),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.perm.iter().enumerate().all(|(i, &p)| i == p)
    }

    /// Permutation equivalent to gathering with `self`, then with `other`
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatchError::Permutation` if the sizes differ.
    pub fn compose(&self, other: &Self) -> SparseResult<Self> {
        if self.len() != other.len() {
            return Err(crate::error::ShapeMismatchError::Permutation {
                perm: other.len(),
                dim: self.len(),
            }
            .into());
        }
        let perm = other.perm.iter().map(|&o| self.perm[o]).collect();
        let inverse = self.inverse.iter().map(|&s| other.inverse[s]).collect();
        Ok(Self { perm, inverse })
    }

    /// In-situ swap sequence
    ///
    /// Executing `data.swap(i, s[i])` for `i = 0, 1, ...` on a slice yields
    /// the same result as [`Permutation::apply_gather`]. Every `s[i] >= i`.
    pub fn swap_positions(&self) -> Vec<usize> {
        let n = self.len();
        // at[pos] = original index currently at pos, pos_of[orig] = its position
        let mut at: Vec<usize> = (0..n).collect();
        let mut pos_of: Vec<usize> = (0..n).collect();
        let mut swaps = Vec::with_capacity(n);
        for i in 0..n {
            let src = pos_of[self.perm[i]];
            swaps.push(src);
            let displaced = at[i];
            at.swap(i, src);
            pos_of[self.perm[i]] = i;
            pos_of[displaced] = src;
        }
        swaps
    }

    /// `out[i] = data[perm[i]]`
    ///
    /// # Panics
    ///
    /// Panics if `data.len() != self.len()`.
    pub fn apply_gather<X: Clone>(&self, data: &[X]) -> Vec<X> {
        assert_eq!(data.len(), self.len(), "permutation size mismatch");
        self.perm.iter().map(|&p| data[p].clone()).collect()
    }

    /// Gather in place through the swap sequence
    ///
    /// # Panics
    ///
    /// Panics if `data.len() != self.len()`.
    pub fn apply_in_place<X>(&self, data: &mut [X]) {
        assert_eq!(data.len(), self.len(), "permutation size mismatch");
        for (i, s) in self.swap_positions().into_iter().enumerate() {
            data.swap(i, s);
        }
    }

    /// Gather fixed-size chunks of `data` in place, e.g. the scalars of a block
    pub(crate) fn apply_chunks_in_place<X: Copy>(&self, data: &mut [X], chunk: usize) {
        debug_assert_eq!(data.len(), self.len() * chunk);
        for (i, s) in self.swap_positions().into_iter().enumerate() {
            if i != s {
                let (head, tail) = data.split_at_mut(s * chunk);
                head[i * chunk..(i + 1) * chunk].swap_with_slice(&mut tail[..chunk]);
            }
        }
    }
}

/// Reverse Cuthill-McKee ordering of a square graph
///
/// Returns `p` such that permuting a matrix built on `graph` with `(p, p)`
/// clusters its blocks around the diagonal. Disconnected components are
/// ordered one after another.
///
/// # Algorithm
///
/// 1. Find a pseudo-peripheral start node
/// 2. BFS visiting neighbours in ascending degree order
/// 3. Reverse the ordering
///
/// # Complexity
///
/// O(E log Δ + V) time, O(V) space
///
/// # Examples
///
/// ```rust
/// use feblock_sparse::{permutation, Graph};
///
/// // Path 0 - 2 - 1 - 3 numbered badly
/// let g = Graph::from_adjacency_lists(4, &[vec![0, 2], vec![1, 2, 3], vec![0, 1, 2], vec![1, 3]])
///     .unwrap();
/// let p = permutation::reverse_cuthill_mckee(&g).unwrap();
/// let reordered = permutation::permute_graph(&g, &p, &p).unwrap();
/// assert_eq!(permutation::bandwidth(&reordered), 1);
/// ```
pub fn reverse_cuthill_mckee(graph: &Graph) -> SparseResult<Permutation> {
    let n = graph.num_nodes_domain();
    if n != graph.num_nodes_image() {
        return Err(crate::error::ShapeMismatchError::NotSquare {
            operation: "reverse_cuthill_mckee",
            rows: n,
            columns: graph.num_nodes_image(),
        }
        .into());
    }

    let mut visited = vec![false; n];
    let mut ordering = Vec::with_capacity(n);
    let mut queue = VecDeque::new();

    let mut seeds: Vec<usize> = (0..n).collect();
    seeds.sort_by_key(|&v| graph.degree(v));
    for seed in seeds {
        if visited[seed] {
            continue;
        }
        let start = peripheral_node(graph, seed);
        queue.push_back(start);
        visited[start] = true;

        while let Some(v) = queue.pop_front() {
            ordering.push(v);
            let mut neighbours: Vec<usize> = graph
                .image(v)
                .iter()
                .copied()
                .filter(|&u| !visited[u])
                .collect();
            neighbours.sort_by_key(|&u| graph.degree(u));
            for u in neighbours {
                visited[u] = true;
                queue.push_back(u);
            }
        }
    }

    ordering.reverse();
    Permutation::from_perm(ordering)
}

/// Pseudo-peripheral node of the component containing `start`
fn peripheral_node(graph: &Graph, mut start: usize) -> usize {
    for _ in 0..3 {
        let (farthest, _) = bfs_farthest(graph, start);
        if farthest == start {
            break;
        }
        start = farthest;
    }
    start
}

fn bfs_farthest(graph: &Graph, start: usize) -> (usize, usize) {
    let n = graph.num_nodes_domain();
    let mut level = vec![usize::MAX; n];
    let mut queue = VecDeque::new();
    level[start] = 0;
    queue.push_back(start);

    let (mut farthest, mut max_level) = (start, 0);
    while let Some(v) = queue.pop_front() {
        if level[v] > max_level {
            max_level = level[v];
            farthest = v;
        }
        for &u in graph.image(v) {
            if level[u] == usize::MAX {
                level[u] = level[v] + 1;
                queue.push_back(u);
            }
        }
    }
    (farthest, max_level)
}

/// Largest `|i - j|` over all edges of `graph`
pub fn bandwidth(graph: &Graph) -> usize {
    (0..graph.num_nodes_domain())
        .flat_map(|i| graph.image(i).iter().map(move |&j| i.abs_diff(j)))
        .max()
        .unwrap_or(0)
}

/// Graph with edges `(i, j)` for every edge `(row_perm[i], col_perm[j])` of `graph`
///
/// Matches the pattern of a matrix permuted with the same permutations.
pub fn permute_graph(
    graph: &Graph,
    row_perm: &Permutation,
    col_perm: &Permutation,
) -> SparseResult<Graph> {
    check_len(row_perm, graph.num_nodes_domain())?;
    check_len(col_perm, graph.num_nodes_image())?;
    let lists: Vec<Vec<usize>> = (0..graph.num_nodes_domain())
        .map(|i| {
            graph
                .image(row_perm.map(i))
                .iter()
                .map(|&j| col_perm.map_inverse(j))
                .collect()
        })
        .collect();
    Graph::from_adjacency_lists(graph.num_nodes_image(), &lists)
}

pub(crate) fn check_len(perm: &Permutation, dim: usize) -> SparseResult<()> {
    if perm.len() != dim {
        return Err(crate::error::ShapeMismatchError::Permutation {
            perm: perm.len(),
            dim,
        }
        .into());
    }
    Ok(())
}
