//! Adjacency graphs used to build sparsity patterns
//!
//! A [`Graph`] maps each *domain* node to a set of *image* nodes in
//! CSR-like form: `domain_ptr` has `num_domain + 1` entries and
//! `image_idx[domain_ptr[i]..domain_ptr[i + 1]]` lists the neighbours of
//! domain node `i`. Building a BCSR matrix from a graph turns every edge
//! `(i, j)` into a stored block.
//!
//! Mesh-side code usually produces an element-to-node incidence; the
//! node-to-node coupling graph needed for a finite element matrix is then
//! [`Graph::from_element_connectivity`].
//!
//! # Examples
//!
//! ```rust
//! use feblock_sparse::Graph;
//!
//! // Two 1D linear elements: nodes (0, 1) and (1, 2)
//! let graph = Graph::from_element_connectivity(3, &[vec![0, 1], vec![1, 2]]).unwrap();
//!
//! assert_eq!(graph.num_edges(), 7);
//! assert_eq!(graph.image(1), &[0, 1, 2]);
//! assert_eq!(graph.degree(0), 2);
//! ```

use crate::error::{SparseResult, ValidationError};

/// Domain-to-image adjacency in compressed row form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graph {
    num_domain: usize,
    num_image: usize,
    domain_ptr: Vec<usize>,
    image_idx: Vec<usize>,
}

fn invalid(reason: String) -> ValidationError {
    ValidationError::InvalidGraph { reason }
}

impl Graph {
    /// Create a graph from raw arrays with validation
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `domain_ptr` does not have `num_domain + 1` entries
    /// - `domain_ptr` does not start at 0, decreases, or does not end at `image_idx.len()`
    /// - an image index is `>= num_image`
    pub fn new(
        num_domain: usize,
        num_image: usize,
        domain_ptr: Vec<usize>,
        image_idx: Vec<usize>,
    ) -> SparseResult<Self> {
        if num_domain.checked_add(1) != Some(domain_ptr.len()) {
            return Err(invalid(format!(
                "domain pointer has {} entries, expected {}",
                domain_ptr.len(),
                num_domain.saturating_add(1)
            ))
            .into());
        }
        if domain_ptr[0] != 0 || domain_ptr[num_domain] != image_idx.len() {
            return Err(invalid(format!(
                "domain pointer spans {}..{} but {} image indices are given",
                domain_ptr[0],
                domain_ptr[num_domain],
                image_idx.len()
            ))
            .into());
        }
        if let Some(i) = domain_ptr.windows(2).position(|w| w[0] > w[1]) {
            return Err(invalid(format!("domain pointer decreases at node {i}")).into());
        }
        if let Some(&j) = image_idx.iter().find(|&&j| j >= num_image) {
            return Err(invalid(format!(
                "image index {j} out of bounds for {num_image} image nodes"
            ))
            .into());
        }

        Ok(Self {
            num_domain,
            num_image,
            domain_ptr,
            image_idx,
        })
    }

    /// Build a graph from one neighbour list per domain node
    ///
    /// Each list is sorted and deduplicated.
    pub fn from_adjacency_lists(num_image: usize, lists: &[Vec<usize>]) -> SparseResult<Self> {
        let mut domain_ptr = Vec::with_capacity(lists.len() + 1);
        let mut image_idx = Vec::new();
        domain_ptr.push(0);
        for list in lists {
            let mut sorted = list.clone();
            sorted.sort_unstable();
            sorted.dedup();
            image_idx.extend(sorted);
            domain_ptr.push(image_idx.len());
        }
        Self::new(lists.len(), num_image, domain_ptr, image_idx)
    }

    /// Node-to-node coupling graph of a mesh
    ///
    /// Two nodes are adjacent whenever some element contains both; every
    /// node touched by an element is adjacent to itself. Neighbour lists are
    /// sorted ascending.
    ///
    /// # Complexity
    ///
    /// O(Σ_e n_e² + E log E) for elements with `n_e` nodes each
    pub fn from_element_connectivity(
        num_nodes: usize,
        elements: &[Vec<usize>],
    ) -> SparseResult<Self> {
        let mut lists = vec![Vec::new(); num_nodes];
        for element in elements {
            for &i in element {
                if i >= num_nodes {
                    return Err(invalid(format!(
                        "element node {i} out of bounds for {num_nodes} nodes"
                    ))
                    .into());
                }
                lists[i].extend(element.iter().copied());
            }
        }
        Self::from_adjacency_lists(num_nodes, &lists)
    }

    /// Number of domain nodes (rows of a matrix built from this graph)
    pub fn num_nodes_domain(&self) -> usize {
        self.num_domain
    }

    /// Number of image nodes (columns of a matrix built from this graph)
    pub fn num_nodes_image(&self) -> usize {
        self.num_image
    }

    pub fn num_edges(&self) -> usize {
        self.image_idx.len()
    }

    pub fn domain_ptr(&self) -> &[usize] {
        &self.domain_ptr
    }

    pub fn image_idx(&self) -> &[usize] {
        &self.image_idx
    }

    /// Neighbours of domain node `i`
    pub fn image(&self, i: usize) -> &[usize] {
        &self.image_idx[self.domain_ptr[i]..self.domain_ptr[i + 1]]
    }

    /// Number of neighbours of domain node `i`
    pub fn degree(&self, i: usize) -> usize {
        self.domain_ptr[i + 1] - self.domain_ptr[i]
    }

    /// Largest degree over all domain nodes
    pub fn max_degree(&self) -> usize {
        (0..self.num_domain)
            .map(|i| self.degree(i))
            .max()
            .unwrap_or(0)
    }

    /// Sort every neighbour list ascending
    pub fn sort_indices(&mut self) {
        for i in 0..self.num_domain {
            let (start, end) = (self.domain_ptr[i], self.domain_ptr[i + 1]);
            self.image_idx[start..end].sort_unstable();
        }
    }

    /// Image-to-domain graph; neighbour lists come out sorted
    ///
    /// # Complexity
    ///
    /// O(V + E)
    pub fn transpose(&self) -> Self {
        let mut counts = vec![0usize; self.num_image + 1];
        for &j in &self.image_idx {
            counts[j + 1] += 1;
        }
        for j in 0..self.num_image {
            counts[j + 1] += counts[j];
        }
        let domain_ptr = counts.clone();
        let mut next = counts;
        let mut image_idx = vec![0; self.image_idx.len()];
        for i in 0..self.num_domain {
            for &j in self.image(i) {
                image_idx[next[j]] = i;
                next[j] += 1;
            }
        }
        Self {
            num_domain: self.num_image,
            num_image: self.num_domain,
            domain_ptr,
            image_idx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates() {
        assert!(Graph::new(2, 2, vec![0, 1, 2], vec![0, 1]).is_ok());
        assert!(Graph::new(2, 2, vec![0, 1], vec![0]).is_err());
        assert!(Graph::new(2, 2, vec![0, 2, 1], vec![0, 1]).is_err());
        assert!(Graph::new(2, 2, vec![0, 1, 2], vec![0, 2]).is_err());
        assert!(Graph::new(2, 2, vec![1, 1, 2], vec![0, 1]).is_err());
    }

    #[test]
    fn test_empty_graph() {
        let g = Graph::new(0, 0, vec![0], vec![]).unwrap();
        assert_eq!(g.num_edges(), 0);
        assert_eq!(g.max_degree(), 0);
    }

    #[test]
    fn test_element_connectivity_quads() {
        // 2x1 quads sharing the edge (1, 4):
        // 3 - 4 - 5
        // |   |   |
        // 0 - 1 - 2
        let elements = vec![vec![0, 1, 4, 3], vec![1, 2, 5, 4]];
        let g = Graph::from_element_connectivity(6, &elements).unwrap();
        assert_eq!(g.image(0), &[0, 1, 3, 4]);
        assert_eq!(g.image(1), &[0, 1, 2, 3, 4, 5]);
        assert_eq!(g.image(5), &[1, 2, 4, 5]);
        assert_eq!(g.max_degree(), 6);
        assert_eq!(g.transpose(), g);
    }

    #[test]
    fn test_element_connectivity_rejects_bad_nodes() {
        assert!(Graph::from_element_connectivity(2, &[vec![0, 2]]).is_err());
    }

    #[test]
    fn test_transpose_rectangular() {
        let g = Graph::new(2, 3, vec![0, 2, 3], vec![0, 2, 1]).unwrap();
        let t = g.transpose();
        assert_eq!(t.num_nodes_domain(), 3);
        assert_eq!(t.num_nodes_image(), 2);
        assert_eq!(t.image(0), &[0]);
        assert_eq!(t.image(1), &[1]);
        assert_eq!(t.image(2), &[0]);
        assert_eq!(t.transpose(), g);
    }

    #[test]
    fn test_sort_indices() {
        let mut g = Graph::new(1, 3, vec![0, 3], vec![2, 0, 1]).unwrap();
        g.sort_indices();
        assert_eq!(g.image(0), &[0, 1, 2]);
    }
}
