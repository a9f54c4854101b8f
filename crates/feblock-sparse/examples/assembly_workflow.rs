//! Assembly Workflow Example
//!
//! This example walks through a typical finite element pipeline:
//! - Building the sparsity pattern from element connectivity
//! - Scatter-assembling local element matrices and load vectors
//! - Reordering with reverse Cuthill-McKee
//! - Solving with a Jacobi iteration built from the container kernels
//!
//! Run with: cargo run --example assembly_workflow

use feblock_core::{Matrix, Vector};
use feblock_sparse::assembly::{DirectMapping, LocalMatrix};
use feblock_sparse::permutation::bandwidth;
use feblock_sparse::{reverse_cuthill_mckee, DenseVector, Graph, SparseMatrixBcsr};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    println!("=== feblock: Assembly Workflow Example ===\n");

    // 1. A 1D mesh of linear elements with scrambled node numbering
    let nodes = 12;
    let order: Vec<usize> = (0..nodes).map(|i| (i * 5) % nodes).collect();
    let elements: Vec<Vec<usize>> = order.windows(2).map(|w| w.to_vec()).collect();
    let graph = Graph::from_element_connectivity(nodes, &elements)?;
    println!("1. Mesh: {nodes} nodes, {} elements", elements.len());
    println!("   Pattern: {} blocks, bandwidth {}\n", graph.num_edges(), bandwidth(&graph));

    // 2. Assemble stiffness matrix and load vector
    println!("2. Scatter-assembling element contributions...");
    let h = 1.0 / (nodes - 1) as f64;
    let mut a = SparseMatrixBcsr::<f64, 1, 1>::from_graph(&graph)?;
    let mut b = DenseVector::<f64>::new(nodes);
    let mut local = LocalMatrix::<f64, 1, 1>::new(2, 2);
    for i in 0..2 {
        for j in 0..2 {
            local[(i, j)] = Matrix::splat(if i == j { 1.0 / h } else { -1.0 / h });
        }
    }
    let load = [Vector::splat(h / 2.0); 2];
    {
        let mut scatter = a.scatter_axpy();
        let mut rhs = b.scatter_axpy();
        for element in &elements {
            let map = DirectMapping::new(element.clone());
            scatter.scatter(&local, &map, &map, 1.0)?;
            rhs.scatter(&load, &map, 1.0)?;
        }
    }
    // Dirichlet boundary at the two ends: make their rows the identity
    let pattern = a.layout().to_graph()?;
    for &boundary in &[order[0], order[nodes - 1]] {
        for &col in pattern.image(boundary) {
            let value = if col == boundary { 1.0 } else { 0.0 };
            a.set(boundary, col, Matrix::splat(value))?;
        }
        b.set(boundary, Vector::splat(0.0));
    }
    println!("   ||A||_F = {:.3}, ||b|| = {:.3}\n", a.norm_frobenius(), b.norm2());

    // 3. Reverse Cuthill-McKee reordering
    println!("3. Reordering with reverse Cuthill-McKee...");
    let perm = reverse_cuthill_mckee(&graph)?;
    a.permute(&perm, &perm)?;
    b.permute(&perm)?;
    println!("   Bandwidth after RCM: {}\n", bandwidth(&a.layout().to_graph()?));

    // 4. Jacobi iteration x <- x + D^-1 (b - A x)
    println!("4. Solving with Jacobi iteration...");
    let mut inv_diag = a.create_vector_l();
    inv_diag.component_invert(&a.extract_diag()?, 1.0)?;
    let mut x = a.create_vector_r();
    let mut residual = a.create_vector_l();
    let mut correction = a.create_vector_l();
    let mut iterations = 0;
    loop {
        a.apply_axpy(&mut residual, &x, &b, -1.0)?;
        let norm = residual.norm2();
        if norm < 1e-10 || iterations == 20_000 {
            println!("   {iterations} iterations, residual {norm:.2e}");
            break;
        }
        correction.component_product(&residual, &inv_diag)?;
        x.add_scaled(&correction, 1.0)?;
        iterations += 1;
    }

    // 5. Undo the reordering and compare with the exact solution x(1 - x) / 2
    x.permute(&perm.inverse())?;
    let max_error = order
        .iter()
        .enumerate()
        .map(|(pos, &node)| {
            let s = pos as f64 * h;
            (x.get(node)[0] - s * (1.0 - s) / 2.0).abs()
        })
        .fold(0.0, f64::max);
    println!("   Max nodal error: {max_error:.2e}");

    println!("\n=== Example Complete ===");
    Ok(())
}
