//! Serialization Example
//!
//! This example demonstrates the container file formats:
//! - Native binary images, uncompressed, zlib and lossy
//! - Matrix Market coordinate and array text
//! - The plain `exp` one-value-per-line vector format
//!
//! Run with: cargo run --example serialization

use feblock_core::Matrix;
use feblock_sparse::{DenseVectorBlocked, FileMode, SerialConfig, SparseMatrixBcsr};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("debug").init();
    println!("=== feblock: Serialization Example ===\n");

    // 1. A small block tridiagonal matrix of 2×2 blocks
    let n: usize = 200;
    let blocks = (0..n).flat_map(|i| {
        let lo = i.saturating_sub(1);
        let hi = (i + 1).min(n - 1);
        (lo..=hi).map(move |j| {
            let v = (if i == j { 4.0 } else { -1.0 }) / (1.0 + (i + j) as f64).sqrt();
            (i, j, Matrix::new([[v, 0.1 * v], [0.0, v]]))
        })
    });
    let a = SparseMatrixBcsr::<f64, 2, 2>::from_blocks(n, n, blocks)?;
    println!("1. Matrix: {}x{} blocks, {} stored, {} bytes in memory\n", a.rows(), a.columns(), a.used_elements(), a.bytes());

    // 2. Binary images
    println!("2. Binary images:");
    for (name, config) in [
        ("raw", SerialConfig::default()),
        ("zlib", SerialConfig::zlib()),
        ("lossy 1e-6", SerialConfig::lossy(1e-6)),
    ] {
        let bytes = a.serialize(&config)?;
        let back = SparseMatrixBcsr::<f64, 2, 2>::deserialize(&bytes)?;
        let mut diff = back.deep_clone();
        diff.axpy(&a, &back, -1.0)?;
        println!("   {name:<11} {:>7} bytes, max deviation {:.1e}", bytes.len(), diff.norm_frobenius());
    }

    // 3. Text formats through files
    let dir = std::env::temp_dir().join("feblock-serialization-example");
    std::fs::create_dir_all(&dir)?;
    println!("\n3. Text files in {}:", dir.display());

    let mtx = dir.join("matrix.mtx");
    a.write_out_file(FileMode::Mtx, &mtx)?;
    let back = SparseMatrixBcsr::<f64, 2, 2>::read_from_file(FileMode::from_path(&mtx).unwrap_or(FileMode::Mtx), &mtx)?;
    println!("   matrix.mtx   round trip exact: {}", back == a);

    let x = a.lump_rows();
    for mode in [FileMode::Mtx, FileMode::Exp] {
        let path = dir.join(format!("lumped.{}", mode.name()));
        x.write_out_file(mode, &path)?;
        let back = DenseVectorBlocked::<f64, 2>::read_from_file(mode, &path)?;
        println!("   lumped.{:<6} round trip exact: {}", mode.name(), back == x);
    }

    // Matrices have no exp representation
    let err = a.write_out(FileMode::Exp, &mut Vec::new()).unwrap_err();
    println!("   exp for a matrix: {err}");

    println!("\n=== Example Complete ===");
    Ok(())
}
