//! Payload codecs for the binary format
//!
//! - **zlib**: lossless, via flate2, applied to any byte payload
//! - **lossy**: values are quantized to multiples of `2 * tolerance`, so the
//!   reconstruction error is at most `tolerance`; quantized integers are
//!   written as zigzag varints and the token stream is zlib-compressed.
//!   Non-finite values and values too large to quantize are stored verbatim.
//!
//! # Examples
//!
//! ```rust
//! use feblock_sparse::io::compression::{lossy_compress, lossy_decompress};
//!
//! let values: Vec<f64> = (0..100).map(|i| (i as f64 * 0.1).sin()).collect();
//! let packed = lossy_compress(&values, 1e-4, 6).unwrap();
//! let unpacked = lossy_decompress(&packed, values.len(), 1e-4).unwrap();
//! assert!(values.iter().zip(&unpacked).all(|(a, b)| (a - b).abs() <= 1e-4));
//! ```

use crate::error::{IoError, SparseResult};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use std::io::{Read, Write};

/// Largest quantized magnitude; keeps `q * step` exact in `f64`
const MAX_QUANT: f64 = (1u64 << 53) as f64;

/// Token marking a value stored as raw `f64` bytes
const ESCAPE: u64 = 0;

fn compression_error(err: impl std::fmt::Display) -> IoError {
    IoError::Compression(err.to_string())
}

/// zlib-compress `data` at `level` (0..=9)
pub fn zlib_compress(data: &[u8], level: u32) -> SparseResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::new(level));
    encoder.write_all(data).map_err(compression_error)?;
    Ok(encoder.finish().map_err(compression_error)?)
}

/// Inflate a zlib stream that must expand to exactly `expected_len` bytes
pub fn zlib_decompress(data: &[u8], expected_len: usize) -> SparseResult<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_len.min(1 << 24));
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(compression_error)?;
    if out.len() != expected_len {
        return Err(compression_error(format!(
            "inflated {} bytes, expected {expected_len}",
            out.len()
        ))
        .into());
    }
    Ok(out)
}

fn zigzag(q: i64) -> u64 {
    ((q << 1) ^ (q >> 63)) as u64
}

fn unzigzag(z: u64) -> i64 {
    ((z >> 1) as i64) ^ -((z & 1) as i64)
}

fn push_varint(out: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        out.push((v as u8) | 0x80);
        v >>= 7;
    }
    out.push(v as u8);
}

fn read_varint(data: &[u8], pos: &mut usize) -> SparseResult<u64> {
    let mut v = 0u64;
    for shift in (0..64).step_by(7) {
        let byte = *data
            .get(*pos)
            .ok_or_else(|| compression_error("truncated varint"))?;
        *pos += 1;
        v |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(v);
        }
    }
    Err(compression_error("varint longer than 64 bits").into())
}

/// Quantize `values` with absolute error bound `tolerance`, then zlib
pub fn lossy_compress(values: &[f64], tolerance: f64, level: u32) -> SparseResult<Vec<u8>> {
    let step = 2.0 * tolerance;
    let mut tokens = Vec::with_capacity(values.len() * 2);
    for &v in values {
        let q = (v / step).round();
        if v.is_finite() && q.abs() <= MAX_QUANT && (v - q * step).abs() <= tolerance {
            push_varint(&mut tokens, zigzag(q as i64) + 1);
        } else {
            push_varint(&mut tokens, ESCAPE);
            tokens.extend_from_slice(&v.to_le_bytes());
        }
    }
    let mut out = Vec::with_capacity(tokens.len() / 2 + 8);
    out.extend_from_slice(&(tokens.len() as u64).to_le_bytes());
    out.extend_from_slice(&zlib_compress(&tokens, level)?);
    Ok(out)
}

/// Inverse of [`lossy_compress`]; `count` values are expected
pub fn lossy_decompress(data: &[u8], count: usize, tolerance: f64) -> SparseResult<Vec<f64>> {
    let (len, body) = data
        .split_first_chunk::<8>()
        .ok_or_else(|| compression_error("truncated lossy payload"))?;
    let tokens = zlib_decompress(body, u64::from_le_bytes(*len) as usize)?;

    let step = 2.0 * tolerance;
    // every value takes at least one token byte
    let mut values = Vec::with_capacity(count.min(tokens.len()));
    let mut pos = 0;
    while values.len() < count {
        match read_varint(&tokens, &mut pos)? {
            ESCAPE => {
                let raw = tokens
                    .get(pos..pos + 8)
                    .ok_or_else(|| compression_error("truncated escaped value"))?;
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(raw);
                values.push(f64::from_le_bytes(bytes));
                pos += 8;
            }
            token => values.push(unzigzag(token - 1) as f64 * step),
        }
    }
    if pos != tokens.len() {
        return Err(compression_error("trailing bytes after lossy payload").into());
    }
    Ok(values)
}
