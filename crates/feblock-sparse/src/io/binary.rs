//! Native binary container format
//!
//! # Layout (little endian)
//!
//! ```text
//! magic "FEBK" | version u8 | kind u8 | scalar tag u8 | index tag u8 | compression tag u8
//! block height u32 | block width u32
//! scalar count u64 | scalar fields u64 * count
//! tolerance f64
//! array count u64 | per array: role u8 | element count u64 | payload bytes u64 | payload
//! ```
//!
//! Vectors store one scalar field (the block count) and one values array.
//! BCSR matrices store `size, rows, columns, used_elements` and the arrays
//! values, row pointer and column indices. Values are written as `f64` and
//! indices as `u64` whatever the in-memory types are; the scalar and index
//! tags record the writer's types.

use super::compression::{lossy_compress, lossy_decompress, zlib_compress, zlib_decompress};
use super::{Compression, SerialConfig};
use crate::error::{SparseError, SparseResult};
use feblock_core::{IndexKind, ScalarType};

/// Leading bytes of every binary container
pub const MAGIC: &[u8; 4] = b"FEBK";

/// Current format version
pub const VERSION: u8 = 1;

/// Container kind stored in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Vector,
    Bcsr,
}

impl ContainerKind {
    pub fn tag(self) -> u8 {
        match self {
            ContainerKind::Vector => 1,
            ContainerKind::Bcsr => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(ContainerKind::Vector),
            2 => Some(ContainerKind::Bcsr),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ContainerKind::Vector => "DenseVectorBlocked",
            ContainerKind::Bcsr => "SparseMatrixBcsr",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrayRole {
    Values,
    RowPtr,
    ColInd,
}

impl ArrayRole {
    fn tag(self) -> u8 {
        match self {
            ArrayRole::Values => 1,
            ArrayRole::RowPtr => 2,
            ArrayRole::ColInd => 3,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(ArrayRole::Values),
            2 => Some(ArrayRole::RowPtr),
            3 => Some(ArrayRole::ColInd),
            _ => None,
        }
    }
}

/// Type-erased contents of a binary container
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryImage {
    pub kind: ContainerKind,
    pub scalar_type: ScalarType,
    pub index_kind: IndexKind,
    pub block_height: u32,
    pub block_width: u32,
    /// Kind-specific size fields
    pub scalars: Vec<u64>,
    pub values: Vec<f64>,
    /// Empty for vectors
    pub row_ptr: Vec<u64>,
    /// Empty for vectors
    pub col_ind: Vec<u64>,
}

fn block_dim(value: usize, field: &'static str) -> SparseResult<u32> {
    u32::try_from(value).map_err(|_| SparseError::malformed(field, "block dimension exceeds u32"))
}

impl BinaryImage {
    /// Image of a vector of `size` blocks of `block` scalars
    pub fn vector(
        scalar_type: ScalarType,
        index_kind: IndexKind,
        block: usize,
        size: usize,
        values: Vec<f64>,
    ) -> SparseResult<Self> {
        Ok(Self {
            kind: ContainerKind::Vector,
            scalar_type,
            index_kind,
            block_height: block_dim(block, "block height")?,
            block_width: 1,
            scalars: vec![size as u64],
            values,
            row_ptr: Vec::new(),
            col_ind: Vec::new(),
        })
    }

    /// Image of a BCSR matrix; `scalars` is `[size, rows, columns, used_elements]`
    #[allow(clippy::too_many_arguments)]
    pub fn bcsr(
        scalar_type: ScalarType,
        index_kind: IndexKind,
        block: (usize, usize),
        scalars: [u64; 4],
        values: Vec<f64>,
        row_ptr: Vec<u64>,
        col_ind: Vec<u64>,
    ) -> SparseResult<Self> {
        Ok(Self {
            kind: ContainerKind::Bcsr,
            scalar_type,
            index_kind,
            block_height: block_dim(block.0, "block height")?,
            block_width: block_dim(block.1, "block width")?,
            scalars: scalars.to_vec(),
            values,
            row_ptr,
            col_ind,
        })
    }

    /// Checks kind and block shape against what the reader expects
    pub fn expect(&self, kind: ContainerKind, height: usize, width: usize) -> SparseResult<()> {
        if self.kind != kind {
            return Err(SparseError::malformed(
                "kind",
                format!("expected {}, found {}", kind.name(), self.kind.name()),
            ));
        }
        if self.block_height as usize != height || self.block_width as usize != width {
            return Err(SparseError::malformed(
                "block shape",
                format!(
                    "expected {height}x{width}, found {}x{}",
                    self.block_height, self.block_width
                ),
            ));
        }
        let fields = match kind {
            ContainerKind::Vector => 1,
            ContainerKind::Bcsr => 4,
        };
        if self.scalars.len() != fields {
            return Err(SparseError::malformed(
                "scalar count",
                format!("expected {fields}, found {}", self.scalars.len()),
            ));
        }
        Ok(())
    }

    /// Scalar field `i` as a position
    pub fn scalar(&self, i: usize, field: &'static str) -> SparseResult<usize> {
        let value = self
            .scalars
            .get(i)
            .copied()
            .ok_or_else(|| SparseError::malformed(field, "missing"))?;
        usize::try_from(value).map_err(|_| SparseError::malformed(field, "exceeds usize"))
    }

    /// Serialize with the compression selected in `config`
    pub fn encode(&self, config: &SerialConfig) -> SparseResult<Vec<u8>> {
        let compression = config.compression;
        compression.validate()?;

        let mut out = Vec::with_capacity(64 + 8 * (self.values.len() + self.col_ind.len()));
        out.extend_from_slice(MAGIC);
        out.push(VERSION);
        out.push(self.kind.tag());
        out.push(self.scalar_type.tag());
        out.push(self.index_kind.tag());
        out.push(compression.tag());
        out.extend_from_slice(&self.block_height.to_le_bytes());
        out.extend_from_slice(&self.block_width.to_le_bytes());
        out.extend_from_slice(&(self.scalars.len() as u64).to_le_bytes());
        for s in &self.scalars {
            out.extend_from_slice(&s.to_le_bytes());
        }
        let tolerance = match compression {
            Compression::Lossy { tolerance } => tolerance,
            _ => 0.0,
        };
        out.extend_from_slice(&tolerance.to_le_bytes());

        let mut arrays = vec![(ArrayRole::Values, self.encode_values(compression)?)];
        if self.kind == ContainerKind::Bcsr {
            arrays.push((ArrayRole::RowPtr, encode_indices(&self.row_ptr, compression)?));
            arrays.push((ArrayRole::ColInd, encode_indices(&self.col_ind, compression)?));
        }
        out.extend_from_slice(&(arrays.len() as u64).to_le_bytes());
        for (role, (count, payload)) in arrays {
            out.push(role.tag());
            out.extend_from_slice(&(count as u64).to_le_bytes());
            out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
            out.extend_from_slice(&payload);
        }

        tracing::debug!(
            kind = self.kind.name(),
            compression = compression.name(),
            bytes = out.len(),
            "encoded binary container"
        );
        Ok(out)
    }

    fn encode_values(&self, compression: Compression) -> SparseResult<(usize, Vec<u8>)> {
        let payload = match compression {
            Compression::Lossy { tolerance } => lossy_compress(&self.values, tolerance, 6)?,
            _ => compress_raw(&f64_bytes(&self.values), compression)?,
        };
        Ok((self.values.len(), payload))
    }

    /// Parse a binary container
    ///
    /// # Errors
    ///
    /// Returns `IoError::Malformed` naming the offending field when the
    /// magic, version, tags, array roles or payload lengths are invalid.
    pub fn decode(bytes: &[u8]) -> SparseResult<Self> {
        let mut r = Reader { bytes, pos: 0 };

        if r.take(4, "magic")? != MAGIC {
            return Err(SparseError::malformed("magic", "not a feblock binary container"));
        }
        let version = r.u8("version")?;
        if version != VERSION {
            return Err(SparseError::malformed(
                "version",
                format!("unsupported version {version}"),
            ));
        }
        let kind_tag = r.u8("kind")?;
        let kind = ContainerKind::from_tag(kind_tag)
            .ok_or_else(|| SparseError::malformed("kind", format!("unknown tag {kind_tag}")))?;
        let scalar_type = ScalarType::from_tag(r.u8("scalar tag")?)?;
        let index_kind = IndexKind::from_tag(r.u8("index tag")?)?;
        let compression_tag = r.u8("compression tag")?;
        let block_height = r.u32("block height")?;
        let block_width = r.u32("block width")?;

        let count = r.u64("scalar count")?;
        if count > 16 {
            return Err(SparseError::malformed(
                "scalar count",
                format!("implausible count {count}"),
            ));
        }
        let scalars = (0..count)
            .map(|_| r.u64("scalar field"))
            .collect::<SparseResult<Vec<_>>>()?;
        let tolerance = r.f64("tolerance")?;
        let compression = match compression_tag {
            0 => Compression::None,
            1 => Compression::Zlib { level: 6 },
            2 => Compression::Lossy { tolerance },
            tag => {
                return Err(SparseError::malformed(
                    "compression tag",
                    format!("unknown tag {tag}"),
                ))
            }
        };
        compression.validate()?;

        let mut values = None;
        let mut row_ptr = None;
        let mut col_ind = None;
        let arrays = r.u64("array count")?;
        for _ in 0..arrays {
            let role_tag = r.u8("array role")?;
            let role = ArrayRole::from_tag(role_tag).ok_or_else(|| {
                SparseError::malformed("array role", format!("unknown tag {role_tag}"))
            })?;
            let elements = r.usize("element count")?;
            let payload_len = r.usize("payload bytes")?;
            let payload = r.take(payload_len, "payload")?;
            match role {
                ArrayRole::Values => {
                    values = Some(decode_values(payload, elements, compression)?);
                }
                ArrayRole::RowPtr => row_ptr = Some(decode_indices(payload, elements, compression)?),
                ArrayRole::ColInd => col_ind = Some(decode_indices(payload, elements, compression)?),
            }
        }
        if r.pos != bytes.len() {
            return Err(SparseError::malformed(
                "payload",
                format!("{} trailing bytes", bytes.len() - r.pos),
            ));
        }

        let values = values.ok_or_else(|| SparseError::malformed("values", "array missing"))?;
        let (row_ptr, col_ind) = match kind {
            ContainerKind::Vector => (Vec::new(), Vec::new()),
            ContainerKind::Bcsr => (
                row_ptr.ok_or_else(|| SparseError::malformed("row_ptr", "array missing"))?,
                col_ind.ok_or_else(|| SparseError::malformed("col_ind", "array missing"))?,
            ),
        };

        tracing::debug!(
            kind = kind.name(),
            compression = compression.name(),
            values = values.len(),
            "decoded binary container"
        );
        Ok(Self {
            kind,
            scalar_type,
            index_kind,
            block_height,
            block_width,
            scalars,
            values,
            row_ptr,
            col_ind,
        })
    }
}

fn f64_bytes(data: &[f64]) -> Vec<u8> {
    data.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn u64_bytes(data: &[u64]) -> Vec<u8> {
    data.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn words(bytes: &[u8]) -> impl Iterator<Item = [u8; 8]> + '_ {
    bytes.chunks_exact(8).map(bytemuck::pod_read_unaligned::<[u8; 8]>)
}

fn compress_raw(bytes: &[u8], compression: Compression) -> SparseResult<Vec<u8>> {
    match compression {
        Compression::None => Ok(bytes.to_vec()),
        Compression::Zlib { level } => zlib_compress(bytes, level),
        Compression::Lossy { .. } => zlib_compress(bytes, 6),
    }
}

fn decompress_raw(payload: &[u8], len: usize, compression: Compression) -> SparseResult<Vec<u8>> {
    match compression {
        Compression::None if payload.len() == len => Ok(payload.to_vec()),
        Compression::None => Err(SparseError::malformed(
            "payload bytes",
            format!("expected {len}, found {}", payload.len()),
        )),
        Compression::Zlib { .. } | Compression::Lossy { .. } => zlib_decompress(payload, len),
    }
}

fn encode_indices(indices: &[u64], compression: Compression) -> SparseResult<(usize, Vec<u8>)> {
    let payload = compress_raw(&u64_bytes(indices), compression)?;
    Ok((indices.len(), payload))
}

fn byte_len(elements: usize) -> SparseResult<usize> {
    elements
        .checked_mul(8)
        .ok_or_else(|| SparseError::malformed("element count", "overflows usize"))
}

fn decode_indices(payload: &[u8], elements: usize, compression: Compression) -> SparseResult<Vec<u64>> {
    let raw = decompress_raw(payload, byte_len(elements)?, compression)?;
    Ok(words(&raw).map(u64::from_le_bytes).collect())
}

fn decode_values(payload: &[u8], elements: usize, compression: Compression) -> SparseResult<Vec<f64>> {
    match compression {
        Compression::Lossy { tolerance } => lossy_decompress(payload, elements, tolerance),
        _ => {
            let raw = decompress_raw(payload, byte_len(elements)?, compression)?;
            Ok(words(&raw).map(f64::from_le_bytes).collect())
        }
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize, field: &'static str) -> SparseResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| SparseError::malformed(field, "unexpected end of stream"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, field: &'static str) -> SparseResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }

    fn u8(&mut self, field: &'static str) -> SparseResult<u8> {
        Ok(self.take(1, field)?[0])
    }

    fn u32(&mut self, field: &'static str) -> SparseResult<u32> {
        Ok(u32::from_le_bytes(self.array(field)?))
    }

    fn u64(&mut self, field: &'static str) -> SparseResult<u64> {
        Ok(u64::from_le_bytes(self.array(field)?))
    }

    fn usize(&mut self, field: &'static str) -> SparseResult<usize> {
        let value = self.u64(field)?;
        usize::try_from(value).map_err(|_| SparseError::malformed(field, "exceeds usize"))
    }

    fn f64(&mut self, field: &'static str) -> SparseResult<f64> {
        Ok(f64::from_le_bytes(self.array(field)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IoError;

    fn sample_bcsr() -> BinaryImage {
        BinaryImage::bcsr(
            ScalarType::F64,
            IndexKind::U64,
            (2, 3),
            [4, 2, 2, 2],
            (1..=12).map(f64::from).collect(),
            vec![0, 1, 2],
            vec![0, 1],
        )
        .unwrap()
    }

    fn malformed_field(err: SparseError) -> &'static str {
        match err {
            SparseError::Io(IoError::Malformed { field, .. }) => field,
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_roundtrip_all_compressions() {
        let image = sample_bcsr();
        for config in [SerialConfig::default(), SerialConfig::zlib()] {
            let bytes = image.encode(&config).unwrap();
            assert_eq!(BinaryImage::decode(&bytes).unwrap(), image);
        }

        let bytes = image.encode(&SerialConfig::lossy(1e-6)).unwrap();
        let back = BinaryImage::decode(&bytes).unwrap();
        assert_eq!(back.row_ptr, image.row_ptr);
        assert_eq!(back.col_ind, image.col_ind);
        for (a, b) in back.values.iter().zip(&image.values) {
            assert!((a - b).abs() <= 1e-6);
        }
    }

    #[test]
    fn test_header_layout() {
        let image = BinaryImage::vector(ScalarType::F32, IndexKind::U32, 2, 1, vec![1.0, 2.0])
            .unwrap();
        let bytes = image.encode(&SerialConfig::default()).unwrap();
        assert_eq!(&bytes[..4], b"FEBK");
        assert_eq!(bytes[4], VERSION);
        assert_eq!(bytes[5], 1);
        assert_eq!(bytes[6], ScalarType::F32.tag());
        assert_eq!(bytes[7], IndexKind::U32.tag());
        assert_eq!(bytes[8], 0);
        // header 9 + block 8 + scalars 8 + 8 + tolerance 8 + arrays 8 + array header 17 + payload 16
        assert_eq!(bytes.len(), 9 + 8 + 16 + 8 + 8 + 17 + 16);
    }

    #[test]
    fn test_rejects_bad_magic_and_truncation() {
        let mut bytes = sample_bcsr().encode(&SerialConfig::default()).unwrap();
        let truncated = &bytes[..bytes.len() - 3];
        assert_eq!(malformed_field(BinaryImage::decode(truncated).unwrap_err()), "payload");

        bytes[0] = b'X';
        assert_eq!(malformed_field(BinaryImage::decode(&bytes).unwrap_err()), "magic");
        assert_eq!(malformed_field(BinaryImage::decode(&[]).unwrap_err()), "magic");
    }

    #[test]
    fn test_rejects_inflated_element_count() {
        let image = BinaryImage::vector(ScalarType::F64, IndexKind::U64, 1, 3, vec![1.0, 2.0, 3.0]).unwrap();
        for config in [SerialConfig::default(), SerialConfig::zlib(), SerialConfig::lossy(1e-6)] {
            let mut bytes = image.encode(&config).unwrap();
            // element count of the only array, after the role byte at 49
            for forged in [u64::MAX, 1 << 40, 4] {
                bytes[50..58].copy_from_slice(&forged.to_le_bytes());
                assert!(BinaryImage::decode(&bytes).is_err(), "{config:?} with {forged}");
            }
        }
    }

    #[test]
    fn test_rejects_unknown_role() {
        let image = BinaryImage::vector(ScalarType::F64, IndexKind::U64, 1, 1, vec![5.0]).unwrap();
        let mut bytes = image.encode(&SerialConfig::default()).unwrap();
        // role byte sits right after the array count
        let role_pos = bytes.len() - 8 - 17;
        bytes[role_pos] = 9;
        assert_eq!(malformed_field(BinaryImage::decode(&bytes).unwrap_err()), "array role");
    }

    #[test]
    fn test_expect_checks_kind_and_shape() {
        let image = sample_bcsr();
        assert!(image.expect(ContainerKind::Bcsr, 2, 3).is_ok());
        assert_eq!(
            malformed_field(image.expect(ContainerKind::Vector, 2, 1).unwrap_err()),
            "kind"
        );
        assert_eq!(
            malformed_field(image.expect(ContainerKind::Bcsr, 3, 2).unwrap_err()),
            "block shape"
        );
    }
}
