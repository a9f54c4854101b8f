//! Matrix Market and plain-text formats
//!
//! - Vectors use the `array` layout: header
//!   `%%MatrixMarket matrix array real general`, a size line `<n> 1`, then
//!   one value per line.
//! - Matrices use the `coordinate` layout: header
//!   `%%MatrixMarket matrix coordinate real general`, a size line
//!   `<rows> <columns> <entries>`, then `row col value` per line (1-based).
//!   Readers also accept `symmetric` and `skew-symmetric` files and mirror
//!   their off-diagonal entries.
//! - The `exp` format is one value per line; lines containing `#` are skipped.
//!
//! Values are written in Rust's shortest round-trip scientific notation, so
//! a text round trip reproduces every value exactly.
//!
//! # Examples
//!
//! ```rust
//! use feblock_sparse::io::matrix_market;
//!
//! let mut out = Vec::new();
//! matrix_market::write_array(&mut out, &[1.5f64, -2.0]).unwrap();
//! assert_eq!(
//!     String::from_utf8(out.clone()).unwrap(),
//!     "%%MatrixMarket matrix array real general\n2 1\n1.5e0\n-2e0\n"
//! );
//! let back: Vec<f64> = matrix_market::read_array(out.as_slice()).unwrap();
//! assert_eq!(back, vec![1.5, -2.0]);
//! ```

use crate::error::{SparseError, SparseResult};
use feblock_core::Scalar;
use std::io::{BufRead, Write};

/// Layout of a Matrix Market file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixMarketFormat {
    /// `row col value` triplets
    Coordinate,
    /// Dense column-major values
    Array,
}

/// Value field of a Matrix Market file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixMarketDataType {
    Real,
    Integer,
    /// Structure only; every stored entry reads as one
    Pattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixMarketSymmetry {
    General,
    Symmetric,
    SkewSymmetric,
}

/// Parsed banner line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixMarketHeader {
    pub format: MatrixMarketFormat,
    pub data_type: MatrixMarketDataType,
    pub symmetry: MatrixMarketSymmetry,
}

impl MatrixMarketHeader {
    pub const ARRAY: Self = Self {
        format: MatrixMarketFormat::Array,
        data_type: MatrixMarketDataType::Real,
        symmetry: MatrixMarketSymmetry::General,
    };

    pub const COORDINATE: Self = Self {
        format: MatrixMarketFormat::Coordinate,
        data_type: MatrixMarketDataType::Real,
        symmetry: MatrixMarketSymmetry::General,
    };

    /// Parse the banner (first line)
    pub fn parse(line: &str) -> SparseResult<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 5 || parts[0] != "%%MatrixMarket" || parts[1] != "matrix" {
            return Err(SparseError::parse(1, "invalid Matrix Market banner"));
        }

        let format = match parts[2] {
            "coordinate" => MatrixMarketFormat::Coordinate,
            "array" => MatrixMarketFormat::Array,
            other => return Err(SparseError::parse(1, format!("unknown format '{other}'"))),
        };
        let data_type = match parts[3] {
            "real" => MatrixMarketDataType::Real,
            "integer" => MatrixMarketDataType::Integer,
            "pattern" => MatrixMarketDataType::Pattern,
            other => {
                return Err(SparseError::parse(
                    1,
                    format!("unsupported data type '{other}'"),
                ))
            }
        };
        let symmetry = match parts[4] {
            "general" => MatrixMarketSymmetry::General,
            "symmetric" => MatrixMarketSymmetry::Symmetric,
            "skew-symmetric" => MatrixMarketSymmetry::SkewSymmetric,
            other => {
                return Err(SparseError::parse(
                    1,
                    format!("unsupported symmetry '{other}'"),
                ))
            }
        };

        Ok(Self {
            format,
            data_type,
            symmetry,
        })
    }

    pub fn header_string(&self) -> String {
        let format = match self.format {
            MatrixMarketFormat::Coordinate => "coordinate",
            MatrixMarketFormat::Array => "array",
        };
        let data_type = match self.data_type {
            MatrixMarketDataType::Real => "real",
            MatrixMarketDataType::Integer => "integer",
            MatrixMarketDataType::Pattern => "pattern",
        };
        let symmetry = match self.symmetry {
            MatrixMarketSymmetry::General => "general",
            MatrixMarketSymmetry::Symmetric => "symmetric",
            MatrixMarketSymmetry::SkewSymmetric => "skew-symmetric",
        };
        format!("%%MatrixMarket matrix {format} {data_type} {symmetry}")
    }
}

/// Scalar entries of a coordinate file, 0-based
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateData<T> {
    pub rows: usize,
    pub columns: usize,
    pub entries: Vec<(usize, usize, T)>,
}

/// Line source that numbers lines and skips `%` comments and blank lines
struct Lines<R> {
    reader: R,
    line: usize,
    buf: String,
}

impl<R: BufRead> Lines<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            buf: String::new(),
        }
    }

    /// Next trimmed line, `None` at end of input
    fn raw(&mut self) -> SparseResult<Option<String>> {
        self.buf.clear();
        if self.reader.read_line(&mut self.buf)? == 0 {
            return Ok(None);
        }
        self.line += 1;
        Ok(Some(self.buf.trim().to_string()))
    }

    /// Next data line with its number
    fn data(&mut self) -> SparseResult<Option<(usize, String)>> {
        while let Some(l) = self.raw()? {
            if !(l.is_empty() || l.starts_with('%')) {
                return Ok(Some((self.line, l)));
            }
        }
        Ok(None)
    }

    fn header(&mut self) -> SparseResult<MatrixMarketHeader> {
        match self.raw()? {
            Some(l) => MatrixMarketHeader::parse(&l),
            None => Err(SparseError::parse(1, "input is empty")),
        }
    }

    fn size_line(&mut self, fields: usize) -> SparseResult<Vec<usize>> {
        let (line, text) = self
            .data()?
            .ok_or_else(|| SparseError::parse(self.line, "missing size line"))?;
        let sizes = text
            .split_whitespace()
            .map(|s| parse_field::<usize>(line, s, "size"))
            .collect::<SparseResult<Vec<_>>>()?;
        if sizes.len() != fields {
            return Err(SparseError::parse(
                line,
                format!("size line needs {fields} fields, found {}", sizes.len()),
            ));
        }
        Ok(sizes)
    }
}

fn parse_field<X: std::str::FromStr>(line: usize, text: &str, what: &str) -> SparseResult<X> {
    text.parse()
        .map_err(|_| SparseError::parse(line, format!("invalid {what} '{text}'")))
}

/// Write `values` as a Matrix Market array with one column
pub fn write_array<T: Scalar, W: Write>(writer: &mut W, values: &[T]) -> SparseResult<()> {
    writeln!(writer, "{}", MatrixMarketHeader::ARRAY.header_string())?;
    writeln!(writer, "{} 1", values.len())?;
    for v in values {
        writeln!(writer, "{v:e}")?;
    }
    Ok(())
}

/// Read a single-column Matrix Market array
///
/// # Errors
///
/// Fails on a banner other than `array real general`, a column count other
/// than 1, an unparsable value, or a value count not matching the size line.
pub fn read_array<T: Scalar, R: BufRead>(reader: R) -> SparseResult<Vec<T>> {
    let mut lines = Lines::new(reader);
    let header = lines.header()?;
    if header.format != MatrixMarketFormat::Array
        || header.symmetry != MatrixMarketSymmetry::General
        || header.data_type == MatrixMarketDataType::Pattern
    {
        return Err(SparseError::parse(1, "not a compatible Matrix Market vector file"));
    }
    let sizes = lines.size_line(2)?;
    if sizes[1] != 1 {
        return Err(SparseError::parse(
            lines.line,
            format!("expected a single column, found {}", sizes[1]),
        ));
    }

    let mut values = Vec::with_capacity(sizes[0].min(1 << 20));
    while let Some((line, text)) = lines.data()? {
        values.push(parse_field::<T>(line, &text, "value")?);
    }
    if values.len() != sizes[0] {
        return Err(SparseError::parse(
            lines.line,
            format!("expected {} values, found {}", sizes[0], values.len()),
        ));
    }
    Ok(values)
}

/// Write one value per line
pub fn write_exp<T: Scalar, W: Write>(writer: &mut W, values: &[T]) -> SparseResult<()> {
    for v in values {
        writeln!(writer, "{v:e}")?;
    }
    Ok(())
}

/// Read one value per line, skipping blank lines and lines containing `#`
pub fn read_exp<T: Scalar, R: BufRead>(reader: R) -> SparseResult<Vec<T>> {
    let mut lines = Lines::new(reader);
    let mut values = Vec::new();
    while let Some(text) = lines.raw()? {
        if text.is_empty() || text.contains('#') {
            continue;
        }
        values.push(parse_field::<T>(lines.line, &text, "value")?);
    }
    Ok(values)
}

/// Write scalar entries in coordinate layout; indices are 0-based
pub fn write_coordinate<T, W, E>(
    writer: &mut W,
    rows: usize,
    columns: usize,
    entries: E,
) -> SparseResult<()>
where
    T: Scalar,
    W: Write,
    E: ExactSizeIterator<Item = (usize, usize, T)>,
{
    writeln!(writer, "{}", MatrixMarketHeader::COORDINATE.header_string())?;
    writeln!(writer, "{rows} {columns} {}", entries.len())?;
    for (r, c, v) in entries {
        writeln!(writer, "{} {} {v:e}", r + 1, c + 1)?;
    }
    Ok(())
}

/// Read a coordinate file into 0-based scalar entries
///
/// Symmetric files contribute `(j, i)` for every off-diagonal `(i, j)`;
/// skew-symmetric files contribute its negation.
pub fn read_coordinate<T: Scalar, R: BufRead>(reader: R) -> SparseResult<CoordinateData<T>> {
    let mut lines = Lines::new(reader);
    let header = lines.header()?;
    if header.format != MatrixMarketFormat::Coordinate {
        return Err(SparseError::parse(1, "not a Matrix Market coordinate file"));
    }
    let sizes = lines.size_line(3)?;
    let (rows, columns, count) = (sizes[0], sizes[1], sizes[2]);
    if rows.checked_add(1).is_none() || columns.checked_add(1).is_none() {
        return Err(SparseError::parse(
            lines.line,
            format!("matrix size {rows}x{columns} is not addressable"),
        ));
    }

    let mut entries = Vec::with_capacity(count.min(1 << 20));
    let mut read = 0;
    while let Some((line, text)) = lines.data()? {
        let parts: Vec<&str> = text.split_whitespace().collect();
        let expected = if header.data_type == MatrixMarketDataType::Pattern { 2 } else { 3 };
        if parts.len() != expected {
            return Err(SparseError::parse(
                line,
                format!("expected {expected} fields, found {}", parts.len()),
            ));
        }
        let r = parse_field::<usize>(line, parts[0], "row index")?;
        let c = parse_field::<usize>(line, parts[1], "column index")?;
        if r == 0 || r > rows || c == 0 || c > columns {
            return Err(SparseError::parse(
                line,
                format!("entry ({r}, {c}) outside {rows}x{columns}"),
            ));
        }
        let value = match header.data_type {
            MatrixMarketDataType::Pattern => T::one(),
            _ => parse_field::<T>(line, parts[2], "value")?,
        };
        let (r, c) = (r - 1, c - 1);
        entries.push((r, c, value));
        if r != c {
            match header.symmetry {
                MatrixMarketSymmetry::General => {}
                MatrixMarketSymmetry::Symmetric => entries.push((c, r, value)),
                MatrixMarketSymmetry::SkewSymmetric => entries.push((c, r, -value)),
            }
        }
        read += 1;
    }
    if read != count {
        return Err(SparseError::parse(
            lines.line,
            format!("expected {count} entries, found {read}"),
        ));
    }
    Ok(CoordinateData {
        rows,
        columns,
        entries,
    })
}
