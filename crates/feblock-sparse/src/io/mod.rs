//! Serialization of vectors and matrices
//!
//! Three file modes are supported:
//!
//! - [`FileMode::Binary`]: the native binary format (see [`binary`]), with
//!   optional zlib or lossy floating-point [`compression`]
//! - [`FileMode::Mtx`]: Matrix Market text, `array` layout for vectors and
//!   `coordinate` layout for matrices (see [`matrix_market`])
//! - [`FileMode::Exp`]: one value per line, vectors only
//!
//! Binary payloads always store values as `f64` and indices as `u64`,
//! regardless of the in-memory types.
//!
//! # Examples
//!
//! ```rust
//! use feblock_sparse::io::{Compression, FileMode, SerialConfig};
//!
//! let config = SerialConfig::default().with_compression(Compression::Zlib { level: 6 });
//! let json = serde_json::to_string(&config).unwrap();
//! let back: SerialConfig = serde_json::from_str(&json).unwrap();
//! assert_eq!(back, config);
//!
//! assert_eq!("mtx".parse::<FileMode>().unwrap(), FileMode::Mtx);
//! ```

pub mod binary;
pub mod compression;
pub mod matrix_market;

pub use binary::{BinaryImage, ContainerKind};

use crate::error::{IoError, SparseError, SparseResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::str::FromStr;

/// Input/output format selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileMode {
    /// Native binary format
    Binary,
    /// Matrix Market text
    Mtx,
    /// Plain list of values, one per line
    Exp,
}

impl FileMode {
    pub fn name(self) -> &'static str {
        match self {
            FileMode::Binary => "binary",
            FileMode::Mtx => "mtx",
            FileMode::Exp => "exp",
        }
    }

    /// Guess the mode from a file extension
    ///
    /// `.mtx` and `.exp` map to their text modes; `.bin`, `.dvb` and `.bcsr`
    /// to [`FileMode::Binary`].
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?;
        ext.parse().ok()
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FileMode {
    type Err = SparseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binary" | "bin" | "dvb" | "bcsr" => Ok(FileMode::Binary),
            "mtx" => Ok(FileMode::Mtx),
            "exp" => Ok(FileMode::Exp),
            _ => Err(SparseError::Io(IoError::Parse {
                line: 0,
                reason: format!("unknown file mode '{s}'"),
            })),
        }
    }
}

/// Payload compression of the binary format
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Compression {
    /// Raw little-endian payloads
    #[default]
    None,
    /// Lossless zlib on every array
    Zlib {
        /// flate2 level, 0 (fastest) to 9 (best)
        level: u32,
    },
    /// Values quantized to an absolute error bound, then zlib
    Lossy {
        /// Largest absolute error allowed per value
        tolerance: f64,
    },
}

impl Compression {
    /// Tag recorded in the binary header
    pub fn tag(&self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Zlib { .. } => 1,
            Compression::Lossy { .. } => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Zlib { .. } => "zlib",
            Compression::Lossy { .. } => "lossy",
        }
    }

    /// Rejects levels above 9 and non-positive or non-finite tolerances
    pub fn validate(&self) -> SparseResult<()> {
        match *self {
            Compression::Zlib { level } if level > 9 => Err(IoError::Compression(format!(
                "zlib level {level} out of range 0..=9"
            ))
            .into()),
            Compression::Lossy { tolerance } if !(tolerance.is_finite() && tolerance > 0.0) => {
                Err(IoError::Compression(format!(
                    "lossy tolerance must be positive and finite, got {tolerance}"
                ))
                .into())
            }
            _ => Ok(()),
        }
    }
}

/// Options for binary serialization
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub compression: Compression,
}

impl SerialConfig {
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Lossless zlib at the default level
    pub fn zlib() -> Self {
        Self::default().with_compression(Compression::Zlib { level: 6 })
    }

    pub fn lossy(tolerance: f64) -> Self {
        Self::default().with_compression(Compression::Lossy { tolerance })
    }
}

pub(crate) fn open_file(path: &Path) -> SparseResult<BufReader<File>> {
    File::open(path).map(BufReader::new).map_err(|source| {
        IoError::File {
            path: path.display().to_string(),
            source,
        }
        .into()
    })
}

pub(crate) fn create_file(path: &Path) -> SparseResult<BufWriter<File>> {
    File::create(path).map(BufWriter::new).map_err(|source| {
        IoError::File {
            path: path.display().to_string(),
            source,
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_mode_parsing() {
        assert_eq!("Binary".parse::<FileMode>().unwrap(), FileMode::Binary);
        assert_eq!(FileMode::from_path("a/b/x.mtx"), Some(FileMode::Mtx));
        assert_eq!(FileMode::from_path("state.bcsr"), Some(FileMode::Binary));
        assert_eq!(FileMode::from_path("noext"), None);
        assert!("csv".parse::<FileMode>().is_err());
        assert_eq!(FileMode::Exp.to_string(), "exp");
    }

    #[test]
    fn test_config_serde() {
        let config: SerialConfig =
            serde_json::from_str(r#"{"compression":{"kind":"lossy","tolerance":0.001}}"#).unwrap();
        assert_eq!(config, SerialConfig::lossy(1e-3));
        let config: SerialConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.compression, Compression::None);
    }

    #[test]
    fn test_compression_validation() {
        assert!(Compression::Zlib { level: 9 }.validate().is_ok());
        assert!(Compression::Zlib { level: 10 }.validate().is_err());
        assert!(Compression::Lossy { tolerance: 0.0 }.validate().is_err());
        assert!(Compression::Lossy { tolerance: f64::NAN }.validate().is_err());
        assert_eq!(Compression::Lossy { tolerance: 1.0 }.tag(), 2);
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = open_file(Path::new("/nonexistent/feblock/file.mtx")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/feblock/file.mtx"));
    }
}
