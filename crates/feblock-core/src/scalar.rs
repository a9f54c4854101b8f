//! Scalar and index type abstractions.
//!
//! Every container is generic over a value scalar ([`Scalar`]) and an index
//! type ([`IndexType`]). Both carry a one-byte tag so that serialized streams
//! can record which in-memory types produced them.
//!
//! # Examples
//!
//! ```
//! use feblock_core::{IndexKind, IndexType, Scalar, ScalarType};
//!
//! assert_eq!(f32::SCALAR_TYPE, ScalarType::F32);
//! assert_eq!(<f64 as Scalar>::from_f64(0.5), 0.5);
//!
//! assert_eq!(u32::INDEX_TYPE, IndexKind::U32);
//! assert_eq!(u32::try_from_usize(7).map(|i| i.index()), Some(7));
//! assert!(u32::try_from_usize(usize::MAX).is_none());
//! ```

use crate::error::{CoreError, CoreResult};
use bytemuck::Pod;
use num_traits::{Float, PrimInt, Unsigned};
use std::fmt::{Debug, Display, LowerExp};
use std::hash::Hash;
use std::iter::Sum;
use std::ops::{AddAssign, DivAssign, MulAssign, SubAssign};
use std::str::FromStr;

/// Tag identifying the in-memory floating-point type of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    F32,
    F64,
}

impl ScalarType {
    /// Stable byte tag used in binary headers.
    pub fn tag(self) -> u8 {
        match self {
            ScalarType::F32 => 1,
            ScalarType::F64 => 2,
        }
    }

    /// Inverse of [`ScalarType::tag`].
    pub fn from_tag(tag: u8) -> CoreResult<Self> {
        match tag {
            1 => Ok(ScalarType::F32),
            2 => Ok(ScalarType::F64),
            _ => Err(CoreError::UnknownTag {
                what: "scalar type",
                tag,
            }),
        }
    }

    /// Size of one value in bytes.
    pub fn size_of(self) -> usize {
        match self {
            ScalarType::F32 => 4,
            ScalarType::F64 => 8,
        }
    }
}

/// Tag identifying the in-memory index type of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    U32,
    U64,
    Usize,
}

impl IndexKind {
    /// Stable byte tag used in binary headers.
    pub fn tag(self) -> u8 {
        match self {
            IndexKind::U32 => 1,
            IndexKind::U64 => 2,
            IndexKind::Usize => 3,
        }
    }

    /// Inverse of [`IndexKind::tag`].
    pub fn from_tag(tag: u8) -> CoreResult<Self> {
        match tag {
            1 => Ok(IndexKind::U32),
            2 => Ok(IndexKind::U64),
            3 => Ok(IndexKind::Usize),
            _ => Err(CoreError::UnknownTag {
                what: "index type",
                tag,
            }),
        }
    }
}

/// Floating-point value type stored in vectors and matrices.
pub trait Scalar:
    Float
    + Pod
    + Default
    + Debug
    + Display
    + LowerExp
    + FromStr
    + Sum
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
    + Send
    + Sync
    + 'static
{
    /// Tag recorded in serialized headers.
    const SCALAR_TYPE: ScalarType;

    /// Lossy conversion from `f64` (narrowing for `f32`).
    fn from_f64(value: f64) -> Self;

    /// Widening conversion to `f64`.
    fn as_f64(self) -> f64;
}

impl Scalar for f32 {
    const SCALAR_TYPE: ScalarType = ScalarType::F32;

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl Scalar for f64 {
    const SCALAR_TYPE: ScalarType = ScalarType::F64;

    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self
    }
}

/// Unsigned integer type used for row pointers and column indices.
pub trait IndexType:
    PrimInt + Unsigned + Pod + Hash + Debug + Display + Default + Send + Sync + 'static
{
    /// Tag recorded in serialized headers.
    const INDEX_TYPE: IndexKind;

    /// Type name used in overflow diagnostics.
    const NAME: &'static str;

    /// The index as a `usize` position.
    fn index(self) -> usize;

    /// Checked conversion from a `usize` position.
    fn try_from_usize(value: usize) -> Option<Self>;

    /// Checked conversion from the 64-bit on-disk representation.
    fn from_u64(value: u64) -> CoreResult<Self>;

    /// Conversion from a `usize` position.
    ///
    /// # Panics
    ///
    /// Panics if the value does not fit; containers never hold more entries
    /// than their index type can address.
    fn from_usize(value: usize) -> Self {
        match Self::try_from_usize(value) {
            Some(i) => i,
            None => panic!("index {value} does not fit into {}", Self::NAME),
        }
    }
}

macro_rules! impl_index_type {
    ($t:ty, $kind:expr, $name:literal) => {
        impl IndexType for $t {
            const INDEX_TYPE: IndexKind = $kind;
            const NAME: &'static str = $name;

            #[inline]
            fn index(self) -> usize {
                self as usize
            }

            #[inline]
            fn try_from_usize(value: usize) -> Option<Self> {
                <$t>::try_from(value).ok()
            }

            fn from_u64(value: u64) -> CoreResult<Self> {
                <$t>::try_from(value).map_err(|_| CoreError::IndexOverflow {
                    value,
                    target: $name,
                })
            }
        }
    };
}

impl_index_type!(u32, IndexKind::U32, "u32");
impl_index_type!(u64, IndexKind::U64, "u64");
impl_index_type!(usize, IndexKind::Usize, "usize");

/// Converts a slice of `usize` positions into an index array.
pub fn to_index_vec<I: IndexType>(values: &[usize]) -> Vec<I> {
    values.iter().map(|&v| I::from_usize(v)).collect()
}
