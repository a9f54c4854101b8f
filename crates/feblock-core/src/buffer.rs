//! Reference-counted value storage shared between container handles.
//!
//! A [`SharedBuffer`] owns (or co-owns) one contiguous allocation and exposes
//! a window `offset..offset+len` into it. A freshly allocated buffer has a
//! single holder and behaves as exclusively owned; [`SharedBuffer::share`]
//! hands out another handle to the same memory, so writes through either
//! handle are observed by both. The allocation lives as long as its longest
//! holder.
//!
//! # Examples
//!
//! ```
//! use feblock_core::SharedBuffer;
//!
//! let a = SharedBuffer::from_vec(vec![1.0, 2.0, 3.0, 4.0]);
//! let b = a.share();
//! b.write()[0] = 10.0;
//! assert_eq!(a.read()[0], 10.0);
//!
//! let tail = a.range(2, 2).unwrap();
//! assert_eq!(&*tail.read(), &[3.0, 4.0]);
//!
//! let c = a.deep_copy();
//! c.write()[1] = -1.0;
//! assert_eq!(a.read()[1], 2.0);
//! ```

use crate::error::{CoreError, CoreResult};
use bytemuck::Pod;
use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Read guard over a buffer window.
pub type ReadGuard<'a, T> = MappedRwLockReadGuard<'a, [T]>;

/// Write guard over a buffer window.
pub type WriteGuard<'a, T> = MappedRwLockWriteGuard<'a, [T]>;

/// Operand access returned by [`SharedBuffer::read_for`].
///
/// Operands living in a different allocation than the written target are
/// read through a lock guard; operands sharing the target's allocation are
/// copied first, so the target can be locked for writing afterwards.
pub enum ReadView<'a, T> {
    Locked(ReadGuard<'a, T>),
    Detached(Vec<T>),
}

impl<T> Deref for ReadView<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        match self {
            ReadView::Locked(guard) => guard,
            ReadView::Detached(copy) => copy,
        }
    }
}

/// Shared, window-able storage for container values.
pub struct SharedBuffer<T> {
    data: Arc<RwLock<Vec<T>>>,
    offset: usize,
    len: usize,
}

impl<T: Pod> SharedBuffer<T> {
    /// Takes ownership of `data`.
    pub fn from_vec(data: Vec<T>) -> Self {
        let len = data.len();
        Self {
            data: Arc::new(RwLock::new(data)),
            offset: 0,
            len,
        }
    }

    /// Allocates `len` zeroed elements.
    pub fn zeroed(len: usize) -> Self {
        Self::from_vec(vec![T::zeroed(); len])
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset of this window into the underlying allocation.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Another handle onto the same memory and window.
    pub fn share(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            offset: self.offset,
            len: self.len,
        }
    }

    /// Handle onto the sub-window `offset..offset+len` of this window.
    pub fn range(&self, offset: usize, len: usize) -> CoreResult<Self> {
        let end = offset + len;
        if end > self.len {
            return Err(CoreError::RangeOutOfBounds {
                offset,
                end,
                len: self.len,
            });
        }
        Ok(Self {
            data: Arc::clone(&self.data),
            offset: self.offset + offset,
            len,
        })
    }

    /// Independent copy of the window contents.
    pub fn deep_copy(&self) -> Self {
        Self::from_vec(self.to_vec())
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.read().to_vec()
    }

    /// Read access to the window.
    pub fn read(&self) -> ReadGuard<'_, T> {
        let (start, end) = (self.offset, self.offset + self.len);
        RwLockReadGuard::map(self.data.read(), |v| &v[start..end])
    }

    /// Write access to the window.
    pub fn write(&self) -> WriteGuard<'_, T> {
        let (start, end) = (self.offset, self.offset + self.len);
        RwLockWriteGuard::map(self.data.write(), |v| &mut v[start..end])
    }

    /// Read access to this window while `target` is about to be written.
    pub fn read_for(&self, target: &Self) -> ReadView<'_, T> {
        if self.is_shared_with(target) {
            ReadView::Detached(self.to_vec())
        } else {
            ReadView::Locked(self.read())
        }
    }

    /// Whether both handles point into the same allocation.
    pub fn is_shared_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Whether both handles address the same window of the same allocation.
    pub fn same_window(&self, other: &Self) -> bool {
        self.is_shared_with(other) && self.offset == other.offset && self.len == other.len
    }

    /// Whether the two windows share at least one element.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.is_shared_with(other)
            && self.offset < other.offset + other.len
            && other.offset < self.offset + self.len
    }

    /// Number of live handles onto the allocation.
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.data)
    }
}

impl<T: Pod + fmt::Debug> fmt::Debug for SharedBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("holders", &self.holders())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_sees_writes() {
        let a = SharedBuffer::<f64>::zeroed(4);
        let b = a.share();
        assert_eq!(a.holders(), 2);
        b.write()[3] = 5.0;
        assert_eq!(a.to_vec(), vec![0.0, 0.0, 0.0, 5.0]);
        assert!(a.same_window(&b));
        drop(b);
        assert_eq!(a.holders(), 1);
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let a = SharedBuffer::from_vec(vec![1u64, 2, 3]);
        let b = a.deep_copy();
        b.write()[0] = 9;
        assert_eq!(a.read()[0], 1);
        assert!(!a.is_shared_with(&b));
    }

    #[test]
    fn test_range_windows() {
        let a = SharedBuffer::from_vec((0..10).map(f64::from).collect());
        let mid = a.range(4, 3).unwrap();
        assert_eq!(mid.offset(), 4);
        assert_eq!(&*mid.read(), &[4.0, 5.0, 6.0]);

        let inner = mid.range(1, 1).unwrap();
        inner.write()[0] = -5.0;
        assert_eq!(a.read()[5], -5.0);

        assert!(mid.overlaps(&a));
        assert!(!a.range(0, 4).unwrap().overlaps(&mid));
        assert!(a.range(8, 3).is_err());
    }

    #[test]
    fn test_read_for_detaches_shared_operands() {
        let a = SharedBuffer::from_vec(vec![1.0, 2.0]);
        let b = a.share();
        let other = SharedBuffer::from_vec(vec![3.0, 4.0]);

        let view = b.read_for(&a);
        assert!(matches!(view, ReadView::Detached(_)));
        a.write()[0] = 10.0;
        assert_eq!(&*view, &[1.0, 2.0]);

        let view = other.read_for(&a);
        assert!(matches!(view, ReadView::Locked(_)));
        assert_eq!(&*view, &[3.0, 4.0]);
    }
}
