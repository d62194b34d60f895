//! TaggedPointer<T, ALIGN>: a non-owning `*mut T` with a small tag packed
//! into the address bits that alignment leaves empty.
//!
//! Layout for `ALIGN = 8`:
//!
//! ```text
//! | 63 ...................... 3 | 2 1 0 |
//! |        address >> 3         |  tag  |
//! ```
//!
//! The wrapper is exactly one word and never owns or frees the pointee.
//!
//! `ALIGN` has to be a power of two, anything else is rejected at compile time:
//!
//! ```compile_fail
//! let _ = tagword::TaggedPointer::<u64, 3>::null();
//! ```
use std::{
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
};

use crate::{Align, TagError, address_of, check_address, check_tag, pointer_at};

pub struct TaggedPointer<T, const ALIGN: usize> {
    data: usize,
    _marker: PhantomData<*mut T>,
}

// derive would require T: Clone, but this only copies the pointer, not T
impl<T, const ALIGN: usize> Clone for TaggedPointer<T, ALIGN> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, const ALIGN: usize> Copy for TaggedPointer<T, ALIGN> {}

impl<T, const ALIGN: usize> TaggedPointer<T, ALIGN> {
    /// Exclusive upper bound of a tag.
    pub const TAG_LIMIT: usize = ALIGN;

    #[inline]
    pub fn new(ptr: *mut T, tag: usize) -> Self {
        let mut tagged = Self::null();
        tagged.set(ptr, tag);
        tagged
    }

    /// Like [`TaggedPointer::new`] but reports violated preconditions
    /// instead of asserting.
    pub fn try_new(ptr: *mut T, tag: usize) -> Result<Self, TagError> {
        let mut tagged = Self::null();
        tagged.try_set(ptr, tag)?;
        Ok(tagged)
    }

    /// A null pointer with tag 0.
    #[inline]
    pub const fn null() -> Self {
        let () = Align::<ALIGN>::VALID;
        Self {
            data: 0,
            _marker: PhantomData,
        }
    }

    /// Reinterpret a word produced by [`TaggedPointer::raw`].
    #[inline]
    pub const fn from_raw(data: usize) -> Self {
        let () = Align::<ALIGN>::VALID;
        Self {
            data,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub const fn raw(self) -> usize {
        self.data
    }

    /// Store `ptr` and `tag`.
    ///
    /// `ptr` must be aligned to `ALIGN` and `tag` must be below `ALIGN`.
    /// Both are checked in debug builds only; in release builds a bad
    /// argument silently mixes tag and address bits.
    #[inline]
    pub fn set(&mut self, ptr: *mut T, tag: usize) {
        let address = address_of(ptr);
        debug_assert_eq!(
            address & Align::<ALIGN>::TAG_MASK,
            0,
            "pointer {:#x} is not aligned to {} bytes",
            address,
            ALIGN
        );
        debug_assert_eq!(
            tag & Align::<ALIGN>::POINTER_MASK,
            0,
            "tag {} does not fit below {}",
            tag,
            ALIGN
        );
        self.data = address | tag;
    }

    pub fn try_set(&mut self, ptr: *mut T, tag: usize) -> Result<(), TagError> {
        let address = address_of(ptr);
        check_address(address, ALIGN)?;
        check_tag(tag, Self::TAG_LIMIT)?;
        self.data = address | tag;
        Ok(())
    }

    /// Replace the pointer, keeping the tag.
    #[inline]
    pub fn set_pointer(&mut self, ptr: *mut T) {
        let tag = self.tag();
        self.set(ptr, tag);
    }

    /// Replace the tag, keeping the pointer.
    #[inline]
    pub fn set_tag(&mut self, tag: usize) {
        let ptr = self.as_ptr();
        self.set(ptr, tag);
    }

    #[inline]
    pub fn as_ptr(self) -> *mut T {
        pointer_at(self.data & Align::<ALIGN>::POINTER_MASK)
    }

    #[inline]
    pub fn tag(self) -> usize {
        self.data & Align::<ALIGN>::TAG_MASK
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.data & Align::<ALIGN>::POINTER_MASK == 0
    }

    /// # Safety
    /// the untagged pointer must point to a live `T` for `'a`
    #[inline]
    pub unsafe fn as_ref<'a>(self) -> &'a T {
        debug_assert!(!self.is_null(), "dereferencing a null TaggedPointer");
        // SAFETY: by contract
        unsafe { &*self.as_ptr() }
    }

    /// # Safety
    /// the untagged pointer must point to a live `T` for `'a`
    /// and no other reference to it may exist
    #[inline]
    pub unsafe fn as_mut<'a>(self) -> &'a mut T {
        debug_assert!(!self.is_null(), "dereferencing a null TaggedPointer");
        // SAFETY: by contract
        unsafe { &mut *self.as_ptr() }
    }
}

impl<T, const ALIGN: usize> Default for TaggedPointer<T, ALIGN> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T, const ALIGN: usize> From<*mut T> for TaggedPointer<T, ALIGN> {
    #[inline]
    fn from(ptr: *mut T) -> Self {
        Self::new(ptr, 0)
    }
}

impl<T, const ALIGN: usize> PartialEq for TaggedPointer<T, ALIGN> {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl<T, const ALIGN: usize> Eq for TaggedPointer<T, ALIGN> {}

impl<T, const ALIGN: usize> Hash for TaggedPointer<T, ALIGN> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.data.hash(state);
    }
}

impl<T, const ALIGN: usize> fmt::Debug for TaggedPointer<T, ALIGN> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaggedPointer")
            .field("ptr", &self.as_ptr())
            .field("tag", &self.tag())
            .finish()
    }
}
