//! TaggedValue<T, ALIGN>: one word holding either a tagged `*mut T` or a
//! small signed integer, told apart by bit 0.
//!
//! ```text
//! pointer: | address >> log2(ALIGN) | tag | 0 |
//! integer: | n (WORD_BITS - 1 bits, signed)  | 1 |
//! ```
//!
//! Bit 0 is always free in the pointer form because the pointee is aligned
//! to at least two bytes, so the pointer form keeps `log2(ALIGN) - 1` tag
//! bits and the integer form loses one bit of range.
//!
//! `ALIGN` must be a power of two greater than one:
//!
//! ```compile_fail
//! let _ = tagword::TaggedValue::<u8, 1>::from_int(1);
//! ```
use std::{
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
};

use crate::{
    Align, DISCRIMINANT_MASK, TagError, WORD_BITS, address_of, check_address,
    check_tag, pointer_at,
};

const INT_TAG: usize = 0b1;

pub struct TaggedValue<T, const ALIGN: usize> {
    data: usize,
    _marker: PhantomData<*mut T>,
}

/// Decoded contents of a [`TaggedValue`].
#[derive(Debug, PartialEq, Eq)]
pub enum Unpacked<T> {
    Pointer { ptr: *mut T, tag: usize },
    Int(isize),
}

impl<T> Clone for Unpacked<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Unpacked<T> {}

impl<T, const ALIGN: usize> Clone for TaggedValue<T, ALIGN> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, const ALIGN: usize> Copy for TaggedValue<T, ALIGN> {}

impl<T, const ALIGN: usize> TaggedValue<T, ALIGN> {
    /// Smallest storable integer.
    pub const INT_MIN: isize = isize::MIN >> 1;
    /// Largest storable integer.
    pub const INT_MAX: isize = isize::MAX >> 1;
    /// Exclusive upper bound of a tag in pointer form.
    pub const TAG_LIMIT: usize = Align::<ALIGN>::VALUE_TAG_LIMIT;

    #[inline]
    const fn new_raw(data: usize) -> Self {
        let () = Align::<ALIGN>::VALID_FOR_VALUE;
        Self {
            data,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn from_pointer(ptr: *mut T, tag: usize) -> Self {
        let mut value = Self::new_raw(0);
        value.set_pointer(ptr, tag);
        value
    }

    #[inline]
    pub fn from_int(number: isize) -> Self {
        let mut value = Self::new_raw(0);
        value.set_int(number);
        value
    }

    pub fn try_from_pointer(ptr: *mut T, tag: usize) -> Result<Self, TagError> {
        let mut value = Self::new_raw(0);
        value.try_set_pointer(ptr, tag)?;
        Ok(value)
    }

    pub fn try_from_int(number: isize) -> Result<Self, TagError> {
        let mut value = Self::new_raw(0);
        value.try_set_int(number)?;
        Ok(value)
    }

    /// Reinterpret a word produced by [`TaggedValue::raw`].
    /// Every word is a valid value: bit 0 selects the form.
    #[inline]
    pub const fn from_raw(data: usize) -> Self {
        Self::new_raw(data)
    }

    #[inline]
    pub const fn raw(self) -> usize {
        self.data
    }

    /// `true` if `number` survives the one bit shift used for storage.
    #[inline]
    pub const fn fits_int(number: isize) -> bool {
        (number << 1) >> 1 == number
    }

    #[inline]
    pub const fn is_pointer(self) -> bool {
        self.data & DISCRIMINANT_MASK == 0
    }

    #[inline]
    pub const fn is_int(self) -> bool {
        self.data & DISCRIMINANT_MASK == INT_TAG
    }

    /// Switch to pointer form.
    ///
    /// `ptr` must be aligned to `ALIGN` and `tag` must be below
    /// `ALIGN / 2`, bit 0 belongs to the discriminant. Checked in debug
    /// builds only.
    #[inline]
    pub fn set_pointer(&mut self, ptr: *mut T, tag: usize) {
        let address = address_of(ptr);
        debug_assert_eq!(
            address & Align::<ALIGN>::TAG_MASK,
            0,
            "pointer {:#x} is not aligned to {} bytes",
            address,
            ALIGN
        );
        debug_assert!(
            tag < Self::TAG_LIMIT,
            "tag {} does not fit below {}",
            tag,
            Self::TAG_LIMIT
        );
        self.data = address | (tag << 1);
    }

    /// Switch to integer form.
    ///
    /// `number` must lie in `INT_MIN..=INT_MAX`. Checked in debug builds
    /// only; out of range values lose their top bit.
    #[inline]
    pub fn set_int(&mut self, number: isize) {
        debug_assert!(
            Self::fits_int(number),
            "integer {} does not fit in {} bits",
            number,
            WORD_BITS - 1
        );
        self.data = (number << 1).cast_unsigned() | INT_TAG;
    }

    pub fn try_set_pointer(
        &mut self,
        ptr: *mut T,
        tag: usize,
    ) -> Result<(), TagError> {
        let address = address_of(ptr);
        check_address(address, ALIGN)?;
        check_tag(tag, Self::TAG_LIMIT)?;
        self.data = address | (tag << 1);
        Ok(())
    }

    pub fn try_set_int(&mut self, number: isize) -> Result<(), TagError> {
        if !Self::fits_int(number) {
            return Err(TagError::RangeViolation {
                value: number as i128,
                min: Self::INT_MIN as i128,
                max: Self::INT_MAX as i128,
            });
        }
        self.data = (number << 1).cast_unsigned() | INT_TAG;
        Ok(())
    }

    /// Pointer part of a value in pointer form.
    #[inline]
    pub fn as_ptr(self) -> *mut T {
        debug_assert!(self.is_pointer(), "TaggedValue holds an integer");
        pointer_at(self.data & Align::<ALIGN>::POINTER_MASK)
    }

    /// Tag of a value in pointer form, in `0..ALIGN / 2`.
    #[inline]
    pub fn tag(self) -> usize {
        debug_assert!(self.is_pointer(), "TaggedValue holds an integer");
        (self.data & Align::<ALIGN>::VALUE_TAG_MASK) >> 1
    }

    /// Integer of a value in integer form.
    #[inline]
    pub fn as_int(self) -> isize {
        debug_assert!(self.is_int(), "TaggedValue holds a pointer");
        self.data.cast_signed() >> 1
    }

    pub fn checked_ptr(self) -> Option<*mut T> {
        self.is_pointer().then(|| self.as_ptr())
    }

    pub fn checked_tag(self) -> Option<usize> {
        self.is_pointer().then(|| self.tag())
    }

    pub fn checked_int(self) -> Option<isize> {
        self.is_int().then(|| self.as_int())
    }

    pub fn unpack(self) -> Unpacked<T> {
        if self.is_int() {
            Unpacked::Int(self.as_int())
        } else {
            Unpacked::Pointer {
                ptr: self.as_ptr(),
                tag: self.tag(),
            }
        }
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.is_pointer() && self.data & Align::<ALIGN>::POINTER_MASK == 0
    }

    /// # Safety
    /// the value must be in pointer form and point to a live `T` for `'a`
    #[inline]
    pub unsafe fn as_ref<'a>(self) -> &'a T {
        debug_assert!(!self.is_null(), "dereferencing a null TaggedValue");
        // SAFETY: by contract
        unsafe { &*self.as_ptr() }
    }

    /// # Safety
    /// the value must be in pointer form and point to a live `T` for `'a`,
    /// no other reference to it may exist
    #[inline]
    pub unsafe fn as_mut<'a>(self) -> &'a mut T {
        debug_assert!(!self.is_null(), "dereferencing a null TaggedValue");
        // SAFETY: by contract
        unsafe { &mut *self.as_ptr() }
    }
}

// the all zero word: null pointer, tag 0
impl<T, const ALIGN: usize> Default for TaggedValue<T, ALIGN> {
    fn default() -> Self {
        Self::new_raw(0)
    }
}

impl<T, const ALIGN: usize> From<isize> for TaggedValue<T, ALIGN> {
    #[inline]
    fn from(number: isize) -> Self {
        Self::from_int(number)
    }
}

impl<T, const ALIGN: usize> PartialEq for TaggedValue<T, ALIGN> {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl<T, const ALIGN: usize> Eq for TaggedValue<T, ALIGN> {}

impl<T, const ALIGN: usize> Hash for TaggedValue<T, ALIGN> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.data.hash(state);
    }
}

impl<T, const ALIGN: usize> fmt::Debug for TaggedValue<T, ALIGN> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unpack() {
            Unpacked::Int(number) => f.debug_tuple("Int").field(&number).finish(),
            Unpacked::Pointer { ptr, tag } => {
                f.debug_tuple("Pointer").field(&ptr).field(&tag).finish()
            }
        }
    }
}
