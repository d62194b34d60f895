//! Compile-time masks for packing tags into the low bits of an aligned address.
//!
//! A pointer to a `T` handed out by an allocator honoring an alignment of
//! `ALIGN` bytes always has its low `log2(ALIGN)` bits cleared. Those bits are
//! free storage:
//!
//! ```text
//! ALIGN = 8
//! ...pppppppp ppppp000   aligned address
//! ...pppppppp pppppttt   address | tag
//! ```
//!
//! All masks are associated consts of [`Align`], so a bad `ALIGN` is rejected
//! when the using type is monomorphized rather than at runtime.

use crate::TagError;

/// Zero sized carrier for the masks of one alignment.
pub struct Align<const ALIGN: usize>;

impl<const ALIGN: usize> Align<ALIGN> {
    /// Fails the build unless `ALIGN` is a power of two.
    pub const VALID: () =
        assert!(ALIGN.is_power_of_two(), "ALIGN must be a power of two");

    /// Low bits available for a tag.
    pub const TAG_MASK: usize = {
        let () = Self::VALID;
        ALIGN - 1
    };

    /// High bits holding the address.
    pub const POINTER_MASK: usize = !Self::TAG_MASK;

    /// Number of tag bits, `log2(ALIGN)`.
    pub const TAG_BITS: u32 = {
        let () = Self::VALID;
        ALIGN.trailing_zeros()
    };

    /// Fails the build unless `ALIGN` also leaves bit 0 free for a
    /// pointer/integer discriminant.
    pub const VALID_FOR_VALUE: () = {
        let () = Self::VALID;
        assert!(ALIGN > 1, "ALIGN must leave room for a discriminant bit");
    };

    /// Tag bits left once bit 0 is spent on the discriminant.
    pub const VALUE_TAG_MASK: usize = {
        let () = Self::VALID_FOR_VALUE;
        Self::TAG_MASK & !DISCRIMINANT_MASK
    };

    /// Exclusive upper bound of a tag stored next to a discriminant.
    pub const VALUE_TAG_LIMIT: usize = {
        let () = Self::VALID_FOR_VALUE;
        ALIGN >> 1
    };
}

/// Bit 0 of a word holding either a pointer or an integer.
pub const DISCRIMINANT_MASK: usize = 0b1;

/// Width of the native word in bits.
pub const WORD_BITS: u32 = usize::BITS;

#[inline]
pub const fn is_aligned(address: usize, align: usize) -> bool {
    debug_assert!(align.is_power_of_two());
    address & (align - 1) == 0
}

/// Address of `ptr` as a plain integer.
///
/// The provenance of `ptr` is exposed so [`pointer_at`] can hand it back.
#[inline]
pub fn address_of<T>(ptr: *mut T) -> usize {
    ptr.expose_provenance()
}

/// Rebuild a pointer from an address previously produced by [`address_of`].
#[inline]
pub fn pointer_at<T>(address: usize) -> *mut T {
    core::ptr::with_exposed_provenance_mut(address)
}

/// Checks that `address` leaves the low bits of `align` free.
pub fn check_address(address: usize, align: usize) -> Result<(), TagError> {
    if is_aligned(address, align) {
        Ok(())
    } else {
        Err(TagError::AlignmentViolation { address, align })
    }
}

/// Checks that `tag` lies in `0..limit`.
pub fn check_tag(tag: usize, limit: usize) -> Result<(), TagError> {
    if tag < limit {
        Ok(())
    } else {
        Err(TagError::RangeViolation {
            value: tag as i128,
            min: 0,
            max: limit as i128 - 1,
        })
    }
}

#[cfg(test)]
mod align_tests {
    use super::*;

    #[test]
    fn masks_for_eight() {
        assert_eq!(Align::<8>::TAG_MASK, 0b111);
        assert_eq!(Align::<8>::POINTER_MASK, !0b111);
        assert_eq!(Align::<8>::TAG_BITS, 3);
        assert_eq!(Align::<8>::VALUE_TAG_MASK, 0b110);
        assert_eq!(Align::<8>::VALUE_TAG_LIMIT, 4);
    }

    #[test]
    fn alignment_of_one_has_no_tag_bits() {
        assert_eq!(Align::<1>::TAG_MASK, 0);
        assert_eq!(Align::<1>::POINTER_MASK, usize::MAX);
        assert_eq!(Align::<1>::TAG_BITS, 0);
    }

    #[test]
    fn alignment_of_two_only_fits_the_discriminant() {
        assert_eq!(Align::<2>::VALUE_TAG_MASK, 0);
        assert_eq!(Align::<2>::VALUE_TAG_LIMIT, 1);
    }

    #[test]
    fn masks_partition_the_word() {
        assert_eq!(Align::<16>::TAG_MASK & Align::<16>::POINTER_MASK, 0);
        assert_eq!(Align::<16>::TAG_MASK | Align::<16>::POINTER_MASK, usize::MAX);
    }

    #[test]
    fn is_aligned_checks_low_bits() {
        assert!(is_aligned(0x1000, 8));
        assert!(is_aligned(0, 8));
        assert!(!is_aligned(0x1004, 8));
        assert!(is_aligned(0x1004, 4));
        assert!(is_aligned(0x1001, 1));
    }

    #[test]
    fn checks_report_violations() {
        assert_eq!(check_address(0x2000, 16), Ok(()));
        assert_eq!(
            check_address(0x2008, 16),
            Err(TagError::AlignmentViolation {
                address: 0x2008,
                align: 16
            })
        );
        assert_eq!(check_tag(3, 4), Ok(()));
        assert_eq!(
            check_tag(4, 4),
            Err(TagError::RangeViolation {
                value: 4,
                min: 0,
                max: 3
            })
        );
    }

    #[test]
    fn address_roundtrip_keeps_pointer() {
        let mut value = 17u64;
        let ptr: *mut u64 = &mut value;
        let address = address_of(ptr);
        let back: *mut u64 = pointer_at(address);
        assert_eq!(back, ptr);
        // SAFETY: back points at `value`, which is still alive
        assert_eq!(unsafe { *back }, 17);
    }
}
