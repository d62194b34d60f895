use std::fmt;

/// A violated packing precondition, reported by the `try_*` constructors
/// and setters. The plain setters treat the same conditions as programmer
/// errors and only check them with `debug_assert!`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagError {
    /// The address has bits set where the tag has to live.
    AlignmentViolation { address: usize, align: usize },
    /// A tag or integer does not fit the bits reserved for it.
    RangeViolation { value: i128, min: i128, max: i128 },
}

impl fmt::Display for TagError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagError::AlignmentViolation { address, align } => write!(
                f,
                "address {address:#x} is not aligned to {align} bytes"
            ),
            TagError::RangeViolation { value, min, max } => {
                write!(f, "{value} is outside of {min}..={max}")
            }
        }
    }
}

impl std::error::Error for TagError {}
