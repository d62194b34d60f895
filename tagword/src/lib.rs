mod align;
mod error;
mod probe;
mod tagged_pointer;
mod tagged_value;

pub use align::*;
pub use error::TagError;
pub use probe::*;
pub use tagged_pointer::TaggedPointer;
pub use tagged_value::{TaggedValue, Unpacked};
