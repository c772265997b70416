//! Record storage for the reference remote.

mod records;

pub use records::*;
