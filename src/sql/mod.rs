//! Safe SQL builder: identifiers from the compiled schema only, values as
//! bound parameters.

mod builder;
pub mod filter;

pub use builder::*;
