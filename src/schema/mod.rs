pub mod compiler;
pub mod types;

pub use compiler::*;
pub use types::*;
