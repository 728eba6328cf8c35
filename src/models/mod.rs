pub mod incident;
pub mod filter;

pub use incident::*;
pub use filter::*;
