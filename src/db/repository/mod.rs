//! Repository layer: entity-scoped database operations.

mod admission;
mod investigation;

pub use admission::*;
pub use investigation::*;
