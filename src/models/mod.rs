pub mod enums;
pub mod investigation;
pub mod portal;

pub use enums::*;
pub use investigation::*;
pub use portal::*;
