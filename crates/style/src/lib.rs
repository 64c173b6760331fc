pub mod expr;
pub mod filters;
pub mod layers;
pub mod tiles;

pub use expr::*;
pub use filters::*;
pub use layers::*;
pub use tiles::*;
