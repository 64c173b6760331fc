pub mod error;
pub mod feature;
pub mod headless;
pub mod interaction;
pub mod map;
pub mod popup;
pub mod segment;
pub mod sync;

// Everything that mutates engine layers goes through this crate.
pub use error::*;
pub use feature::*;
pub use headless::*;
pub use interaction::*;
pub use map::*;
pub use popup::*;
pub use segment::*;
pub use sync::*;
