pub mod error;
pub mod presets;
pub mod render;
pub mod state;
pub mod store;
pub mod symbology;

pub use error::*;
pub use state::*;
pub use store::*;
pub use symbology::*;
