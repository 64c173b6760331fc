pub mod action_queue;
pub mod replay;
pub mod selection;

pub use action_queue::*;
pub use replay::*;
pub use selection::*;
