pub mod auth;
pub mod config;
pub mod controller;
pub mod details;
pub mod error;

pub use auth::*;
pub use config::*;
pub use controller::*;
pub use details::*;
pub use error::*;
