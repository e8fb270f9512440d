pub mod config;
pub mod detection;
pub mod error;
pub mod gate;
pub mod io;
pub mod paths;
pub mod rubric;
pub mod scope_config;
pub mod types;

pub use error::{Result, SpecKitError};
