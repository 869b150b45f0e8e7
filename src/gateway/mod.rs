//! Gateway construction and the public request surface

mod builder;
mod facade;
mod prompts;

pub use builder::{DEFAULT_MODEL, Sanad, SanadBuilder};
pub use facade::Gateway;
