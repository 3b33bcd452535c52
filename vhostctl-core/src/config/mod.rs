//! Configurator options and their loader

pub mod loader;
pub mod types;

pub use loader::OptionsLoader;
pub use types::{keys, Options};
