//! Configuration loading and management

mod loader;

pub use loader::{SteadfastConfig, SteadfastConfigFile};
