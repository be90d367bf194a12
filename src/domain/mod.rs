//! Domain Layer
//!
//! Ports the cache and warming scheduler depend on. Infrastructure adapters
//! in [`crate::adapters`] implement them.
//!
//! - **Ports** (`ports.rs`) - Trait abstractions for external dependencies

pub mod ports;

pub use ports::{column_str, DataRepository, Row};
