//! Infrastructure Adapters
//!
//! Implementations of the domain ports.
//!
//! ```text
//! ┌───────────────────────────────┐
//! │ Ports: DataRepository         │
//! └───────────────┬───────────────┘
//!                 ▼
//! ┌───────────────────────────────┐
//! │ Adapters: InMemoryRepository  │
//! └───────────────────────────────┘
//! ```
//!
//! The distributed store port and its in-memory adapter live in
//! [`crate::cache`] next to the facade that drives them.

mod memory;

pub use memory::InMemoryRepository;
