//! Local adapters for monolith deployment.

pub mod fs;
pub mod http;
pub mod memory;

pub use fs::FsStorage;
pub use http::{router, AppState};
pub use memory::{InMemoryJobRepository, MemoryStorage};
