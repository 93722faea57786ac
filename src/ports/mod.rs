//! Ports - Traits the core consumes.

pub mod decoder;
pub mod repository;
pub mod storage;
