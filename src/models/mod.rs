// src/models/mod.rs

pub mod dataset;
pub mod equipment;
pub mod user;

// Re-export so the types are reachable as crate::models::StructName
pub use dataset::*;
pub use equipment::*;
pub use user::*;
