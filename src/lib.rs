// src/lib.rs
//! Client core for exploring equipment datasets held by the chemviz
//! backend: session handling, dataset catalog, filtered queries and
//! artifact export.

pub mod admin;
pub mod backend;
pub mod catalog;
pub mod charts;
pub mod config;
pub mod error;
pub mod explorer;
pub mod export;
pub mod gateway;
pub mod models;
pub mod query;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ClientError, ClientResult};
pub use explorer::{Explorer, ExplorerEvent};
