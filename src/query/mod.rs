// src/query/mod.rs

pub mod engine;
pub mod stamp;

pub use engine::{Completion, FilterQueryEngine, LoadedView, QueryMachine, QuerySnapshot, QueryState};
pub use stamp::{Slot, Stamp, StampRegistry, Ticket};
