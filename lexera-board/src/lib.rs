//! Lexera board engine: fractional ordering of lists and cards, drag
//! sessions, and optimistic persistence with rollback.
pub mod board;
pub mod config;
pub mod drag;
pub mod error;
pub mod mutation;
pub mod notify;
pub mod order;
pub mod source;
pub mod types;
pub mod view_model;

pub use error::BoardError;
pub use source::{BoardDataSource, SourceError};
pub use view_model::{BoardEvent, BoardViewModel, DropOutcome};
