pub mod collection;
pub mod key;

pub use collection::{InsertError, OrderedCollection, Positioned};
pub use key::PositionKey;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderingError {
    /// No key fits between the neighbours. Recovered by reindexing the list.
    #[error("No key fits between {lower:?} and {upper:?}, list requires a reflow")]
    RequiresReflow {
        lower: Option<String>,
        upper: Option<String>,
    },

    #[error("Malformed position key: {0:?}")]
    MalformedKey(String),

    #[error("Unknown neighbour: {0}")]
    UnknownNeighbour(String),

    #[error("Item not found: {0}")]
    NotFound(String),
}

impl OrderingError {
    pub fn requires_reflow(&self) -> bool {
        matches!(self, OrderingError::RequiresReflow { .. })
    }
}
