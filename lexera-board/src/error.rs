use crate::drag::DragError;
use crate::order::OrderingError;
use crate::source::SourceError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BoardError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Drag(#[from] DragError),

    #[error(transparent)]
    Ordering(#[from] OrderingError),

    #[error("Card not found: {0}")]
    UnknownCard(String),

    #[error("List not found: {0}")]
    UnknownList(String),

    #[error("No pending mutation with sequence {0}")]
    UnknownSequence(u64),
}
