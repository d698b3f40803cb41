pub mod session;

pub use hit_test::{hit_test, BoardLayout, CardLayout, HoverTarget, ListLayout, Point, Rect};
pub use session::{CancelReason, DragPhase, DragSession};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DragError {
    #[error("No drag in progress")]
    NotDragging,

    #[error("Already dragging card {card_id}")]
    AlreadyDragging { card_id: String },

    #[error("Card {card_id} is still committing (sequence {sequence})")]
    CommitInProgress { card_id: String, sequence: u64 },

    #[error("Card not found: {0}")]
    UnknownCard(String),
}
