/// Drag gesture state machine.
///
/// Idle -> Dragging -> Committing -> Idle, or Dragging -> Idle on cancel.
/// A session in Committing holds the sequence of the mutation it produced
/// and only returns to Idle once that mutation is confirmed or failed, so a
/// second drag can never race an unsettled optimistic write.
use serde::Serialize;

use super::hit_test::HoverTarget;
use super::DragError;
use crate::order::PositionKey;

/// One drag gesture, from pointer-down to drop or cancel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DragSession {
    pub card_id: String,
    pub source_list_id: String,
    pub original_position: PositionKey,
    pub original_index: usize,
    /// Current tentative slot; `None` while outside every drop target.
    pub hover: Option<HoverTarget>,
}

impl DragSession {
    pub fn new(
        card_id: impl Into<String>,
        source_list_id: impl Into<String>,
        original_position: PositionKey,
        original_index: usize,
    ) -> Self {
        let source_list_id = source_list_id.into();
        Self {
            card_id: card_id.into(),
            hover: Some(HoverTarget {
                list_id: source_list_id.clone(),
                index: original_index,
            }),
            source_list_id,
            original_position,
            original_index,
        }
    }

    pub fn current_hover_list_id(&self) -> Option<&str> {
        self.hover.as_ref().map(|h| h.list_id.as_str())
    }

    pub fn current_hover_index(&self) -> Option<usize> {
        self.hover.as_ref().map(|h| h.index)
    }
}

/// Why a drag ended without a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CancelReason {
    /// Escape key or an explicit cancel callback.
    UserCancelled,
    /// Released outside every drop target.
    NoDropTarget,
    /// Released over a list that does not accept drops.
    InvalidDropTarget { list_id: String },
    /// The dragged card disappeared under a background refresh.
    CardRemoved,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum DragPhase {
    #[default]
    Idle,
    Dragging { session: DragSession },
    Committing { card_id: String, sequence: u64 },
}

impl DragPhase {
    pub fn is_idle(&self) -> bool {
        matches!(self, DragPhase::Idle)
    }

    pub fn session(&self) -> Option<&DragSession> {
        match self {
            DragPhase::Dragging { session } => Some(session),
            _ => None,
        }
    }

    /// Idle -> Dragging.
    pub fn start(&mut self, session: DragSession) -> Result<(), DragError> {
        match self {
            DragPhase::Idle => {
                *self = DragPhase::Dragging { session };
                Ok(())
            }
            DragPhase::Dragging { session: active } => Err(DragError::AlreadyDragging {
                card_id: active.card_id.clone(),
            }),
            DragPhase::Committing { card_id, sequence } => Err(DragError::CommitInProgress {
                card_id: card_id.clone(),
                sequence: *sequence,
            }),
        }
    }

    /// Dragging self-loop: record the tentative slot.
    pub fn hover(&mut self, target: Option<HoverTarget>) -> Result<(), DragError> {
        match self {
            DragPhase::Dragging { session } => {
                session.hover = target;
                Ok(())
            }
            _ => Err(DragError::NotDragging),
        }
    }

    /// Leave Dragging, handing the session to the caller to commit or drop.
    pub fn take(&mut self) -> Result<DragSession, DragError> {
        match std::mem::take(self) {
            DragPhase::Dragging { session } => Ok(session),
            other => {
                *self = other;
                Err(DragError::NotDragging)
            }
        }
    }

    /// Dragging -> Idle without side effects.
    pub fn cancel(&mut self) -> Option<DragSession> {
        self.take().ok()
    }

    /// -> Committing, waiting for `sequence` to settle.
    pub fn begin_commit(&mut self, card_id: impl Into<String>, sequence: u64) {
        *self = DragPhase::Committing {
            card_id: card_id.into(),
            sequence,
        };
    }

    /// Committing -> Idle once its mutation settled. Returns true when this
    /// sequence was the one being waited on.
    pub fn settle(&mut self, settled: u64) -> bool {
        match self {
            DragPhase::Committing { sequence, .. } if *sequence == settled => {
                *self = DragPhase::Idle;
                true
            }
            _ => false,
        }
    }
}
