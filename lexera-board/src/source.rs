/// Data source the engine persists through.
///
/// The open board's view model gets one injected instead of reaching into a
/// global query cache. Implementations wrap whatever transport the host uses
/// (HTTP client, IPC bridge, in-memory fake in tests).
use std::future::Future;
use std::time::Duration;

use crate::types::{BoardSnapshot, CardPatch, CardPlacement, ListPatch, ListPlacement};

pub trait BoardDataSource {
    /// `GET board(id)`: lists and cards of one board.
    fn fetch_board(
        &self,
        board_id: &str,
    ) -> impl Future<Output = Result<BoardSnapshot, SourceError>>;

    /// `PATCH card(id)`. The returned placement is authoritative and may
    /// differ from the request.
    fn patch_card(
        &self,
        card_id: &str,
        patch: CardPatch,
    ) -> impl Future<Output = Result<CardPlacement, SourceError>>;

    /// `PATCH list(id)`.
    fn patch_list(
        &self,
        list_id: &str,
        patch: ListPatch,
    ) -> impl Future<Output = Result<ListPlacement, SourceError>>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(String),

    /// Validation or permission failure reported by the server.
    #[error("Rejected by server: {0}")]
    Rejected(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The server answered for a different entity than the one requested.
    #[error("Response for {got} does not match request for {expected}")]
    Mismatch { expected: String, got: String },
}
