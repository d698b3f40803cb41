/// One persistence round-trip, detached from the engine so the host's event
/// loop can run it while the user keeps dragging.
use std::sync::Arc;
use std::time::Duration;

use super::queue::PersistRequest;
use crate::source::{BoardDataSource, SourceError};
use crate::types::{EntityRef, Placement};

/// Owned, runnable persistence request.
pub struct PersistTask<D> {
    request: PersistRequest,
    source: Arc<D>,
    timeout: Duration,
}

/// Result of a [`PersistTask`], fed back through `BoardViewModel::complete`.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistOutcome {
    pub sequence: u64,
    pub entity: EntityRef,
    pub result: Result<Placement, SourceError>,
}

impl<D: BoardDataSource> PersistTask<D> {
    pub fn new(request: PersistRequest, source: Arc<D>, timeout: Duration) -> Self {
        Self {
            request,
            source,
            timeout,
        }
    }

    pub fn request(&self) -> &PersistRequest {
        &self.request
    }

    pub fn sequence(&self) -> u64 {
        self.request.sequence
    }

    /// Send the request, bounded by the timeout. Expiry is a failure.
    pub async fn run(self) -> PersistOutcome {
        let PersistTask {
            request,
            source,
            timeout,
        } = self;

        let call = send(&request, source.as_ref());

        let result = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!(
                    "[lexera.board.persist] #{} for {} timed out after {:?}",
                    request.sequence,
                    request.entity,
                    timeout
                );
                Err(SourceError::Timeout(timeout))
            }
        };

        PersistOutcome {
            sequence: request.sequence,
            entity: request.entity,
            result,
        }
    }
}

async fn send<D: BoardDataSource>(
    request: &PersistRequest,
    source: &D,
) -> Result<Placement, SourceError> {
    match &request.entity {
        EntityRef::Card(id) => {
            let placement = source.patch_card(id, request.card_patch()).await?;
            if &placement.id != id {
                return Err(SourceError::Mismatch {
                    expected: id.clone(),
                    got: placement.id,
                });
            }
            Ok(Placement::in_list(placement.list_id, placement.position))
        }
        EntityRef::List(id) => {
            let placement = source.patch_list(id, request.list_patch()).await?;
            if &placement.id != id {
                return Err(SourceError::Mismatch {
                    expected: id.clone(),
                    got: placement.id,
                });
            }
            Ok(Placement::at(placement.position))
        }
    }
}
