/// Per-board view model: owns the board graph, the drag state and the
/// optimistic mutation queue, and exposes the callbacks a renderer drives.
///
/// All local updates are synchronous. Persistence leaves through
/// [`BoardViewModel::dispatch`] as owned [`PersistTask`]s and comes back
/// through [`BoardViewModel::complete`]; [`BoardViewModel::flush`] does both
/// until the queue drains.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::board::Board;
use crate::config::EngineConfig;
use crate::drag::{
    hit_test, BoardLayout, CancelReason, DragError, DragPhase, DragSession, HoverTarget, Point,
};
use crate::error::BoardError;
use crate::mutation::{
    ConfirmOutcome, FailOutcome, MutationOrigin, OptimisticMutationQueue, PendingMutation,
    PersistOutcome, PersistTask,
};
use crate::notify::{Notification, Notifications};
use crate::order::PositionKey;
use crate::source::{BoardDataSource, SourceError};
use crate::types::{BoardSnapshot, CardView, EntityRef, GhostView, ListView, Placement, ViewState};

/// Change notifications for hosts that re-render or sync on events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BoardEvent {
    #[serde(rename_all = "camelCase")]
    Loaded { board_id: String, fingerprint: String },
    Committed {
        sequence: u64,
        entity: EntityRef,
        placement: Placement,
    },
    /// Server accepted the optimistic placement as sent.
    Confirmed { sequence: u64, entity: EntityRef },
    /// Server answered with a different placement; the board was adjusted.
    Reconciled {
        sequence: u64,
        entity: EntityRef,
        placement: Option<Placement>,
        correction: Option<u64>,
    },
    MoveFailed {
        sequence: u64,
        entity: EntityRef,
        error: String,
        /// Placement restored by the rollback, if one happened.
        restored: Option<Placement>,
    },
    #[serde(rename_all = "camelCase")]
    Reflowed {
        list_id: Option<String>,
        reassigned: usize,
    },
    PatchApplied { fingerprint: String, removed: usize },
    DragCancelled { reason: CancelReason },
}

/// Result of a drop or list move.
#[derive(Debug, Clone, PartialEq)]
pub enum DropOutcome {
    Committed { sequence: u64 },
    /// Dropped at its own slot.
    Unchanged,
    Cancelled(CancelReason),
}

/// Settle-epoch snapshot taken when a background fetch starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket {
    epoch: u64,
}

pub struct BoardViewModel<D> {
    source: Arc<D>,
    config: EngineConfig,
    board: Board,
    queue: OptimisticMutationQueue,
    drag: DragPhase,
    notifications: Notifications,
    events: broadcast::Sender<BoardEvent>,
    last_fingerprint: Option<String>,
}

impl<D: BoardDataSource> BoardViewModel<D> {
    pub fn new(source: Arc<D>, config: EngineConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            source,
            board: Board::empty("", config.max_key_length),
            queue: OptimisticMutationQueue::new(),
            drag: DragPhase::default(),
            notifications: Notifications::new(config.notification_limit),
            events,
            last_fingerprint: None,
            config,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.events.subscribe()
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn queue(&self) -> &OptimisticMutationQueue {
        &self.queue
    }

    pub fn drag_phase(&self) -> &DragPhase {
        &self.drag
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn notifications(&self) -> &Notifications {
        &self.notifications
    }

    pub fn dismiss_notification(&mut self, id: u64) -> bool {
        self.notifications.dismiss(id)
    }

    /// Drop notifications older than the configured lifetime. Hosts call
    /// this from their render tick.
    pub fn expire_notifications(&mut self) -> usize {
        let now_ms = chrono::Utc::now().timestamp_millis();
        self.notifications
            .prune_older_than(self.config.notification_ttl(), now_ms)
    }

    pub fn is_pending(&self, entity: &EntityRef) -> bool {
        self.queue.is_pending(entity)
    }

    // ── Loading and background patches ──────────────────────────────────────

    /// Fetch a board and replace all local state with it.
    pub async fn load_board(&mut self, board_id: &str) -> Result<(), BoardError> {
        let snapshot = self.source.fetch_board(board_id).await?;
        self.install(board_id, snapshot);
        Ok(())
    }

    /// Replace all local state with `snapshot`. Pending mutations and the
    /// drag are dropped.
    pub fn install(&mut self, board_id: &str, snapshot: BoardSnapshot) {
        let fingerprint = snapshot.fingerprint();
        self.board = Board::from_snapshot(board_id, snapshot, self.config.max_key_length);
        self.queue.reset();
        self.drag = DragPhase::Idle;
        self.notifications.clear();
        self.last_fingerprint = Some(fingerprint.clone());
        log::info!(
            "[lexera.board.load] Loaded board {} ({} lists, {} cards)",
            board_id,
            self.board.lists().len(),
            self.board.card_count()
        );
        self.normalize();
        self.emit(BoardEvent::Loaded {
            board_id: board_id.to_string(),
            fingerprint,
        });
    }

    /// Merge authoritative server data. Returns false when the snapshot is
    /// identical to the last one applied.
    pub fn apply_server_patch(&mut self, snapshot: BoardSnapshot) -> bool {
        self.merge(snapshot, &HashSet::new())
    }

    /// Mark the start of a background fetch. Entities settled after this
    /// point keep their local placement when the fetched snapshot arrives.
    pub fn begin_refresh(&self) -> RefreshTicket {
        RefreshTicket {
            epoch: self.queue.settle_epoch(),
        }
    }

    /// Apply a snapshot fetched after `ticket` was taken.
    pub fn apply_refresh(&mut self, ticket: RefreshTicket, snapshot: BoardSnapshot) -> bool {
        let protected = self.queue.settled_since(ticket.epoch);
        if !protected.is_empty() {
            log::debug!(
                "[lexera.board.refresh] {} entities settled during fetch keep local placement",
                protected.len()
            );
        }
        self.merge(snapshot, &protected)
    }

    /// Fetch the open board again and merge it.
    pub async fn refresh(&mut self) -> Result<bool, BoardError> {
        let ticket = self.begin_refresh();
        let board_id = self.board.id().to_string();
        let snapshot = self.source.fetch_board(&board_id).await?;
        Ok(self.apply_refresh(ticket, snapshot))
    }

    fn merge(&mut self, snapshot: BoardSnapshot, protected: &HashSet<EntityRef>) -> bool {
        let fingerprint = snapshot.fingerprint();
        if self.last_fingerprint.as_deref() == Some(fingerprint.as_str()) {
            log::debug!("[lexera.board.patch] Snapshot unchanged, skipping");
            return false;
        }

        let mut keep = self.queue.pending_entities();
        keep.extend(protected.iter().cloned());

        let incoming_lists: HashSet<String> =
            snapshot.lists.iter().map(|l| l.id.clone()).collect();
        let incoming_cards: HashSet<String> =
            snapshot.cards.iter().map(|c| c.id.clone()).collect();

        for record in snapshot.lists {
            let keep_position = keep.contains(&EntityRef::List(record.id.clone()));
            self.board.upsert_list(record, keep_position);
        }
        for record in snapshot.cards {
            let card_id = record.id.clone();
            let keep_placement = keep.contains(&EntityRef::Card(card_id.clone()));
            if let Err(e) = self.board.upsert_card(record, keep_placement) {
                log::warn!("[lexera.board.patch] Skipping card {}: {}", card_id, e);
            }
        }

        let mut removed = 0;
        let stale_cards: Vec<String> = self
            .board
            .card_ids()
            .into_iter()
            .filter(|id| {
                !incoming_cards.contains(id) && !keep.contains(&EntityRef::Card(id.clone()))
            })
            .collect();
        for card_id in stale_cards {
            if self.board.remove_card(&card_id).is_some() {
                removed += 1;
            }
        }

        let stale_lists: Vec<String> = self
            .board
            .lists()
            .iter()
            .filter(|list| !incoming_lists.contains(&list.id))
            .filter(|list| !keep.contains(&EntityRef::List(list.id.clone())))
            .filter(|list| {
                self.board
                    .cards_in(&list.id)
                    .map_or(true, |cards| {
                        cards
                            .iter()
                            .all(|c| !keep.contains(&EntityRef::Card(c.id.clone())))
                    })
            })
            .map(|list| list.id.clone())
            .collect();
        for list_id in stale_lists {
            removed += 1 + self.board.remove_list(&list_id).len();
        }

        self.cancel_drag_if_orphaned();
        self.last_fingerprint = Some(fingerprint.clone());
        log::debug!(
            "[lexera.board.patch] Applied snapshot {} ({} removed)",
            fingerprint,
            removed
        );
        self.normalize();
        self.emit(BoardEvent::PatchApplied {
            fingerprint,
            removed,
        });
        true
    }

    fn cancel_drag_if_orphaned(&mut self) {
        let orphaned = self
            .drag
            .session()
            .is_some_and(|session| self.board.card(&session.card_id).is_none());
        if orphaned {
            if let Some(session) = self.drag.cancel() {
                log::info!(
                    "[lexera.board.drag] Card {} removed during drag, cancelling",
                    session.card_id
                );
            }
            self.emit(BoardEvent::DragCancelled {
                reason: CancelReason::CardRemoved,
            });
        }
    }

    // ── Drag callbacks ──────────────────────────────────────────────────────

    pub fn on_drag_start(&mut self, card_id: &str) -> Result<(), BoardError> {
        let card = self
            .board
            .card(card_id)
            .ok_or_else(|| DragError::UnknownCard(card_id.to_string()))?;
        let index = self
            .board
            .index_of(&EntityRef::card(card_id))
            .ok_or_else(|| DragError::UnknownCard(card_id.to_string()))?;
        let session = DragSession::new(card_id, card.list_id.clone(), card.position.clone(), index);
        self.drag.start(session)?;
        log::debug!("[lexera.board.drag] Start {}", card_id);
        Ok(())
    }

    /// Explicit hover target, for renderers doing their own hit testing.
    pub fn on_drag_over(&mut self, list_id: &str, index: usize) -> Result<(), DragError> {
        self.drag.hover(Some(HoverTarget {
            list_id: list_id.to_string(),
            index,
        }))
    }

    /// Hit-test `point` against the rendered layout and record the result.
    pub fn on_pointer_move(
        &mut self,
        layout: &BoardLayout,
        point: Point,
    ) -> Result<Option<HoverTarget>, DragError> {
        let card_id = self
            .drag
            .session()
            .map(|session| session.card_id.clone())
            .ok_or(DragError::NotDragging)?;
        let target = hit_test(layout, point, &card_id);
        self.drag.hover(target.clone())?;
        Ok(target)
    }

    pub fn on_drag_cancel(&mut self) -> Result<DropOutcome, DragError> {
        let session = self.drag.take()?;
        log::debug!("[lexera.board.drag] Cancelled {}", session.card_id);
        Ok(DropOutcome::Cancelled(CancelReason::UserCancelled))
    }

    /// Drop the dragged card at its hover target.
    pub fn on_drag_end(&mut self) -> Result<DropOutcome, BoardError> {
        let session = self.drag.take()?;
        let Some(target) = session.hover else {
            return Ok(self.cancelled(&session.card_id, CancelReason::NoDropTarget));
        };

        let accepts_drop = self
            .board
            .list(&target.list_id)
            .is_some_and(|list| !list.locked);
        if !accepts_drop {
            return Ok(self.cancelled(
                &session.card_id,
                CancelReason::InvalidDropTarget {
                    list_id: target.list_id,
                },
            ));
        }

        let entity = EntityRef::card(session.card_id.clone());
        let (Some(current), Some(current_index)) =
            (self.board.placement_of(&entity), self.board.index_of(&entity))
        else {
            return Ok(self.cancelled(&session.card_id, CancelReason::CardRemoved));
        };
        // slots past the end mean "append"
        let slots = self
            .board
            .cards_in(&target.list_id)
            .map_or(0, |cards| cards.iter().filter(|c| c.id != session.card_id).count());
        let index = target.index.min(slots);
        if current.list_id.as_deref() == Some(target.list_id.as_str()) && current_index == index {
            log::debug!("[lexera.board.drag] {} dropped on its own slot", session.card_id);
            return Ok(DropOutcome::Unchanged);
        }

        let position = self.card_slot_key(&session.card_id, &target.list_id, index)?;
        let placement = Placement::in_list(target.list_id, position);
        let sequence = self.commit(entity, placement, MutationOrigin::Drag)?;
        self.drag.begin_commit(session.card_id, sequence);
        Ok(DropOutcome::Committed { sequence })
    }

    fn cancelled(&self, card_id: &str, reason: CancelReason) -> DropOutcome {
        log::debug!("[lexera.board.drag] {} not dropped: {:?}", card_id, reason);
        DropOutcome::Cancelled(reason)
    }

    /// Move a list to `index` (counted without the list itself).
    pub fn move_list(&mut self, list_id: &str, index: usize) -> Result<DropOutcome, BoardError> {
        let entity = EntityRef::list(list_id);
        let current = self
            .board
            .index_of(&entity)
            .ok_or_else(|| BoardError::UnknownList(list_id.to_string()))?;
        if current == index.min(self.board.lists().len() - 1) {
            return Ok(DropOutcome::Unchanged);
        }

        let position = match self.board.key_for_list_slot(list_id, index) {
            Err(BoardError::Ordering(e)) if e.requires_reflow() => {
                self.reflow_lists();
                self.board.key_for_list_slot(list_id, index)?
            }
            other => other?,
        };
        let sequence = self.commit(entity, Placement::at(position), MutationOrigin::ListReorder)?;
        Ok(DropOutcome::Committed { sequence })
    }

    fn card_slot_key(
        &mut self,
        card_id: &str,
        list_id: &str,
        index: usize,
    ) -> Result<PositionKey, BoardError> {
        match self.board.key_for_card_slot(card_id, list_id, index) {
            Err(BoardError::Ordering(e)) if e.requires_reflow() => {
                log::info!(
                    "[lexera.board.reflow] No key left in list {}, reindexing",
                    list_id
                );
                self.reflow_cards(list_id)?;
                self.board.key_for_card_slot(card_id, list_id, index)
            }
            other => other,
        }
    }

    fn commit(
        &mut self,
        entity: EntityRef,
        placement: Placement,
        origin: MutationOrigin,
    ) -> Result<u64, BoardError> {
        let sequence = self
            .queue
            .commit(&mut self.board, entity.clone(), placement, origin)?;
        let placement = self
            .board
            .placement_of(&entity)
            .ok_or_else(|| BoardError::UnknownCard(entity.id().to_string()))?;
        self.emit(BoardEvent::Committed {
            sequence,
            entity,
            placement,
        });
        Ok(sequence)
    }

    // ── Reflow ──────────────────────────────────────────────────────────────

    /// Reindex the cards of `list_id` and queue every changed key.
    pub fn reflow_cards(&mut self, list_id: &str) -> Result<usize, BoardError> {
        let before: HashMap<String, PositionKey> = self
            .board
            .cards_in(list_id)
            .ok_or_else(|| BoardError::UnknownList(list_id.to_string()))?
            .iter()
            .map(|card| (card.id.clone(), card.position.clone()))
            .collect();
        let assigned = self.board.reindex_cards(list_id)?;
        let mut reassigned = 0;
        for (card_id, position) in assigned {
            let Some(old) = before.get(&card_id) else { continue };
            if *old == position {
                continue;
            }
            self.queue.record_applied(
                EntityRef::Card(card_id),
                Placement::in_list(list_id, old.clone()),
                Placement::in_list(list_id, position),
                MutationOrigin::Reflow,
            );
            reassigned += 1;
        }
        log::info!(
            "[lexera.board.reflow] List {}: {} keys reassigned",
            list_id,
            reassigned
        );
        self.emit(BoardEvent::Reflowed {
            list_id: Some(list_id.to_string()),
            reassigned,
        });
        Ok(reassigned)
    }

    /// Reindex the board's list order and queue every changed key.
    pub fn reflow_lists(&mut self) -> usize {
        let before: HashMap<String, PositionKey> = self
            .board
            .lists()
            .iter()
            .map(|list| (list.id.clone(), list.position.clone()))
            .collect();
        let mut reassigned = 0;
        for (list_id, position) in self.board.reindex_lists() {
            let Some(old) = before.get(&list_id) else { continue };
            if *old == position {
                continue;
            }
            self.queue.record_applied(
                EntityRef::List(list_id),
                Placement::at(old.clone()),
                Placement::at(position),
                MutationOrigin::Reflow,
            );
            reassigned += 1;
        }
        log::info!("[lexera.board.reflow] List order: {} keys reassigned", reassigned);
        self.emit(BoardEvent::Reflowed {
            list_id: None,
            reassigned,
        });
        reassigned
    }

    /// Reflow every collection with duplicate, malformed or overlong keys.
    fn normalize(&mut self) {
        for list_id in self.board.lists_needing_reflow() {
            if let Err(e) = self.reflow_cards(&list_id) {
                log::warn!("[lexera.board.reflow] List {} not reindexed: {}", list_id, e);
            }
        }
        if self.board.list_order_needs_reflow() {
            self.reflow_lists();
        }
    }

    // ── Persistence ─────────────────────────────────────────────────────────

    /// Hand out every request that may be sent now.
    pub fn dispatch(&mut self) -> Vec<PersistTask<D>> {
        let timeout = self.config.persist_timeout();
        self.queue
            .dispatch_ready()
            .into_iter()
            .map(|request| PersistTask::new(request, Arc::clone(&self.source), timeout))
            .collect()
    }

    /// Feed a finished [`PersistTask`] back in.
    pub fn complete(&mut self, outcome: PersistOutcome) -> Result<(), BoardError> {
        let PersistOutcome {
            sequence,
            entity,
            result,
        } = outcome;
        let settled = match result {
            Ok(authoritative) => self.confirm(sequence, authoritative),
            Err(error) => self.fail(sequence, error),
        };
        match settled {
            Err(BoardError::UnknownSequence(_)) => {
                log::debug!(
                    "[lexera.board.queue] Ignoring outcome of #{} for {}, no longer pending",
                    sequence,
                    entity
                );
            }
            Err(e) => return Err(e),
            Ok(()) => {}
        }
        self.drag.settle(sequence);
        self.normalize();
        Ok(())
    }

    fn confirm(&mut self, sequence: u64, authoritative: Placement) -> Result<(), BoardError> {
        let (mutation, outcome) = self.queue.confirm(&mut self.board, sequence, authoritative)?;
        let entity = mutation.entity;
        let event = match outcome {
            ConfirmOutcome::Unchanged | ConfirmOutcome::Superseded { .. } => {
                BoardEvent::Confirmed { sequence, entity }
            }
            ConfirmOutcome::Adopted { placement } => BoardEvent::Reconciled {
                sequence,
                entity,
                placement: Some(placement),
                correction: None,
            },
            ConfirmOutcome::Corrected {
                placement,
                correction,
            } => BoardEvent::Reconciled {
                sequence,
                entity,
                placement: Some(placement),
                correction: Some(correction),
            },
            ConfirmOutcome::KeptLocal => BoardEvent::Reconciled {
                sequence,
                entity,
                placement: None,
                correction: None,
            },
        };
        self.emit(event);
        Ok(())
    }

    fn fail(&mut self, sequence: u64, error: SourceError) -> Result<(), BoardError> {
        let (mutation, outcome) = self.queue.fail(&mut self.board, sequence)?;
        let restored = match &outcome {
            FailOutcome::RolledBack { placement }
            | FailOutcome::RolledBackAfter { placement, .. } => Some(placement.clone()),
            FailOutcome::Superseded { .. }
            | FailOutcome::KeptLocal { .. }
            | FailOutcome::NotRestored => None,
        };
        log::warn!(
            "[lexera.board.queue] #{} for {} failed: {} ({:?})",
            sequence,
            mutation.entity,
            error,
            outcome
        );
        if user_initiated(&mutation) {
            let message = match restored {
                Some(_) => format!("Move of {} not saved, reverted: {}", mutation.entity, error),
                None => format!("Move of {} not saved: {}", mutation.entity, error),
            };
            self.notifications.push(mutation.entity.clone(), message);
        }
        self.emit(BoardEvent::MoveFailed {
            sequence,
            entity: mutation.entity,
            error: error.to_string(),
            restored,
        });
        Ok(())
    }

    /// Dispatch and complete until nothing is pending.
    pub async fn flush(&mut self) -> Result<(), BoardError> {
        loop {
            let tasks = self.dispatch();
            if tasks.is_empty() {
                return Ok(());
            }
            let outcomes = join_all(tasks.into_iter().map(PersistTask::run)).await;
            for outcome in outcomes {
                self.complete(outcome)?;
            }
        }
    }

    // ── Rendering ───────────────────────────────────────────────────────────

    pub fn get_view_state(&self) -> ViewState {
        let pending = self.queue.pending_entities();
        let lists = self
            .board
            .lists()
            .iter()
            .map(|list| ListView {
                id: list.id.clone(),
                name: list.name.clone(),
                locked: list.locked,
                is_pending: pending.contains(&EntityRef::List(list.id.clone())),
                cards: self
                    .board
                    .cards_in(&list.id)
                    .map(|cards| {
                        cards
                            .iter()
                            .map(|card| CardView {
                                id: card.id.clone(),
                                payload: card.payload.clone(),
                                is_pending: pending.contains(&EntityRef::Card(card.id.clone())),
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            })
            .collect();

        let ghost = self.drag.session().and_then(|session| {
            session.hover.as_ref().map(|hover| GhostView {
                card_id: session.card_id.clone(),
                list_id: hover.list_id.clone(),
                index: hover.index,
            })
        });

        ViewState {
            board_id: self.board.id().to_string(),
            lists,
            ghost,
            notifications: self.notifications.to_vec(),
        }
    }

    pub fn pending_mutations(&self) -> Vec<&PendingMutation> {
        self.queue.iter().collect()
    }

    pub fn latest_notification(&self) -> Option<&Notification> {
        self.notifications.iter().last()
    }

    fn emit(&self, event: BoardEvent) {
        if self.events.send(event).is_err() {
            log::debug!("[lexera.board.events] No subscribers");
        }
    }
}

fn user_initiated(mutation: &PendingMutation) -> bool {
    matches!(
        mutation.origin,
        MutationOrigin::Drag | MutationOrigin::ListReorder
    )
}
