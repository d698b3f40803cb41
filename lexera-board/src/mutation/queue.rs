/// Optimistic mutation log.
///
/// Every local reorder is applied to the [`Board`] before any I/O and
/// recorded here with its rollback baseline. Requests leave the queue in
/// strict per-entity FIFO order: at most one in flight per entity, always
/// the oldest. Settling (confirm or fail) reconciles the board against the
/// server's answer without ever clobbering a newer local intent.
use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use uuid::Uuid;

use crate::board::Board;
use crate::error::BoardError;
use crate::types::{CardPatch, EntityRef, ListPatch, Placement};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationStatus {
    Queued,
    InFlight,
}

/// What produced a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationOrigin {
    Drag,
    ListReorder,
    /// Key reassigned by a reindex of its collection.
    Reflow,
    /// Local fix-up after the server answered with a placement that did
    /// not fit the local order.
    Correction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMutation {
    pub id: Uuid,
    pub sequence: u64,
    pub entity: EntityRef,
    pub optimistic: Placement,
    /// Placement to restore if this mutation fails and nothing newer is
    /// pending for the entity.
    pub baseline: Placement,
    pub status: MutationStatus,
    pub origin: MutationOrigin,
}

/// One persistence call ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistRequest {
    pub sequence: u64,
    pub entity: EntityRef,
    pub placement: Placement,
    /// Set for cards whose list changed relative to the baseline.
    pub moved_to_list: Option<String>,
}

impl PersistRequest {
    pub fn card_patch(&self) -> CardPatch {
        CardPatch {
            list_id: self.moved_to_list.clone(),
            position: self.placement.position.clone(),
        }
    }

    pub fn list_patch(&self) -> ListPatch {
        ListPatch {
            position: self.placement.position.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmOutcome {
    /// A newer mutation is pending; local state untouched, its baseline
    /// now holds the confirmed placement.
    Superseded { newer: u64 },
    /// Server agreed with the optimistic placement.
    Unchanged,
    /// Server placement differed and was adopted as-is.
    Adopted { placement: Placement },
    /// Server placement did not fit the local order; a fresh key was
    /// applied and a correction mutation enqueued.
    Corrected { placement: Placement, correction: u64 },
    /// Local placement kept: the server named a list this board does not
    /// know, or rewrote a correction again.
    KeptLocal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailOutcome {
    /// Baseline restored exactly.
    RolledBack { placement: Placement },
    /// Baseline key collided with a sibling; placed after it instead.
    RolledBackAfter {
        placement: Placement,
        correction: Option<u64>,
    },
    /// A newer mutation is pending and inherited the baseline.
    Superseded { newer: u64 },
    /// Engine-originated key (reflow or correction) kept locally; its
    /// baseline is the unusable key it replaced.
    KeptLocal { placement: Placement },
    /// Entity or its baseline list is gone; nothing to restore.
    NotRestored,
}

#[derive(Debug, Default)]
pub struct OptimisticMutationQueue {
    mutations: BTreeMap<u64, PendingMutation>,
    next_sequence: u64,
    settle_epoch: u64,
    settled_at: HashMap<EntityRef, u64>,
}

impl OptimisticMutationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `placement` to the board and record it. A card placement
    /// without a list stays in the card's current list.
    pub fn commit(
        &mut self,
        board: &mut Board,
        entity: EntityRef,
        placement: Placement,
        origin: MutationOrigin,
    ) -> Result<u64, BoardError> {
        let baseline = board
            .placement_of(&entity)
            .ok_or_else(|| unknown_entity(&entity))?;
        board.apply_placement(&entity, &placement)?;
        let optimistic = board
            .placement_of(&entity)
            .ok_or_else(|| unknown_entity(&entity))?;
        Ok(self.record_applied(entity, baseline, optimistic, origin))
    }

    /// Record a placement the caller already applied to the board.
    pub fn record_applied(
        &mut self,
        entity: EntityRef,
        baseline: Placement,
        optimistic: Placement,
        origin: MutationOrigin,
    ) -> u64 {
        self.next_sequence += 1;
        let sequence = self.next_sequence;
        log::debug!(
            "[lexera.board.queue] #{} {:?} {} -> {}",
            sequence,
            origin,
            entity,
            optimistic.position
        );
        self.mutations.insert(
            sequence,
            PendingMutation {
                id: Uuid::new_v4(),
                sequence,
                entity,
                optimistic,
                baseline,
                status: MutationStatus::Queued,
                origin,
            },
        );
        sequence
    }

    /// Oldest queued mutation of every entity with nothing in flight.
    pub fn dispatch_ready(&mut self) -> Vec<PersistRequest> {
        let mut seen: HashSet<EntityRef> = HashSet::new();
        let mut ready = Vec::new();
        for mutation in self.mutations.values_mut() {
            if !seen.insert(mutation.entity.clone()) {
                continue;
            }
            if mutation.status == MutationStatus::Queued {
                mutation.status = MutationStatus::InFlight;
                let moved_to_list = match (&mutation.optimistic.list_id, &mutation.baseline.list_id)
                {
                    (Some(to), Some(from)) if to != from => Some(to.clone()),
                    _ => None,
                };
                ready.push(PersistRequest {
                    sequence: mutation.sequence,
                    entity: mutation.entity.clone(),
                    placement: mutation.optimistic.clone(),
                    moved_to_list,
                });
            }
        }
        ready
    }

    /// Settle `sequence` as accepted with the server's `authoritative`
    /// placement and reconcile the board.
    pub fn confirm(
        &mut self,
        board: &mut Board,
        sequence: u64,
        authoritative: Placement,
    ) -> Result<(PendingMutation, ConfirmOutcome), BoardError> {
        let mutation = self.settle(sequence)?;
        let entity = mutation.entity.clone();
        let authoritative = match (&entity, authoritative.list_id) {
            (EntityRef::Card(_), None) => Placement {
                list_id: mutation.optimistic.list_id.clone(),
                position: authoritative.position,
            },
            (_, list_id) => Placement {
                list_id,
                position: authoritative.position,
            },
        };

        if let Some(newer) = self.oldest_for_mut(&entity) {
            newer.baseline = authoritative;
            let newer = newer.sequence;
            log::debug!(
                "[lexera.board.queue] #{} confirmed under newer #{} for {}",
                sequence,
                newer,
                entity
            );
            return Ok((mutation, ConfirmOutcome::Superseded { newer }));
        }

        if authoritative == mutation.optimistic {
            return Ok((mutation, ConfirmOutcome::Unchanged));
        }
        if !board.contains(&entity) {
            return Ok((mutation, ConfirmOutcome::KeptLocal));
        }

        // a correction that is itself rewritten keeps the local order
        let allow_correction = mutation.origin != MutationOrigin::Correction;
        let outcome = self.reconcile(board, &entity, authoritative, allow_correction)?;
        Ok((mutation, outcome))
    }

    /// Settle `sequence` as failed and roll back if nothing newer is
    /// pending for the entity.
    pub fn fail(
        &mut self,
        board: &mut Board,
        sequence: u64,
    ) -> Result<(PendingMutation, FailOutcome), BoardError> {
        let mutation = self.settle(sequence)?;
        let entity = mutation.entity.clone();

        if let Some(newer) = self.oldest_for_mut(&entity) {
            newer.baseline = mutation.baseline.clone();
            let newer = newer.sequence;
            log::debug!(
                "[lexera.board.queue] Superseded rollback of #{} for {}, #{} inherits baseline",
                sequence,
                entity,
                newer
            );
            return Ok((mutation, FailOutcome::Superseded { newer }));
        }

        if matches!(
            mutation.origin,
            MutationOrigin::Reflow | MutationOrigin::Correction
        ) {
            if let Some(placement) = board.placement_of(&entity) {
                log::debug!(
                    "[lexera.board.queue] Keeping local key of {} after failed #{}",
                    entity,
                    sequence
                );
                return Ok((mutation, FailOutcome::KeptLocal { placement }));
            }
        }

        let baseline = mutation.baseline.clone();
        let baseline_list_known = match &baseline.list_id {
            Some(list_id) => board.cards_in(list_id).is_some(),
            None => true,
        };
        if !board.contains(&entity) || !baseline_list_known {
            log::warn!(
                "[lexera.board.queue] Cannot restore {} after failed #{}",
                entity,
                sequence
            );
            return Ok((mutation, FailOutcome::NotRestored));
        }

        if board.collision(&entity, &baseline).is_none() {
            board.apply_placement(&entity, &baseline)?;
            return Ok((mutation, FailOutcome::RolledBack { placement: baseline }));
        }

        let placement = match board.key_after(&entity, &baseline) {
            Ok(position) => Placement {
                list_id: baseline.list_id.clone(),
                position,
            },
            Err(e) => {
                // duplicate key stays until the collection is reflowed
                log::debug!("[lexera.board.queue] No key after collision: {}", e);
                baseline.clone()
            }
        };
        board.apply_placement(&entity, &placement)?;
        let correction = if placement != baseline {
            Some(self.record_applied(
                entity,
                baseline,
                placement.clone(),
                MutationOrigin::Correction,
            ))
        } else {
            None
        };
        Ok((
            mutation,
            FailOutcome::RolledBackAfter {
                placement,
                correction,
            },
        ))
    }

    fn reconcile(
        &mut self,
        board: &mut Board,
        entity: &EntityRef,
        authoritative: Placement,
        allow_correction: bool,
    ) -> Result<ConfirmOutcome, BoardError> {
        let current = board
            .placement_of(entity)
            .ok_or_else(|| unknown_entity(entity))?;

        let changes_list = matches!(entity, EntityRef::Card(_))
            && authoritative.list_id != current.list_id;

        if changes_list {
            let target_known = authoritative
                .list_id
                .as_deref()
                .is_some_and(|list_id| board.cards_in(list_id).is_some());
            if !target_known {
                log::warn!(
                    "[lexera.board.queue] Server placed {} in unknown list {:?}, keeping local placement",
                    entity,
                    authoritative.list_id
                );
                return Ok(ConfirmOutcome::KeptLocal);
            }
            if board.collision(entity, &authoritative).is_none() {
                board.apply_placement(entity, &authoritative)?;
                return Ok(ConfirmOutcome::Adopted {
                    placement: authoritative,
                });
            }
            let placement = match board.key_after(entity, &authoritative) {
                Ok(position) => Placement {
                    list_id: authoritative.list_id.clone(),
                    position,
                },
                Err(_) => authoritative.clone(),
            };
            board.apply_placement(entity, &placement)?;
            return Ok(self.corrected(entity, authoritative, placement, allow_correction));
        }

        if board.fits_current_slot(entity, &authoritative.position) {
            board.apply_placement(entity, &authoritative)?;
            return Ok(ConfirmOutcome::Adopted {
                placement: authoritative,
            });
        }

        let position = match board.key_for_current_slot(entity) {
            Ok(position) => position,
            Err(e) => {
                log::debug!("[lexera.board.queue] Keeping local key for {}: {}", entity, e);
                current.position.clone()
            }
        };
        let placement = Placement {
            list_id: current.list_id.clone(),
            position,
        };
        board.apply_placement(entity, &placement)?;
        Ok(self.corrected(entity, authoritative, placement, allow_correction))
    }

    fn corrected(
        &mut self,
        entity: &EntityRef,
        authoritative: Placement,
        placement: Placement,
        allow_correction: bool,
    ) -> ConfirmOutcome {
        if placement == authoritative {
            return ConfirmOutcome::Adopted { placement };
        }
        if !allow_correction {
            log::debug!(
                "[lexera.board.queue] Not correcting {} again, local placement kept",
                entity
            );
            return ConfirmOutcome::KeptLocal;
        }
        let correction = self.record_applied(
            entity.clone(),
            authoritative,
            placement.clone(),
            MutationOrigin::Correction,
        );
        ConfirmOutcome::Corrected {
            placement,
            correction,
        }
    }

    fn settle(&mut self, sequence: u64) -> Result<PendingMutation, BoardError> {
        let mutation = self
            .mutations
            .remove(&sequence)
            .ok_or(BoardError::UnknownSequence(sequence))?;
        self.settle_epoch += 1;
        self.settled_at
            .insert(mutation.entity.clone(), self.settle_epoch);
        Ok(mutation)
    }

    fn oldest_for_mut(&mut self, entity: &EntityRef) -> Option<&mut PendingMutation> {
        self.mutations.values_mut().find(|m| &m.entity == entity)
    }

    pub fn get(&self, sequence: u64) -> Option<&PendingMutation> {
        self.mutations.get(&sequence)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingMutation> {
        self.mutations.values()
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.mutations
            .values()
            .filter(|m| m.status == MutationStatus::InFlight)
            .count()
    }

    pub fn is_pending(&self, entity: &EntityRef) -> bool {
        self.mutations.values().any(|m| &m.entity == entity)
    }

    pub fn pending_entities(&self) -> HashSet<EntityRef> {
        self.mutations.values().map(|m| m.entity.clone()).collect()
    }

    /// Counter bumped on every confirm or fail.
    pub fn settle_epoch(&self) -> u64 {
        self.settle_epoch
    }

    /// Entities settled after `epoch` was observed.
    pub fn settled_since(&self, epoch: u64) -> HashSet<EntityRef> {
        self.settled_at
            .iter()
            .filter(|(_, at)| **at > epoch)
            .map(|(entity, _)| entity.clone())
            .collect()
    }

    /// Forget every mutation; sequences keep increasing.
    pub fn reset(&mut self) {
        self.mutations.clear();
        self.settled_at.clear();
    }
}

fn unknown_entity(entity: &EntityRef) -> BoardError {
    match entity {
        EntityRef::Card(id) => BoardError::UnknownCard(id.clone()),
        EntityRef::List(id) => BoardError::UnknownList(id.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::tests::{card, ids, list, pos, two_list_snapshot};
    use crate::order::key::DEFAULT_MAX_KEY_LEN;
    use crate::types::BoardSnapshot;

    fn board() -> Board {
        Board::from_snapshot("b", two_list_snapshot(), DEFAULT_MAX_KEY_LEN)
    }

    fn move_p1_to_b(queue: &mut OptimisticMutationQueue, board: &mut Board) -> u64 {
        queue
            .commit(
                board,
                EntityRef::card("P1"),
                Placement::in_list("B", pos("V")),
                MutationOrigin::Drag,
            )
            .unwrap()
    }

    #[test]
    fn test_commit_applies_before_dispatch() {
        let mut board = board();
        let mut queue = OptimisticMutationQueue::new();
        let seq = move_p1_to_b(&mut queue, &mut board);
        assert_eq!(ids(&board, "B"), vec!["P1"]);
        assert!(queue.is_pending(&EntityRef::card("P1")));
        let m = queue.get(seq).unwrap();
        assert_eq!(m.baseline, Placement::in_list("A", pos("a")));
        assert_eq!(m.status, MutationStatus::Queued);
    }

    #[test]
    fn test_dispatch_is_per_entity_fifo() {
        let mut board = board();
        let mut queue = OptimisticMutationQueue::new();
        let first = move_p1_to_b(&mut queue, &mut board);
        let second = queue
            .commit(
                &mut board,
                EntityRef::card("P1"),
                Placement::in_list("A", pos("c")),
                MutationOrigin::Drag,
            )
            .unwrap();
        let other = queue
            .commit(
                &mut board,
                EntityRef::card("P2"),
                Placement::in_list("A", pos("0V")),
                MutationOrigin::Drag,
            )
            .unwrap();

        let ready = queue.dispatch_ready();
        let seqs: Vec<u64> = ready.iter().map(|r| r.sequence).collect();
        assert_eq!(seqs, vec![first, other]);
        assert_eq!(ready[0].moved_to_list.as_deref(), Some("B"));
        assert!(ready[1].moved_to_list.is_none());
        // nothing new until the in-flight ones settle
        assert!(queue.dispatch_ready().is_empty());

        let authoritative = Placement::in_list("B", pos("V"));
        queue.confirm(&mut board, first, authoritative).unwrap();
        let ready = queue.dispatch_ready();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].sequence, second);
    }

    #[test]
    fn test_confirm_same_placement_changes_nothing() {
        let mut board = board();
        let mut queue = OptimisticMutationQueue::new();
        let seq = move_p1_to_b(&mut queue, &mut board);
        queue.dispatch_ready();
        let (_, outcome) = queue
            .confirm(&mut board, seq, Placement::in_list("B", pos("V")))
            .unwrap();
        assert_eq!(outcome, ConfirmOutcome::Unchanged);
        assert_eq!(board.card("P1").unwrap().position, pos("V"));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_confirm_without_list_uses_optimistic_list() {
        let mut board = board();
        let mut queue = OptimisticMutationQueue::new();
        let seq = move_p1_to_b(&mut queue, &mut board);
        let (_, outcome) = queue.confirm(&mut board, seq, Placement::at(pos("V"))).unwrap();
        assert_eq!(outcome, ConfirmOutcome::Unchanged);
    }

    #[test]
    fn test_confirm_adopts_fitting_server_key() {
        let mut board = board();
        let mut queue = OptimisticMutationQueue::new();
        let seq = move_p1_to_b(&mut queue, &mut board);
        let (_, outcome) = queue
            .confirm(&mut board, seq, Placement::in_list("B", pos("m")))
            .unwrap();
        assert_eq!(
            outcome,
            ConfirmOutcome::Adopted {
                placement: Placement::in_list("B", pos("m"))
            }
        );
        assert_eq!(board.card("P1").unwrap().position, pos("m"));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_confirm_out_of_order_key_enqueues_correction() {
        let snap = BoardSnapshot {
            lists: vec![list("A", "a")],
            cards: vec![card("P1", "A", "a"), card("P2", "A", "b"), card("P3", "A", "c")],
        };
        let mut board = Board::from_snapshot("b", snap, DEFAULT_MAX_KEY_LEN);
        let mut queue = OptimisticMutationQueue::new();
        // move P3 to the top
        let key = board.key_for_card_slot("P3", "A", 0).unwrap();
        let seq = queue
            .commit(
                &mut board,
                EntityRef::card("P3"),
                Placement::in_list("A", key),
                MutationOrigin::Drag,
            )
            .unwrap();
        assert_eq!(ids(&board, "A"), vec!["P3", "P1", "P2"]);

        // server answers with a key that sorts after P2
        let (_, outcome) = queue
            .confirm(&mut board, seq, Placement::in_list("A", pos("bV")))
            .unwrap();
        let ConfirmOutcome::Corrected { correction, placement } = outcome else {
            panic!("expected correction, got {:?}", outcome);
        };
        assert_eq!(ids(&board, "A"), vec!["P3", "P1", "P2"]);
        assert!(placement.position < pos("a"));
        let m = queue.get(correction).unwrap();
        assert_eq!(m.origin, MutationOrigin::Correction);
        assert_eq!(m.baseline, Placement::in_list("A", pos("bV")));
    }

    #[test]
    fn test_confirm_into_other_list_is_accepted() {
        let mut board = board();
        let mut queue = OptimisticMutationQueue::new();
        let seq = move_p1_to_b(&mut queue, &mut board);
        let (_, outcome) = queue
            .confirm(&mut board, seq, Placement::in_list("A", pos("c")))
            .unwrap();
        assert!(matches!(outcome, ConfirmOutcome::Adopted { .. }));
        assert_eq!(ids(&board, "A"), vec!["P2", "P1"]);
        assert!(ids(&board, "B").is_empty());
    }

    #[test]
    fn test_confirm_into_unknown_list_keeps_local() {
        let mut board = board();
        let mut queue = OptimisticMutationQueue::new();
        let seq = move_p1_to_b(&mut queue, &mut board);
        let (_, outcome) = queue
            .confirm(&mut board, seq, Placement::in_list("Z", pos("c")))
            .unwrap();
        assert_eq!(outcome, ConfirmOutcome::KeptLocal);
        assert_eq!(ids(&board, "B"), vec!["P1"]);
    }

    #[test]
    fn test_confirm_under_newer_mutation_leaves_local_state() {
        let mut board = board();
        let mut queue = OptimisticMutationQueue::new();
        let first = move_p1_to_b(&mut queue, &mut board);
        let second = queue
            .commit(
                &mut board,
                EntityRef::card("P1"),
                Placement::in_list("A", pos("c")),
                MutationOrigin::Drag,
            )
            .unwrap();
        let (_, outcome) = queue
            .confirm(&mut board, first, Placement::in_list("B", pos("W")))
            .unwrap();
        assert_eq!(outcome, ConfirmOutcome::Superseded { newer: second });
        assert_eq!(ids(&board, "A"), vec!["P2", "P1"]);
        assert_eq!(
            queue.get(second).unwrap().baseline,
            Placement::in_list("B", pos("W"))
        );
    }

    #[test]
    fn test_fail_restores_baseline() {
        let mut board = board();
        let mut queue = OptimisticMutationQueue::new();
        let seq = move_p1_to_b(&mut queue, &mut board);
        queue.dispatch_ready();
        let (_, outcome) = queue.fail(&mut board, seq).unwrap();
        assert_eq!(
            outcome,
            FailOutcome::RolledBack {
                placement: Placement::in_list("A", pos("a"))
            }
        );
        assert_eq!(ids(&board, "A"), vec!["P1", "P2"]);
        assert_eq!(board.card("P1").unwrap().position, pos("a"));
        assert!(ids(&board, "B").is_empty());
    }

    #[test]
    fn test_fail_under_newer_mutation_is_superseded() {
        let mut board = board();
        let mut queue = OptimisticMutationQueue::new();
        let first = move_p1_to_b(&mut queue, &mut board);
        let second = queue
            .commit(
                &mut board,
                EntityRef::card("P1"),
                Placement::in_list("B", pos("k")),
                MutationOrigin::Drag,
            )
            .unwrap();
        let (_, outcome) = queue.fail(&mut board, first).unwrap();
        assert_eq!(outcome, FailOutcome::Superseded { newer: second });
        assert_eq!(board.card("P1").unwrap().position, pos("k"));
        assert_eq!(
            queue.get(second).unwrap().baseline,
            Placement::in_list("A", pos("a"))
        );

        // the newer one failing now restores the original baseline
        let (_, outcome) = queue.fail(&mut board, second).unwrap();
        assert!(matches!(outcome, FailOutcome::RolledBack { .. }));
        assert_eq!(ids(&board, "A"), vec!["P1", "P2"]);
    }

    #[test]
    fn test_fail_with_colliding_baseline_places_after_sibling() {
        let mut board = board();
        let mut queue = OptimisticMutationQueue::new();
        let seq = move_p1_to_b(&mut queue, &mut board);
        // a background patch put another card on P1's old key
        board.upsert_card(card("P9", "A", "a"), false).unwrap();
        let (_, outcome) = queue.fail(&mut board, seq).unwrap();
        let FailOutcome::RolledBackAfter { placement, correction } = outcome else {
            panic!("expected placement after sibling, got {:?}", outcome);
        };
        assert!(placement.position > pos("a") && placement.position < pos("b"));
        assert_eq!(ids(&board, "A"), vec!["P9", "P1", "P2"]);
        assert!(correction.is_some());
    }

    #[test]
    fn test_failed_reflow_keeps_local_key() {
        let mut board = board();
        let mut queue = OptimisticMutationQueue::new();
        board
            .apply_placement(&EntityRef::card("P1"), &Placement::in_list("A", pos("K")))
            .unwrap();
        let seq = queue.record_applied(
            EntityRef::card("P1"),
            Placement::in_list("A", pos("10")),
            Placement::in_list("A", pos("K")),
            MutationOrigin::Reflow,
        );
        let (_, outcome) = queue.fail(&mut board, seq).unwrap();
        assert_eq!(
            outcome,
            FailOutcome::KeptLocal {
                placement: Placement::in_list("A", pos("K"))
            }
        );
        assert_eq!(board.card("P1").unwrap().position, pos("K"));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_unknown_sequence() {
        let mut board = board();
        let mut queue = OptimisticMutationQueue::new();
        assert_eq!(
            queue.fail(&mut board, 42).unwrap_err(),
            BoardError::UnknownSequence(42)
        );
    }

    #[test]
    fn test_settled_since_tracks_epochs() {
        let mut board = board();
        let mut queue = OptimisticMutationQueue::new();
        let epoch = queue.settle_epoch();
        let seq = move_p1_to_b(&mut queue, &mut board);
        assert!(queue.settled_since(epoch).is_empty());
        queue
            .confirm(&mut board, seq, Placement::in_list("B", pos("V")))
            .unwrap();
        assert!(queue.settled_since(epoch).contains(&EntityRef::card("P1")));
        assert!(queue.settled_since(queue.settle_epoch()).is_empty());
    }
}
