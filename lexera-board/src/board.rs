/// In-memory graph of the open board: lists ordered within the board, cards
/// ordered within their list.
///
/// Placement changes go through [`Board::apply_placement`], which the
/// mutation queue calls; everything else here is read access plus the
/// merge primitives used when a server snapshot arrives.
use std::collections::{BTreeMap, HashMap};

use crate::error::BoardError;
use crate::order::{OrderedCollection, OrderingError, PositionKey, Positioned};
use crate::types::{BoardSnapshot, Card, CardRecord, EntityRef, List, ListRecord, Placement};

#[derive(Debug, Clone)]
pub struct Board {
    id: String,
    lists: OrderedCollection<List>,
    /// list_id -> cards of that list
    cards: HashMap<String, OrderedCollection<Card>>,
    /// card_id -> owning list_id
    card_lists: HashMap<String, String>,
    max_key_len: usize,
}

impl Board {
    pub fn empty(id: impl Into<String>, max_key_len: usize) -> Self {
        Self {
            id: id.into(),
            lists: OrderedCollection::new(max_key_len),
            cards: HashMap::new(),
            card_lists: HashMap::new(),
            max_key_len,
        }
    }

    pub fn from_snapshot(id: impl Into<String>, snapshot: BoardSnapshot, max_key_len: usize) -> Self {
        let mut board = Self::empty(id, max_key_len);
        for record in snapshot.lists {
            board.upsert_list(record, false);
        }
        for record in snapshot.cards {
            let card_id = record.id.clone();
            if let Err(e) = board.upsert_card(record, false) {
                log::warn!(
                    "[lexera.board.load] Skipping card {} on board {}: {}",
                    card_id,
                    board.id,
                    e
                );
            }
        }
        board
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn lists(&self) -> &OrderedCollection<List> {
        &self.lists
    }

    pub fn list(&self, list_id: &str) -> Option<&List> {
        self.lists.get(list_id)
    }

    pub fn cards_in(&self, list_id: &str) -> Option<&OrderedCollection<Card>> {
        self.cards.get(list_id)
    }

    pub fn card(&self, card_id: &str) -> Option<&Card> {
        let list_id = self.card_lists.get(card_id)?;
        self.cards.get(list_id)?.get(card_id)
    }

    pub fn card_ids(&self) -> Vec<String> {
        self.card_lists.keys().cloned().collect()
    }

    pub fn card_count(&self) -> usize {
        self.card_lists.len()
    }

    pub fn contains(&self, entity: &EntityRef) -> bool {
        match entity {
            EntityRef::Card(id) => self.card_lists.contains_key(id),
            EntityRef::List(id) => self.lists.contains(id),
        }
    }

    pub fn placement_of(&self, entity: &EntityRef) -> Option<Placement> {
        match entity {
            EntityRef::Card(id) => self
                .card(id)
                .map(|card| Placement::in_list(card.list_id.clone(), card.position.clone())),
            EntityRef::List(id) => self
                .lists
                .get(id)
                .map(|list| Placement::at(list.position.clone())),
        }
    }

    /// Move an entity to `placement`. A card placement without a list keeps
    /// the card in its current list.
    pub(crate) fn apply_placement(
        &mut self,
        entity: &EntityRef,
        placement: &Placement,
    ) -> Result<(), BoardError> {
        match entity {
            EntityRef::List(id) => {
                if self.lists.set_position(id, placement.position.clone()) {
                    Ok(())
                } else {
                    Err(BoardError::UnknownList(id.clone()))
                }
            }
            EntityRef::Card(id) => {
                let current = self
                    .card_lists
                    .get(id)
                    .cloned()
                    .ok_or_else(|| BoardError::UnknownCard(id.clone()))?;
                let target = placement.list_id.clone().unwrap_or_else(|| current.clone());
                if !self.cards.contains_key(&target) {
                    return Err(BoardError::UnknownList(target));
                }
                let mut card = self
                    .cards
                    .get_mut(&current)
                    .and_then(|cards| cards.remove(id))
                    .ok_or_else(|| BoardError::UnknownCard(id.clone()))?;
                card.list_id = target.clone();
                card.position = placement.position.clone();
                self.card_lists.insert(id.clone(), target.clone());
                self.cards
                    .get_mut(&target)
                    .ok_or_else(|| BoardError::UnknownList(target.clone()))?
                    .insert(card);
                Ok(())
            }
        }
    }

    /// Key for dropping `card_id` at slot `index` of `list_id` (the slot is
    /// counted without the card itself).
    pub fn key_for_card_slot(
        &self,
        card_id: &str,
        list_id: &str,
        index: usize,
    ) -> Result<PositionKey, BoardError> {
        let cards = self
            .cards
            .get(list_id)
            .ok_or_else(|| BoardError::UnknownList(list_id.to_string()))?;
        Ok(cards.key_at(index, Some(card_id))?)
    }

    pub fn key_for_list_slot(&self, list_id: &str, index: usize) -> Result<PositionKey, BoardError> {
        Ok(self.lists.key_at(index, Some(list_id))?)
    }

    /// Index of a card in its list, or of a list in the board.
    pub fn index_of(&self, entity: &EntityRef) -> Option<usize> {
        match entity {
            EntityRef::Card(id) => {
                let list_id = self.card_lists.get(id)?;
                self.cards.get(list_id)?.index_of(id)
            }
            EntityRef::List(id) => self.lists.index_of(id),
        }
    }

    /// Whether the entity could take `position` without changing its
    /// visible slot. Only meaningful for the entity's current list.
    pub(crate) fn fits_current_slot(&self, entity: &EntityRef, position: &PositionKey) -> bool {
        match entity {
            EntityRef::Card(id) => self
                .card_lists
                .get(id)
                .and_then(|list_id| self.cards.get(list_id))
                .is_some_and(|cards| cards.fits_current_slot(id, position)),
            EntityRef::List(id) => self.lists.fits_current_slot(id, position),
        }
    }

    /// Fresh key between the entity's current neighbours.
    pub(crate) fn key_for_current_slot(&self, entity: &EntityRef) -> Result<PositionKey, BoardError> {
        match entity {
            EntityRef::Card(id) => {
                let list_id = self
                    .card_lists
                    .get(id)
                    .ok_or_else(|| BoardError::UnknownCard(id.clone()))?;
                let cards = self
                    .cards
                    .get(list_id)
                    .ok_or_else(|| BoardError::UnknownList(list_id.clone()))?;
                Ok(current_slot_key(cards, id)?)
            }
            EntityRef::List(id) => Ok(current_slot_key(&self.lists, id)?),
        }
    }

    /// Sibling already holding exactly `placement` (other than the entity).
    pub(crate) fn collision(&self, entity: &EntityRef, placement: &Placement) -> Option<String> {
        match entity {
            EntityRef::Card(id) => {
                let list_id = placement.list_id.as_ref().or_else(|| self.card_lists.get(id))?;
                self.cards
                    .get(list_id)?
                    .collision(&placement.position, id)
                    .map(|card| card.id.clone())
            }
            EntityRef::List(id) => self
                .lists
                .collision(&placement.position, id)
                .map(|list| list.id.clone()),
        }
    }

    /// Key that sorts the entity right after every sibling at or below
    /// `placement.position` in the placement's list.
    pub(crate) fn key_after(
        &self,
        entity: &EntityRef,
        placement: &Placement,
    ) -> Result<PositionKey, BoardError> {
        match entity {
            EntityRef::Card(id) => {
                let list_id = placement
                    .list_id
                    .clone()
                    .or_else(|| self.card_lists.get(id).cloned())
                    .ok_or_else(|| BoardError::UnknownCard(id.clone()))?;
                let cards = self
                    .cards
                    .get(&list_id)
                    .ok_or(BoardError::UnknownList(list_id))?;
                let slot = cards.slot_after(&placement.position, Some(id));
                Ok(cards.key_at(slot, Some(id))?)
            }
            EntityRef::List(id) => {
                let slot = self.lists.slot_after(&placement.position, Some(id));
                Ok(self.lists.key_at(slot, Some(id))?)
            }
        }
    }

    /// Card lists whose keys are duplicated, malformed or too long.
    pub fn lists_needing_reflow(&self) -> Vec<String> {
        self.lists
            .iter()
            .filter(|list| {
                self.cards
                    .get(&list.id)
                    .is_some_and(|cards| cards.needs_reflow())
            })
            .map(|list| list.id.clone())
            .collect()
    }

    pub fn list_order_needs_reflow(&self) -> bool {
        self.lists.needs_reflow()
    }

    pub(crate) fn reindex_cards(
        &mut self,
        list_id: &str,
    ) -> Result<BTreeMap<String, PositionKey>, BoardError> {
        self.cards
            .get_mut(list_id)
            .map(|cards| cards.reindex())
            .ok_or_else(|| BoardError::UnknownList(list_id.to_string()))
    }

    pub(crate) fn reindex_lists(&mut self) -> BTreeMap<String, PositionKey> {
        self.lists.reindex()
    }

    /// Insert or update a list. With `keep_position` the local key survives
    /// (the list has an unconfirmed move).
    pub(crate) fn upsert_list(&mut self, record: ListRecord, keep_position: bool) {
        if self.lists.contains(&record.id) {
            self.lists.update(&record.id, |list| {
                list.name = record.name;
                list.locked = record.locked;
                if !keep_position {
                    list.position = record.position;
                }
            });
        } else {
            self.cards
                .entry(record.id.clone())
                .or_insert_with(|| OrderedCollection::new(self.max_key_len));
            self.lists.insert(List {
                id: record.id,
                name: record.name,
                position: record.position,
                locked: record.locked,
            });
        }
    }

    /// Remove a list and, with it, its cards.
    pub(crate) fn remove_list(&mut self, list_id: &str) -> Vec<Card> {
        self.lists.remove(list_id);
        let removed = self
            .cards
            .remove(list_id)
            .map(|cards| cards.iter().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        for card in &removed {
            self.card_lists.remove(&card.id);
        }
        removed
    }

    /// Insert or update a card. With `keep_placement` only the payload is
    /// taken from the record.
    pub(crate) fn upsert_card(
        &mut self,
        record: CardRecord,
        keep_placement: bool,
    ) -> Result<(), BoardError> {
        if let Some(current) = self.card_lists.get(&record.id).cloned() {
            if keep_placement {
                if let Some(cards) = self.cards.get_mut(&current) {
                    cards.update(&record.id, |card| card.payload = record.payload);
                }
                return Ok(());
            }
            if !self.cards.contains_key(&record.list_id) {
                return Err(BoardError::UnknownList(record.list_id));
            }
            if let Some(cards) = self.cards.get_mut(&current) {
                cards.remove(&record.id);
            }
        } else if !self.cards.contains_key(&record.list_id) {
            return Err(BoardError::UnknownList(record.list_id));
        }

        self.card_lists
            .insert(record.id.clone(), record.list_id.clone());
        let target = self
            .cards
            .get_mut(&record.list_id)
            .ok_or_else(|| BoardError::UnknownList(record.list_id.clone()))?;
        target.insert(Card {
            id: record.id,
            list_id: record.list_id,
            position: record.position,
            payload: record.payload,
        });
        Ok(())
    }

    pub(crate) fn remove_card(&mut self, card_id: &str) -> Option<Card> {
        let list_id = self.card_lists.remove(card_id)?;
        self.cards.get_mut(&list_id)?.remove(card_id)
    }
}

fn current_slot_key<T: Positioned>(
    collection: &OrderedCollection<T>,
    id: &str,
) -> Result<PositionKey, OrderingError> {
    let index = collection
        .index_of(id)
        .ok_or_else(|| OrderingError::NotFound(id.to_string()))?;
    collection.key_at(index, Some(id))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::order::key::DEFAULT_MAX_KEY_LEN;

    pub(crate) fn pos(raw: &str) -> PositionKey {
        PositionKey::from_server(raw)
    }

    pub(crate) fn list(id: &str, position: &str) -> ListRecord {
        ListRecord {
            id: id.to_string(),
            name: format!("List {}", id),
            position: pos(position),
            locked: false,
        }
    }

    pub(crate) fn card(id: &str, list_id: &str, position: &str) -> CardRecord {
        CardRecord {
            id: id.to_string(),
            list_id: list_id.to_string(),
            position: pos(position),
            payload: serde_json::json!({ "title": id }),
        }
    }

    /// List A holds P1 ("a") and P2 ("b"); list B is empty.
    pub(crate) fn two_list_snapshot() -> BoardSnapshot {
        BoardSnapshot {
            lists: vec![list("A", "a"), list("B", "b")],
            cards: vec![card("P1", "A", "a"), card("P2", "A", "b")],
        }
    }

    pub(crate) fn ids(board: &Board, list_id: &str) -> Vec<String> {
        board
            .cards_in(list_id)
            .map(|cards| cards.ids().into_iter().map(String::from).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_from_snapshot_orders_lists_and_cards() {
        let snap = BoardSnapshot {
            lists: vec![list("B", "b"), list("A", "a")],
            cards: vec![card("P2", "A", "b"), card("P1", "A", "a")],
        };
        let board = Board::from_snapshot("board-1", snap, DEFAULT_MAX_KEY_LEN);
        assert_eq!(board.lists().ids(), vec!["A", "B"]);
        assert_eq!(ids(&board, "A"), vec!["P1", "P2"]);
        assert_eq!(board.card_count(), 2);
    }

    #[test]
    fn test_from_snapshot_skips_orphan_cards() {
        let snap = BoardSnapshot {
            lists: vec![list("A", "a")],
            cards: vec![card("P1", "A", "a"), card("X", "gone", "a")],
        };
        let board = Board::from_snapshot("board-1", snap, DEFAULT_MAX_KEY_LEN);
        assert!(board.card("X").is_none());
        assert_eq!(board.card_count(), 1);
    }

    #[test]
    fn test_apply_placement_moves_card_between_lists() {
        let mut board = Board::from_snapshot("b", two_list_snapshot(), DEFAULT_MAX_KEY_LEN);
        let entity = EntityRef::card("P1");
        board
            .apply_placement(&entity, &Placement::in_list("B", pos("V")))
            .unwrap();
        assert_eq!(ids(&board, "A"), vec!["P2"]);
        assert_eq!(ids(&board, "B"), vec!["P1"]);
        assert_eq!(board.card("P1").unwrap().list_id, "B");
    }

    #[test]
    fn test_apply_placement_unknown_list_leaves_card() {
        let mut board = Board::from_snapshot("b", two_list_snapshot(), DEFAULT_MAX_KEY_LEN);
        let err = board
            .apply_placement(&EntityRef::card("P1"), &Placement::in_list("Z", pos("V")))
            .unwrap_err();
        assert_eq!(err, BoardError::UnknownList("Z".into()));
        assert_eq!(ids(&board, "A"), vec!["P1", "P2"]);
    }

    #[test]
    fn test_key_for_card_slot_excludes_dragged_card() {
        let board = Board::from_snapshot("b", two_list_snapshot(), DEFAULT_MAX_KEY_LEN);
        // P1 to the end of its own list: after P2
        let key = board.key_for_card_slot("P1", "A", 1).unwrap();
        assert!(key > pos("b"));
        // into the empty list
        let key = board.key_for_card_slot("P1", "B", 0).unwrap();
        assert_eq!(key.as_str(), "V");
    }

    #[test]
    fn test_key_after_collision() {
        let board = Board::from_snapshot("b", two_list_snapshot(), DEFAULT_MAX_KEY_LEN);
        let entity = EntityRef::card("X");
        let placement = Placement::in_list("A", pos("a"));
        assert_eq!(board.collision(&entity, &placement), Some("P1".to_string()));
        let key = board.key_after(&entity, &placement).unwrap();
        assert!(pos("a") < key && key < pos("b"));
    }

    #[test]
    fn test_remove_list_cascades_cards() {
        let mut board = Board::from_snapshot("b", two_list_snapshot(), DEFAULT_MAX_KEY_LEN);
        let removed = board.remove_list("A");
        assert_eq!(removed.len(), 2);
        assert!(board.card("P1").is_none());
        assert_eq!(board.lists().ids(), vec!["B"]);
    }

    #[test]
    fn test_upsert_card_keep_placement_updates_payload_only() {
        let mut board = Board::from_snapshot("b", two_list_snapshot(), DEFAULT_MAX_KEY_LEN);
        let mut record = card("P1", "B", "z");
        record.payload = serde_json::json!({ "title": "renamed" });
        board.upsert_card(record, true).unwrap();
        let p1 = board.card("P1").unwrap();
        assert_eq!(p1.list_id, "A");
        assert_eq!(p1.position, pos("a"));
        assert_eq!(p1.payload["title"], "renamed");
    }

    #[test]
    fn test_lists_needing_reflow() {
        let snap = BoardSnapshot {
            lists: vec![list("A", "a"), list("B", "b")],
            cards: vec![card("P1", "A", "a"), card("P2", "A", "a"), card("P3", "B", "a")],
        };
        let board = Board::from_snapshot("b", snap, DEFAULT_MAX_KEY_LEN);
        assert_eq!(board.lists_needing_reflow(), vec!["A".to_string()]);
        assert!(!board.list_order_needs_reflow());
    }
}
