/// Items kept sorted by their position key.
///
/// Sort order is `(position, id)`, so duplicate keys coming from a server
/// still render deterministically until the list is reflowed.
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use super::key::{PositionKey, DEFAULT_MAX_KEY_LEN};
use super::OrderingError;

/// Anything that lives in an ordered list: cards inside a list, lists
/// inside a board.
pub trait Positioned {
    fn id(&self) -> &str;
    fn position(&self) -> &PositionKey;
    fn set_position(&mut self, position: PositionKey);
}

/// A failed insert hands the item back so the caller can reflow and retry.
#[derive(Debug)]
pub struct InsertError<T> {
    pub error: OrderingError,
    pub item: T,
}

fn order<T: Positioned>(a: &T, b: &T) -> Ordering {
    a.position()
        .cmp(b.position())
        .then_with(|| a.id().cmp(b.id()))
}

#[derive(Debug, Clone)]
pub struct OrderedCollection<T> {
    items: Vec<T>,
    max_key_len: usize,
}

impl<T: Positioned> Default for OrderedCollection<T> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_KEY_LEN)
    }
}

impl<T: Positioned> OrderedCollection<T> {
    pub fn new(max_key_len: usize) -> Self {
        Self {
            items: Vec::new(),
            max_key_len,
        }
    }

    pub fn from_items(items: impl IntoIterator<Item = T>, max_key_len: usize) -> Self {
        let mut items: Vec<T> = items.into_iter().collect();
        items.sort_by(order);
        Self { items, max_key_len }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.id()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    pub fn max_key_len(&self) -> usize {
        self.max_key_len
    }

    /// Insert an item at the slot its current key sorts into.
    pub fn insert(&mut self, item: T) {
        let slot = self
            .items
            .partition_point(|existing| order(existing, &item) == Ordering::Less);
        self.items.insert(slot, item);
    }

    pub fn remove(&mut self, id: &str) -> Option<T> {
        let index = self.index_of(id)?;
        Some(self.items.remove(index))
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) -> Vec<T> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.items.len());
        for item in self.items.drain(..) {
            if keep(&item) {
                kept.push(item);
            } else {
                removed.push(item);
            }
        }
        self.items = kept;
        removed
    }

    /// Neighbours of insertion slot `index`, counted with `exclude` removed
    /// from the list. `index` past the end means "append".
    pub fn neighbours_at(&self, index: usize, exclude: Option<&str>) -> (Option<&T>, Option<&T>) {
        let visible: Vec<&T> = self
            .items
            .iter()
            .filter(|item| Some(item.id()) != exclude)
            .collect();
        let index = index.min(visible.len());
        let before = index.checked_sub(1).map(|i| visible[i]);
        let after = visible.get(index).copied();
        (before, after)
    }

    /// Key for insertion slot `index` (see [`Self::neighbours_at`]).
    pub fn key_at(&self, index: usize, exclude: Option<&str>) -> Result<PositionKey, OrderingError> {
        let (before, after) = self.neighbours_at(index, exclude);
        PositionKey::between_with_limit(
            before.map(|item| item.position()),
            after.map(|item| item.position()),
            self.max_key_len,
        )
    }

    /// Assign `item` a key between the item with id `before` (which will
    /// precede it) and the item with id `after` (which will follow it).
    /// `None` stands for the open end of the list.
    pub fn insert_between(
        &mut self,
        mut item: T,
        before: Option<&str>,
        after: Option<&str>,
    ) -> Result<PositionKey, InsertError<T>> {
        let lower = match self.neighbour_key(before) {
            Ok(key) => key,
            Err(error) => return Err(InsertError { error, item }),
        };
        let upper = match self.neighbour_key(after) {
            Ok(key) => key,
            Err(error) => return Err(InsertError { error, item }),
        };
        match PositionKey::between_with_limit(lower.as_ref(), upper.as_ref(), self.max_key_len) {
            Ok(key) => {
                item.set_position(key.clone());
                self.insert(item);
                Ok(key)
            }
            Err(error) => Err(InsertError { error, item }),
        }
    }

    fn neighbour_key(&self, id: Option<&str>) -> Result<Option<PositionKey>, OrderingError> {
        match id {
            None => Ok(None),
            Some(id) => self
                .get(id)
                .map(|item| Some(item.position().clone()))
                .ok_or_else(|| OrderingError::UnknownNeighbour(id.to_string())),
        }
    }

    /// Insert `item` so it ends up at `index`.
    pub fn insert_at(&mut self, item: T, index: usize) -> Result<PositionKey, InsertError<T>> {
        let (before, after) = self.neighbours_at(index, Some(item.id()));
        let before = before.map(|n| n.id().to_string());
        let after = after.map(|n| n.id().to_string());
        self.insert_between(item, before.as_deref(), after.as_deref())
    }

    /// Move an existing item to `index`, counted in the list without the
    /// item itself. On failure the item keeps its old key and slot.
    pub fn move_to_index(&mut self, id: &str, index: usize) -> Result<PositionKey, OrderingError> {
        let item = self
            .remove(id)
            .ok_or_else(|| OrderingError::NotFound(id.to_string()))?;
        match self.insert_at(item, index) {
            Ok(key) => Ok(key),
            Err(InsertError { error, item }) => {
                self.insert(item);
                Err(error)
            }
        }
    }

    /// Replace an item's key and move it to the slot the new key sorts into.
    pub fn set_position(&mut self, id: &str, position: PositionKey) -> bool {
        match self.remove(id) {
            Some(mut item) => {
                item.set_position(position);
                self.insert(item);
                true
            }
            None => false,
        }
    }

    /// Mutate an item in place, re-sorting it afterwards.
    pub fn update(&mut self, id: &str, apply: impl FnOnce(&mut T)) -> bool {
        match self.remove(id) {
            Some(mut item) => {
                apply(&mut item);
                self.insert(item);
                true
            }
            None => false,
        }
    }

    /// Evenly spaced keys for every item, in the current order. Returns the
    /// full set of reassigned keys so the caller can persist them together.
    pub fn reindex(&mut self) -> BTreeMap<String, PositionKey> {
        let keys = PositionKey::evenly_spaced(self.items.len());
        let mut assigned = BTreeMap::new();
        for (item, key) in self.items.iter_mut().zip(keys) {
            assigned.insert(item.id().to_string(), key.clone());
            item.set_position(key);
        }
        assigned
    }

    /// True when keys are duplicated, malformed or too long to extend.
    pub fn needs_reflow(&self) -> bool {
        let mut seen = HashSet::new();
        self.items.iter().any(|item| {
            let key = item.position();
            !key.is_well_formed() || key.len() > self.max_key_len || !seen.insert(key.as_str())
        })
    }

    /// Another item holding exactly `position`.
    pub fn collision(&self, position: &PositionKey, except: &str) -> Option<&T> {
        self.items
            .iter()
            .find(|item| item.id() != except && item.position() == position)
    }

    /// Whether `id` could take `position` without changing its slot.
    pub fn fits_current_slot(&self, id: &str, position: &PositionKey) -> bool {
        let Some(index) = self.index_of(id) else {
            return false;
        };
        if !position.is_well_formed() || position.len() > self.max_key_len {
            return false;
        }
        let above = index
            .checked_sub(1)
            .and_then(|i| self.items.get(i))
            .map_or(true, |item| item.position() < position);
        let below = self
            .items
            .get(index + 1)
            .map_or(true, |item| position < item.position());
        above && below
    }

    /// Insertion slot (with `except` removed) right after every item whose
    /// key is less than or equal to `position`.
    pub fn slot_after(&self, position: &PositionKey, except: Option<&str>) -> usize {
        self.items
            .iter()
            .filter(|item| Some(item.id()) != except)
            .take_while(|item| item.position() <= position)
            .count()
    }
}
