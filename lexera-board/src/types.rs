use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::order::{PositionKey, Positioned};

/// A card on the board. The payload (title, deal value, assignee, ...) is
/// opaque to the ordering engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub list_id: String,
    pub position: PositionKey,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Positioned for Card {
    fn id(&self) -> &str {
        &self.id
    }

    fn position(&self) -> &PositionKey {
        &self.position
    }

    fn set_position(&mut self, position: PositionKey) {
        self.position = position;
    }
}

/// A list (pipeline stage, Kanban column). Its cards live in the board's
/// per-list collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub id: String,
    pub name: String,
    pub position: PositionKey,
    /// Locked or archived lists reject drops.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub locked: bool,
}

impl Positioned for List {
    fn id(&self) -> &str {
        &self.id
    }

    fn position(&self) -> &PositionKey {
        &self.position
    }

    fn set_position(&mut self, position: PositionKey) {
        self.position = position;
    }
}

/// The entity a mutation targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum EntityRef {
    Card(String),
    List(String),
}

impl EntityRef {
    pub fn card(id: impl Into<String>) -> Self {
        EntityRef::Card(id.into())
    }

    pub fn list(id: impl Into<String>) -> Self {
        EntityRef::List(id.into())
    }

    pub fn id(&self) -> &str {
        match self {
            EntityRef::Card(id) | EntityRef::List(id) => id,
        }
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityRef::Card(id) => write!(f, "card {}", id),
            EntityRef::List(id) => write!(f, "list {}", id),
        }
    }
}

/// Where an entity sits: owning list (cards only) and key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_id: Option<String>,
    pub position: PositionKey,
}

impl Placement {
    pub fn in_list(list_id: impl Into<String>, position: PositionKey) -> Self {
        Self {
            list_id: Some(list_id.into()),
            position,
        }
    }

    pub fn at(position: PositionKey) -> Self {
        Self {
            list_id: None,
            position,
        }
    }
}

// ── Wire types exchanged with the data source ────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRecord {
    pub id: String,
    pub name: String,
    pub position: PositionKey,
    #[serde(default)]
    pub locked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardRecord {
    pub id: String,
    pub list_id: String,
    pub position: PositionKey,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Full board as returned by `GET board(id)` and by background refreshes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSnapshot {
    #[serde(default)]
    pub lists: Vec<ListRecord>,
    #[serde(default)]
    pub cards: Vec<CardRecord>,
}

impl BoardSnapshot {
    /// SHA-256 over the snapshot with lists and cards sorted by id, so two
    /// polls of the same server state compare equal regardless of order.
    pub fn fingerprint(&self) -> String {
        let mut lists: Vec<&ListRecord> = self.lists.iter().collect();
        lists.sort_by(|a, b| a.id.cmp(&b.id));
        let mut cards: Vec<&CardRecord> = self.cards.iter().collect();
        cards.sort_by(|a, b| a.id.cmp(&b.id));

        let mut hasher = Sha256::new();
        for list in lists {
            hasher.update(b"L\0");
            hasher.update(list.id.as_bytes());
            hasher.update(b"\0");
            hasher.update(list.name.as_bytes());
            hasher.update(b"\0");
            hasher.update(list.position.as_str().as_bytes());
            hasher.update(if list.locked { b"\x01" } else { b"\x00" });
        }
        for card in cards {
            hasher.update(b"C\0");
            hasher.update(card.id.as_bytes());
            hasher.update(b"\0");
            hasher.update(card.list_id.as_bytes());
            hasher.update(b"\0");
            hasher.update(card.position.as_str().as_bytes());
            hasher.update(b"\0");
            hasher.update(card.payload.to_string().as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Body of `PATCH card(id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_id: Option<String>,
    pub position: PositionKey,
}

/// Authoritative answer to `PATCH card(id)`; may differ from the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPlacement {
    pub id: String,
    pub list_id: String,
    pub position: PositionKey,
}

/// Body of `PATCH list(id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListPatch {
    pub position: PositionKey,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListPlacement {
    pub id: String,
    pub position: PositionKey,
}

// ── Render data ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardView {
    pub id: String,
    pub payload: serde_json::Value,
    /// An unconfirmed mutation exists for this card.
    pub is_pending: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListView {
    pub id: String,
    pub name: String,
    pub locked: bool,
    pub is_pending: bool,
    pub cards: Vec<CardView>,
}

/// Where the dragged card would land if released now.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GhostView {
    pub card_id: String,
    pub list_id: String,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub board_id: String,
    /// Lists and cards in render order.
    pub lists: Vec<ListView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ghost: Option<GhostView>,
    pub notifications: Vec<crate::notify::Notification>,
}
