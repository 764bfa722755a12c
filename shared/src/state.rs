//! Render projections of the authoritative state and their receiving-side
//! reconstruction.
//!
//! The server sends one [`StatePayload`] shape for both the full `startgame`
//! snapshot and the per-tick `gamestate` delta. Empty collections are left
//! off the wire entirely. On the receiving side, [`ClientGameState`] folds
//! payloads in with two strategies:
//!
//! - replace-wholesale: players, solid/surrounding walls, weak walls,
//!   power-ups. Only overwritten when the incoming collection is present.
//! - append-and-expire: collapsing walls, bombs, flames, item events. New
//!   entries are appended unless already known and age out after a short
//!   client-local timeout so a backgrounded tab never replays stale events.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{SeatId, TIMED_OUT_SUFFIX};

/// How long an event entry stays live on the client.
pub const CLIENT_EXPIRY_MS: u64 = 600;
/// New bombs stay around for their whole fuse so the drop sound never
/// plays late.
pub const CLIENT_BOMB_EXPIRY_MS: u64 = 2500;

/// Player fields a renderer needs. Power-up history and timers stay on the
/// server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: SeatId,
    pub size: f32,
    pub lives: u32,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub vulnerable: bool,
    /// Facing left.
    pub left: bool,
    pub alive: bool,
    pub killer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WallKind {
    Solid,
    Weak,
    Surrounding,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallView {
    pub id: String,
    pub kind: WallKind,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub level: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BombView {
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub power: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlameDirection {
    #[serde(rename = "H")]
    Horizontal,
    #[serde(rename = "V")]
    Vertical,
    #[serde(rename = "L")]
    LeftEnd,
    #[serde(rename = "R")]
    RightEnd,
    #[serde(rename = "U")]
    UpEnd,
    #[serde(rename = "D")]
    DownEnd,
}

impl FlameDirection {
    pub fn tag(&self) -> &'static str {
        match self {
            FlameDirection::Horizontal => "H",
            FlameDirection::Vertical => "V",
            FlameDirection::LeftEnd => "L",
            FlameDirection::RightEnd => "R",
            FlameDirection::UpEnd => "U",
            FlameDirection::DownEnd => "D",
        }
    }

    pub fn is_horizontal(&self) -> bool {
        matches!(
            self,
            FlameDirection::Horizontal | FlameDirection::LeftEnd | FlameDirection::RightEnd
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlameView {
    pub direction: FlameDirection,
    pub x: f32,
    pub y: f32,
}

impl FlameView {
    /// Clients dedupe flames by direction and position.
    pub fn key(&self) -> String {
        format!("{}{}-{}", self.direction.tag(), self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerUpKind {
    BombUp,
    FlameUp,
    SpeedUp,
    LifeUp,
    WallClip,
    /// Recognised on the wire but never spawned.
    BombClip,
}

impl PowerUpKind {
    pub fn tag(&self) -> &'static str {
        match self {
            PowerUpKind::BombUp => "bombUp",
            PowerUpKind::FlameUp => "flameUp",
            PowerUpKind::SpeedUp => "speedUp",
            PowerUpKind::LifeUp => "lifeUp",
            PowerUpKind::WallClip => "wallClip",
            PowerUpKind::BombClip => "bombClip",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerUpView {
    pub name: String,
    pub kind: PowerUpKind,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub row: usize,
    pub col: usize,
}

/// A seat's dot in the lobby mini-game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiniPlayer {
    pub nickname: String,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePayload {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub players: Vec<PlayerView>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub solid_walls: Vec<WallView>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub surrounding_walls: Vec<WallView>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub weak_walls: BTreeMap<String, WallView>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub powerups: BTreeMap<String, PowerUpView>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collapsing_walls: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub new_bombs: BTreeMap<String, BombView>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub removed_bombs: BTreeMap<String, BombView>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub new_flames: Vec<FlameView>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub new_items: BTreeMap<String, PowerUpView>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub picked_items: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub burning_items: Vec<String>,
    #[serde(default)]
    pub level: u32,
}

#[derive(Debug, Clone)]
struct EventEntry {
    id: String,
    added_at: u64,
    timed_out: bool,
}

/// Receiving-side copy of the arena, rebuilt from state payloads.
///
/// Times are client-local milliseconds supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct ClientGameState {
    pub solid_walls: Vec<WallView>,
    pub surrounding_walls: Vec<WallView>,
    pub weak_walls: BTreeMap<String, WallView>,
    pub powerups: BTreeMap<String, PowerUpView>,
    /// Items announced by the latest payload that carried any. Replaced
    /// wholesale rather than appended; `power_ups_on_board` keeps the
    /// running set.
    pub new_items: BTreeMap<String, PowerUpView>,
    pub players: Vec<PlayerView>,
    pub level: u32,

    standing_walls: BTreeMap<String, WallView>,
    board_items: BTreeMap<String, PowerUpView>,
    collapsing_walls: Vec<EventEntry>,
    picked_items: Vec<EventEntry>,
    burning_items: Vec<EventEntry>,
    new_bombs: BTreeMap<String, (BombView, u64)>,
    removed_bombs: BTreeMap<String, (BombView, u64)>,
    new_flames: BTreeMap<String, (FlameView, u64)>,
}

impl ClientGameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one payload into the local copy.
    pub fn apply(&mut self, update: &StatePayload, now_ms: u64) {
        if !update.solid_walls.is_empty() {
            self.solid_walls = update.solid_walls.clone();
        }
        if !update.surrounding_walls.is_empty() {
            self.surrounding_walls = update.surrounding_walls.clone();
        }
        if !update.weak_walls.is_empty() {
            self.weak_walls = update.weak_walls.clone();
            self.standing_walls = update.weak_walls.clone();
        }
        if !update.powerups.is_empty() {
            self.powerups = update.powerups.clone();
            self.board_items = update.powerups.clone();
        }
        if !update.new_items.is_empty() {
            self.new_items = update.new_items.clone();
            self.board_items.extend(update.new_items.clone());
        }
        for id in &update.collapsing_walls {
            self.standing_walls.remove(strip_timed_out(id));
        }
        for name in update.picked_items.iter().chain(&update.burning_items) {
            self.board_items.remove(strip_timed_out(name));
        }
        self.players = update.players.clone();
        if update.level != 0 {
            self.level = update.level;
        }

        append_unique(&mut self.collapsing_walls, &update.collapsing_walls, now_ms);
        append_unique(&mut self.picked_items, &update.picked_items, now_ms);
        append_unique(&mut self.burning_items, &update.burning_items, now_ms);

        for (name, bomb) in &update.new_bombs {
            self.new_bombs
                .entry(name.clone())
                .or_insert_with(|| (bomb.clone(), now_ms));
        }
        for (name, bomb) in &update.removed_bombs {
            self.removed_bombs
                .entry(name.clone())
                .or_insert_with(|| (bomb.clone(), now_ms));
        }
        for flame in &update.new_flames {
            self.new_flames
                .entry(flame.key())
                .or_insert_with(|| (flame.clone(), now_ms));
        }
    }

    /// Ages out event entries. String events are marked timed out rather
    /// than dropped, map entries are dropped.
    pub fn expire(&mut self, now_ms: u64) {
        for entries in [
            &mut self.collapsing_walls,
            &mut self.picked_items,
            &mut self.burning_items,
        ] {
            for entry in entries.iter_mut() {
                if now_ms.saturating_sub(entry.added_at) >= CLIENT_EXPIRY_MS {
                    entry.timed_out = true;
                }
            }
        }

        self.new_bombs
            .retain(|_, (_, added)| now_ms.saturating_sub(*added) < CLIENT_BOMB_EXPIRY_MS);
        self.removed_bombs
            .retain(|_, (_, added)| now_ms.saturating_sub(*added) < CLIENT_EXPIRY_MS);
        self.new_flames
            .retain(|_, (_, added)| now_ms.saturating_sub(*added) < CLIENT_EXPIRY_MS);
    }

    /// Weak walls with no collapse announced yet.
    pub fn standing_weak_walls(&self) -> &BTreeMap<String, WallView> {
        &self.standing_walls
    }

    /// Every item received so far that has not been picked up or set alight.
    /// Items still hidden under a weak wall are included.
    pub fn power_ups_on_board(&self) -> &BTreeMap<String, PowerUpView> {
        &self.board_items
    }

    pub fn collapsing_walls(&self) -> Vec<String> {
        render_events(&self.collapsing_walls)
    }

    pub fn picked_items(&self) -> Vec<String> {
        render_events(&self.picked_items)
    }

    pub fn burning_items(&self) -> Vec<String> {
        render_events(&self.burning_items)
    }

    pub fn new_bombs(&self) -> impl Iterator<Item = (&String, &BombView)> {
        self.new_bombs.iter().map(|(name, (bomb, _))| (name, bomb))
    }

    pub fn removed_bombs(&self) -> impl Iterator<Item = (&String, &BombView)> {
        self.removed_bombs.iter().map(|(name, (bomb, _))| (name, bomb))
    }

    pub fn new_flames(&self) -> impl Iterator<Item = (&String, &FlameView)> {
        self.new_flames.iter().map(|(key, (flame, _))| (key, flame))
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

fn append_unique(entries: &mut Vec<EventEntry>, incoming: &[String], now_ms: u64) {
    for id in incoming {
        if !entries.iter().any(|entry| &entry.id == id) {
            entries.push(EventEntry {
                id: id.clone(),
                added_at: now_ms,
                timed_out: false,
            });
        }
    }
}

fn strip_timed_out(id: &str) -> &str {
    id.strip_suffix(TIMED_OUT_SUFFIX).unwrap_or(id)
}

fn render_events(entries: &[EventEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            if entry.timed_out {
                format!("{}{}", entry.id, TIMED_OUT_SUFFIX)
            } else {
                entry.id.clone()
            }
        })
        .collect()
}
