//! Projection of the authoritative game into wire payloads.
//!
//! Two shapes are produced from the same [`StatePayload`] type:
//! - the full snapshot sent once with `startgame`, carrying every wall and
//!   power-up;
//! - the reduced per-tick delta sent with `gamestate`, which leaves out the
//!   large static collections and only carries players plus the events
//!   recorded since the previous tick.

use shared::{BombView, FlameView, PowerUpView, StatePayload};
use std::collections::BTreeMap;
use std::mem;

use crate::entity::{Player, PowerUp, Wall};

/// Render events recorded since the last broadcast.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PendingChanges {
    pub collapsing_walls: Vec<String>,
    pub new_bombs: BTreeMap<String, BombView>,
    pub removed_bombs: BTreeMap<String, BombView>,
    pub new_flames: Vec<FlameView>,
    pub new_items: BTreeMap<String, PowerUpView>,
    pub picked_items: Vec<String>,
    pub burning_items: Vec<String>,
}

impl PendingChanges {
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.collapsing_walls.is_empty()
            && self.new_bombs.is_empty()
            && self.removed_bombs.is_empty()
            && self.new_flames.is_empty()
            && self.new_items.is_empty()
            && self.picked_items.is_empty()
            && self.burning_items.is_empty()
    }

    /// Hands the recorded events over and starts a fresh batch.
    pub fn take(&mut self) -> PendingChanges {
        mem::take(self)
    }
}

/// Borrowed view of the state a payload is built from.
pub struct StateSource<'a> {
    pub players: &'a [Player],
    pub solid_walls: &'a [Wall],
    pub surrounding_walls: &'a [Wall],
    pub weak_walls: &'a BTreeMap<String, Wall>,
    pub power_ups: &'a BTreeMap<String, PowerUp>,
    pub level: u32,
}

pub fn full_state(source: &StateSource<'_>, changes: PendingChanges) -> StatePayload {
    let mut payload = reduced_state(source, changes);
    payload.solid_walls = source.solid_walls.iter().map(Wall::view).collect();
    payload.surrounding_walls = source.surrounding_walls.iter().map(Wall::view).collect();
    payload.weak_walls = source
        .weak_walls
        .iter()
        .map(|(id, wall)| (id.clone(), wall.view()))
        .collect();
    payload.powerups = source
        .power_ups
        .iter()
        .map(|(name, power_up)| (name.clone(), power_up.view()))
        .collect();
    payload
}

pub fn reduced_state(source: &StateSource<'_>, changes: PendingChanges) -> StatePayload {
    StatePayload {
        players: source.players.iter().map(Player::view).collect(),
        collapsing_walls: changes.collapsing_walls,
        new_bombs: changes.new_bombs,
        removed_bombs: changes.removed_bombs,
        new_flames: changes.new_flames,
        new_items: changes.new_items,
        picked_items: changes.picked_items,
        burning_items: changes.burning_items,
        level: source.level,
        ..Default::default()
    }
}
