use shared::{HeldInput, MiniPlayer, SeatId, MINI_GAME_STEP, PLAYER_SIZE, WORLD_HEIGHT, WORLD_WIDTH};
use std::collections::BTreeMap;

use crate::level::spawn_position;

/// Lobby filler: one dot per seat, moved a fixed step per tick.
#[derive(Debug, Default)]
pub struct MiniGame {
    players: BTreeMap<SeatId, MiniPlayer>,
}

impl MiniGame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_player(&mut self, seat: SeatId, nickname: &str) {
        let (x, y) = spawn_position(seat);
        self.players.insert(
            seat,
            MiniPlayer {
                nickname: nickname.to_string(),
                x,
                y,
            },
        );
    }

    pub fn remove_player(&mut self, seat: SeatId) {
        self.players.remove(&seat);
    }

    pub fn tick<F>(&mut self, input_for: F)
    where
        F: Fn(SeatId) -> HeldInput,
    {
        for (seat, player) in self.players.iter_mut() {
            let (dx, dy) = input_for(*seat).direction();
            player.x = (player.x + dx * MINI_GAME_STEP).clamp(0.0, WORLD_WIDTH - PLAYER_SIZE);
            player.y = (player.y + dy * MINI_GAME_STEP).clamp(0.0, WORLD_HEIGHT - PLAYER_SIZE);
        }
    }

    pub fn state(&self) -> BTreeMap<SeatId, MiniPlayer> {
        self.players.clone()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
