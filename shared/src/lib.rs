//! Wire schema and gameplay constants shared by the arena server and the
//! render clients that consume its state payloads.

pub mod protocol;
pub mod state;

pub use protocol::{ClientMessage, InputPayload, ServerMessage};
pub use state::{
    BombView, ClientGameState, FlameDirection, FlameView, MiniPlayer, PlayerView, PowerUpKind,
    PowerUpView, StatePayload, WallKind, WallView,
};

use serde::{Deserialize, Serialize};

/// Seat number of a joined connection, always in `1..=MAX_SEATS`.
pub type SeatId = u8;

pub const MAX_SEATS: usize = 4;

pub const GRID_STEP: f32 = 50.0;
pub const HALF_STEP: f32 = GRID_STEP / 2.0;
pub const GRID_COLS: usize = 13;
pub const GRID_ROWS: usize = 11;
pub const WORLD_WIDTH: f32 = GRID_STEP * GRID_COLS as f32;
pub const WORLD_HEIGHT: f32 = GRID_STEP * GRID_ROWS as f32;

pub const PLAYER_SIZE: f32 = 40.0;
/// Base movement speed in pixels per second.
pub const PLAYER_SPEED: f32 = 150.0;
pub const SPEED_INCREMENT: f32 = 30.0;
/// Applied to both axes when moving diagonally so the resultant speed
/// matches axis-aligned movement.
pub const DIAGONAL_FACTOR: f32 = 0.707;
pub const STARTING_LIVES: u32 = 3;
pub const STARTING_BOMBS: u32 = 1;
pub const STARTING_POWER: u32 = 2;
/// Overlap tolerance for flame and power-up hits.
pub const HIT_INSET: f32 = 10.0;

pub const BOMB_FUSE_MS: u64 = 2500;
pub const FLAME_LIFETIME_MS: u64 = 500;
pub const INVULNERABILITY_MS: u64 = 2000;
pub const RESPAWN_DELAY_MS: u64 = 2000;
pub const COLLAPSE_DELAY_MS: u64 = 500;
pub const COLLAPSE_TIMEOUT_MS: u64 = 600;
pub const END_ANNOUNCE_DELAY_MS: u64 = BOMB_FUSE_MS + FLAME_LIFETIME_MS + 500;
pub const RETURN_TO_LOBBY_DELAY_MS: u64 = 5000;

pub const MINI_GAME_STEP: f32 = 5.0;
pub const MAX_CHAT_LEN: usize = 200;
/// Appended to a collapse/burn/pickup id to tell clients to skip the
/// animation and remove the entity immediately.
pub const TIMED_OUT_SUFFIX: &str = "timedout";

/// Latest known key state of one seat. Overwritten wholesale by every
/// input message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeldInput {
    #[serde(default)]
    pub left: bool,
    #[serde(default)]
    pub right: bool,
    #[serde(default)]
    pub up: bool,
    #[serde(default)]
    pub down: bool,
    #[serde(default)]
    pub bomb: bool,
}

impl HeldInput {
    /// Builds an input from the legacy list-of-held-directions form.
    /// Unknown entries are ignored.
    pub fn from_directions<S: AsRef<str>>(directions: &[S]) -> Self {
        let mut input = HeldInput::default();
        for direction in directions {
            match direction.as_ref() {
                "left" => input.left = true,
                "right" => input.right = true,
                "up" => input.up = true,
                "down" => input.down = true,
                "bomb" => input.bomb = true,
                _ => {}
            }
        }
        input
    }

    pub fn is_diagonal(&self) -> bool {
        (self.left || self.right) && (self.up || self.down)
    }

    /// Unit direction of travel before speed scaling. Opposing keys cancel.
    pub fn direction(&self) -> (f32, f32) {
        let mut dx = 0.0;
        let mut dy = 0.0;
        if self.left {
            dx -= 1.0;
        }
        if self.right {
            dx += 1.0;
        }
        if self.up {
            dy -= 1.0;
        }
        if self.down {
            dy += 1.0;
        }
        (dx, dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_world_matches_grid() {
        assert_eq!(WORLD_WIDTH, 650.0);
        assert_eq!(WORLD_HEIGHT, 550.0);
        assert!(PLAYER_SIZE < GRID_STEP);
    }

    #[test]
    fn test_end_delay_covers_last_explosion() {
        assert_eq!(END_ANNOUNCE_DELAY_MS, 3500);
        assert!(COLLAPSE_TIMEOUT_MS > COLLAPSE_DELAY_MS);
    }

    #[test]
    fn test_from_directions() {
        let input = HeldInput::from_directions(&["left", "up", "jump"]);
        assert!(input.left);
        assert!(input.up);
        assert!(!input.right);
        assert!(!input.bomb);
        assert!(input.is_diagonal());
    }

    #[test]
    fn test_opposing_keys_cancel() {
        let input = HeldInput {
            left: true,
            right: true,
            ..Default::default()
        };
        assert_eq!(input.direction(), (0.0, 0.0));
        assert!(!input.is_diagonal());
    }

    #[test]
    fn test_diagonal_factor_normalizes() {
        let magnitude = (2.0 * DIAGONAL_FACTOR * DIAGONAL_FACTOR).sqrt();
        assert_approx_eq!(magnitude, 1.0, 0.001);
    }

    #[test]
    fn test_held_input_partial_json() {
        let input: HeldInput = serde_json::from_str(r#"{"left":true}"#).unwrap();
        assert!(input.left);
        assert!(!input.bomb);
    }
}
