use shared::{
    BombView, FlameDirection, FlameView, PlayerView, PowerUpKind, PowerUpView, SeatId, WallKind,
    WallView, GRID_STEP, PLAYER_SIZE, PLAYER_SPEED, SPEED_INCREMENT, STARTING_BOMBS,
    STARTING_LIVES, STARTING_POWER,
};
use std::collections::HashSet;

use crate::level::{cell_of, cell_origin, Cell};
use crate::physics::Rect;

/// A main-game player. Owned by the tick engine and only mutated inside a
/// tick or a timer event it handles.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: SeatId,
    pub name: String,
    pub size: f32,
    /// Pixels per second.
    pub speed: f32,
    pub x: f32,
    pub y: f32,
    pub spawn_x: f32,
    pub spawn_y: f32,
    pub lives: u32,
    pub alive: bool,
    pub vulnerable: bool,
    pub bomb_capacity: u32,
    pub bomb_power: u32,
    pub wall_clip: bool,
    pub facing_left: bool,
    pub killer: String,
    /// Every power-up picked up this round, in order. Biases the death drop.
    pub collected: Vec<PowerUpKind>,
}

impl Player {
    pub fn new(id: SeatId, name: String, spawn: (f32, f32)) -> Self {
        Self {
            id,
            name,
            size: PLAYER_SIZE,
            speed: PLAYER_SPEED,
            x: spawn.0,
            y: spawn.1,
            spawn_x: spawn.0,
            spawn_y: spawn.1,
            lives: STARTING_LIVES,
            alive: true,
            vulnerable: false,
            bomb_capacity: STARTING_BOMBS,
            bomb_power: STARTING_POWER,
            wall_clip: false,
            facing_left: false,
            killer: String::new(),
            collected: Vec::new(),
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::square(self.x, self.y, self.size)
    }

    /// Grid cell under the player's center.
    pub fn cell(&self) -> Cell {
        let center = self.rect().center();
        cell_of(center.x, center.y)
    }

    pub fn reset_to_spawn(&mut self) {
        self.x = self.spawn_x;
        self.y = self.spawn_y;
    }

    pub fn apply_power_up(&mut self, kind: PowerUpKind) {
        match kind {
            PowerUpKind::BombUp => self.bomb_capacity += 1,
            PowerUpKind::FlameUp => self.bomb_power += 1,
            PowerUpKind::SpeedUp => self.speed += SPEED_INCREMENT,
            PowerUpKind::LifeUp => self.lives += 1,
            PowerUpKind::WallClip => self.wall_clip = true,
            PowerUpKind::BombClip => {}
        }
        self.collected.push(kind);
    }

    pub fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id,
            size: self.size,
            lives: self.lives,
            name: self.name.clone(),
            x: self.x,
            y: self.y,
            vulnerable: self.vulnerable,
            left: self.facing_left,
            alive: self.alive,
            killer: self.killer.clone(),
        }
    }
}

/// Solid, weak or border wall. Border walls sit outside the grid, so their
/// cell can be negative.
#[derive(Debug, Clone)]
pub struct Wall {
    pub id: String,
    pub kind: WallKind,
    pub row: i32,
    pub col: i32,
    pub level: u32,
    /// Set once a flame reached a weak wall; it collapses on a timer.
    pub collapsing: bool,
}

impl Wall {
    pub fn new(id: String, kind: WallKind, row: i32, col: i32, level: u32) -> Self {
        Self {
            id,
            kind,
            row,
            col,
            level,
            collapsing: false,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::square(
            self.col as f32 * GRID_STEP,
            self.row as f32 * GRID_STEP,
            GRID_STEP,
        )
    }

    pub fn view(&self) -> WallView {
        let rect = self.rect();
        WallView {
            id: self.id.clone(),
            kind: self.kind,
            x: rect.x,
            y: rect.y,
            size: GRID_STEP,
            level: self.level,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Bomb {
    pub id: u64,
    pub owner: SeatId,
    pub cell: Cell,
    pub power: u32,
    /// Seats standing on the bomb when it was dropped. A seat leaves the set
    /// once it steps off, and from then on the bomb blocks it.
    pub owners: HashSet<SeatId>,
}

impl Bomb {
    pub fn name(&self) -> String {
        format!("bomb{}", self.id)
    }

    pub fn rect(&self) -> Rect {
        let (x, y) = cell_origin(self.cell);
        Rect::square(x, y, GRID_STEP)
    }

    pub fn view(&self) -> BombView {
        let rect = self.rect();
        BombView {
            name: self.name(),
            x: rect.x,
            y: rect.y,
            size: GRID_STEP,
            power: self.power,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Flame {
    pub id: u64,
    pub direction: FlameDirection,
    pub cell: Cell,
    /// Seat whose bomb produced the flame, for killer attribution.
    pub owner: SeatId,
}

impl Flame {
    pub fn rect(&self) -> Rect {
        let (x, y) = cell_origin(self.cell);
        Rect::square(x, y, GRID_STEP)
    }

    pub fn view(&self) -> FlameView {
        let rect = self.rect();
        FlameView {
            direction: self.direction,
            x: rect.x,
            y: rect.y,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PowerUp {
    pub name: String,
    pub kind: PowerUpKind,
    pub cell: Cell,
    /// Under a weak wall that has not collapsed yet.
    pub hidden: bool,
    pub burning: bool,
}

impl PowerUp {
    pub fn new(kind: PowerUpKind, cell: Cell, hidden: bool) -> Self {
        Self {
            name: power_up_name(kind, cell),
            kind,
            cell,
            hidden,
            burning: false,
        }
    }

    /// Can be picked up or burnt.
    pub fn is_exposed(&self) -> bool {
        !self.hidden && !self.burning
    }

    pub fn rect(&self) -> Rect {
        let (x, y) = cell_origin(self.cell);
        Rect::square(x, y, GRID_STEP)
    }

    pub fn view(&self) -> PowerUpView {
        let rect = self.rect();
        PowerUpView {
            name: self.name.clone(),
            kind: self.kind,
            x: rect.x,
            y: rect.y,
            size: GRID_STEP,
            row: self.cell.row,
            col: self.cell.col,
        }
    }
}

/// `{kind}{col:02}{row:02}`, e.g. `speedUp0304`.
pub fn power_up_name(kind: PowerUpKind, cell: Cell) -> String {
    format!("{}{:02}{:02}", kind.tag(), cell.col, cell.row)
}
