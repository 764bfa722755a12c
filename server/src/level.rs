//! Level geometry: the wall grid, spawn corners and the procedural weak
//! wall and power-up seeding done at the start of every level.

use log::info;
use rand::seq::SliceRandom;
use rand::Rng;
use shared::{
    PowerUpKind, SeatId, WallKind, GRID_COLS, GRID_ROWS, GRID_STEP, PLAYER_SIZE,
};
use std::collections::BTreeMap;

use crate::entity::{PowerUp, Wall};

const HIDDEN_POWER_UP_CHANCE: f64 = 0.3;
const SEEDED_POWER_UPS: [PowerUpKind; 5] = [
    PowerUpKind::BombUp,
    PowerUpKind::FlameUp,
    PowerUpKind::SpeedUp,
    PowerUpKind::LifeUp,
    PowerUpKind::WallClip,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
}

impl Cell {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Neighbour one step away, if it is still on the grid.
    pub fn offset(&self, d_row: i32, d_col: i32) -> Option<Cell> {
        let row = self.row as i32 + d_row;
        let col = self.col as i32 + d_col;
        if row < 0 || col < 0 || row >= GRID_ROWS as i32 || col >= GRID_COLS as i32 {
            None
        } else {
            Some(Cell::new(row as usize, col as usize))
        }
    }
}

/// Grid cell containing a point, clamped onto the grid.
pub fn cell_of(x: f32, y: f32) -> Cell {
    let col = (x / GRID_STEP).floor().clamp(0.0, (GRID_COLS - 1) as f32) as usize;
    let row = (y / GRID_STEP).floor().clamp(0.0, (GRID_ROWS - 1) as f32) as usize;
    Cell::new(row, col)
}

/// Top-left pixel of a cell.
pub fn cell_origin(cell: Cell) -> (f32, f32) {
    (cell.col as f32 * GRID_STEP, cell.row as f32 * GRID_STEP)
}

pub fn spawn_cell(seat: SeatId) -> Cell {
    match seat {
        2 => Cell::new(0, GRID_COLS - 1),
        3 => Cell::new(GRID_ROWS - 1, GRID_COLS - 1),
        4 => Cell::new(GRID_ROWS - 1, 0),
        _ => Cell::new(0, 0),
    }
}

/// Player position centred in the seat's spawn corner.
pub fn spawn_position(seat: SeatId) -> (f32, f32) {
    let (x, y) = cell_origin(spawn_cell(seat));
    let margin = (GRID_STEP - PLAYER_SIZE) / 2.0;
    (x + margin, y + margin)
}

/// Corners and their two grid neighbours never get a weak wall.
fn is_spawn_area(cell: Cell) -> bool {
    (1..=4).any(|seat| {
        let corner = spawn_cell(seat);
        corner.row.abs_diff(cell.row) + corner.col.abs_diff(cell.col) <= 1
    })
}

/// Solid pillars only ever sit on odd rows and odd columns, which keeps every
/// even row and column open and the grid connected. The pattern cycles with
/// the level index.
pub fn is_solid(level: u32, cell: Cell) -> bool {
    if cell.row % 2 == 0 || cell.col % 2 == 0 {
        return false;
    }
    match level.saturating_sub(1) % 3 {
        0 => true,
        1 => (cell.row / 2 + cell.col / 2) % 2 == 0,
        _ => cell.row != GRID_ROWS / 2,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tile {
    Empty,
    Solid,
    Weak,
}

/// Collision map of walls. Bombs are tracked by the tick engine.
#[derive(Debug, Clone)]
pub struct LevelGrid {
    tiles: Vec<Tile>,
}

impl Default for LevelGrid {
    fn default() -> Self {
        Self {
            tiles: vec![Tile::Empty; GRID_ROWS * GRID_COLS],
        }
    }
}

impl LevelGrid {
    pub fn get(&self, cell: Cell) -> Tile {
        self.tiles
            .get(cell.row * GRID_COLS + cell.col)
            .copied()
            .unwrap_or(Tile::Solid)
    }

    pub fn set(&mut self, cell: Cell, tile: Tile) {
        if let Some(slot) = self.tiles.get_mut(cell.row * GRID_COLS + cell.col) {
            *slot = tile;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.iter().all(|tile| *tile == Tile::Empty)
    }
}

/// Everything built at level start
#[derive(Debug, Default)]
pub struct LevelLayout {
    pub grid: LevelGrid,
    pub solid_walls: Vec<Wall>,
    pub surrounding_walls: Vec<Wall>,
    pub weak_walls: BTreeMap<String, Wall>,
    pub power_ups: BTreeMap<String, PowerUp>,
}

pub fn weak_wall_id(cell: Cell) -> String {
    format!("weak{:02}{:02}", cell.row, cell.col)
}

/// Builds the walls and hidden power-ups of a level
pub fn generate<R: Rng>(level: u32, weak_wall_density: f64, rng: &mut R) -> LevelLayout {
    let mut layout = LevelLayout::default();

    for row in 0..GRID_ROWS {
        for col in 0..GRID_COLS {
            let cell = Cell::new(row, col);
            if is_solid(level, cell) {
                layout.grid.set(cell, Tile::Solid);
                layout.solid_walls.push(Wall::new(
                    format!("solid{:02}{:02}", row, col),
                    WallKind::Solid,
                    row as i32,
                    col as i32,
                    level,
                ));
                continue;
            }

            if is_spawn_area(cell) || !rng.gen_bool(weak_wall_density.clamp(0.0, 1.0)) {
                continue;
            }

            let id = weak_wall_id(cell);
            layout.grid.set(cell, Tile::Weak);
            layout.weak_walls.insert(
                id.clone(),
                Wall::new(id, WallKind::Weak, row as i32, col as i32, level),
            );

            if rng.gen_bool(HIDDEN_POWER_UP_CHANCE) {
                if let Some(kind) = SEEDED_POWER_UPS.choose(rng) {
                    let power_up = PowerUp::new(*kind, cell, true);
                    layout.power_ups.insert(power_up.name.clone(), power_up);
                }
            }
        }
    }

    let (rows, cols) = (GRID_ROWS as i32, GRID_COLS as i32);
    let ring = (-1..=cols).flat_map(|col| [(-1, col), (rows, col)]).chain(
        (0..rows).flat_map(|row| [(row, -1), (row, cols)]),
    );
    for (index, (row, col)) in ring.enumerate() {
        layout.surrounding_walls.push(Wall::new(
            format!("surrounding{}", index),
            WallKind::Surrounding,
            row,
            col,
            level,
        ));
    }

    info!(
        "Level {} generated: {} solid, {} weak walls, {} hidden power-ups",
        level,
        layout.solid_walls.len(),
        layout.weak_walls.len(),
        layout.power_ups.len()
    );
    layout
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::{HashSet, VecDeque};

    fn reachable_from(layout: &LevelLayout, start: Cell) -> HashSet<Cell> {
        // Weak walls can be bombed, so only solid tiles block the path
        let mut seen = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(cell) = queue.pop_front() {
            for (dr, dc) in [(0, 1), (0, -1), (1, 0), (-1, 0)] {
                if let Some(next) = cell.offset(dr, dc) {
                    if layout.grid.get(next) != Tile::Solid && seen.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
        }
        seen
    }

    #[test]
    fn test_cell_of_clamps() {
        assert_eq!(cell_of(-3.0, 10.0), Cell::new(0, 0));
        assert_eq!(cell_of(649.0, 549.0), Cell::new(10, 12));
        assert_eq!(cell_of(1000.0, 1000.0), Cell::new(10, 12));
        assert_eq!(cell_of(75.0, 125.0), Cell::new(2, 1));
    }

    #[test]
    fn test_spawn_corners() {
        assert_eq!(spawn_position(1), (5.0, 5.0));
        assert_eq!(spawn_position(3), (605.0, 505.0));
        assert_eq!(spawn_cell(4), Cell::new(10, 0));
    }

    #[test]
    fn test_walls_never_overlap() {
        let mut rng = StdRng::seed_from_u64(7);
        for level in 1..=3 {
            let layout = generate(level, 0.55, &mut rng);
            for wall in layout.weak_walls.values() {
                let cell = Cell::new(wall.row as usize, wall.col as usize);
                assert!(!is_solid(level, cell));
            }
        }
    }

    #[test]
    fn test_spawn_areas_clear() {
        let mut rng = StdRng::seed_from_u64(11);
        let layout = generate(1, 0.55, &mut rng);
        for seat in 1..=4 {
            let corner = spawn_cell(seat);
            assert_eq!(layout.grid.get(corner), Tile::Empty);
            let free_neighbours = [(0, 1), (0, -1), (1, 0), (-1, 0)]
                .iter()
                .filter_map(|(dr, dc)| corner.offset(*dr, *dc))
                .filter(|cell| layout.grid.get(*cell) == Tile::Empty)
                .count();
            assert_eq!(free_neighbours, 2);
        }
    }

    #[test]
    fn test_every_pattern_is_connected() {
        let mut rng = StdRng::seed_from_u64(3);
        for level in 1..=3 {
            let layout = generate(level, 0.55, &mut rng);
            let open = GRID_ROWS * GRID_COLS - layout.solid_walls.len();
            for seat in 1..=4 {
                assert_eq!(reachable_from(&layout, spawn_cell(seat)).len(), open);
            }
        }
    }

    #[test]
    fn test_patterns_cycle() {
        let pillars = |level| {
            (0..GRID_ROWS)
                .flat_map(|row| (0..GRID_COLS).map(move |col| Cell::new(row, col)))
                .filter(|cell| is_solid(level, *cell))
                .count()
        };
        assert_eq!(pillars(1), 30);
        assert_ne!(pillars(2), pillars(1));
        assert_eq!(pillars(4), pillars(1));
    }

    #[test]
    fn test_hidden_power_ups_sit_under_weak_walls() {
        let mut rng = StdRng::seed_from_u64(21);
        let layout = generate(1, 0.55, &mut rng);
        for power_up in layout.power_ups.values() {
            assert!(power_up.hidden);
            assert_eq!(layout.grid.get(power_up.cell), Tile::Weak);
        }
    }

    #[test]
    fn test_surrounding_ring() {
        let mut rng = StdRng::seed_from_u64(1);
        let layout = generate(1, 0.55, &mut rng);
        assert_eq!(
            layout.surrounding_walls.len(),
            2 * (GRID_COLS + 2) + 2 * GRID_ROWS
        );
    }
}
