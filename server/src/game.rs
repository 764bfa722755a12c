use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use shared::{
    FlameDirection, PlayerView, PowerUpKind, SeatId, StatePayload, BOMB_FUSE_MS,
    COLLAPSE_DELAY_MS, COLLAPSE_TIMEOUT_MS, FLAME_LIFETIME_MS, HeldInput, INVULNERABILITY_MS,
    RESPAWN_DELAY_MS, TIMED_OUT_SUFFIX, WORLD_HEIGHT, WORLD_WIDTH,
};
use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use crate::client_manager::HeldInputs;
use crate::config::ArenaConfig;
use crate::delta::{self, PendingChanges, StateSource};
use crate::entity::{Bomb, Flame, Player, PowerUp, Wall};
use crate::error::SimulationFault;
use crate::level::{self, spawn_position, Cell, LevelGrid, Tile};
use crate::physics::{slide, Rect, Vector2};
use crate::scheduler::Scheduler;

/// Upper bound on the simulated step, so a stalled loop cannot tunnel
/// players through walls on the next tick.
pub const MAX_TICK_DT: Duration = Duration::from_millis(50);
/// Life-up is left out so eliminated players cannot seed runaway lives.
const DEATH_DROP_FALLBACK: [PowerUpKind; 4] = [
    PowerUpKind::BombUp,
    PowerUpKind::FlameUp,
    PowerUpKind::SpeedUp,
    PowerUpKind::WallClip,
];
const DEBUG_SAMPLE_TICKS: u64 = 60;

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

/// Delayed effects owned by the main game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    InvulnerabilityEnd { seat: SeatId },
    Respawn { seat: SeatId },
    BombFuse { bomb: u64 },
    FlameExpire { flame: u64 },
    WallCollapse { wall: String },
    WallCollapseTimeout { wall: String },
    PowerUpBurn { name: String },
    PowerUpBurnTimeout { name: String },
}

impl GameEvent {
    fn seat(&self) -> Option<SeatId> {
        match self {
            GameEvent::InvulnerabilityEnd { seat } | GameEvent::Respawn { seat } => Some(*seat),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct TickOutcome {
    pub delta: StatePayload,
    /// Set on the single tick where fewer than two players still have lives.
    pub round_over: bool,
}

/// The authoritative main game: players, level entities and their timers.
pub struct MainGame {
    players: Vec<Player>,
    grid: LevelGrid,
    solid_walls: Vec<Wall>,
    surrounding_walls: Vec<Wall>,
    weak_walls: BTreeMap<String, Wall>,
    power_ups: BTreeMap<String, PowerUp>,
    bombs: BTreeMap<u64, Bomb>,
    flames: BTreeMap<u64, Flame>,
    events: Scheduler<GameEvent>,
    changes: PendingChanges,
    rng: StdRng,
    weak_wall_density: f64,
    next_entity_id: u64,
    level: u32,
    ending: bool,
    tick: u64,
}

impl MainGame {
    pub fn new(config: &ArenaConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            players: Vec::new(),
            grid: LevelGrid::default(),
            solid_walls: Vec::new(),
            surrounding_walls: Vec::new(),
            weak_walls: BTreeMap::new(),
            power_ups: BTreeMap::new(),
            bombs: BTreeMap::new(),
            flames: BTreeMap::new(),
            events: Scheduler::new(),
            changes: PendingChanges::default(),
            rng,
            weak_wall_density: config.weak_wall_density,
            next_entity_id: 0,
            level: 0,
            ending: false,
            tick: 0,
        }
    }

    /// Advances to the next level, builds its geometry and seats one player
    /// per entry. Returns the full snapshot for `startgame`.
    pub fn start(&mut self, seats: &[(SeatId, String)], now: Instant) -> StatePayload {
        self.next_level();
        self.players.clear();
        self.ending = false;

        let layout = level::generate(self.level, self.weak_wall_density, &mut self.rng);
        self.grid = layout.grid;
        self.solid_walls = layout.solid_walls;
        self.surrounding_walls = layout.surrounding_walls;
        self.weak_walls = layout.weak_walls;
        self.power_ups = layout.power_ups;

        for (seat, nickname) in seats {
            self.players
                .push(Player::new(*seat, nickname.clone(), spawn_position(*seat)));
            self.events.schedule(
                now,
                ms(INVULNERABILITY_MS),
                GameEvent::InvulnerabilityEnd { seat: *seat },
            );
        }

        info!(
            "Main game started on level {} with {} players",
            self.level,
            self.players.len()
        );
        self.snapshot()
    }

    /// Wipes walls, power-ups, bombs, flames and every pending timer, then
    /// bumps the level index. Players are kept.
    pub fn next_level(&mut self) {
        self.clear_entities();
        self.level += 1;
    }

    /// Drops everything from the finished round, players included.
    pub fn reset(&mut self) {
        self.clear_entities();
        self.players.clear();
        self.ending = false;
    }

    fn clear_entities(&mut self) {
        self.grid = LevelGrid::default();
        self.solid_walls.clear();
        self.surrounding_walls.clear();
        self.weak_walls.clear();
        self.power_ups.clear();
        self.bombs.clear();
        self.flames.clear();
        self.events.clear();
        self.changes = PendingChanges::default();
    }

    /// Full state including walls and power-ups.
    pub fn snapshot(&mut self) -> StatePayload {
        let changes = self.changes.take();
        delta::full_state(&self.source(), changes)
    }

    fn take_delta(&mut self) -> StatePayload {
        let changes = self.changes.take();
        delta::reduced_state(&self.source(), changes)
    }

    fn source(&self) -> StateSource<'_> {
        StateSource {
            players: &self.players,
            solid_walls: &self.solid_walls,
            surrounding_walls: &self.surrounding_walls,
            weak_walls: &self.weak_walls,
            power_ups: &self.power_ups,
            level: self.level,
        }
    }

    /// Runs one simulation step
    ///
    /// Due timers fire first, then every player is moved in list order. A
    /// fault in one player's update resets that player and the tick goes on
    /// with the rest.
    pub fn tick(&mut self, now: Instant, dt: Duration, inputs: &mut HeldInputs) -> TickOutcome {
        self.tick += 1;

        for (_, event) in self.events.pop_due(now) {
            self.handle_event(event, now);
        }

        let dt = dt.min(MAX_TICK_DT).as_secs_f32();
        for index in 0..self.players.len() {
            let seat = self.players[index].id;
            let mut input = inputs.current(seat);
            if self.ending {
                input.bomb = false;
            }
            if let Err(fault) = self.update_player(index, &input, dt, now) {
                warn!("{}; returning player to spawn", fault);
                self.players[index].reset_to_spawn();
            }
            inputs.clear_bomb(seat);
        }

        let round_over = !self.ending && self.players_with_lives() < 2;
        if round_over {
            self.ending = true;
            info!("Round over on level {}", self.level);
        }

        if self.tick % DEBUG_SAMPLE_TICKS == 0 {
            debug!(
                "Tick {}: {} players, {} bombs, {} flames, {} timers",
                self.tick,
                self.players.len(),
                self.bombs.len(),
                self.flames.len(),
                self.events.len()
            );
        }

        TickOutcome {
            delta: self.take_delta(),
            round_over,
        }
    }

    fn update_player(
        &mut self,
        index: usize,
        input: &HeldInput,
        dt: f32,
        now: Instant,
    ) -> Result<(), SimulationFault> {
        if !self.players[index].alive {
            return Ok(());
        }

        let body = self.players[index].rect();
        let seat = self.players[index].id;
        if !body.is_finite() {
            return Err(SimulationFault::NonFinitePosition {
                seat,
                x: body.x,
                y: body.y,
            });
        }
        if body.x < 0.0 || body.y < 0.0 || body.right() > WORLD_WIDTH || body.bottom() > WORLD_HEIGHT
        {
            return Err(SimulationFault::OffGrid {
                seat,
                x: body.x,
                y: body.y,
            });
        }

        if input.bomb {
            self.drop_bomb(index, now);
        }

        let (speed, wall_clip, vulnerable) = {
            let player = &mut self.players[index];
            if input.left {
                player.facing_left = true;
            }
            if input.right {
                player.facing_left = false;
            }
            (player.speed, player.wall_clip, player.vulnerable)
        };

        let offset = Vector2::from_input(input, speed, dt);
        let tentative = body.translate(offset);
        let swept = body.union(&tentative);

        // A fast diagonal sweep can touch two pillars while only one blocks
        let mut blockers: Vec<Rect> = self
            .solid_walls
            .iter()
            .map(Wall::rect)
            .filter(|rect| rect.overlaps(&swept))
            .collect();
        if !wall_clip {
            blockers.extend(
                self.weak_walls
                    .values()
                    .map(Wall::rect)
                    .filter(|rect| rect.overlaps(&swept)),
            );
        }
        for bomb in self.bombs.values_mut() {
            let rect = bomb.rect();
            if !rect.overlaps(&tentative) {
                bomb.owners.remove(&seat);
            }
            if vulnerable && !bomb.owners.contains(&seat) && rect.overlaps(&swept) {
                blockers.push(rect);
            }
        }

        let moved = slide(body, offset, &blockers).clamp_within(WORLD_WIDTH, WORLD_HEIGHT);
        if !moved.is_finite() {
            return Err(SimulationFault::NonFinitePosition {
                seat,
                x: moved.x,
                y: moved.y,
            });
        }
        {
            let player = &mut self.players[index];
            player.x = moved.x;
            player.y = moved.y;
        }

        if vulnerable {
            let owner = self
                .flames
                .values()
                .find(|flame| moved.hits(&flame.rect()))
                .map(|flame| flame.owner);
            if let Some(owner) = owner {
                let killer = self
                    .player(owner)
                    .map(|player| player.name.clone())
                    .unwrap_or_else(|| "bomb".to_string());
                self.kill(index, killer, now);
                return Ok(());
            }
        }

        let picked = self
            .power_ups
            .values()
            .find(|power_up| power_up.is_exposed() && moved.hits(&power_up.rect()))
            .map(|power_up| power_up.name.clone());
        if let Some(name) = picked {
            // Removed before the effect so it can only be consumed once
            if let Some(power_up) = self.power_ups.remove(&name) {
                self.players[index].apply_power_up(power_up.kind);
                self.changes.picked_items.push(name);
            }
        }

        Ok(())
    }

    fn drop_bomb(&mut self, index: usize, now: Instant) {
        let (seat, cell, power) = {
            let player = &self.players[index];
            if !player.alive || player.bomb_capacity == 0 {
                return;
            }
            (player.id, player.cell(), player.bomb_power)
        };
        if self.grid.get(cell) != Tile::Empty || self.bombs.values().any(|bomb| bomb.cell == cell)
        {
            return;
        }

        let id = self.next_id();
        let mut bomb = Bomb {
            id,
            owner: seat,
            cell,
            power,
            owners: HashSet::new(),
        };
        let rect = bomb.rect();
        bomb.owners = self
            .players
            .iter()
            .filter(|player| player.alive && player.rect().overlaps(&rect))
            .map(|player| player.id)
            .collect();
        bomb.owners.insert(seat);

        self.players[index].bomb_capacity -= 1;
        self.changes.new_bombs.insert(bomb.name(), bomb.view());
        self.events
            .schedule(now, ms(BOMB_FUSE_MS), GameEvent::BombFuse { bomb: id });
        self.bombs.insert(id, bomb);
    }

    fn kill(&mut self, index: usize, killer: String, now: Instant) {
        let (seat, lives, cell, history) = {
            let player = &mut self.players[index];
            player.alive = false;
            player.lives = player.lives.saturating_sub(1);
            player.killer = killer;
            (player.id, player.lives, player.cell(), player.collected.clone())
        };
        info!(
            "Player {} hit by {}'s bomb, {} lives left",
            seat, self.players[index].killer, lives
        );

        self.events
            .schedule(now, ms(RESPAWN_DELAY_MS), GameEvent::Respawn { seat });

        if lives == 0 {
            let drop = history
                .choose(&mut self.rng)
                .copied()
                .or_else(|| DEATH_DROP_FALLBACK.choose(&mut self.rng).copied());
            if let Some(kind) = drop {
                self.place_power_up(kind, cell);
            }
        }
    }

    /// Puts a power-up on a cell and announces it unless a weak wall hides it.
    pub fn place_power_up(&mut self, kind: PowerUpKind, cell: Cell) -> String {
        let hidden = self.grid.get(cell) == Tile::Weak;
        let power_up = PowerUp::new(kind, cell, hidden);
        let name = power_up.name.clone();
        if !hidden {
            self.changes.new_items.insert(name.clone(), power_up.view());
        }
        self.power_ups.insert(name.clone(), power_up);
        name
    }

    fn handle_event(&mut self, event: GameEvent, now: Instant) {
        match event {
            GameEvent::InvulnerabilityEnd { seat } => {
                if let Some(player) = self.player_mut(seat) {
                    player.vulnerable = true;
                }
            }
            GameEvent::Respawn { seat } => {
                let revived = match self.player_mut(seat) {
                    Some(player) => {
                        player.killer.clear();
                        if player.lives > 0 {
                            player.reset_to_spawn();
                            player.alive = true;
                            player.vulnerable = false;
                            true
                        } else {
                            false
                        }
                    }
                    None => false,
                };
                if revived {
                    self.events.schedule(
                        now,
                        ms(INVULNERABILITY_MS),
                        GameEvent::InvulnerabilityEnd { seat },
                    );
                }
            }
            GameEvent::BombFuse { bomb } => {
                if let Some(bomb) = self.bombs.remove(&bomb) {
                    self.explode(bomb, now);
                }
            }
            GameEvent::FlameExpire { flame } => {
                self.flames.remove(&flame);
            }
            GameEvent::WallCollapse { wall } => {
                if let Some(wall) = self.weak_walls.remove(&wall) {
                    let cell = Cell::new(wall.row as usize, wall.col as usize);
                    self.grid.set(cell, Tile::Empty);
                    for power_up in self.power_ups.values_mut() {
                        if power_up.cell == cell {
                            power_up.hidden = false;
                        }
                    }
                }
            }
            GameEvent::WallCollapseTimeout { wall } => {
                self.changes
                    .collapsing_walls
                    .push(format!("{}{}", wall, TIMED_OUT_SUFFIX));
            }
            GameEvent::PowerUpBurn { name } => {
                self.power_ups.remove(&name);
            }
            GameEvent::PowerUpBurnTimeout { name } => {
                self.changes
                    .burning_items
                    .push(format!("{}{}", name, TIMED_OUT_SUFFIX));
            }
        }
    }

    fn explode(&mut self, bomb: Bomb, now: Instant) {
        self.changes.removed_bombs.insert(bomb.name(), bomb.view());
        if let Some(owner) = self.player_mut(bomb.owner) {
            owner.bomb_capacity += 1;
        }

        self.spawn_flame(bomb.cell, FlameDirection::Horizontal, bomb.owner, now);
        let rays = [
            (0, -1, FlameDirection::Horizontal, FlameDirection::LeftEnd),
            (0, 1, FlameDirection::Horizontal, FlameDirection::RightEnd),
            (-1, 0, FlameDirection::Vertical, FlameDirection::UpEnd),
            (1, 0, FlameDirection::Vertical, FlameDirection::DownEnd),
        ];
        for (d_row, d_col, middle, end) in rays {
            let mut cell = bomb.cell;
            for step in 1..=bomb.power {
                cell = match cell.offset(d_row, d_col) {
                    Some(next) => next,
                    None => break,
                };
                match self.grid.get(cell) {
                    Tile::Solid => break,
                    Tile::Weak => {
                        self.spawn_flame(cell, end, bomb.owner, now);
                        self.ignite_wall(cell, now);
                        break;
                    }
                    Tile::Empty => {
                        let direction = if step == bomb.power { end } else { middle };
                        self.spawn_flame(cell, direction, bomb.owner, now);
                    }
                }
            }
        }
    }

    fn spawn_flame(&mut self, cell: Cell, direction: FlameDirection, owner: SeatId, now: Instant) {
        let id = self.next_id();
        let flame = Flame {
            id,
            direction,
            cell,
            owner,
        };
        self.changes.new_flames.push(flame.view());
        self.events
            .schedule(now, ms(FLAME_LIFETIME_MS), GameEvent::FlameExpire { flame: id });
        self.flames.insert(id, flame);

        let burning: Vec<String> = self
            .power_ups
            .values_mut()
            .filter(|power_up| power_up.cell == cell && power_up.is_exposed())
            .map(|power_up| {
                power_up.burning = true;
                power_up.name.clone()
            })
            .collect();
        for name in burning {
            self.changes.burning_items.push(name.clone());
            self.events.schedule(
                now,
                ms(COLLAPSE_DELAY_MS),
                GameEvent::PowerUpBurn { name: name.clone() },
            );
            self.events.schedule(
                now,
                ms(COLLAPSE_TIMEOUT_MS),
                GameEvent::PowerUpBurnTimeout { name },
            );
        }
    }

    fn ignite_wall(&mut self, cell: Cell, now: Instant) {
        let id = level::weak_wall_id(cell);
        let wall = match self.weak_walls.get_mut(&id) {
            Some(wall) if !wall.collapsing => wall,
            _ => return,
        };
        wall.collapsing = true;
        self.changes.collapsing_walls.push(id.clone());
        self.events.schedule(
            now,
            ms(COLLAPSE_DELAY_MS),
            GameEvent::WallCollapse { wall: id.clone() },
        );
        self.events.schedule(
            now,
            ms(COLLAPSE_TIMEOUT_MS),
            GameEvent::WallCollapseTimeout { wall: id },
        );
    }

    /// Takes a seat out of the running game and cancels its timers. Bombs it
    /// already dropped still go off.
    pub fn remove_player(&mut self, seat: SeatId) -> bool {
        let before = self.players.len();
        self.players.retain(|player| player.id != seat);
        self.events.retain(|event| event.seat() != Some(seat));
        let removed = self.players.len() != before;
        if removed {
            info!("Player {} removed from the main game", seat);
        }
        removed
    }

    /// First player with lives left, if any.
    pub fn winner(&self) -> Option<PlayerView> {
        self.players
            .iter()
            .find(|player| player.lives != 0)
            .map(Player::view)
    }

    pub fn players_with_lives(&self) -> usize {
        self.players.iter().filter(|player| player.lives != 0).count()
    }

    fn next_id(&mut self) -> u64 {
        self.next_entity_id += 1;
        self.next_entity_id
    }

    pub fn player(&self, seat: SeatId) -> Option<&Player> {
        self.players.iter().find(|player| player.id == seat)
    }

    pub fn player_mut(&mut self, seat: SeatId) -> Option<&mut Player> {
        self.players.iter_mut().find(|player| player.id == seat)
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn bombs(&self) -> impl Iterator<Item = &Bomb> {
        self.bombs.values()
    }

    pub fn flames(&self) -> impl Iterator<Item = &Flame> {
        self.flames.values()
    }

    pub fn weak_walls(&self) -> &BTreeMap<String, Wall> {
        &self.weak_walls
    }

    pub fn solid_walls(&self) -> &[Wall] {
        &self.solid_walls
    }

    pub fn power_ups(&self) -> &BTreeMap<String, PowerUp> {
        &self.power_ups
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn is_ending(&self) -> bool {
        self.ending
    }
}
