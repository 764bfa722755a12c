//! Socket-free orchestration of one arena.
//!
//! [`Arena`] owns every piece of authoritative state: the registry, the
//! session state machine and both game loops. The network layer feeds it
//! events with the current time and forwards whatever it puts in the
//! [`Outbox`]. Nothing in here blocks or awaits, so the whole arena can be
//! driven step by step from tests.

use log::{debug, info, warn};
use shared::{ClientMessage, ServerMessage, MAX_CHAT_LEN, MAX_SEATS};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::client_manager::{ClientManager, ConnId, Seat};
use crate::config::ArenaConfig;
use crate::error::JoinError;
use crate::game::MainGame;
use crate::mini_game::MiniGame;
use crate::outbox::Outbox;
use crate::session::{Session, Transition};

/// Which simulation the tick drives. Exactly one runs at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveLoop {
    MiniGame,
    MainGame,
}

pub struct Arena {
    config: ArenaConfig,
    clients: ClientManager,
    session: Session,
    mini_game: MiniGame,
    main_game: MainGame,
    active_loop: ActiveLoop,
    last_tick: Option<Instant>,
}

fn chat(seat: &Seat, message: String) -> ServerMessage {
    ServerMessage::Chat {
        nickname: seat.nickname.clone(),
        player_id: seat.id,
        message,
    }
}

impl Arena {
    pub fn new(config: ArenaConfig) -> Self {
        Self {
            clients: ClientManager::new(MAX_SEATS),
            session: Session::new(config.lobby_secs, config.countdown_secs),
            mini_game: MiniGame::new(),
            main_game: MainGame::new(&config),
            active_loop: ActiveLoop::MiniGame,
            last_tick: None,
            config,
        }
    }

    pub fn connect(&mut self, conn_id: ConnId, addr: SocketAddr, now: Instant) {
        self.clients.add_connection(conn_id, addr, now);
    }

    pub fn handle_pong(&mut self, conn_id: ConnId, now: Instant) {
        self.clients.refresh_pong(conn_id, now);
    }

    /// Applies one decoded client message
    pub fn handle_message(
        &mut self,
        conn_id: ConnId,
        message: ClientMessage,
        now: Instant,
        out: &mut Outbox,
    ) {
        if !self.clients.contains(conn_id) {
            return;
        }
        let seat = self.clients.seat_of(conn_id).cloned();

        match message {
            ClientMessage::Join { nickname } => self.join(conn_id, &nickname, now, out),
            ClientMessage::Input { payload } => {
                if let Some(seat) = seat {
                    self.clients.set_input(seat.id, payload.into_held());
                }
            }
            ClientMessage::Chat { message } => {
                if let Some(seat) = seat {
                    let message: String = message.trim().chars().take(MAX_CHAT_LEN).collect();
                    if !message.is_empty() {
                        out.broadcast(chat(&seat, message));
                    }
                }
            }
            ClientMessage::RequestPoints => {
                out.broadcast(ServerMessage::Points {
                    points: self.clients.points(),
                    players: None,
                });
            }
            ClientMessage::RequestPointsAndPlayers => {
                out.broadcast(ServerMessage::Points {
                    points: self.clients.points(),
                    players: Some(self.mini_game.state()),
                });
            }
            ClientMessage::LeaveGame => {
                out.send(conn_id, ServerMessage::LeaveConfirmed);
                self.disconnect(conn_id, "left the game", now, out);
                out.close(conn_id);
            }
            ClientMessage::BackToLobby => {
                // Only meaningful for a seat that is still in a running round
                match seat {
                    Some(seat) if self.session.in_game() => {
                        if self.main_game.remove_player(seat.id) {
                            let message = format!("{} exited to lobby!", seat.nickname);
                            out.broadcast(chat(&seat, message));
                        }
                    }
                    _ => debug!("Connection {} asked for the lobby outside a round", conn_id),
                }
            }
        }
    }

    fn join(&mut self, conn_id: ConnId, nickname: &str, now: Instant, out: &mut Outbox) {
        let seat = match self.clients.join(conn_id, nickname) {
            Ok(seat) => seat,
            Err(JoinError::ServerFull) => {
                warn!("Connection {} rejected: server full", conn_id);
                out.send(
                    conn_id,
                    ServerMessage::Error {
                        message: JoinError::ServerFull.to_string(),
                    },
                );
                out.close(conn_id);
                return;
            }
            Err(error @ JoinError::DuplicateNickname(_)) => {
                warn!("Connection {} rejected: {}", conn_id, error);
                out.send(
                    conn_id,
                    ServerMessage::DuplicateNickname {
                        message: error.to_string(),
                    },
                );
                return;
            }
            Err(JoinError::AlreadyJoined) => {
                warn!("Connection {} sent a second join", conn_id);
                return;
            }
            Err(error @ JoinError::UnknownConnection(_)) => {
                warn!("Ignoring join: {}", error);
                return;
            }
        };

        self.mini_game.add_player(seat.id, &seat.nickname);
        let count = self.clients.seat_count();

        out.send(conn_id, ServerMessage::PlayerId { id: seat.id });
        out.send(conn_id, ServerMessage::PlayerCount { count });
        out.send(
            conn_id,
            ServerMessage::Points {
                points: self.clients.points(),
                players: Some(self.mini_game.state()),
            },
        );

        self.session.seat_count_changed(count, now, out);
        out.broadcast(ServerMessage::PlayerCount { count });
        let message = format!("{} joined the game!", seat.nickname);
        out.broadcast(chat(&seat, message));
    }

    /// Single cleanup path for leave, close, socket error and heartbeat
    /// timeout. Returns false when the connection was already cleaned up.
    pub fn disconnect(
        &mut self,
        conn_id: ConnId,
        reason: &str,
        now: Instant,
        out: &mut Outbox,
    ) -> bool {
        let client = match self.clients.remove_connection(conn_id) {
            Some(client) => client,
            None => return false,
        };
        info!("Connection {} cleaned up: {}", conn_id, reason);

        if let Some(seat) = client.seat {
            self.main_game.remove_player(seat.id);
            self.mini_game.remove_player(seat.id);

            let count = self.clients.seat_count();
            let message = format!("{} left the game!", seat.nickname);
            out.broadcast(chat(&seat, message));
            out.broadcast(ServerMessage::Points {
                points: self.clients.points(),
                players: None,
            });
            self.session.seat_count_changed(count, now, out);
            out.broadcast(ServerMessage::PlayerCount { count });
        }
        true
    }

    /// Force-closes connections that stopped answering pings.
    pub fn check_heartbeats(&mut self, now: Instant, out: &mut Outbox) -> Vec<ConnId> {
        let timed_out = self.clients.check_timeouts(now, self.config.pong_timeout);
        for conn_id in &timed_out {
            warn!("Connection {} missed its heartbeat", conn_id);
            self.disconnect(*conn_id, "heartbeat timeout", now, out);
            out.close(*conn_id);
        }
        timed_out
    }

    /// Advances whichever loop is active by one step.
    pub fn tick(&mut self, now: Instant, out: &mut Outbox) {
        let dt = self
            .last_tick
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or_else(|| self.tick_interval());
        self.last_tick = Some(now);

        match self.active_loop {
            ActiveLoop::MiniGame => {
                let inputs = self.clients.inputs();
                self.mini_game.tick(|seat| inputs.current(seat));
                if !self.mini_game.is_empty() {
                    out.broadcast(ServerMessage::State {
                        payload: self.mini_game.state(),
                    });
                }
            }
            ActiveLoop::MainGame => {
                let outcome = self.main_game.tick(now, dt, self.clients.inputs_mut());
                out.broadcast(ServerMessage::GameState {
                    payload: outcome.delta,
                });
                if outcome.round_over {
                    self.session.begin_end_sequence(now);
                }
            }
        }
    }

    /// Fires due session timers and carries out the resulting transitions.
    pub fn poll_timers(&mut self, now: Instant, out: &mut Outbox) {
        for transition in self.session.poll(now, out) {
            match transition {
                Transition::StartMainGame => self.start_main_game(now, out),
                Transition::AnnounceWinner => self.announce_winner(out),
                Transition::ReturnToLobby => self.return_to_lobby(now, out),
            }
        }
    }

    fn start_main_game(&mut self, now: Instant, out: &mut Outbox) {
        let seats: Vec<_> = self
            .clients
            .seats()
            .into_iter()
            .map(|seat| (seat.id, seat.nickname.clone()))
            .collect();
        let payload = self.main_game.start(&seats, now);
        self.active_loop = ActiveLoop::MainGame;
        self.last_tick = None;
        out.broadcast(ServerMessage::StartGame { payload });
    }

    fn announce_winner(&mut self, out: &mut Outbox) {
        let winner = self.main_game.winner();
        match &winner {
            Some(winner) => {
                self.clients.award_point(winner.id);
                info!("Player {} ({}) wins the round", winner.id, winner.name);
            }
            None => info!("Round ended in a tie"),
        }
        out.broadcast(ServerMessage::EndGame {
            winner,
            points: self.clients.points(),
        });
    }

    fn return_to_lobby(&mut self, now: Instant, out: &mut Outbox) {
        self.main_game.reset();
        self.active_loop = ActiveLoop::MiniGame;
        self.last_tick = None;
        out.broadcast(ServerMessage::BackToLobby);
        let count = self.clients.seat_count();
        self.session.seat_count_changed(count, now, out);
    }

    pub fn tick_interval(&self) -> Duration {
        match self.active_loop {
            ActiveLoop::MiniGame => self.config.mini_tick,
            ActiveLoop::MainGame => self.config.main_tick,
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.session.next_deadline()
    }

    pub fn active_loop(&self) -> ActiveLoop {
        self.active_loop
    }

    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn main_game(&self) -> &MainGame {
        &self.main_game
    }

    pub fn main_game_mut(&mut self) -> &mut MainGame {
        &mut self.main_game
    }

    pub fn mini_game(&self) -> &MiniGame {
        &self.mini_game
    }
}
