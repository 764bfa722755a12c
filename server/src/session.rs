//! Session lifecycle
//!
//! ```text
//! Lobby --2+ seats--> LobbyTimer --elapsed / 4 seats--> Countdown --0--> MainGame
//!   ^                                                                      |
//!   +---- ReturnToLobby <---- AnnounceWinner <---- EndSequence <-----------+
//! ```
//!
//! Lobby and countdown timers tick once per second and broadcast the time
//! left. Any seat change while one of them runs restarts it from its full
//! duration; dropping below two seats clears both.

use log::info;
use shared::{ServerMessage, END_ANNOUNCE_DELAY_MS, MAX_SEATS, RETURN_TO_LOBBY_DELAY_MS};
use std::time::{Duration, Instant};

use crate::outbox::Outbox;
use crate::scheduler::{Scheduler, TimerHandle};

const SECOND: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lobby,
    LobbyTimer { remaining: u32 },
    Countdown { remaining: u32 },
    MainGame,
    EndSequence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEvent {
    LobbyTick,
    CountdownTick,
    AnnounceWinner,
    ReturnToLobby,
}

/// What the owner has to do after a timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    StartMainGame,
    AnnounceWinner,
    ReturnToLobby,
}

pub struct Session {
    phase: Phase,
    lobby_secs: u32,
    countdown_secs: u32,
    timers: Scheduler<SessionEvent>,
    phase_timer: Option<TimerHandle>,
}

impl Session {
    pub fn new(lobby_secs: u32, countdown_secs: u32) -> Self {
        Self {
            phase: Phase::Lobby,
            lobby_secs,
            countdown_secs,
            timers: Scheduler::new(),
            phase_timer: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Main game or its end sequence is running.
    pub fn in_game(&self) -> bool {
        matches!(self.phase, Phase::MainGame | Phase::EndSequence)
    }

    /// Re-evaluates the lobby after a join or a leave
    pub fn seat_count_changed(&mut self, seats: usize, now: Instant, out: &mut Outbox) {
        match self.phase {
            Phase::MainGame | Phase::EndSequence => {}
            phase if seats >= MAX_SEATS => {
                if let Phase::LobbyTimer { .. } = phase {
                    self.cancel_phase_timer();
                    out.broadcast(ServerMessage::Lobby { time: None });
                }
                self.start_countdown(now, out);
            }
            Phase::Countdown { .. } if seats >= 2 => self.start_countdown(now, out),
            _ if seats >= 2 => self.start_lobby_timer(now, out),
            _ => self.reset(out),
        }
    }

    /// Fires due timers. Returns the transitions the owner has to carry out,
    /// in order.
    pub fn poll(&mut self, now: Instant, out: &mut Outbox) -> Vec<Transition> {
        let mut transitions = Vec::new();
        for (handle, event) in self.timers.pop_due(now) {
            if self.phase_timer == Some(handle) {
                self.phase_timer = None;
            }
            if let Some(transition) = self.handle_event(event, now, out) {
                transitions.push(transition);
            }
        }
        transitions
    }

    fn handle_event(
        &mut self,
        event: SessionEvent,
        now: Instant,
        out: &mut Outbox,
    ) -> Option<Transition> {
        match (event, self.phase) {
            (SessionEvent::LobbyTick, Phase::LobbyTimer { remaining }) => {
                let remaining = remaining.saturating_sub(1);
                if remaining > 0 {
                    self.phase = Phase::LobbyTimer { remaining };
                    out.broadcast(ServerMessage::Lobby {
                        time: Some(remaining),
                    });
                    self.phase_timer =
                        Some(self.timers.schedule(now, SECOND, SessionEvent::LobbyTick));
                } else {
                    out.broadcast(ServerMessage::LobbyFinished);
                    self.start_countdown(now, out);
                }
                None
            }
            (SessionEvent::CountdownTick, Phase::Countdown { remaining }) => {
                let remaining = remaining.saturating_sub(1);
                if remaining > 0 {
                    self.phase = Phase::Countdown { remaining };
                    out.broadcast(ServerMessage::Countdown {
                        time: Some(remaining),
                    });
                    self.phase_timer =
                        Some(self.timers.schedule(now, SECOND, SessionEvent::CountdownTick));
                    None
                } else {
                    out.broadcast(ServerMessage::CountdownFinished);
                    self.phase = Phase::MainGame;
                    info!("Countdown finished, starting main game");
                    Some(Transition::StartMainGame)
                }
            }
            (SessionEvent::AnnounceWinner, Phase::EndSequence) => {
                self.timers.schedule(
                    now,
                    Duration::from_millis(RETURN_TO_LOBBY_DELAY_MS),
                    SessionEvent::ReturnToLobby,
                );
                Some(Transition::AnnounceWinner)
            }
            (SessionEvent::ReturnToLobby, Phase::EndSequence) => {
                self.phase = Phase::Lobby;
                info!("Returning to lobby");
                Some(Transition::ReturnToLobby)
            }
            // Timer outlived the phase that scheduled it
            _ => None,
        }
    }

    /// Called once when the main game reports that its round is decided.
    pub fn begin_end_sequence(&mut self, now: Instant) {
        if self.phase != Phase::MainGame {
            return;
        }
        self.phase = Phase::EndSequence;
        self.timers.schedule(
            now,
            Duration::from_millis(END_ANNOUNCE_DELAY_MS),
            SessionEvent::AnnounceWinner,
        );
        info!("End sequence started");
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    fn start_lobby_timer(&mut self, now: Instant, out: &mut Outbox) {
        self.cancel_phase_timer();
        self.phase = Phase::LobbyTimer {
            remaining: self.lobby_secs,
        };
        out.broadcast(ServerMessage::Lobby {
            time: Some(self.lobby_secs),
        });
        self.phase_timer = Some(self.timers.schedule(now, SECOND, SessionEvent::LobbyTick));
        info!("Lobby timer started ({}s)", self.lobby_secs);
    }

    fn start_countdown(&mut self, now: Instant, out: &mut Outbox) {
        self.cancel_phase_timer();
        out.broadcast(ServerMessage::Countdown { time: None });
        self.phase = Phase::Countdown {
            remaining: self.countdown_secs,
        };
        out.broadcast(ServerMessage::Countdown {
            time: Some(self.countdown_secs),
        });
        self.phase_timer = Some(
            self.timers
                .schedule(now, SECOND, SessionEvent::CountdownTick),
        );
        info!("Countdown started ({}s)", self.countdown_secs);
    }

    fn reset(&mut self, out: &mut Outbox) {
        self.cancel_phase_timer();
        self.phase = Phase::Lobby;
        out.broadcast(ServerMessage::Lobby { time: None });
        out.broadcast(ServerMessage::Countdown { time: None });
    }

    fn cancel_phase_timer(&mut self) {
        if let Some(handle) = self.phase_timer.take() {
            self.timers.cancel(handle);
        }
    }
}
