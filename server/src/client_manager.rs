//! Connection registry and seat assignment
//!
//! This module tracks every open connection and the seat it holds, if any:
//! - Seat allocation (lowest free id in `1..=4`) and nickname uniqueness
//! - Per-seat held input, overwritten by each input message
//! - Heartbeat liveness via the last pong time
//! - Per-seat points tally across rounds
//!
//! Removal is idempotent: the first call hands back the client, every later
//! call for the same connection returns `None`, which is what lets several
//! close-like events funnel into a single cleanup.

use log::info;
use shared::{HeldInput, SeatId, MAX_SEATS};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::error::JoinError;

/// Identifies one accepted socket for its whole lifetime.
pub type ConnId = u64;

/// A joined player's slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seat {
    pub id: SeatId,
    pub nickname: String,
    pub points: u32,
}

/// Represents an open connection, joined or not
#[derive(Debug)]
pub struct Client {
    pub conn_id: ConnId,
    /// Peer address, for logging
    pub addr: SocketAddr,
    /// Last time a pong (or the connection itself) was seen
    pub last_pong: Instant,
    /// Present once the connection has joined
    pub seat: Option<Seat>,
}

impl Client {
    pub fn new(conn_id: ConnId, addr: SocketAddr, now: Instant) -> Self {
        Self {
            conn_id,
            addr,
            last_pong: now,
            seat: None,
        }
    }

    pub fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_pong) > timeout
    }
}

/// Held input per seat. A seat with no entry reads as all keys released.
#[derive(Debug, Default)]
pub struct HeldInputs {
    inputs: HashMap<SeatId, HeldInput>,
}

impl HeldInputs {
    /// Stores the latest snapshot of held keys for a seat
    pub fn set(&mut self, seat: SeatId, input: HeldInput) {
        self.inputs.insert(seat, input);
    }

    /// Keys a seat is holding; nothing held if it never sent input
    pub fn current(&self, seat: SeatId) -> HeldInput {
        self.inputs.get(&seat).copied().unwrap_or_default()
    }

    /// Consumes the bomb action so a stale snapshot cannot drop twice.
    pub fn clear_bomb(&mut self, seat: SeatId) {
        if let Some(input) = self.inputs.get_mut(&seat) {
            input.bomb = false;
        }
    }

    /// Forgets a seat's keys when it leaves
    pub fn remove(&mut self, seat: SeatId) {
        self.inputs.remove(&seat);
    }
}

/// Manages all open connections and the seats they hold
pub struct ClientManager {
    clients: HashMap<ConnId, Client>,
    inputs: HeldInputs,
    max_seats: usize,
}

impl ClientManager {
    /// Creates an empty registry
    ///
    /// `max_seats` is capped at the four seats the arena has.
    pub fn new(max_seats: usize) -> Self {
        Self {
            clients: HashMap::new(),
            inputs: HeldInputs::default(),
            max_seats: max_seats.min(MAX_SEATS),
        }
    }

    /// Registers an accepted socket. It holds no seat until it joins.
    pub fn add_connection(&mut self, conn_id: ConnId, addr: SocketAddr, now: Instant) {
        info!("Connection {} opened from {}", conn_id, addr);
        self.clients.insert(conn_id, Client::new(conn_id, addr, now));
    }

    /// Attempts to seat a connection under the given nickname
    ///
    /// Capacity is checked before the nickname, so a full server always
    /// answers with `ServerFull`. Empty and default nicknames are rewritten
    /// to `Player {id}`.
    pub fn join(&mut self, conn_id: ConnId, nickname: &str) -> Result<Seat, JoinError> {
        match self.clients.get(&conn_id) {
            Some(client) if client.seat.is_some() => return Err(JoinError::AlreadyJoined),
            Some(_) => {}
            None => return Err(JoinError::UnknownConnection(conn_id)),
        }

        if self.seat_count() >= self.max_seats {
            return Err(JoinError::ServerFull);
        }

        let requested = nickname.trim();
        if self.nickname_taken(requested) {
            return Err(JoinError::DuplicateNickname(requested.to_string()));
        }

        let id = self.lowest_free_seat().ok_or(JoinError::ServerFull)?;
        let nickname = if requested.is_empty() || requested.eq_ignore_ascii_case("player") {
            format!("Player {}", id)
        } else {
            requested.to_string()
        };
        if self.nickname_taken(&nickname) {
            return Err(JoinError::DuplicateNickname(nickname));
        }

        let seat = Seat {
            id,
            nickname,
            points: 0,
        };
        if let Some(client) = self.clients.get_mut(&conn_id) {
            client.seat = Some(seat.clone());
        }
        self.inputs.set(id, HeldInput::default());

        info!(
            "Connection {} joined as seat {} ({})",
            conn_id, seat.id, seat.nickname
        );
        Ok(seat)
    }

    /// Removes a connection and frees its seat
    ///
    /// Returns the client the first time only.
    pub fn remove_connection(&mut self, conn_id: ConnId) -> Option<Client> {
        let client = self.clients.remove(&conn_id)?;
        if let Some(seat) = &client.seat {
            self.inputs.remove(seat.id);
            info!("Seat {} ({}) freed", seat.id, seat.nickname);
        }
        info!("Connection {} closed", conn_id);
        Some(client)
    }

    /// Whether the connection is registered, seated or not
    pub fn contains(&self, conn_id: ConnId) -> bool {
        self.clients.contains_key(&conn_id)
    }

    /// Seat held by the connection, if it has joined
    pub fn seat_of(&self, conn_id: ConnId) -> Option<&Seat> {
        self.clients.get(&conn_id)?.seat.as_ref()
    }

    /// Number of connections holding a seat
    pub fn seat_count(&self) -> usize {
        self.clients
            .values()
            .filter(|client| client.seat.is_some())
            .count()
    }

    /// Joined seats ordered by id.
    pub fn seats(&self) -> Vec<&Seat> {
        let mut seats: Vec<&Seat> = self
            .clients
            .values()
            .filter_map(|client| client.seat.as_ref())
            .collect();
        seats.sort_by_key(|seat| seat.id);
        seats
    }

    /// Connections that receive broadcasts
    pub fn seated_conn_ids(&self) -> Vec<ConnId> {
        self.clients
            .values()
            .filter(|client| client.seat.is_some())
            .map(|client| client.conn_id)
            .collect()
    }

    /// Every registered connection, joined or not
    pub fn conn_ids(&self) -> Vec<ConnId> {
        self.clients.keys().copied().collect()
    }

    /// Records a pong. Returns false for unknown connections.
    pub fn refresh_pong(&mut self, conn_id: ConnId, now: Instant) -> bool {
        match self.clients.get_mut(&conn_id) {
            Some(client) => {
                client.last_pong = now;
                true
            }
            None => false,
        }
    }

    /// Lists connections whose last pong is older than `timeout`
    ///
    /// Nothing is removed here; the caller runs the usual disconnect
    /// cleanup for each id.
    pub fn check_timeouts(&self, now: Instant, timeout: Duration) -> Vec<ConnId> {
        self.clients
            .values()
            .filter(|client| client.is_timed_out(now, timeout))
            .map(|client| client.conn_id)
            .collect()
    }

    /// Points of every joined seat.
    pub fn points(&self) -> BTreeMap<SeatId, u32> {
        self.seats()
            .into_iter()
            .map(|seat| (seat.id, seat.points))
            .collect()
    }

    /// Adds one point to a seat. Returns false if the seat is gone.
    pub fn award_point(&mut self, seat_id: SeatId) -> bool {
        for client in self.clients.values_mut() {
            if let Some(seat) = client.seat.as_mut() {
                if seat.id == seat_id {
                    seat.points += 1;
                    return true;
                }
            }
        }
        false
    }

    /// Replaces a seat's held keys with the newest snapshot
    pub fn set_input(&mut self, seat: SeatId, input: HeldInput) {
        self.inputs.set(seat, input);
    }

    pub fn inputs(&self) -> &HeldInputs {
        &self.inputs
    }

    pub fn inputs_mut(&mut self) -> &mut HeldInputs {
        &mut self.inputs
    }

    /// Returns the number of open connections
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn nickname_taken(&self, nickname: &str) -> bool {
        !nickname.is_empty()
            && self
                .clients
                .values()
                .filter_map(|client| client.seat.as_ref())
                .any(|seat| seat.nickname.eq_ignore_ascii_case(nickname))
    }

    /// Seats freed by a leave are handed out again before higher ones
    fn lowest_free_seat(&self) -> Option<SeatId> {
        let used: Vec<SeatId> = self
            .clients
            .values()
            .filter_map(|client| client.seat.as_ref().map(|seat| seat.id))
            .collect();
        (1..=self.max_seats as SeatId).find(|id| !used.contains(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn manager_with_connections(count: u64) -> (ClientManager, Instant) {
        let now = Instant::now();
        let mut manager = ClientManager::new(MAX_SEATS);
        for conn_id in 1..=count {
            manager.add_connection(conn_id, test_addr(), now);
        }
        (manager, now)
    }

    #[test]
    fn test_client_creation() {
        let now = Instant::now();
        let client = Client::new(7, test_addr(), now);
        assert_eq!(client.conn_id, 7);
        assert!(client.seat.is_none());
        assert!(!client.is_timed_out(now, Duration::from_secs(1)));
        assert!(client.is_timed_out(now + Duration::from_secs(2), Duration::from_secs(1)));
    }

    #[test]
    fn test_join_assigns_sequential_seats() {
        let (mut manager, _) = manager_with_connections(3);
        assert_eq!(manager.join(1, "Ann").unwrap().id, 1);
        assert_eq!(manager.join(2, "Bob").unwrap().id, 2);
        assert_eq!(manager.join(3, "Cid").unwrap().id, 3);
        assert_eq!(manager.seat_count(), 3);
    }

    #[test]
    fn test_freed_seat_is_reused_first() {
        let (mut manager, _) = manager_with_connections(4);
        manager.join(1, "Ann").unwrap();
        manager.join(2, "Bob").unwrap();
        manager.join(3, "Cid").unwrap();

        manager.remove_connection(2);
        assert_eq!(manager.join(4, "Dee").unwrap().id, 2);
    }

    #[test]
    fn test_capacity_enforced() {
        let (mut manager, _) = manager_with_connections(5);
        for (conn_id, name) in [(1, "a"), (2, "b"), (3, "c"), (4, "d")] {
            manager.join(conn_id, name).unwrap();
        }
        assert_eq!(manager.join(5, "e"), Err(JoinError::ServerFull));
        assert_eq!(manager.seat_count(), 4);
    }

    #[test]
    fn test_duplicate_nickname_case_insensitive() {
        let (mut manager, _) = manager_with_connections(2);
        manager.join(1, "Ann").unwrap();

        assert_eq!(
            manager.join(2, "aNN"),
            Err(JoinError::DuplicateNickname("aNN".to_string()))
        );
        // Connection stays and may retry
        assert!(manager.contains(2));
        assert_eq!(manager.join(2, "Bob").unwrap().id, 2);
    }

    #[test]
    fn test_default_nicknames_rewritten() {
        let (mut manager, _) = manager_with_connections(3);
        assert_eq!(manager.join(1, "").unwrap().nickname, "Player 1");
        assert_eq!(manager.join(2, "player").unwrap().nickname, "Player 2");
        assert_eq!(manager.join(3, "  Player ").unwrap().nickname, "Player 3");
    }

    #[test]
    fn test_join_twice_rejected() {
        let (mut manager, _) = manager_with_connections(1);
        manager.join(1, "Ann").unwrap();
        assert_eq!(manager.join(1, "Ann2"), Err(JoinError::AlreadyJoined));
    }

    #[test]
    fn test_join_from_unregistered_connection() {
        let (mut manager, _) = manager_with_connections(1);
        assert_eq!(
            manager.join(9, "Ann"),
            Err(JoinError::UnknownConnection(9))
        );
        assert_eq!(manager.seat_count(), 0);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (mut manager, _) = manager_with_connections(1);
        manager.join(1, "Ann").unwrap();

        assert!(manager.remove_connection(1).is_some());
        assert!(manager.remove_connection(1).is_none());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_held_input_lifecycle() {
        let (mut manager, _) = manager_with_connections(1);
        let seat = manager.join(1, "Ann").unwrap();

        manager.set_input(
            seat.id,
            HeldInput {
                up: true,
                bomb: true,
                ..Default::default()
            },
        );
        manager.inputs_mut().clear_bomb(seat.id);
        let input = manager.inputs().current(seat.id);
        assert!(input.up);
        assert!(!input.bomb);

        manager.remove_connection(1);
        assert_eq!(manager.inputs().current(seat.id), HeldInput::default());
    }

    #[test]
    fn test_missing_input_reads_as_released() {
        let manager = ClientManager::new(MAX_SEATS);
        assert_eq!(manager.inputs().current(3), HeldInput::default());
    }

    #[test]
    fn test_check_timeouts() {
        let (mut manager, now) = manager_with_connections(2);
        let later = now + Duration::from_secs(61);
        manager.refresh_pong(2, now + Duration::from_secs(30));

        let timed_out = manager.check_timeouts(later, Duration::from_secs(60));
        assert_eq!(timed_out, vec![1]);
        // Detection does not remove
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_points() {
        let (mut manager, _) = manager_with_connections(2);
        manager.join(1, "Ann").unwrap();
        manager.join(2, "Bob").unwrap();

        assert!(manager.award_point(2));
        assert!(!manager.award_point(4));

        let points = manager.points();
        assert_eq!(points.get(&1), Some(&0));
        assert_eq!(points.get(&2), Some(&1));
    }
}
