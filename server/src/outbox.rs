use shared::ServerMessage;

use crate::client_manager::ConnId;

/// Who a message goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// Every connection holding a seat.
    All,
    Conn(ConnId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Message(Recipient, ServerMessage),
    /// Flush what was queued for the connection, then close it.
    Close(ConnId),
}

/// Effects produced by the arena, in order. The network layer drains it
/// after every call into the arena.
#[derive(Debug, Default)]
pub struct Outbox {
    items: Vec<Outgoing>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a message for every seated connection
    pub fn broadcast(&mut self, message: ServerMessage) {
        self.items.push(Outgoing::Message(Recipient::All, message));
    }

    /// Queues a message for one connection, seated or not
    pub fn send(&mut self, conn_id: ConnId, message: ServerMessage) {
        self.items
            .push(Outgoing::Message(Recipient::Conn(conn_id), message));
    }

    /// Queues a close after everything already sent to the connection
    pub fn close(&mut self, conn_id: ConnId) {
        self.items.push(Outgoing::Close(conn_id));
    }

    /// Takes every queued effect in order, leaving the outbox empty
    pub fn drain(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.items)
    }

    pub fn items(&self) -> &[Outgoing] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Messages addressed to one connection, broadcasts included.
    pub fn messages_for(&self, conn_id: ConnId) -> Vec<&ServerMessage> {
        self.items
            .iter()
            .filter_map(|item| match item {
                Outgoing::Message(Recipient::All, message) => Some(message),
                Outgoing::Message(Recipient::Conn(id), message) if *id == conn_id => Some(message),
                _ => None,
            })
            .collect()
    }
}
