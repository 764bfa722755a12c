//! Server network layer: websocket sockets in, arena effects out

use crate::arena::Arena;
use crate::client_manager::ConnId;
use crate::codec::{
    close_frame, encode_text, handshake_response, parse_handshake, ping_frame, pong_frame, Frame,
    FrameDecoder, BAD_REQUEST_RESPONSE,
};
use crate::config::ArenaConfig;
use crate::error::{ConnectionError, ProtocolError};
use crate::outbox::{Outbox, Outgoing, Recipient};
use log::{debug, error, info, warn};
use shared::ClientMessage;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, timeout, MissedTickBehavior};

const READ_BUFFER_SIZE: usize = 4096;

/// Messages sent from connection tasks to the main server loop
#[derive(Debug)]
pub enum NetworkEvent {
    Connected {
        conn_id: ConnId,
        addr: SocketAddr,
        writer: mpsc::UnboundedSender<WriterCommand>,
    },
    Message {
        conn_id: ConnId,
        message: ClientMessage,
    },
    Pong {
        conn_id: ConnId,
    },
    Disconnected {
        conn_id: ConnId,
        reason: String,
    },
}

/// Messages sent from the main loop to one connection's writer task
#[derive(Debug, Clone)]
pub enum WriterCommand {
    /// An encoded frame, shared between every recipient of a broadcast.
    Frame(Arc<Vec<u8>>),
    Close,
}

/// Reads the HTTP upgrade request and answers it.
///
/// Returns whatever the client sent after the header block. A request that
/// is not a valid upgrade gets a 400 and an error.
pub async fn perform_handshake<S>(stream: &mut S) -> Result<Vec<u8>, ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_BUFFER_SIZE];

    loop {
        match parse_handshake(&buffer) {
            Ok(Some((request, consumed))) => {
                stream
                    .write_all(handshake_response(&request.key).as_bytes())
                    .await?;
                debug!("Upgraded websocket on path {}", request.path);
                return Ok(buffer.split_off(consumed));
            }
            Ok(None) => {}
            Err(e) => {
                // Best effort: the peer may already be gone
                let _ = stream.write_all(BAD_REQUEST_RESPONSE.as_bytes()).await;
                return Err(e.into());
            }
        }

        let len = stream.read(&mut chunk).await?;
        if len == 0 {
            return Err(ConnectionError::Closed);
        }
        buffer.extend_from_slice(&chunk[..len]);
    }
}

/// Decodes every complete frame in the buffer and routes it.
///
/// Returns the reason the connection has to end, if any.
fn drain_frames(
    conn_id: ConnId,
    decoder: &mut FrameDecoder,
    events: &mpsc::UnboundedSender<NetworkEvent>,
    writer: &mpsc::UnboundedSender<WriterCommand>,
) -> Option<String> {
    loop {
        let frame = match decoder.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return None,
            Err(e) if e.is_fatal() => {
                warn!("Connection {}: {}", conn_id, e);
                return Some(e.to_string());
            }
            Err(e) => {
                warn!("Connection {}: dropped frame: {}", conn_id, e);
                continue;
            }
        };

        match frame {
            Frame::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => {
                    if events
                        .send(NetworkEvent::Message { conn_id, message })
                        .is_err()
                    {
                        return Some("server loop stopped".to_string());
                    }
                }
                Err(e) => warn!("Connection {}: {}", conn_id, ProtocolError::from(e)),
            },
            Frame::Ping(payload) => {
                let _ = writer.send(WriterCommand::Frame(Arc::new(pong_frame(&payload))));
            }
            Frame::Pong => {
                let _ = events.send(NetworkEvent::Pong { conn_id });
            }
            Frame::Close => {
                let _ = writer.send(WriterCommand::Close);
                return Some("closed by client".to_string());
            }
            Frame::Other(opcode) => {
                debug!("Connection {}: ignoring opcode {:#x}", conn_id, opcode);
            }
        }
    }
}

async fn read_loop<R>(
    conn_id: ConnId,
    mut reader: R,
    leftover: Vec<u8>,
    events: &mpsc::UnboundedSender<NetworkEvent>,
    writer: &mpsc::UnboundedSender<WriterCommand>,
    mut writer_done: oneshot::Receiver<()>,
) -> String
where
    R: AsyncRead + Unpin,
{
    let mut decoder = FrameDecoder::new();
    decoder.extend(&leftover);
    let mut chunk = [0u8; READ_BUFFER_SIZE];

    loop {
        if let Some(reason) = drain_frames(conn_id, &mut decoder, events, writer) {
            return reason;
        }

        // A silent peer must not keep the task alive once the writer is done
        let read = tokio::select! {
            read = reader.read(&mut chunk) => read,
            _ = &mut writer_done => return "closed by server".to_string(),
        };
        match read {
            Ok(0) => return ConnectionError::Closed.to_string(),
            Ok(len) => decoder.extend(&chunk[..len]),
            Err(e) => return ConnectionError::from(e).to_string(),
        }
    }
}

/// Drains writer commands until told to close. Dropping `_done` on the way
/// out wakes the reader.
async fn write_loop<W>(
    conn_id: ConnId,
    mut writer: W,
    mut commands: mpsc::UnboundedReceiver<WriterCommand>,
    _done: oneshot::Sender<()>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = commands.recv().await {
        match command {
            WriterCommand::Frame(bytes) => {
                if let Err(e) = writer.write_all(&bytes).await {
                    warn!("Connection {}: write failed: {}", conn_id, e);
                    break;
                }
            }
            WriterCommand::Close => {
                let _ = writer.write_all(&close_frame()).await;
                let _ = writer.shutdown().await;
                break;
            }
        }
    }
}

/// Serves one connection from handshake to hang-up
async fn handle_connection<S>(
    conn_id: ConnId,
    mut stream: S,
    addr: SocketAddr,
    handshake_timeout: Duration,
    events: mpsc::UnboundedSender<NetworkEvent>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let handshake = timeout(handshake_timeout, perform_handshake(&mut stream))
        .await
        .unwrap_or(Err(ConnectionError::HandshakeTimeout));
    let leftover = match handshake {
        Ok(leftover) => leftover,
        Err(e) => {
            warn!("Handshake with {} failed: {}", addr, e);
            return;
        }
    };

    let (reader, writer) = tokio::io::split(stream);
    let (writer_tx, writer_rx) = mpsc::unbounded_channel();
    let (done_tx, done_rx) = oneshot::channel();
    tokio::spawn(write_loop(conn_id, writer, writer_rx, done_tx));

    if events
        .send(NetworkEvent::Connected {
            conn_id,
            addr,
            writer: writer_tx.clone(),
        })
        .is_err()
    {
        return;
    }

    let reason = read_loop(conn_id, reader, leftover, &events, &writer_tx, done_rx).await;
    let _ = events.send(NetworkEvent::Disconnected { conn_id, reason });
}

/// Main server coordinating sockets and the arena
pub struct Server {
    listener: Arc<TcpListener>,
    arena: Arena,
    writers: HashMap<ConnId, mpsc::UnboundedSender<WriterCommand>>,

    // Communication channels
    event_tx: mpsc::UnboundedSender<NetworkEvent>,
    event_rx: mpsc::UnboundedReceiver<NetworkEvent>,
}

impl Server {
    pub async fn new(addr: &str, config: ArenaConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = Arc::new(TcpListener::bind(addr).await?);
        info!("Server listening on {}", listener.local_addr()?);

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            arena: Arena::new(config),
            writers: HashMap::new(),
            event_tx,
            event_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Spawns task that accepts sockets and hands each one its own task
    fn spawn_acceptor(&self) {
        let listener = Arc::clone(&self.listener);
        let events = self.event_tx.clone();
        let handshake_timeout = self.arena.config().handshake_timeout;

        tokio::spawn(async move {
            let mut next_conn_id: ConnId = 1;

            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let conn_id = next_conn_id;
                        next_conn_id += 1;
                        debug!("Accepted {} as connection {}", addr, conn_id);
                        tokio::spawn(handle_connection(
                            conn_id,
                            stream,
                            addr,
                            handshake_timeout,
                            events.clone(),
                        ));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    fn handle_event(&mut self, event: NetworkEvent, now: Instant, out: &mut Outbox) {
        match event {
            NetworkEvent::Connected {
                conn_id,
                addr,
                writer,
            } => {
                info!("Connection {} established from {}", conn_id, addr);
                self.writers.insert(conn_id, writer);
                self.arena.connect(conn_id, addr, now);
            }
            NetworkEvent::Message { conn_id, message } => {
                self.arena.handle_message(conn_id, message, now, out);
            }
            NetworkEvent::Pong { conn_id } => self.arena.handle_pong(conn_id, now),
            NetworkEvent::Disconnected { conn_id, reason } => {
                self.writers.remove(&conn_id);
                self.arena.disconnect(conn_id, &reason, now, out);
            }
        }
    }

    fn ping_all(&mut self) {
        let frame = Arc::new(ping_frame());
        for writer in self.writers.values() {
            let _ = writer.send(WriterCommand::Frame(Arc::clone(&frame)));
        }
    }

    /// Hands everything in the outbox to the writer tasks. Connections whose
    /// writer is gone are cleaned up, which may queue more messages.
    fn flush(&mut self, out: &mut Outbox, now: Instant) {
        while !out.is_empty() {
            let mut failed = Vec::new();

            for item in out.drain() {
                match item {
                    Outgoing::Message(recipient, message) => {
                        let text = match serde_json::to_string(&message) {
                            Ok(text) => text,
                            Err(e) => {
                                error!("Failed to serialize {:?}: {}", message, e);
                                continue;
                            }
                        };
                        let frame = Arc::new(encode_text(&text));
                        let targets = match recipient {
                            Recipient::All => self.arena.clients().seated_conn_ids(),
                            Recipient::Conn(conn_id) => vec![conn_id],
                        };
                        for conn_id in targets {
                            if let Some(writer) = self.writers.get(&conn_id) {
                                if writer.send(WriterCommand::Frame(Arc::clone(&frame))).is_err() {
                                    failed.push(conn_id);
                                }
                            }
                        }
                    }
                    Outgoing::Close(conn_id) => {
                        if let Some(writer) = self.writers.remove(&conn_id) {
                            let _ = writer.send(WriterCommand::Close);
                        }
                    }
                }
            }

            failed.sort_unstable();
            failed.dedup();
            for conn_id in failed {
                self.writers.remove(&conn_id);
                self.arena.disconnect(conn_id, "send failed", now, out);
            }
        }
    }

    fn tick_interval(&self) -> tokio::time::Interval {
        let mut tick_interval = interval(self.arena.tick_interval());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tick_interval
    }

    /// Main server loop
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_acceptor();

        let mut current_period = self.arena.tick_interval();
        let mut tick_interval = self.tick_interval();
        let mut heartbeat = interval(self.arena.config().ping_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;

        let mut ticks: u64 = 0;
        let mut out = Outbox::new();

        loop {
            let deadline = self.arena.next_deadline();

            tokio::select! {
                event = self.event_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event, Instant::now(), &mut out),
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    self.arena.tick(Instant::now(), &mut out);
                    ticks += 1;

                    // Periodic performance monitoring
                    if ticks % 60 == 0 && !self.writers.is_empty() {
                        debug!(
                            "Tick {}: {} connections, {} seated, {:?} loop",
                            ticks,
                            self.writers.len(),
                            self.arena.clients().seat_count(),
                            self.arena.active_loop()
                        );
                    }
                },

                _ = heartbeat.tick() => {
                    self.arena.check_heartbeats(Instant::now(), &mut out);
                    self.ping_all();
                },

                _ = wait_for(deadline) => {
                    self.arena.poll_timers(Instant::now(), &mut out);
                },
            }

            self.flush(&mut out, Instant::now());

            if self.arena.tick_interval() != current_period {
                current_period = self.arena.tick_interval();
                tick_interval = self.tick_interval();
                debug!("Tick period now {:?}", current_period);
            }
        }

        Ok(())
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}
