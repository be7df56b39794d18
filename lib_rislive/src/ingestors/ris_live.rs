//! # RIS Live Stream Handle
//!
//! One handle owns one logical subscription to RIS Live:
//!
//! ```text
//! Connecting ──► Active ──► Reconnecting ──► Active ──► ... ──► Dead
//! ```
//!
//! `Dead` is terminal. Two background tasks run while the handle lives:
//!
//! 1. **Read task**: reads frames with a per-read deadline, decodes them and
//!    pushes them onto a bounded queue. A failed read (deadline, transport error,
//!    close) triggers exactly one re-dial plus resubscribe; if that fails the
//!    session is killed.
//! 2. **Timer task**: races the session deadline against the heartbeat. The
//!    deadline kills the session; each heartbeat sends a `ping` over whatever
//!    connection is current.
//!
//! The write half of the connection sits behind one mutex; reconnect and
//! heartbeat both take it. The dead flag is the [`KillSwitch`], readable
//! without the lock.
//!
//! ## Backpressure
//! The queue is bounded and the read task waits for room. A consumer that falls
//! behind therefore stalls reading from the socket. While stalled, RIS Live keeps
//! sending; if the stall outlasts the server's patience, or the next read then
//! misses its deadline, the handle reconnects although the network is fine.
//! Messages in flight across a reconnect may be lost or repeated; they are
//! not reconciled.

use std::io;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, protocol::Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::core::kill_switch::KillSwitch;
use crate::protocol::ris_message::{ClientDirective, ClientMessage, ServerMessage};

/// Interval between application-level `ping`s.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(40);
/// Longest wait for a single frame before the connection is considered broken.
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);
/// Decoded messages buffered between the read task and the consumer.
pub const QUEUE_CAPACITY: usize = 1024;
/// Upper bound for the heartbeat period; `Instant` arithmetic panics on overflow.
pub const MAX_TIMER_PERIOD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },
    #[error("failed to send to RIS Live: {0}")]
    Send(#[from] tungstenite::Error),
    #[error("send to RIS Live not completed within {0:?}")]
    SendTimeout(Duration),
    #[error("the RIS Live session has ended")]
    Dead,
}

/// Timing and buffering knobs for a [`RisLiveHandle`].
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub read_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub queue_capacity: usize,
    /// Bound on the WebSocket handshake, for the first dial and the re-dial.
    pub connect_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            read_timeout: READ_TIMEOUT,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            queue_capacity: QUEUE_CAPACITY,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamState {
    Connecting = 0,
    Active = 1,
    Reconnecting = 2,
    Dead = 3,
}

impl StreamState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => StreamState::Connecting,
            1 => StreamState::Active,
            2 => StreamState::Reconnecting,
            _ => StreamState::Dead,
        }
    }
}

/// State shared by the handle and its two background tasks.
struct Session {
    url: String,
    filter: ClientDirective,
    config: StreamConfig,
    /// Write half of the current connection; `None` once the session is over.
    conn: Mutex<Option<WsWriter>>,
    state: AtomicU8,
    received: AtomicU64,
    kill_switch: KillSwitch,
}

impl Session {
    fn state(&self) -> StreamState {
        if self.kill_switch.killed() {
            return StreamState::Dead;
        }
        StreamState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: StreamState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn mark_dead(&self) {
        self.set_state(StreamState::Dead);
        self.kill_switch.kill();
    }

    async fn send(&self, message: &ClientMessage) -> Result<(), StreamError> {
        let mut conn = self.conn.lock().await;
        match conn.as_mut() {
            Some(writer) if !self.kill_switch.killed() => send_within(writer, message, self.config.read_timeout).await,
            _ => Err(StreamError::Dead),
        }
    }

    /// Decodes a text frame and queues it. Returns `false` when the read task
    /// should stop.
    async fn deliver(&self, queue: &mpsc::Sender<ServerMessage>, text: &str) -> bool {
        let message = match ServerMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("Skipping RIS Live frame: {}", e);
                return true;
            }
        };
        self.received.fetch_add(1, Ordering::Relaxed);

        // Waits for room in the queue: this is where a slow consumer pushes back.
        tokio::select! {
            biased;
            _ = self.kill_switch.dead() => false,
            sent = queue.send(message) => {
                if sent.is_err() {
                    log::warn!("Message consumer is gone, ending RIS Live session.");
                    self.mark_dead();
                }
                sent.is_ok()
            }
        }
    }

    /// One re-dial attempt, holding the connection lock throughout.
    async fn reconnect(&self) -> Option<WsReader> {
        let mut conn = self.conn.lock().await;
        if self.kill_switch.killed() {
            return None;
        }
        self.set_state(StreamState::Reconnecting);
        drop(conn.take());

        let (mut writer, reader) = match dial(&self.url, self.config.connect_timeout).await {
            Ok(halves) => halves,
            Err(e) => {
                log::error!("Reconnect to {} failed: {}", self.url, e);
                self.mark_dead();
                return None;
            }
        };

        let subscribe = ClientMessage::subscribe(self.filter.clone());
        if let Err(e) = send_within(&mut writer, &subscribe, self.config.read_timeout).await {
            log::error!("Resubscribe after reconnect failed: {}", e);
            self.mark_dead();
            return None;
        }

        *conn = Some(writer);
        self.set_state(StreamState::Active);
        log::info!("Reconnected to {}", self.url);
        Some(reader)
    }

    /// Releases the connection. Safe to call more than once.
    async fn close(&self) {
        let mut conn = self.conn.lock().await;
        self.set_state(StreamState::Dead);
        if let Some(mut writer) = conn.take() {
            match time::timeout(Duration::from_secs(1), writer.close()).await {
                Ok(Ok(())) => log::info!("Closed connection to {}", self.url),
                Ok(Err(e)) => log::debug!("Closing connection to {}: {}", self.url, e),
                Err(_) => log::debug!("Close handshake with {} timed out", self.url),
            }
        }
    }
}

/// Sends one directive, giving up after `limit` so a peer that stopped
/// reading cannot hold the connection lock forever.
async fn send_within<S>(writer: &mut S, message: &ClientMessage, limit: Duration) -> Result<(), StreamError>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let frame = Message::Text(message.to_json().into());
    match time::timeout(limit, writer.send(frame)).await {
        Ok(sent) => Ok(sent?),
        Err(_) => Err(StreamError::SendTimeout(limit)),
    }
}

async fn dial(url: &str, connect_timeout: Duration) -> Result<(WsWriter, WsReader), tungstenite::Error> {
    let (stream, response) = match time::timeout(connect_timeout, connect_async(url)).await {
        Ok(result) => result?,
        Err(_) => {
            let e = io::Error::new(io::ErrorKind::TimedOut, "WebSocket handshake timed out");
            return Err(tungstenite::Error::Io(e));
        }
    };
    log::info!("Connected to {} (HTTP {})", url, response.status());
    Ok(stream.split())
}

async fn read_loop(session: Arc<Session>, mut reader: WsReader, queue: mpsc::Sender<ServerMessage>) {
    let read_timeout = session.config.read_timeout;

    while !session.kill_switch.killed() {
        let next = tokio::select! {
            biased;
            _ = session.kill_switch.dead() => break,
            next = time::timeout(read_timeout, reader.next()) => next,
        };

        let failure = match next {
            Ok(Some(Ok(Message::Text(text)))) => {
                if !session.deliver(&queue, text.as_str()).await {
                    break;
                }
                continue;
            }
            Ok(Some(Ok(Message::Close(frame)))) => format!("server closed the connection ({:?})", frame),
            // Control frames and binary payloads carry nothing for us.
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(e))) => e.to_string(),
            Ok(None) => "stream ended".to_string(),
            Err(_) => format!("no frame within {:?}", read_timeout),
        };

        log::info!("RIS Live read failed: {}", failure);
        match session.reconnect().await {
            Some(new_reader) => reader = new_reader,
            None => break,
        }
    }

    session.close().await;
    log::info!(
        "RIS Live read task stopped after {} messages",
        session.received.load(Ordering::Relaxed)
    );
}

async fn timer_loop(session: Arc<Session>, duration: Duration) {
    let period = session.config.heartbeat_interval.clamp(Duration::from_millis(1), MAX_TIMER_PERIOD);
    let deadline = time::sleep(duration);
    tokio::pin!(deadline);
    let mut heartbeat = time::interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while !session.kill_switch.killed() {
        tokio::select! {
            _ = &mut deadline => {
                log::info!("Session deadline of {:?} reached", duration);
                session.mark_dead();
            }
            _ = session.kill_switch.dead() => {}
            _ = heartbeat.tick() => {
                if session.kill_switch.killed() {
                    break;
                }
                let mut conn = session.conn.lock().await;
                if let Some(writer) = conn.as_mut() {
                    log::info!("Sending ping to RIS Live");
                    if let Err(e) = send_within(writer, &ClientMessage::ping(), session.config.read_timeout).await {
                        log::error!("Ping failed: {}", e);
                    }
                }
                heartbeat.reset();
            }
        }
    }
}

/// A live RIS Live subscription.
///
/// Dropping the handle kills the session; [`shutdown`](Self::shutdown) also
/// waits for the background tasks to finish.
pub struct RisLiveHandle {
    session: Arc<Session>,
    queue: mpsc::Receiver<ServerMessage>,
    tasks: Vec<JoinHandle<()>>,
}

impl RisLiveHandle {
    /// Dials `url`, subscribes with `filter` and starts the background tasks.
    ///
    /// The session ends on its own after `duration`.
    ///
    /// # Errors
    /// [`StreamError::Connect`] if the first dial fails; no handle is produced.
    pub async fn connect(
        url: &str,
        filter: ClientDirective,
        duration: Duration,
        config: StreamConfig,
    ) -> Result<Self, StreamError> {
        let (writer, reader) = dial(url, config.connect_timeout)
            .await
            .map_err(|source| StreamError::Connect { url: url.to_string(), source })?;

        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let session = Arc::new(Session {
            url: url.to_string(),
            filter: filter.clone(),
            config,
            conn: Mutex::new(Some(writer)),
            state: AtomicU8::new(StreamState::Connecting as u8),
            received: AtomicU64::new(0),
            kill_switch: KillSwitch::new(),
        });

        session.send(&ClientMessage::subscribe(filter)).await?;
        session.set_state(StreamState::Active);
        log::info!("Subscribed to {}", url);

        let tasks = vec![
            tokio::spawn(read_loop(session.clone(), reader, tx)),
            tokio::spawn(timer_loop(session.clone(), duration)),
        ];

        Ok(Self { session, queue: rx, tasks })
    }

    /// Next queued message, or `None` once the session is dead.
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        if self.session.kill_switch.killed() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.session.kill_switch.dead() => None,
            message = self.queue.recv() => message,
        }
    }

    /// The queue itself, for consumers that manage their own loop.
    pub fn queue_mut(&mut self) -> &mut mpsc::Receiver<ServerMessage> {
        &mut self.queue
    }

    pub fn kill_switch(&self) -> KillSwitch {
        self.session.kill_switch.clone()
    }

    pub fn kill(&self) {
        self.session.mark_dead();
    }

    pub fn killed(&self) -> bool {
        self.session.kill_switch.killed()
    }

    pub fn state(&self) -> StreamState {
        self.session.state()
    }

    /// Frames decoded since the handle was created, across reconnects.
    pub fn messages_received(&self) -> u64 {
        self.session.received.load(Ordering::Relaxed)
    }

    pub async fn unsubscribe(&self, filter: ClientDirective) -> Result<(), StreamError> {
        self.session.send(&ClientMessage::unsubscribe(filter)).await
    }

    /// Asks RIS Live for its collector list; the answer arrives on the queue.
    pub async fn request_rrc_list(&self) -> Result<(), StreamError> {
        self.session.send(&ClientMessage::request_rrc_list()).await
    }

    /// Kills the session and waits until the connection is released.
    pub async fn shutdown(mut self) {
        self.session.mark_dead();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                log::error!("RIS Live task failed: {}", e);
            }
        }
        self.session.close().await;
    }
}

impl Drop for RisLiveHandle {
    fn drop(&mut self) {
        self.session.kill_switch.kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::sink;

    #[tokio::test]
    async fn test_send_gives_up_on_stuck_peer() {
        // Accepts the frame but never finishes flushing it.
        let stuck = sink::unfold((), |_, _frame: Message| std::future::pending::<Result<(), tungstenite::Error>>());
        let mut stuck = std::pin::pin!(stuck);

        let limit = Duration::from_millis(50);
        let sent = time::timeout(Duration::from_secs(5), send_within(&mut stuck, &ClientMessage::ping(), limit))
            .await
            .expect("send_within must not block past its limit");

        assert!(matches!(sent, Err(StreamError::SendTimeout(d)) if d == limit));
    }

    #[tokio::test]
    async fn test_send_delivers_json_frame() {
        let mut frames = Vec::<Message>::new().sink_map_err(|never: std::convert::Infallible| -> tungstenite::Error { match never {} });
        send_within(&mut frames, &ClientMessage::ping(), Duration::from_secs(1)).await.unwrap();
        assert_eq!(frames.get_ref(), &vec![Message::Text(r#"{"type":"ping"}"#.into())]);
    }
}
