//! Websocket client: one connection per channel on a dedicated thread
//!
//! The worker thread runs a single-threaded async runtime whose select
//! loop multiplexes inbound frames with a command channel (payload
//! sends, heartbeats, shutdown). Venue specifics live behind the
//! `VenueStream` trait: what to send on open, the channel's ping
//! format, and how to parse each frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::state::{ReconnectDecision, ReconnectPolicy, WsState, WsStateCell};

/// Per-venue channel behavior plugged into `WsClient`.
pub trait VenueStream: Send + 'static {
    /// Channel name for logs and the thread label.
    fn name(&self) -> &str;

    /// Payloads sent right after the socket opens: auth first for
    /// private channels, then subscriptions.
    fn on_open(&mut self) -> Vec<String>;

    /// The channel's ping format; `None` disables heartbeats.
    fn heartbeat_payload(&self) -> Option<String>;

    /// One inbound text frame.
    fn on_frame(&mut self, text: &str);

    /// Socket lost; reset any warmup state.
    fn on_disconnect(&mut self);
}

#[derive(Debug)]
enum WsCommand {
    Send(String),
    Heartbeat,
    Close,
}

#[derive(Debug, Clone)]
pub struct WsConfig {
    pub uri: String,
    pub retry_limit: u32,
    /// Pause between reconnect attempts.
    pub reconnect_delay: Duration,
}

impl WsConfig {
    pub fn new(uri: impl Into<String>, retry_limit: u32) -> Self {
        Self {
            uri: uri.into(),
            retry_limit,
            reconnect_delay: Duration::from_millis(250),
        }
    }
}

struct WsShared {
    state: WsStateCell,
    shutdown_requested: AtomicBool,
    policy: ReconnectPolicy,
}

pub type DisconnectCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Cheap clonable handle for outbound traffic and status checks.
#[derive(Clone)]
pub struct WsHandle {
    cmd_tx: UnboundedSender<WsCommand>,
    shared: Arc<WsShared>,
}

impl WsHandle {
    /// Queue a payload; false when the channel is down.
    pub fn send(&self, payload: String) -> bool {
        if !self.shared.state.is_open() {
            return false;
        }
        self.cmd_tx.send(WsCommand::Send(payload)).is_ok()
    }

    /// Queue a heartbeat ping; false when the channel is down.
    pub fn send_heartbeat(&self) -> bool {
        if !self.shared.state.is_open() {
            return false;
        }
        self.cmd_tx.send(WsCommand::Heartbeat).is_ok()
    }

    pub fn is_ready(&self) -> bool {
        self.shared.state.is_open()
    }

    pub fn state(&self) -> WsState {
        self.shared.state.get()
    }
}

/// Owns the worker thread for one websocket channel.
pub struct WsClient {
    config: WsConfig,
    shared: Arc<WsShared>,
    cmd_tx: UnboundedSender<WsCommand>,
    cmd_rx: Mutex<Option<UnboundedReceiver<WsCommand>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl WsClient {
    pub fn new(config: WsConfig) -> Self {
        let (cmd_tx, cmd_rx) = unbounded_channel();
        Self {
            shared: Arc::new(WsShared {
                state: WsStateCell::new(),
                shutdown_requested: AtomicBool::new(false),
                policy: ReconnectPolicy::new(config.retry_limit),
            }),
            config,
            cmd_tx,
            cmd_rx: Mutex::new(Some(cmd_rx)),
            thread: Mutex::new(None),
        }
    }

    pub fn handle(&self) -> WsHandle {
        WsHandle {
            cmd_tx: self.cmd_tx.clone(),
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.shared.state.is_open()
    }

    pub fn state(&self) -> WsState {
        self.shared.state.get()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.policy.attempts()
    }

    /// Spawn the worker thread. `on_disconnect` receives `false` for
    /// each recoverable drop and `true` once the retry budget is gone.
    pub fn start<H: VenueStream>(&self, handler: H, on_disconnect: DisconnectCallback) {
        let mut thread = self.thread.lock();
        if thread.is_some() {
            debug!(action = "start_ws", result = "already_running");
            return;
        }
        let Some(cmd_rx) = self.cmd_rx.lock().take() else {
            warn!(action = "start_ws", result = "fail", reason = "receiver_consumed");
            return;
        };

        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        let label = format!("ws-{}", handler.name());
        let handle = std::thread::Builder::new()
            .name(label)
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to build connector runtime");
                runtime.block_on(run_channel(config, shared, cmd_rx, handler, on_disconnect));
            })
            .expect("failed to spawn websocket thread");
        *thread = Some(handle);
    }

    /// Request shutdown, close the socket, join the worker. Idempotent.
    pub fn stop(&self) {
        self.shared.shutdown_requested.store(true, Ordering::Release);
        let _ = self.cmd_tx.send(WsCommand::Close);
        if let Some(handle) = self.thread.lock().take() {
            if handle.join().is_err() {
                error!(action = "join_ws_thread", result = "fail");
            }
        }
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_channel<H: VenueStream>(
    config: WsConfig,
    shared: Arc<WsShared>,
    mut cmd_rx: UnboundedReceiver<WsCommand>,
    mut handler: H,
    on_disconnect: DisconnectCallback,
) {
    loop {
        if shared.shutdown_requested.load(Ordering::Acquire) {
            shared.state.set(WsState::Disconnected);
            return;
        }

        shared.state.set(WsState::Connecting);
        let session = connect_once(&config, &shared, &mut cmd_rx, &mut handler, &on_disconnect);
        let ended_by_shutdown = session.await;
        shared.state.set(WsState::Disconnected);
        handler.on_disconnect();

        if ended_by_shutdown || shared.shutdown_requested.load(Ordering::Acquire) {
            return;
        }

        match shared.policy.on_connection_lost() {
            ReconnectDecision::Reconnect => {
                warn!(
                    action = "ws_reconnect",
                    channel = handler.name(),
                    attempt = shared.policy.attempts(),
                    retry_limit = shared.policy.retry_limit(),
                );
                on_disconnect(false);
                tokio::time::sleep(config.reconnect_delay).await;
            }
            ReconnectDecision::GiveUp => {
                error!(
                    action = "ws_reconnect",
                    channel = handler.name(),
                    result = "fail",
                    reason = "retry_limit_reached",
                    attempt = shared.policy.attempts(),
                );
                on_disconnect(true);
                return;
            }
        }
    }
}

/// Run one connection to completion. Returns true when the session
/// ended because shutdown was requested.
async fn connect_once<H: VenueStream>(
    config: &WsConfig,
    shared: &Arc<WsShared>,
    cmd_rx: &mut UnboundedReceiver<WsCommand>,
    handler: &mut H,
    on_disconnect: &DisconnectCallback,
) -> bool {
    let stream = match connect_async(&config.uri).await {
        Ok((stream, _response)) => stream,
        Err(err) => {
            warn!(
                action = "ws_connect",
                channel = handler.name(),
                result = "fail",
                error = %err,
            );
            return false;
        }
    };
    info!(action = "ws_connect", channel = handler.name(), result = "pass");

    let (mut write, mut read) = stream.split();

    for payload in handler.on_open() {
        if let Err(err) = write.send(Message::text(payload)).await {
            warn!(
                action = "ws_subscribe",
                channel = handler.name(),
                result = "fail",
                error = %err,
            );
            return false;
        }
    }
    shared.state.set(WsState::Open);

    loop {
        tokio::select! {
            inbound = read.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => handler.on_frame(text.as_ref()),
                    Some(Ok(Message::Ping(payload))) => {
                        if write.send(Message::Pong(payload)).await.is_err() {
                            return false;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        debug!(action = "heartbeat", channel = handler.name(), result = "pass");
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        warn!(action = "ws_closed", channel = handler.name());
                        return false;
                    }
                    Some(Err(err)) => {
                        warn!(action = "ws_read", channel = handler.name(), error = %err);
                        return false;
                    }
                    Some(Ok(_)) => {}
                }
            }
            command = cmd_rx.recv() => {
                match command {
                    Some(WsCommand::Send(payload)) => {
                        if let Err(err) = write.send(Message::text(payload)).await {
                            warn!(
                                action = "ws_send",
                                channel = handler.name(),
                                result = "fail",
                                error = %err,
                            );
                            return false;
                        }
                    }
                    Some(WsCommand::Heartbeat) => {
                        if let Some(payload) = handler.heartbeat_payload() {
                            debug!(action = "heartbeat", channel = handler.name(), state = "send");
                            if write.send(Message::text(payload)).await.is_err() {
                                on_disconnect(false);
                                return false;
                            }
                        }
                    }
                    Some(WsCommand::Close) | None => {
                        shared.state.set(WsState::Closing);
                        let _ = write.send(Message::Close(None)).await;
                        return true;
                    }
                }
            }
        }
    }
}
