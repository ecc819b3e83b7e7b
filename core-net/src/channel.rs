//! # Reconnecting Channel
//!
//! A duplex WebSocket channel that authenticates on every connect and
//! reconnects after any close or failed attempt.
//!
//! ```text
//!            ┌──────────────── delay ────────────────┐
//!            v                                       │
//!      Connecting ──auth frame──> Open ──drop──> Closed
//!            │                                       │
//!            └── policy exhausted / close(true) ──> Stopped
//! ```
//!
//! The first frame of every connection is `["auth", <access_token>]`, read
//! from the credential store at connect time. `on_open` runs only after it
//! was written, so callers never race it. Sends while the channel is not
//! open fail with [`TransportError::NotOpen`]; nothing is queued across a
//! disconnect.

use crate::error::{TransportError, TransportResult};
use bridge_traits::websocket::{
    WebSocketConnector, WebSocketReceiver, WebSocketSender, WsFrame,
};
use core_auth::CredentialStore;
use core_runtime::events::{CoreEvent, EventBus, TransportEvent};
use core_runtime::ReconnectPolicy;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

type MessageFn = Arc<dyn Fn(String) + Send + Sync>;
type OpenFn = Arc<dyn Fn() + Send + Sync>;
type CloseFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Channel lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    /// Between connections, waiting for the reconnect delay
    Closed,
    /// Terminal; no further reconnects
    Stopped,
}

/// Callbacks invoked from the channel task.
///
/// They run on the channel's task and should not block.
#[derive(Clone)]
pub struct ChannelHandlers {
    on_message: MessageFn,
    on_open: Option<OpenFn>,
    on_close: Option<CloseFn>,
}

impl ChannelHandlers {
    /// `on_message` receives every inbound text frame in arrival order.
    pub fn new(on_message: impl Fn(String) + Send + Sync + 'static) -> Self {
        Self {
            on_message: Arc::new(on_message),
            on_open: None,
            on_close: None,
        }
    }

    pub fn on_open(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_open = Some(Arc::new(callback));
        self
    }

    /// Called with the close reason, before any reconnect is scheduled.
    pub fn on_close(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(callback));
        self
    }
}

impl std::fmt::Debug for ChannelHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandlers")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .finish_non_exhaustive()
    }
}

/// Factory for reconnecting channels sharing one connector and credential store.
#[derive(Clone)]
pub struct ReconnectingChannel {
    connector: Arc<dyn WebSocketConnector>,
    credentials: CredentialStore,
    policy: ReconnectPolicy,
    connect_timeout: Duration,
    event_bus: EventBus,
}

impl ReconnectingChannel {
    pub fn new(
        connector: Arc<dyn WebSocketConnector>,
        credentials: CredentialStore,
        policy: ReconnectPolicy,
        connect_timeout: Duration,
        event_bus: EventBus,
    ) -> Self {
        Self {
            connector,
            credentials,
            policy,
            connect_timeout,
            event_bus,
        }
    }

    /// Start a channel to `endpoint` (a full `ws://` or `wss://` URL).
    ///
    /// Returns immediately; connecting happens on a background task. Dropping
    /// the handle stops the channel.
    pub fn connect(&self, endpoint: impl Into<String>, handlers: ChannelHandlers) -> ChannelHandle {
        let endpoint = endpoint.into();
        let (state, _) = watch::channel(ChannelState::Connecting);
        let shared = Arc::new(Shared {
            state,
            outbound: Mutex::new(None),
            current: Mutex::new(None),
        });
        let stop = CancellationToken::new();

        let task = ChannelTask {
            endpoint,
            channel: self.clone(),
            handlers,
            shared: shared.clone(),
            stop: stop.clone(),
        };
        let handle = tokio::spawn(task.run());

        ChannelHandle {
            shared,
            stop,
            task: Mutex::new(Some(handle)),
        }
    }
}

struct Shared {
    state: watch::Sender<ChannelState>,
    /// Present only while a connection is open
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    /// Cancels the current connection without stopping the channel
    current: Mutex<Option<CancellationToken>>,
}

impl Shared {
    fn set_state(&self, state: ChannelState) {
        self.state.send_replace(state);
    }

    fn install(&self, outbound: mpsc::UnboundedSender<String>, current: CancellationToken) {
        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = Some(outbound);
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(current);
    }

    fn uninstall(&self) {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Caller side of a running channel.
pub struct ChannelHandle {
    shared: Arc<Shared>,
    stop: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelHandle {
    /// Send `payload` as a JSON text frame.
    ///
    /// # Errors
    ///
    /// `TransportError::NotOpen` if the channel is not currently open.
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T) -> TransportResult<()> {
        self.send_text(serde_json::to_string(payload)?)
    }

    /// Send a raw text frame.
    pub fn send_text(&self, text: impl Into<String>) -> TransportResult<()> {
        let outbound = self
            .shared
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match outbound.as_ref() {
            Some(tx) => tx.send(text.into()).map_err(|_| TransportError::NotOpen),
            None => Err(TransportError::NotOpen),
        }
    }

    /// Close the current connection.
    ///
    /// With `permanent` the channel stops for good; otherwise it reconnects
    /// after the policy delay.
    pub fn close(&self, permanent: bool) {
        if permanent {
            self.stop.cancel();
            return;
        }
        let current = self
            .shared
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(token) = current {
            token.cancel();
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.shared.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.shared.state.subscribe()
    }

    /// Wait until the channel reaches `state`.
    ///
    /// Returns `false` if the channel stopped first.
    pub async fn wait_for(&self, state: ChannelState) -> bool {
        let mut rx = self.subscribe_state();
        let reached = match rx
            .wait_for(|current| *current == state || *current == ChannelState::Stopped)
            .await
        {
            Ok(reached) => *reached == state,
            Err(_) => false,
        };
        reached
    }

    /// Wait for the background task to end (after `close(true)` or a give-up).
    pub async fn join(&self) {
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Channel task ended abnormally");
            }
        }
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

struct ChannelTask {
    endpoint: String,
    channel: ReconnectingChannel,
    handlers: ChannelHandlers,
    shared: Arc<Shared>,
    stop: CancellationToken,
}

enum Attempt {
    /// The connection opened and later closed for `reason`
    Closed(String),
    /// The connection never opened
    Failed(TransportError),
}

impl ChannelTask {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn run(self) {
        let mut failures: u32 = 0;

        loop {
            if self.stop.is_cancelled() {
                break;
            }

            self.shared.set_state(ChannelState::Connecting);
            self.emit(TransportEvent::Connecting {
                endpoint: self.endpoint.clone(),
                attempt: failures + 1,
            });

            let attempt = tokio::select! {
                biased;

                attempt = self.attempt() => attempt,
                _ = self.stop.cancelled() => break,
            };

            let reason = match attempt {
                Attempt::Closed(reason) => {
                    failures = 0;
                    reason
                }
                Attempt::Failed(e) => {
                    failures += 1;
                    warn!(error = %e, failures, "Channel connect failed");
                    e.to_string()
                }
            };

            self.shared.uninstall();
            self.shared.set_state(ChannelState::Closed);
            if let Some(on_close) = &self.handlers.on_close {
                on_close(&reason);
            }
            self.emit(TransportEvent::Closed {
                endpoint: self.endpoint.clone(),
                reason,
            });

            if self.stop.is_cancelled() {
                break;
            }
            if !self.channel.policy.allows(failures) {
                warn!(attempts = failures, "Giving up on channel");
                self.emit(TransportEvent::GaveUp {
                    endpoint: self.endpoint.clone(),
                    attempts: failures,
                });
                break;
            }

            let delay = self.channel.policy.delay_for(failures.max(1));
            debug!(delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
            tokio::select! {
                _ = self.stop.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.shared.uninstall();
        self.shared.set_state(ChannelState::Stopped);
        info!("Channel stopped");
    }

    /// One connection: connect, authenticate, pump frames until it closes.
    async fn attempt(&self) -> Attempt {
        let (mut sender, mut receiver) = match self.open().await {
            Ok(halves) => halves,
            Err(e) => return Attempt::Failed(e),
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let current = self.stop.child_token();
        self.shared.install(tx, current.clone());
        info!("Channel open");
        if let Some(on_open) = &self.handlers.on_open {
            on_open();
        }
        self.shared.set_state(ChannelState::Open);
        self.emit(TransportEvent::Open {
            endpoint: self.endpoint.clone(),
        });

        let reason = loop {
            tokio::select! {
                biased;

                _ = current.cancelled() => {
                    if let Err(e) = sender.close().await {
                        debug!(error = %e, "Close handshake failed");
                    }
                    break if self.stop.is_cancelled() {
                        "closed permanently".to_string()
                    } else {
                        "closed by client".to_string()
                    };
                }
                frame = receiver.next_frame() => match frame {
                    Some(Ok(WsFrame::Text(text))) => (self.handlers.on_message)(text),
                    Some(Ok(WsFrame::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => (self.handlers.on_message)(text),
                        Err(_) => debug!(len = bytes.len(), "Ignoring non-UTF-8 binary frame"),
                    },
                    Some(Ok(WsFrame::Close(reason))) => {
                        break reason.unwrap_or_else(|| "closed by server".to_string());
                    }
                    Some(Err(e)) => break TransportError::Io(e.to_string()).to_string(),
                    None => break "connection lost".to_string(),
                },
                Some(text) = rx.recv() => {
                    if let Err(e) = sender.send(WsFrame::Text(text)).await {
                        break TransportError::Io(e.to_string()).to_string();
                    }
                }
            }
        };

        debug!(%reason, "Channel closed");
        Attempt::Closed(reason)
    }

    async fn open(
        &self,
    ) -> TransportResult<(Box<dyn WebSocketSender>, Box<dyn WebSocketReceiver>)> {
        let connect = self.channel.connector.connect(&self.endpoint);
        let connection = match tokio::time::timeout(self.channel.connect_timeout, connect).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => return Err(TransportError::Connect(e.to_string())),
            Err(_) => {
                return Err(TransportError::Connect(format!(
                    "handshake exceeded {:?}",
                    self.channel.connect_timeout
                )))
            }
        };

        let mut sender = connection.sender;
        let token = self.channel.credentials.access_token().await?;
        let auth = serde_json::to_string(&("auth", token.as_str()))?;
        sender
            .send(WsFrame::Text(auth))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;

        Ok((sender, connection.receiver))
    }

    fn emit(&self, event: TransportEvent) {
        self.channel.event_bus.emit(CoreEvent::Transport(event)).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::websocket::WebSocketConnection;
    use core_auth::Credentials;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

    /// Server end of one fake connection.
    struct ServerSide {
        from_client: UnboundedReceiver<WsFrame>,
        to_client: UnboundedSender<WsFrame>,
    }

    struct FakeSender(UnboundedSender<WsFrame>);

    #[async_trait]
    impl WebSocketSender for FakeSender {
        async fn send(&mut self, frame: WsFrame) -> BridgeResult<()> {
            self.0
                .send(frame)
                .map_err(|_| BridgeError::Connection("peer gone".to_string()))
        }

        async fn close(&mut self) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct FakeReceiver(UnboundedReceiver<WsFrame>);

    #[async_trait]
    impl WebSocketReceiver for FakeReceiver {
        async fn next_frame(&mut self) -> Option<BridgeResult<WsFrame>> {
            self.0.recv().await.map(Ok)
        }
    }

    struct FakeConnector {
        accepted: UnboundedSender<ServerSide>,
        refuse: bool,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl WebSocketConnector for FakeConnector {
        async fn connect(&self, _url: &str) -> BridgeResult<WebSocketConnection> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.refuse {
                return Err(BridgeError::Connection("refused".to_string()));
            }
            let (client_tx, server_rx) = mpsc::unbounded_channel();
            let (server_tx, client_rx) = mpsc::unbounded_channel();
            self.accepted
                .send(ServerSide {
                    from_client: server_rx,
                    to_client: server_tx,
                })
                .map_err(|_| BridgeError::Connection("server gone".to_string()))?;
            Ok(WebSocketConnection {
                sender: Box::new(FakeSender(client_tx)),
                receiver: Box::new(FakeReceiver(client_rx)),
            })
        }
    }

    struct Fixture {
        channel: ReconnectingChannel,
        connector: Arc<FakeConnector>,
        accepted: UnboundedReceiver<ServerSide>,
        credentials: CredentialStore,
        events: tokio::sync::broadcast::Receiver<CoreEvent>,
    }

    async fn fixture(refuse: bool, max_attempts: Option<u32>) -> Fixture {
        fixture_with(refuse, ReconnectPolicy::fixed(Duration::from_millis(10), max_attempts)).await
    }

    async fn fixture_with(refuse: bool, policy: ReconnectPolicy) -> Fixture {
        let (accepted_tx, accepted) = mpsc::unbounded_channel();
        let connector = Arc::new(FakeConnector {
            accepted: accepted_tx,
            refuse,
            attempts: AtomicUsize::new(0),
        });
        let credentials = CredentialStore::new();
        credentials
            .replace(Credentials::new("tok-1".to_string(), None, None, 600))
            .await;
        let bus = EventBus::new(256);
        let events = bus.subscribe();
        let channel = ReconnectingChannel::new(
            connector.clone(),
            credentials.clone(),
            policy,
            Duration::from_secs(1),
            bus,
        );
        Fixture {
            channel,
            connector,
            accepted,
            credentials,
            events,
        }
    }

    fn collecting() -> (ChannelHandlers, UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handlers = ChannelHandlers::new(move |text| {
            tx.send(text).ok();
        });
        (handlers, rx)
    }

    fn auth_frame(token: &str) -> WsFrame {
        WsFrame::Text(format!(r#"["auth","{}"]"#, token))
    }

    #[tokio::test]
    async fn test_auth_frame_precedes_caller_messages() {
        let mut fx = fixture(false, None).await;
        let (handlers, mut inbox) = collecting();
        let handle = fx.channel.connect("wss://host/socket", handlers);

        let mut server = fx.accepted.recv().await.unwrap();
        assert!(handle.wait_for(ChannelState::Open).await);
        handle.send(&json!(["subscribe", "jobs"])).unwrap();

        assert_eq!(server.from_client.recv().await.unwrap(), auth_frame("tok-1"));
        assert_eq!(
            server.from_client.recv().await.unwrap(),
            WsFrame::Text(r#"["subscribe","jobs"]"#.to_string())
        );

        server.to_client.send(WsFrame::Text("one".to_string())).unwrap();
        server.to_client.send(WsFrame::Text("two".to_string())).unwrap();
        assert_eq!(inbox.recv().await.unwrap(), "one");
        assert_eq!(inbox.recv().await.unwrap(), "two");
    }

    #[tokio::test]
    async fn test_each_close_reconnects_once_and_reauthenticates() {
        let mut fx = fixture(false, None).await;
        let closes = Arc::new(AtomicUsize::new(0));
        let opens = Arc::new(AtomicUsize::new(0));
        let (close_count, open_count) = (closes.clone(), opens.clone());
        let handlers = ChannelHandlers::new(|_| {})
            .on_open(move || {
                open_count.fetch_add(1, Ordering::SeqCst);
            })
            .on_close(move |_| {
                close_count.fetch_add(1, Ordering::SeqCst);
            });
        let handle = fx.channel.connect("wss://host/socket", handlers);

        for round in 0..3 {
            let mut server = fx.accepted.recv().await.unwrap();
            assert_eq!(server.from_client.recv().await.unwrap(), auth_frame("tok-1"));
            assert!(handle.wait_for(ChannelState::Open).await, "round {round}");
            drop(server);
        }
        let mut server = fx.accepted.recv().await.unwrap();
        assert_eq!(server.from_client.recv().await.unwrap(), auth_frame("tok-1"));
        assert!(handle.wait_for(ChannelState::Open).await);

        assert_eq!(fx.connector.attempts.load(Ordering::SeqCst), 4);
        assert_eq!(closes.load(Ordering::SeqCst), 3);
        assert_eq!(opens.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_waits_for_policy_delay() {
        let delay = Duration::from_secs(2);
        let mut fx = fixture_with(false, ReconnectPolicy::fixed(delay, None)).await;
        let handle = fx.channel.connect("wss://host/socket", ChannelHandlers::new(|_| {}));

        let server = fx.accepted.recv().await.unwrap();
        assert!(handle.wait_for(ChannelState::Open).await);
        drop(server);
        assert!(handle.wait_for(ChannelState::Closed).await);
        let closed_at = tokio::time::Instant::now();

        tokio::time::advance(delay - Duration::from_millis(100)).await;
        tokio::task::yield_now().await;
        assert!(fx.accepted.try_recv().is_err());
        assert_eq!(fx.connector.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(handle.state(), ChannelState::Closed);

        let _second = fx.accepted.recv().await.unwrap();
        assert!(closed_at.elapsed() >= delay);
        assert_eq!(fx.connector.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reconnect_uses_current_token() {
        let mut fx = fixture(false, None).await;
        let handle = fx.channel.connect("wss://host/socket", ChannelHandlers::new(|_| {}));

        let mut first = fx.accepted.recv().await.unwrap();
        assert_eq!(first.from_client.recv().await.unwrap(), auth_frame("tok-1"));
        assert!(handle.wait_for(ChannelState::Open).await);

        fx.credentials
            .replace(Credentials::new("tok-2".to_string(), None, None, 600))
            .await;
        handle.close(false);

        let mut second = fx.accepted.recv().await.unwrap();
        assert_eq!(second.from_client.recv().await.unwrap(), auth_frame("tok-2"));
    }

    #[tokio::test]
    async fn test_send_while_not_open_is_rejected() {
        let fx = fixture(true, None).await;
        let handle = fx.channel.connect("wss://host/socket", ChannelHandlers::new(|_| {}));

        assert!(matches!(
            handle.send(&json!({"op": "ping"})),
            Err(TransportError::NotOpen)
        ));
        handle.close(true);
        handle.join().await;
        assert_eq!(handle.state(), ChannelState::Stopped);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let mut fx = fixture(true, Some(3)).await;
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let sink = reasons.clone();
        let handlers = ChannelHandlers::new(|_| {}).on_close(move |reason| {
            sink.lock().unwrap().push(reason.to_string());
        });

        let handle = fx.channel.connect("wss://host/socket", handlers);
        handle.join().await;

        assert_eq!(handle.state(), ChannelState::Stopped);
        assert_eq!(fx.connector.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(reasons.lock().unwrap().len(), 3);

        let mut gave_up = None;
        while let Ok(event) = fx.events.try_recv() {
            if let CoreEvent::Transport(TransportEvent::GaveUp { attempts, .. }) = event {
                gave_up = Some(attempts);
            }
        }
        assert_eq!(gave_up, Some(3));
    }

    #[tokio::test]
    async fn test_permanent_close_suppresses_reconnect() {
        let mut fx = fixture(false, None).await;
        let handle = fx.channel.connect("wss://host/socket", ChannelHandlers::new(|_| {}));

        let _server = fx.accepted.recv().await.unwrap();
        assert!(handle.wait_for(ChannelState::Open).await);

        handle.close(true);
        handle.join().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(handle.state(), ChannelState::Stopped);
        assert_eq!(fx.connector.attempts.load(Ordering::SeqCst), 1);
        assert!(fx.accepted.try_recv().is_err());
        assert!(matches!(
            handle.send_text("late"),
            Err(TransportError::NotOpen)
        ));
    }

    #[tokio::test]
    async fn test_server_close_reason_reaches_on_close() {
        let mut fx = fixture(false, None).await;
        let (reason_tx, mut reason_rx) = mpsc::unbounded_channel();
        let handlers = ChannelHandlers::new(|_| {}).on_close(move |reason| {
            reason_tx.send(reason.to_string()).ok();
        });
        let handle = fx.channel.connect("wss://host/socket", handlers);

        let server = fx.accepted.recv().await.unwrap();
        assert!(handle.wait_for(ChannelState::Open).await);
        server
            .to_client
            .send(WsFrame::Close(Some("going away".to_string())))
            .unwrap();

        assert_eq!(reason_rx.recv().await.unwrap(), "going away");
    }
}
