// =============================================================================
// Connection Manager — feed session state machine
// =============================================================================
//
//   Disconnected → Connecting → Authenticating → Subscribed
//                      ↑                             │
//                      └──────── Reconnecting ◄──────┘  (error, close, timeout)
//
// A single driver task owns the socket.  It authorises on open, subscribes
// on the auth ack and forwards ticks over a bounded channel; it never touches
// candle state.  Failures back off exponentially; a healthy session is
// refreshed on a wall-clock schedule or on request.
// =============================================================================

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use futures_util::future::BoxFuture;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::backoff::{ReconnectPolicy, ScheduledReconnect};
use super::error::ConnectionError;
use super::protocol::{authorize_request, parse_message, subscribe_request, FeedMessage};
use crate::clock::Clock;
use crate::runtime_config::FeedConfig;
use crate::types::{ConnectionState, Tick};

/// Write half of a feed session.
pub type FeedSink = Pin<Box<dyn Sink<Message, Error = anyhow::Error> + Send>>;
/// Read half of a feed session.
pub type FeedStream = Pin<Box<dyn Stream<Item = anyhow::Result<Message>> + Send>>;

/// Opens transport sessions.  The production implementation is a WebSocket.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: &str) -> BoxFuture<'static, anyhow::Result<(FeedSink, FeedStream)>>;
}

/// `tokio-tungstenite` WebSocket connector.
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, anyhow::Result<(FeedSink, FeedStream)>> {
        let url = url.to_string();
        Box::pin(async move {
            let (ws_stream, _response) = connect_async(url.as_str())
                .await
                .context("failed to connect to feed WebSocket")?;
            let (write, read) = ws_stream.split();
            let sink: FeedSink = Box::pin(write.sink_map_err(anyhow::Error::from));
            let stream: FeedStream = Box::pin(read.map(|r| r.map_err(anyhow::Error::from)));
            Ok((sink, stream))
        })
    }
}

/// What the driver hands to the analysis side.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Tick(Tick),
    StateChanged(ConnectionState),
    /// A failed session; the next attempt starts after `delay`.
    Reconnecting { attempt: u32, delay: Duration },
    /// Attempt budget exhausted; the driver has stopped.
    Fatal { attempts: u32 },
}

// =============================================================================
// Shared state & handle
// =============================================================================

struct Shared {
    state_tx: watch::Sender<ConnectionState>,
    schedule: Mutex<ScheduledReconnect>,
    reconnect_requested: AtomicBool,
    clock: Arc<dyn Clock>,
}

/// Cheap, cloneable read/trigger access to a running manager.
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
}

impl ConnectionHandle {
    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    /// Refresh the session at the next housekeeping tick.
    pub fn request_reconnect(&self) {
        info!("manual reconnect requested");
        self.shared.reconnect_requested.store(true, Ordering::SeqCst);
    }

    /// Seconds until the scheduled refresh, while a session is subscribed.
    pub fn seconds_until_scheduled_reconnect(&self) -> Option<i64> {
        let now = self.shared.clock.now_secs();
        self.shared.schedule.lock().remaining(now)
    }
}

// =============================================================================
// ConnectionManager
// =============================================================================

pub struct ConnectionManager {
    config: FeedConfig,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    events: mpsc::Sender<FeedEvent>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<Result<(), ConnectionError>>>,
}

impl ConnectionManager {
    pub fn new(
        config: FeedConfig,
        connector: Arc<dyn Connector>,
        clock: Arc<dyn Clock>,
        events: mpsc::Sender<FeedEvent>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, _) = watch::channel(false);
        let schedule = ScheduledReconnect::new(config.scheduled_reconnect_secs);
        Self {
            config,
            connector,
            shared: Arc::new(Shared {
                state_tx,
                schedule: Mutex::new(schedule),
                reconnect_requested: AtomicBool::new(false),
                clock,
            }),
            events,
            shutdown_tx,
            task: None,
        }
    }

    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            shared: self.shared.clone(),
        }
    }

    /// Start the driver and wait until the session is subscribed.
    ///
    /// On `HandshakeTimeout` the driver keeps retrying in the background;
    /// a fatal driver exit inside the wait is returned directly.
    pub async fn connect(&mut self) -> Result<(), ConnectionError> {
        if self.task.is_some() {
            return Err(ConnectionError::AlreadyStarted);
        }
        self.shutdown_tx.send_replace(false);

        let driver = Driver {
            config: self.config.clone(),
            connector: self.connector.clone(),
            shared: self.shared.clone(),
            events: self.events.clone(),
        };
        let shutdown_rx = self.shutdown_tx.subscribe();
        self.task = Some(tokio::spawn(driver.run(shutdown_rx)));

        let secs = self.config.connect_timeout_secs;
        let mut state_rx = self.shared.state_tx.subscribe();

        enum Waited {
            Ready(Result<(), ConnectionError>),
            Exited(Result<(), ConnectionError>),
        }

        let waited = {
            let Some(task) = self.task.as_mut() else {
                return Err(ConnectionError::NotRunning);
            };
            let subscribed = tokio::time::timeout(
                Duration::from_secs(secs),
                state_rx.wait_for(|s| *s == ConnectionState::Subscribed),
            );
            tokio::select! {
                res = subscribed => Waited::Ready(match res {
                    Ok(Ok(_)) => Ok(()),
                    Ok(Err(_)) => Err(ConnectionError::Task("state channel closed".into())),
                    Err(_) => Err(ConnectionError::HandshakeTimeout { secs }),
                }),
                joined = task => Waited::Exited(flatten_join(joined)),
            }
        };

        match waited {
            Waited::Ready(res) => res,
            Waited::Exited(res) => {
                self.task = None;
                // A driver that stops before subscribing has failed.
                res.and(Err(ConnectionError::NotRunning))
            }
        }
    }

    /// Resolve when the driver stops on its own.
    pub async fn closed(&mut self) -> Result<(), ConnectionError> {
        let Some(task) = self.task.as_mut() else {
            return Err(ConnectionError::NotRunning);
        };
        let joined = task.await;
        self.task = None;
        flatten_join(joined)
    }

    /// Close the session and stop the driver.  Safe in any state.
    pub async fn disconnect(&mut self) {
        self.shutdown_tx.send_replace(true);
        if let Some(task) = self.task.take() {
            match tokio::time::timeout(Duration::from_secs(5), task).await {
                Ok(joined) => {
                    if let Err(e) = flatten_join(joined) {
                        warn!(error = %e, "feed driver ended with error");
                    }
                }
                Err(_) => warn!("feed driver did not stop within 5s"),
            }
        }
        self.shared.schedule.lock().disarm();
        self.shared.state_tx.send_replace(ConnectionState::Disconnected);
        info!("feed disconnected");
    }
}

fn flatten_join(
    joined: Result<Result<(), ConnectionError>, tokio::task::JoinError>,
) -> Result<(), ConnectionError> {
    joined.map_err(|e| ConnectionError::Task(e.to_string()))?
}

// =============================================================================
// Driver
// =============================================================================

enum SessionEnd {
    Shutdown,
    Refresh,
    Failed(anyhow::Error),
}

struct Driver {
    config: FeedConfig,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    events: mpsc::Sender<FeedEvent>,
}

impl Driver {
    fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = self.shared.state_tx.send_replace(next);
        if prev != next {
            info!(from = %prev, to = %next, "feed state");
            self.emit(FeedEvent::StateChanged(next));
        }
    }

    /// Informational events only; a full queue drops them.
    fn emit(&self, event: FeedEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(ev)) => {
                warn!(event = ?ev, "feed event queue full, event dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("feed event consumer gone");
            }
        }
    }

    /// Ticks are never dropped on a full queue.  The session waits for room
    /// and fails as a transport error once the consumer has stalled for
    /// `tick_send_timeout_secs`.
    async fn forward_tick(&self, tick: Tick) -> anyhow::Result<()> {
        let wait = Duration::from_secs(self.config.tick_send_timeout_secs);
        match tokio::time::timeout(wait, self.events.send(FeedEvent::Tick(tick))).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => {
                debug!("feed event consumer gone, tick discarded");
                Ok(())
            }
            Err(_) => Err(anyhow!(
                "tick consumer stalled for {}s",
                wait.as_secs()
            )),
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), ConnectionError> {
        let mut policy = ReconnectPolicy::new(
            self.config.backoff_cap_secs,
            self.config.max_reconnect_attempts,
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            self.set_state(ConnectionState::Connecting);

            let pause = match self.run_session(&mut shutdown, &mut policy).await {
                SessionEnd::Shutdown => break,
                SessionEnd::Refresh => {
                    self.shared.schedule.lock().disarm();
                    self.set_state(ConnectionState::Reconnecting);
                    info!(
                        pause_secs = self.config.scheduled_pause_secs,
                        "refreshing feed session"
                    );
                    Duration::from_secs(self.config.scheduled_pause_secs)
                }
                SessionEnd::Failed(e) => {
                    self.shared.schedule.lock().disarm();
                    self.set_state(ConnectionState::Reconnecting);
                    match policy.next_delay() {
                        Some(delay) => {
                            warn!(
                                error = %e,
                                attempt = policy.attempt(),
                                max = policy.max_attempts(),
                                delay_secs = delay.as_secs(),
                                "feed session failed, reconnecting"
                            );
                            self.emit(FeedEvent::Reconnecting {
                                attempt: policy.attempt(),
                                delay,
                            });
                            delay
                        }
                        None => {
                            let attempts = policy.max_attempts();
                            error!(error = %e, attempts, "feed reconnect attempts exhausted");
                            self.emit(FeedEvent::Fatal { attempts });
                            self.set_state(ConnectionState::Disconnected);
                            return Err(ConnectionError::MaxAttemptsExceeded { attempts });
                        }
                    }
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.set_state(ConnectionState::Disconnected);
        Ok(())
    }

    async fn run_session(
        &self,
        shutdown: &mut watch::Receiver<bool>,
        policy: &mut ReconnectPolicy,
    ) -> SessionEnd {
        let connect_timeout = Duration::from_secs(self.config.connect_timeout_secs);
        let opened = tokio::time::timeout(connect_timeout, self.connector.connect(&self.config.url));
        let (mut sink, mut stream) = tokio::select! {
            res = opened => match res {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => return SessionEnd::Failed(e),
                Err(_) => {
                    return SessionEnd::Failed(anyhow!(
                        "transport open timed out after {}s",
                        self.config.connect_timeout_secs
                    ))
                }
            },
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    return SessionEnd::Shutdown;
                }
                return SessionEnd::Failed(anyhow!("interrupted while connecting"));
            }
        };

        self.set_state(ConnectionState::Authenticating);
        if let Err(e) = sink
            .send(Message::Text(authorize_request(&self.config.api_token)))
            .await
        {
            return SessionEnd::Failed(e.context("failed to send authorize request"));
        }

        let handshake_deadline = Instant::now() + connect_timeout;
        let ping_every = Duration::from_secs(self.config.ping_interval_secs.max(1));
        let pong_timeout = Duration::from_secs(self.config.pong_timeout_secs);
        let mut ping = tokio::time::interval_at(Instant::now() + ping_every, ping_every);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut housekeeping = tokio::time::interval(Duration::from_secs(1));
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut awaiting_pong: Option<Instant> = None;

        let end = loop {
            tokio::select! {
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break SessionEnd::Shutdown;
                    }
                }

                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = self.on_text(&text, &mut sink, policy).await {
                            break SessionEnd::Failed(e);
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sink.send(Message::Pong(data)).await {
                            break SessionEnd::Failed(e.context("failed to answer ping"));
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        awaiting_pong = None;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break SessionEnd::Failed(anyhow!("feed closed the session: {frame:?}"));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break SessionEnd::Failed(e.context("feed read error")),
                    None => break SessionEnd::Failed(anyhow!("feed stream ended")),
                },

                _ = ping.tick() => {
                    if awaiting_pong.is_none() {
                        awaiting_pong = Some(Instant::now());
                    }
                    if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                        break SessionEnd::Failed(e.context("failed to send ping"));
                    }
                }

                _ = housekeeping.tick() => {
                    if let Some(sent) = awaiting_pong {
                        if sent.elapsed() >= pong_timeout {
                            break SessionEnd::Failed(anyhow!(
                                "no pong within {}s",
                                pong_timeout.as_secs()
                            ));
                        }
                    }
                    if self.state() != ConnectionState::Subscribed {
                        if Instant::now() >= handshake_deadline {
                            break SessionEnd::Failed(anyhow!(
                                "not subscribed within {}s of opening",
                                connect_timeout.as_secs()
                            ));
                        }
                    } else if self.refresh_due() {
                        break SessionEnd::Refresh;
                    }
                }
            }
        };

        if matches!(end, SessionEnd::Shutdown | SessionEnd::Refresh) {
            if let Err(e) = sink.close().await {
                debug!(error = %e, "close on feed session failed");
            }
        }
        end
    }

    fn refresh_due(&self) -> bool {
        let mut schedule = self.shared.schedule.lock();
        if self.shared.reconnect_requested.swap(false, Ordering::SeqCst) {
            schedule.force();
        }
        schedule.is_due(self.shared.clock.now_secs())
    }

    async fn on_text(
        &self,
        text: &str,
        sink: &mut FeedSink,
        policy: &mut ReconnectPolicy,
    ) -> anyhow::Result<()> {
        let msg = match parse_message(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "failed to parse feed message");
                return Ok(());
            }
        };

        let auth_failure = msg.is_auth_error();
        match msg {
            FeedMessage::Tick(tick) => {
                if self.state() == ConnectionState::Subscribed {
                    debug!(price = tick.price, epoch = tick.epoch_seconds, "tick");
                    self.forward_tick(tick).await?;
                } else {
                    debug!(state = %self.state(), "tick before subscription dropped");
                }
            }
            FeedMessage::Authorized { login_id } => {
                info!(login_id = ?login_id, symbol = %self.config.symbol, "authorized, subscribing to ticks");
                sink.send(Message::Text(subscribe_request(&self.config.symbol)))
                    .await
                    .context("failed to send subscribe request")?;
                policy.reset();
                self.shared.schedule.lock().arm(self.shared.clock.now_secs());
                self.set_state(ConnectionState::Subscribed);
            }
            FeedMessage::Error { code, message, .. } => {
                if auth_failure || self.state() == ConnectionState::Authenticating {
                    return Err(anyhow!("authorization rejected: {message}"));
                }
                warn!(code = ?code, message = %message, "feed reported an error");
            }
            FeedMessage::Other { msg_type } => {
                debug!(msg_type = ?msg_type, "unhandled feed message");
            }
        }
        Ok(())
    }
}
