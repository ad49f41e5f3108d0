//! Process-wide live-update service.
//!
//! One [`LiveUpdateService`] per session owns the only [`LiveConnection`].
//! UI surfaces never create connections; they hold a [`Subscription`] for as
//! long as they want fresh data. The channel is kept open while a session
//! identity is known and at least one subscription is alive.

use std::future::Future;

use pulse_shared::Envelope;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::{broadcast, watch};

use super::connection::{ConnectionState, LiveConnection};
use super::transport::{ChannelId, Scheduler, TimerId, Transport, TransportEvent};
use crate::config::{ConfigError, LiveConfig};
use crate::stores::CacheInvalidator;

#[cfg(not(target_arch = "wasm32"))]
use super::transport::{TokioScheduler as PlatformScheduler, TungsteniteTransport as PlatformTransport};

#[cfg(target_arch = "wasm32")]
use super::transport::{GlooScheduler as PlatformScheduler, WebSocketTransport as PlatformTransport};

/// Routed events buffered per subscriber before the slowest one lags.
const EVENT_CAPACITY: usize = 64;

#[derive(Debug)]
enum Command {
    StartSession(String),
    EndSession,
    Subscribe,
    Unsubscribe,
    Send(Envelope),
    Reconnect,
    Shutdown,
}

/// Entry point: spawns the task that owns the connection.
pub struct LiveUpdateService;

impl LiveUpdateService {
    /// Spawn the service: on the current tokio runtime natively, on the
    /// page's event loop in the browser.
    ///
    /// Nothing connects until a session is started and something subscribes.
    pub fn spawn<C>(config: LiveConfig, cache: C) -> Result<LiveHandle, ConfigError>
    where
        C: CacheInvalidator + Send + 'static,
    {
        let endpoint = config.endpoint()?;

        let (transport_tx, transport_rx) = unbounded_channel();
        let (timer_tx, timer_rx) = unbounded_channel();
        let connection = LiveConnection::new(
            endpoint,
            config.reconnect,
            PlatformTransport::new(transport_tx),
            PlatformScheduler::new(timer_tx),
            cache,
        );

        let (handle, driver) = LiveHandle::with_connection(connection);
        spawn_driver(driver.run(transport_rx, timer_rx));
        Ok(handle)
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn spawn_driver(run: impl Future<Output = ()> + Send + 'static) {
    tokio::spawn(run);
}

#[cfg(target_arch = "wasm32")]
fn spawn_driver(run: impl Future<Output = ()> + 'static) {
    wasm_bindgen_futures::spawn_local(run);
}

/// Cloneable handle to the running service.
#[derive(Clone)]
pub struct LiveHandle {
    commands: UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    events: broadcast::Sender<Envelope>,
}

impl LiveHandle {
    /// Wrap `connection` in a driver. The caller runs the driver with the
    /// receiving ends of the connection's transport and scheduler reports.
    fn with_connection<T, S, C>(connection: LiveConnection<T, S, C>) -> (Self, Driver<T, S, C>) {
        let (commands_tx, commands_rx) = unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let driver = Driver {
            connection,
            commands: commands_rx,
            identity: None,
            subscribers: 0,
            state_tx,
            events_tx: events_tx.clone(),
        };
        let handle = LiveHandle {
            commands: commands_tx,
            state: state_rx,
            events: events_tx,
        };
        (handle, driver)
    }

    /// Start the session for `identity`. A blank identity keeps the channel idle.
    pub fn start_session(&self, identity: impl Into<String>) {
        self.command(Command::StartSession(identity.into()));
    }

    /// End the session: cancel any pending reconnect and close the channel.
    pub fn end_session(&self) {
        self.command(Command::EndSession);
    }

    /// Register interest in live updates until the returned guard is dropped.
    pub fn subscribe(&self) -> Subscription {
        let events = self.events.subscribe();
        self.command(Command::Subscribe);
        Subscription {
            commands: self.commands.clone(),
            state: self.state.clone(),
            events,
        }
    }

    /// Send an application envelope. Dropped unless the channel is open.
    pub fn send(&self, envelope: Envelope) {
        self.command(Command::Send(envelope));
    }

    /// Manual recovery once automatic reconnects have given up.
    pub fn reconnect(&self) {
        self.command(Command::Reconnect);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Receiver for connection state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Stop the service, closing the channel. Other handles become inert.
    pub fn shutdown(&self) {
        self.command(Command::Shutdown);
    }

    /// False once the driver has stopped and released its command queue.
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    fn command(&self, command: Command) {
        if let Err(e) = self.commands.send(command) {
            crate::log_debug!("Live updates: service stopped, dropping {:?}", e.0);
        }
    }
}

/// A consumer's interest in live updates.
///
/// Dropping it unsubscribes; when the last subscription goes away the channel
/// is closed and any pending reconnect is cancelled.
pub struct Subscription {
    commands: UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    events: broadcast::Receiver<Envelope>,
}

impl Subscription {
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Consumers may use this to switch a polling fallback on or off.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Wait for the next connection state change.
    ///
    /// Returns `None` once the service has stopped.
    pub async fn changed(&mut self) -> Option<ConnectionState> {
        self.state.changed().await.ok()?;
        Some(*self.state.borrow_and_update())
    }

    /// Next routed event, after its cache keys were invalidated.
    ///
    /// Events missed because this subscriber lagged are skipped. Returns
    /// `None` once the service and every [`LiveHandle`] are gone.
    pub async fn next_event(&mut self) -> Option<Envelope> {
        loop {
            match self.events.recv().await {
                Ok(envelope) => return Some(envelope),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    crate::log_warn!(missed = missed; "Live updates: subscriber lagged, skipping events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Unsubscribe);
    }
}

/// Owns the connection; every input is handled here, one at a time.
struct Driver<T, S, C> {
    connection: LiveConnection<T, S, C>,
    commands: UnboundedReceiver<Command>,
    identity: Option<String>,
    subscribers: usize,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: broadcast::Sender<Envelope>,
}

impl<T, S, C> Driver<T, S, C>
where
    T: Transport,
    S: Scheduler,
    C: CacheInvalidator,
{
    async fn run(
        mut self,
        mut transport: UnboundedReceiver<(ChannelId, TransportEvent)>,
        mut timers: UnboundedReceiver<TimerId>,
    ) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some((channel, event)) = transport.recv() => {
                    if let Some(envelope) = self.connection.on_transport_event(channel, event) {
                        // No receivers is fine: nobody is listening for raw events.
                        let _ = self.events_tx.send(envelope);
                    }
                }
                Some(timer) = timers.recv() => self.connection.on_timer(timer),
            }
            self.publish_state();
        }

        crate::log_info!("Live updates: service stopping");
        self.connection.deactivate();
        self.publish_state();
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartSession(identity) => {
                self.identity = Some(identity).filter(|id| !id.trim().is_empty());
                self.reconcile();
            }
            Command::EndSession => {
                self.identity = None;
                self.reconcile();
            }
            Command::Subscribe => {
                self.subscribers += 1;
                self.reconcile();
            }
            Command::Unsubscribe => {
                self.subscribers = self.subscribers.saturating_sub(1);
                self.reconcile();
            }
            Command::Send(envelope) => self.connection.send(&envelope),
            Command::Reconnect => {
                if self.wants_channel() {
                    self.connection.reconnect();
                }
            }
            Command::Shutdown => {}
        }
    }

    fn wants_channel(&self) -> bool {
        self.identity.is_some() && self.subscribers > 0
    }

    /// Bring the connection in line with session and subscriber count.
    fn reconcile(&mut self) {
        match self.identity.as_deref().filter(|_| self.subscribers > 0) {
            Some(identity) => {
                let already = self.connection.is_active()
                    && self.connection.identity() == Some(identity);
                if !already {
                    self.connection.activate(identity);
                }
            }
            None => self.connection.deactivate(),
        }
    }

    fn publish_state(&self) {
        let state = self.connection.state();
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}
