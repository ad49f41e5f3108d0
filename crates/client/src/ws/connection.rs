//! Live-update connection with state management and auto-reconnect.
//!
//! [`LiveConnection`] is a plain state machine. It is driven by the caller
//! (`activate`, `deactivate`, `send`) and by the reports of its transport and
//! scheduler (`on_transport_event`, `on_timer`). All of these must be called
//! from one logical thread, one at a time; nothing here blocks.

use pulse_shared::{router, ClientFrame, Envelope};
use url::Url;

use super::backoff::ReconnectConfig;
use super::transport::{ChannelId, Scheduler, TimerId, Transport, TransportEvent};
use crate::stores::CacheInvalidator;

/// Connection state for the live-update channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    /// Deactivated while the channel was still opening; it is closed as soon
    /// as the open completes.
    Closing,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

/// Owns one channel to the live-update endpoint and keeps it alive while
/// active, feeding every pushed event through the router into the cache.
pub struct LiveConnection<T, S, C> {
    endpoint: Url,
    reconnect_config: ReconnectConfig,
    transport: T,
    scheduler: S,
    cache: C,
    state: ConnectionState,
    identity: Option<String>,
    active: bool,
    /// The single live (or opening) channel.
    channel: Option<ChannelId>,
    /// Pending reconnect timer.
    timer: Option<TimerId>,
    /// Reconnects scheduled since the last successful open.
    attempt: u32,
    next_channel: u64,
    next_timer: u64,
}

impl<T, S, C> LiveConnection<T, S, C>
where
    T: Transport,
    S: Scheduler,
    C: CacheInvalidator,
{
    pub fn new(
        endpoint: Url,
        reconnect_config: ReconnectConfig,
        transport: T,
        scheduler: S,
        cache: C,
    ) -> Self {
        Self {
            endpoint,
            reconnect_config,
            transport,
            scheduler,
            cache,
            state: ConnectionState::Disconnected,
            identity: None,
            active: false,
            channel: None,
            timer: None,
            attempt: 0,
            next_channel: 0,
            next_timer: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Whether the connection wants to be connected (auto-reconnect armed).
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Start (or resume) keeping a channel open for `identity`.
    ///
    /// A blank identity leaves the connection idle. Re-activating with the
    /// same identity while connecting or open does nothing; a different
    /// identity restarts the channel so the new user authenticates.
    pub fn activate(&mut self, identity: &str) {
        if identity.trim().is_empty() {
            crate::log_debug!("Live updates: no identity, staying idle");
            return;
        }

        if self.identity.as_deref() != Some(identity) && self.channel.is_some() {
            crate::log_info!("Live updates: identity changed, restarting channel");
            self.deactivate();
        }

        self.identity = Some(identity.to_string());
        self.active = true;
        self.attempt = 0;

        match self.state {
            ConnectionState::Disconnected => {
                self.cancel_timer();
                self.open_channel();
            }
            ConnectionState::Closing => {
                crate::log_debug!("Live updates: reactivated while opening, keeping channel");
                self.state = ConnectionState::Connecting;
            }
            ConnectionState::Connecting | ConnectionState::Open => {}
        }
    }

    /// Stop auto-reconnecting and release the channel. Safe to call repeatedly.
    pub fn deactivate(&mut self) {
        if self.active {
            crate::log_info!("Live updates: deactivating");
        }
        self.active = false;
        self.cancel_timer();

        match (self.state, self.channel) {
            (ConnectionState::Open, Some(channel)) => {
                self.transport.close(channel);
                self.channel = None;
                self.state = ConnectionState::Disconnected;
            }
            (ConnectionState::Connecting, Some(_)) => {
                self.state = ConnectionState::Closing;
            }
            _ => {}
        }
    }

    /// Retry after the attempt ceiling was reached, with a fresh budget.
    pub fn reconnect(&mut self) {
        match self.identity.clone() {
            Some(identity) => self.activate(&identity),
            None => crate::log_debug!("Live updates: reconnect without identity ignored"),
        }
    }

    /// Deliver `envelope` now if open; otherwise drop it.
    pub fn send(&mut self, envelope: &Envelope) {
        let Some(channel) = self.channel.filter(|_| self.state.is_connected()) else {
            crate::log_debug!("Live updates: not open, dropping outbound '{}'", envelope.kind);
            return;
        };

        match envelope.encode() {
            Ok(text) => self.send_text(channel, text),
            Err(e) => crate::log_error!("Live updates: {}", e),
        }
    }

    /// Feed a transport report. Returns the decoded envelope when a message
    /// was routed, so callers can fan it out further.
    pub fn on_transport_event(
        &mut self,
        channel: ChannelId,
        event: TransportEvent,
    ) -> Option<Envelope> {
        if self.channel != Some(channel) {
            crate::log_debug!(channel = channel; "Live updates: ignoring {:?} from stale channel", event);
            return None;
        }

        match event {
            TransportEvent::Open => {
                self.handle_open(channel);
                None
            }
            TransportEvent::Message(text) => self.handle_message(&text),
            TransportEvent::Error(detail) => {
                crate::log_warn!(channel = channel; "Live updates: transport error: {}", detail);
                None
            }
            TransportEvent::Closed { code, reason } => {
                self.handle_closed(channel, code, &reason);
                None
            }
        }
    }

    /// Feed a scheduler report.
    pub fn on_timer(&mut self, timer: TimerId) {
        if self.timer != Some(timer) {
            crate::log_debug!(timer = timer; "Live updates: ignoring stale timer");
            return;
        }
        self.timer = None;

        if self.active && self.state == ConnectionState::Disconnected {
            self.open_channel();
        }
    }

    fn open_channel(&mut self) {
        let channel = ChannelId(self.next_channel);
        self.next_channel += 1;
        self.channel = Some(channel);
        self.state = ConnectionState::Connecting;

        crate::log_info!(channel = channel, endpoint = self.endpoint; "Live updates: connecting");
        if let Err(e) = self.transport.open(channel, &self.endpoint) {
            crate::log_error!(channel = channel; "Live updates: {}", e);
            self.handle_closed(channel, None, "open failed");
        }
    }

    fn handle_open(&mut self, channel: ChannelId) {
        match self.state {
            ConnectionState::Closing => {
                crate::log_info!(channel = channel; "Live updates: opened after deactivation, closing");
                self.transport.close(channel);
                self.channel = None;
                self.state = ConnectionState::Disconnected;
            }
            ConnectionState::Connecting => {
                self.state = ConnectionState::Open;
                self.attempt = 0;
                crate::log_info!(channel = channel; "Live updates: open");
                self.authenticate(channel);
            }
            ConnectionState::Open | ConnectionState::Disconnected => {
                crate::log_warn!(channel = channel; "Live updates: duplicate open");
            }
        }
    }

    fn authenticate(&mut self, channel: ChannelId) {
        let Some(identity) = self.identity.as_deref() else {
            crate::log_error!("Live updates: open without identity, cannot authenticate");
            return;
        };

        match ClientFrame::auth(identity).encode() {
            Ok(text) => self.send_text(channel, text),
            Err(e) => crate::log_error!("Live updates: {}", e),
        }
    }

    fn handle_message(&mut self, text: &str) -> Option<Envelope> {
        if !self.state.is_connected() {
            return None;
        }

        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(e) if e.is_shape_error() => {
                crate::log_warn!("Live updates: dropping frame that is not an event envelope: {}", e);
                return None;
            }
            Err(e) => {
                crate::log_warn!("Live updates: dropping non-JSON frame: {}", e);
                return None;
            }
        };

        let keys = router::resolve(&envelope.kind);
        if keys.is_empty() {
            crate::log_debug!("Live updates: no cache keys for '{}'", envelope.kind);
        }
        for key in keys {
            self.cache.invalidate(key);
        }

        Some(envelope)
    }

    fn handle_closed(&mut self, channel: ChannelId, code: Option<u16>, reason: &str) {
        crate::log_info!(
            channel = channel;
            "Live updates: closed (code {:?}, reason '{}')",
            code,
            reason
        );
        self.channel = None;
        self.state = ConnectionState::Disconnected;

        if self.active {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(&mut self) {
        if !self.reconnect_config.should_retry(self.attempt) {
            crate::log_warn!(
                "Live updates: giving up after {} reconnect attempts",
                self.attempt
            );
            return;
        }

        let delay = self.reconnect_config.delay_for_attempt(self.attempt);
        self.attempt += 1;

        let timer = TimerId(self.next_timer);
        self.next_timer += 1;
        self.timer = Some(timer);

        crate::log_info!(
            timer = timer, attempt = self.attempt;
            "Live updates: reconnecting in {}ms",
            delay.as_millis()
        );
        self.scheduler.schedule(timer, delay);
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            self.scheduler.cancel(timer);
        }
    }

    fn send_text(&mut self, channel: ChannelId, text: String) {
        if let Err(e) = self.transport.send(channel, text) {
            crate::log_warn!("Live updates: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::transport::TransportError;
    use pulse_shared::QueryKey;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    #[derive(Default)]
    struct Log {
        opened: Vec<ChannelId>,
        sent: Vec<(ChannelId, String)>,
        closed: Vec<ChannelId>,
        scheduled: Vec<(TimerId, Duration)>,
        cancelled: Vec<TimerId>,
        invalidated: Vec<QueryKey>,
        fail_open: bool,
    }

    type SharedLog = Rc<RefCell<Log>>;

    struct FakeTransport(SharedLog);

    impl Transport for FakeTransport {
        fn open(&mut self, channel: ChannelId, _url: &Url) -> Result<(), TransportError> {
            let mut log = self.0.borrow_mut();
            if log.fail_open {
                return Err(TransportError::Open {
                    channel,
                    reason: "refused".to_string(),
                });
            }
            log.opened.push(channel);
            Ok(())
        }

        fn send(&mut self, channel: ChannelId, text: String) -> Result<(), TransportError> {
            self.0.borrow_mut().sent.push((channel, text));
            Ok(())
        }

        fn close(&mut self, channel: ChannelId) {
            self.0.borrow_mut().closed.push(channel);
        }
    }

    struct FakeScheduler(SharedLog);

    impl Scheduler for FakeScheduler {
        fn schedule(&mut self, timer: TimerId, delay: Duration) {
            self.0.borrow_mut().scheduled.push((timer, delay));
        }

        fn cancel(&mut self, timer: TimerId) {
            self.0.borrow_mut().cancelled.push(timer);
        }
    }

    struct FakeCache(SharedLog);

    impl CacheInvalidator for FakeCache {
        fn invalidate(&self, key: &QueryKey) {
            self.0.borrow_mut().invalidated.push(key.clone());
        }
    }

    type TestConnection = LiveConnection<FakeTransport, FakeScheduler, FakeCache>;

    fn connection() -> (TestConnection, SharedLog) {
        let log = SharedLog::default();
        let connection = LiveConnection::new(
            Url::parse("wss://portal.example.com/").unwrap(),
            ReconnectConfig::default(),
            FakeTransport(log.clone()),
            FakeScheduler(log.clone()),
            FakeCache(log.clone()),
        );
        (connection, log)
    }

    fn last_channel(log: &SharedLog) -> ChannelId {
        *log.borrow().opened.last().expect("no channel opened")
    }

    fn last_timer(log: &SharedLog) -> (TimerId, Duration) {
        *log.borrow().scheduled.last().expect("no timer scheduled")
    }

    fn auth_frames(log: &SharedLog) -> Vec<(ChannelId, serde_json::Value)> {
        log.borrow()
            .sent
            .iter()
            .map(|(channel, text)| (*channel, serde_json::from_str(text).unwrap()))
            .filter(|(_, value): &(ChannelId, serde_json::Value)| value["type"] == "auth")
            .collect()
    }

    fn closed(code: u16) -> TransportEvent {
        TransportEvent::Closed {
            code: Some(code),
            reason: String::new(),
        }
    }

    fn open_connection() -> (TestConnection, SharedLog, ChannelId) {
        let (mut connection, log) = connection();
        connection.activate("user-1");
        let channel = last_channel(&log);
        connection.on_transport_event(channel, TransportEvent::Open);
        (connection, log, channel)
    }

    #[test]
    fn blank_identity_never_opens() {
        let (mut connection, log) = connection();
        connection.activate("");
        connection.activate("   ");

        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert!(!connection.is_active());
        assert!(log.borrow().opened.is_empty());
    }

    #[test]
    fn open_sends_exactly_one_auth_frame() {
        let (connection, log, channel) = open_connection();

        assert_eq!(connection.state(), ConnectionState::Open);
        assert!(connection.is_connected());
        assert_eq!(
            auth_frames(&log),
            vec![(channel, json!({"type": "auth", "userId": "user-1"}))]
        );
        assert_eq!(log.borrow().sent.len(), 1);
    }

    #[test]
    fn activate_while_connecting_or_open_is_a_noop() {
        let (mut connection, log) = connection();
        connection.activate("user-1");
        connection.activate("user-1");
        assert_eq!(log.borrow().opened.len(), 1);

        let channel = last_channel(&log);
        connection.on_transport_event(channel, TransportEvent::Open);
        connection.activate("user-1");

        assert_eq!(log.borrow().opened.len(), 1);
        assert_eq!(auth_frames(&log).len(), 1);
    }

    #[test]
    fn notification_invalidates_list_and_unread_count_once_each() {
        let (mut connection, log, channel) = open_connection();

        let routed = connection.on_transport_event(
            channel,
            TransportEvent::Message(r#"{"type":"notification","data":{}}"#.to_string()),
        );

        assert_eq!(routed.map(|e| e.kind), Some("notification".to_string()));
        let mut invalidated: Vec<_> = log
            .borrow()
            .invalidated
            .iter()
            .map(|key| key.as_str().to_string())
            .collect();
        invalidated.sort();
        assert_eq!(
            invalidated,
            ["/api/notifications", "/api/notifications/unread-count"]
        );
    }

    #[test]
    fn unknown_type_invalidates_nothing_and_stays_open() {
        let (mut connection, log, channel) = open_connection();

        let routed = connection.on_transport_event(
            channel,
            TransportEvent::Message(r#"{"type":"weather_update","data":{"uv":7}}"#.to_string()),
        );

        assert!(routed.is_some());
        assert!(log.borrow().invalidated.is_empty());
        assert_eq!(connection.state(), ConnectionState::Open);
        assert!(log.borrow().closed.is_empty());
    }

    #[test]
    fn malformed_frames_are_dropped_without_closing() {
        let (mut connection, log, channel) = open_connection();

        for frame in ["{not json", r#"{"data":1}"#, "42", ""] {
            let routed =
                connection.on_transport_event(channel, TransportEvent::Message(frame.to_string()));
            assert!(routed.is_none(), "{frame:?} should be dropped");
        }

        assert_eq!(connection.state(), ConnectionState::Open);
        assert!(log.borrow().invalidated.is_empty());
        assert!(log.borrow().closed.is_empty());
    }

    #[test]
    fn close_schedules_reconnect_with_growing_delay() {
        let (mut connection, log, channel) = open_connection();
        let config = ReconnectConfig::default();

        connection.on_transport_event(channel, closed(1006));
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        let (timer, first_delay) = last_timer(&log);
        assert_eq!(first_delay, config.delay_for_attempt(0));

        // Timer fires: a fresh attempt is made.
        connection.on_timer(timer);
        assert_eq!(connection.state(), ConnectionState::Connecting);
        let retry = last_channel(&log);
        assert_ne!(retry, channel);

        // That attempt fails before opening.
        connection.on_transport_event(retry, TransportEvent::Error("refused".to_string()));
        connection.on_transport_event(retry, closed(1006));
        let (_, second_delay) = last_timer(&log);
        assert_eq!(second_delay, config.delay_for_attempt(1));
        assert!(second_delay > first_delay);
    }

    #[test]
    fn successful_open_resets_attempts() {
        let (mut connection, log, channel) = open_connection();

        connection.on_transport_event(channel, closed(1006));
        for _ in 0..3 {
            let (timer, _) = last_timer(&log);
            connection.on_timer(timer);
            connection.on_transport_event(last_channel(&log), closed(1006));
        }
        assert_eq!(connection.attempt(), 4);

        let (timer, _) = last_timer(&log);
        connection.on_timer(timer);
        connection.on_transport_event(last_channel(&log), TransportEvent::Open);

        assert_eq!(connection.attempt(), 0);
        assert_eq!(connection.state(), ConnectionState::Open);
        assert_eq!(auth_frames(&log).len(), 2);
    }

    #[test]
    fn stops_after_attempt_ceiling_until_reactivated() {
        let (mut connection, log, channel) = open_connection();
        let ceiling = ReconnectConfig::default().max_attempts as usize;

        connection.on_transport_event(channel, closed(1006));
        for _ in 0..ceiling {
            let (timer, _) = last_timer(&log);
            connection.on_timer(timer);
            connection.on_transport_event(last_channel(&log), closed(1006));
        }

        assert_eq!(log.borrow().scheduled.len(), ceiling);
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert!(connection.is_active());

        let opened_before = log.borrow().opened.len();
        connection.reconnect();
        assert_eq!(log.borrow().opened.len(), opened_before + 1);
        assert_eq!(connection.attempt(), 0);
    }

    #[test]
    fn deactivate_twice_is_a_noop_and_cancels_timer() {
        let (mut connection, log, channel) = open_connection();
        connection.on_transport_event(channel, closed(1006));
        let (timer, _) = last_timer(&log);

        connection.deactivate();
        assert_eq!(log.borrow().cancelled, vec![timer]);
        connection.deactivate();
        assert_eq!(log.borrow().cancelled, vec![timer]);

        // The cancelled timer firing anyway does nothing.
        let opened_before = log.borrow().opened.len();
        connection.on_timer(timer);
        assert_eq!(log.borrow().opened.len(), opened_before);
        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn deactivate_closes_open_channel_without_reconnecting() {
        let (mut connection, log, channel) = open_connection();

        connection.deactivate();
        assert_eq!(log.borrow().closed, vec![channel]);
        assert_eq!(connection.state(), ConnectionState::Disconnected);

        // The transport's own close report arrives afterwards.
        connection.on_transport_event(channel, closed(1000));
        assert!(log.borrow().scheduled.is_empty());
    }

    #[test]
    fn deactivate_while_connecting_closes_on_open_without_auth() {
        let (mut connection, log) = connection();
        connection.activate("user-1");
        let channel = last_channel(&log);

        connection.deactivate();
        assert_eq!(connection.state(), ConnectionState::Closing);
        assert!(log.borrow().closed.is_empty());

        connection.on_transport_event(channel, TransportEvent::Open);

        assert_eq!(log.borrow().closed, vec![channel]);
        assert!(log.borrow().sent.is_empty());
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert!(log.borrow().scheduled.is_empty());
    }

    #[test]
    fn reactivate_while_closing_keeps_the_opening_channel() {
        let (mut connection, log) = connection();
        connection.activate("user-1");
        let channel = last_channel(&log);
        connection.deactivate();
        connection.activate("user-1");

        assert_eq!(connection.state(), ConnectionState::Connecting);
        connection.on_transport_event(channel, TransportEvent::Open);

        assert_eq!(log.borrow().opened, vec![channel]);
        assert!(log.borrow().closed.is_empty());
        assert_eq!(auth_frames(&log).len(), 1);
    }

    #[test]
    fn identity_switch_restarts_channel_and_authenticates_once() {
        let (mut connection, log, first) = open_connection();

        connection.activate("user-2");
        assert_eq!(log.borrow().closed, vec![first]);
        let second = last_channel(&log);
        assert_ne!(first, second);

        connection.on_transport_event(second, TransportEvent::Open);
        assert_eq!(
            auth_frames(&log),
            vec![
                (first, json!({"type": "auth", "userId": "user-1"})),
                (second, json!({"type": "auth", "userId": "user-2"})),
            ]
        );
    }

    #[test]
    fn stale_channel_events_are_ignored() {
        let (mut connection, log, first) = open_connection();
        connection.activate("user-2");
        let second = last_channel(&log);

        connection.on_transport_event(
            first,
            TransportEvent::Message(r#"{"type":"audit_log"}"#.to_string()),
        );
        connection.on_transport_event(first, closed(1000));

        assert!(log.borrow().invalidated.is_empty());
        assert!(log.borrow().scheduled.is_empty());
        assert_eq!(connection.state(), ConnectionState::Connecting);

        connection.on_transport_event(second, TransportEvent::Open);
        assert!(connection.is_connected());
    }

    #[test]
    fn send_only_delivers_while_open() {
        let (mut connection, log) = connection();
        let envelope = Envelope::new("typing", json!({"thread": 3}));

        connection.send(&envelope);
        connection.activate("user-1");
        connection.send(&envelope);
        assert!(log.borrow().sent.is_empty());

        let channel = last_channel(&log);
        connection.on_transport_event(channel, TransportEvent::Open);
        connection.send(&envelope);

        let sent = log.borrow().sent.clone();
        assert_eq!(sent.len(), 2);
        let (to, text) = &sent[1];
        assert_eq!(*to, channel);
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(text).unwrap(),
            json!({"type": "typing", "data": {"thread": 3}})
        );
    }

    #[test]
    fn failed_open_is_treated_as_close() {
        let (mut connection, log) = connection();
        log.borrow_mut().fail_open = true;

        connection.activate("user-1");

        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert_eq!(log.borrow().scheduled.len(), 1);
        assert_eq!(connection.attempt(), 1);
    }
}
