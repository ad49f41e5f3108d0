//! Browser transport on `web_sys::WebSocket`, plus a `gloo-timers` scheduler.
//!
//! Socket callbacks only push reports into the driver's channel; they never
//! call into the connection directly.

use std::collections::HashMap;
use std::time::Duration;

use gloo_timers::callback::Timeout;
use tokio::sync::mpsc::UnboundedSender;
use url::Url;
use wasm_bindgen::prelude::*;
use web_sys::{js_sys, CloseEvent, Event, MessageEvent, WebSocket};

use super::{ChannelId, Scheduler, TimerId, Transport, TransportError, TransportEvent};

type Reports = UnboundedSender<(ChannelId, TransportEvent)>;

/// A socket together with the handlers installed on it.
struct BrowserChannel {
    socket: WebSocket,
    _onopen: Closure<dyn FnMut(Event)>,
    _onmessage: Closure<dyn FnMut(MessageEvent)>,
    _onerror: Closure<dyn FnMut(Event)>,
    _onclose: Closure<dyn FnMut(CloseEvent)>,
}

impl BrowserChannel {
    /// Handlers must be detached before their closures are dropped.
    fn detach(&self) {
        self.socket.set_onopen(None);
        self.socket.set_onmessage(None);
        self.socket.set_onerror(None);
        self.socket.set_onclose(None);
    }

    fn is_closed(&self) -> bool {
        self.socket.ready_state() == WebSocket::CLOSED
    }
}

/// Opens channels with the browser's WebSocket API.
pub struct WebSocketTransport {
    events: Reports,
    channels: HashMap<ChannelId, BrowserChannel>,
}

impl WebSocketTransport {
    pub fn new(events: Reports) -> Self {
        Self {
            events,
            channels: HashMap::new(),
        }
    }
}

fn reporter(events: &Reports, channel: ChannelId) -> impl Fn(TransportEvent) + 'static {
    let events = events.clone();
    move |event| {
        let _ = events.send((channel, event));
    }
}

impl Transport for WebSocketTransport {
    fn open(&mut self, channel: ChannelId, url: &Url) -> Result<(), TransportError> {
        self.channels.retain(|_, entry| {
            let done = entry.is_closed();
            if done {
                entry.detach();
            }
            !done
        });

        let socket = WebSocket::new(url.as_str()).map_err(|e| TransportError::Open {
            channel,
            reason: format!("{:?}", e),
        })?;

        let report = reporter(&self.events, channel);
        let onopen = Closure::wrap(Box::new(move |_: Event| {
            report(TransportEvent::Open);
        }) as Box<dyn FnMut(Event)>);
        socket.set_onopen(Some(onopen.as_ref().unchecked_ref()));

        let report = reporter(&self.events, channel);
        let onmessage = Closure::wrap(Box::new(move |e: MessageEvent| {
            // Binary frames are not part of the protocol.
            if let Ok(text) = e.data().dyn_into::<js_sys::JsString>() {
                report(TransportEvent::Message(text.into()));
            }
        }) as Box<dyn FnMut(MessageEvent)>);
        socket.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));

        let report = reporter(&self.events, channel);
        let onerror = Closure::wrap(Box::new(move |_: Event| {
            report(TransportEvent::Error("WebSocket error".to_string()));
        }) as Box<dyn FnMut(Event)>);
        socket.set_onerror(Some(onerror.as_ref().unchecked_ref()));

        let report = reporter(&self.events, channel);
        let onclose = Closure::wrap(Box::new(move |e: CloseEvent| {
            report(TransportEvent::Closed {
                code: Some(e.code()),
                reason: e.reason(),
            });
        }) as Box<dyn FnMut(CloseEvent)>);
        socket.set_onclose(Some(onclose.as_ref().unchecked_ref()));

        self.channels.insert(
            channel,
            BrowserChannel {
                socket,
                _onopen: onopen,
                _onmessage: onmessage,
                _onerror: onerror,
                _onclose: onclose,
            },
        );
        Ok(())
    }

    fn send(&mut self, channel: ChannelId, text: String) -> Result<(), TransportError> {
        let Some(entry) = self.channels.get(&channel) else {
            return Err(TransportError::NotOpen(channel));
        };
        entry
            .socket
            .send_with_str(&text)
            .map_err(|e| TransportError::Send {
                channel,
                reason: format!("{:?}", e),
            })
    }

    fn close(&mut self, channel: ChannelId) {
        if let Some(entry) = self.channels.remove(&channel) {
            entry.detach();
            let _ = entry.socket.close();
        }
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        for (_, entry) in self.channels.drain() {
            entry.detach();
            let _ = entry.socket.close();
        }
    }
}

/// Reconnect timers on `setTimeout`; dropping a [`Timeout`] clears it.
pub struct GlooScheduler {
    fired: UnboundedSender<TimerId>,
    timers: HashMap<TimerId, Timeout>,
}

impl GlooScheduler {
    pub fn new(fired: UnboundedSender<TimerId>) -> Self {
        Self {
            fired,
            timers: HashMap::new(),
        }
    }
}

impl Scheduler for GlooScheduler {
    fn schedule(&mut self, timer: TimerId, delay: Duration) {
        // A connection has one pending timer at most; older ones already fired.
        self.timers.clear();

        // setTimeout treats anything above i32::MAX as zero.
        let millis = delay.as_millis().min(i32::MAX as u128) as u32;
        let fired = self.fired.clone();
        let timeout = Timeout::new(millis, move || {
            let _ = fired.send(timer);
        });
        self.timers.insert(timer, timeout);
    }

    fn cancel(&mut self, timer: TimerId) {
        self.timers.remove(&timer);
    }
}
