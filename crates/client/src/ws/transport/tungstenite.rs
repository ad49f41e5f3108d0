//! Native transport on tokio-tungstenite, plus a tokio-backed scheduler.
//!
//! Each channel runs in its own task and reports through an unbounded
//! channel, so the owner of the [`LiveConnection`](crate::ws::LiveConnection)
//! can serialize transport reports with everything else it handles.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use super::{ChannelId, Scheduler, TimerId, Transport, TransportError, TransportEvent};

enum Outbound {
    Text(String),
    Close,
}

struct ChannelTask {
    outbound: UnboundedSender<Outbound>,
    task: JoinHandle<()>,
}

/// Opens channels with `connect_async` and reports their events.
pub struct TungsteniteTransport {
    events: UnboundedSender<(ChannelId, TransportEvent)>,
    channels: HashMap<ChannelId, ChannelTask>,
}

impl TungsteniteTransport {
    /// Must be used from within a tokio runtime.
    pub fn new(events: UnboundedSender<(ChannelId, TransportEvent)>) -> Self {
        Self {
            events,
            channels: HashMap::new(),
        }
    }
}

impl Transport for TungsteniteTransport {
    fn open(&mut self, channel: ChannelId, url: &Url) -> Result<(), TransportError> {
        self.channels.retain(|_, c| !c.task.is_finished());

        let (outbound, outbound_rx) = unbounded_channel();
        let task = tokio::spawn(run_channel(
            channel,
            url.to_string(),
            outbound_rx,
            self.events.clone(),
        ));
        self.channels.insert(channel, ChannelTask { outbound, task });
        Ok(())
    }

    fn send(&mut self, channel: ChannelId, text: String) -> Result<(), TransportError> {
        let Some(entry) = self.channels.get(&channel) else {
            return Err(TransportError::NotOpen(channel));
        };
        entry
            .outbound
            .send(Outbound::Text(text))
            .map_err(|_| TransportError::Send {
                channel,
                reason: "channel task stopped".to_string(),
            })
    }

    fn close(&mut self, channel: ChannelId) {
        if let Some(entry) = self.channels.remove(&channel) {
            let _ = entry.outbound.send(Outbound::Close);
        }
    }
}

impl Drop for TungsteniteTransport {
    fn drop(&mut self) {
        for (_, entry) in self.channels.drain() {
            let _ = entry.outbound.send(Outbound::Close);
        }
    }
}

/// Connect, then pump frames both ways until either side closes.
async fn run_channel(
    channel: ChannelId,
    url: String,
    mut outbound: UnboundedReceiver<Outbound>,
    events: UnboundedSender<(ChannelId, TransportEvent)>,
) {
    let report = |event: TransportEvent| {
        let _ = events.send((channel, event));
    };

    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            report(TransportEvent::Error(e.to_string()));
            report(TransportEvent::Closed {
                code: None,
                reason: e.to_string(),
            });
            return;
        }
    };

    report(TransportEvent::Open);
    let (mut write, mut read) = stream.split();
    let mut code = None;
    let mut reason = String::new();

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    report(TransportEvent::Message(text.as_str().to_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    if let Some(frame) = frame {
                        code = Some(u16::from(frame.code));
                        reason = frame.reason.as_str().to_owned();
                    }
                    // The close reply is queued by the read; flush it out.
                    let _ = write.flush().await;
                    break;
                }
                Some(Ok(_)) => {
                    // Ignore binary, ping, pong; tungstenite answers pings itself.
                }
                Some(Err(e)) => {
                    report(TransportEvent::Error(e.to_string()));
                    reason = e.to_string();
                    break;
                }
                None => {
                    reason = "stream ended".to_string();
                    break;
                }
            },
            message = outbound.recv() => match message {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        report(TransportEvent::Error(e.to_string()));
                        reason = e.to_string();
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    reason = "closed by client".to_string();
                    break;
                }
            },
        }
    }

    report(TransportEvent::Closed { code, reason });
}

/// Reconnect timers as sleeping tokio tasks.
pub struct TokioScheduler {
    fired: UnboundedSender<TimerId>,
    timers: HashMap<TimerId, JoinHandle<()>>,
}

impl TokioScheduler {
    /// Must be used from within a tokio runtime.
    pub fn new(fired: UnboundedSender<TimerId>) -> Self {
        Self {
            fired,
            timers: HashMap::new(),
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, timer: TimerId, delay: Duration) {
        self.timers.retain(|_, handle| !handle.is_finished());

        let fired = self.fired.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = fired.send(timer);
        });
        self.timers.insert(timer, handle);
    }

    fn cancel(&mut self, timer: TimerId) {
        if let Some(handle) = self.timers.remove(&timer) {
            handle.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }
}
