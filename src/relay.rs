//! WebSocket relay driver
//!
//! Carries a [`PeerSession`] over a y-webrtc style signaling server. The
//! relay only knows topics: every client subscribes to the room name and
//! publishes its session frames there, base64 encoded inside JSON.
//!
//! The driver owns the session on one tokio task. The application talks
//! to it through a [`RelayHandle`]: commands in, notifications out.

use crate::awareness::{CursorRange, PresenceState};
use crate::crdt::{Document, LocalOp};
use crate::error::Result;
use crate::session::{Backoff, Notification, Outgoing, PeerSession, SessionEvent};
use crate::Millis;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// How often the session timers run without other input
const TICK_INTERVAL: Duration = Duration::from_millis(40);

/// Keepalive for the signaling connection
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Frame understood by the signaling server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalingFrame {
    Subscribe { topics: Vec<String> },
    Unsubscribe { topics: Vec<String> },
    Publish { topic: String, data: String },
    Ping,
    Pong,
}

impl SignalingFrame {
    /// Publish a session frame on `topic`
    pub fn publish(topic: &str, frame: &[u8]) -> Self {
        SignalingFrame::Publish {
            topic: topic.to_string(),
            data: STANDARD.encode(frame),
        }
    }

    /// Session frame carried by a publish on `topic`
    pub fn payload_for(&self, topic: &str) -> Result<Option<Bytes>> {
        match self {
            SignalingFrame::Publish { topic: t, data } if t == topic => {
                Ok(Some(Bytes::from(STANDARD.decode(data)?)))
            }
            _ => Ok(None),
        }
    }

    fn to_message(&self) -> Result<Message> {
        Ok(Message::text(serde_json::to_string(self)?))
    }
}

/// Request from the application to the driver
#[derive(Debug, Clone)]
pub enum Command {
    Edit(Vec<LocalOp>),
    Cursor(Option<CursorRange>),
    Presence(PresenceState),
    /// Leave the room and stop the driver
    Leave,
}

/// Application side of a running driver
pub struct RelayHandle {
    commands: mpsc::Sender<Command>,
    notifications: mpsc::Receiver<Notification>,
    task: JoinHandle<Document>,
}

impl RelayHandle {
    pub async fn edit(&self, ops: Vec<LocalOp>) -> bool {
        self.commands.send(Command::Edit(ops)).await.is_ok()
    }

    pub async fn set_cursor(&self, cursor: Option<CursorRange>) -> bool {
        self.commands.send(Command::Cursor(cursor)).await.is_ok()
    }

    pub async fn set_presence(&self, presence: PresenceState) -> bool {
        self.commands.send(Command::Presence(presence)).await.is_ok()
    }

    /// Next notification; `None` once the driver stopped
    pub async fn next_notification(&mut self) -> Option<Notification> {
        self.notifications.recv().await
    }

    /// Leave the room and wait for the driver; returns the final document
    pub async fn leave(self) -> Option<Document> {
        let _ = self.commands.send(Command::Leave).await;
        drop(self.notifications);
        self.task.await.ok()
    }
}

/// Start driving `session` on a new tokio task
pub fn spawn(session: PeerSession) -> RelayHandle {
    let (command_tx, command_rx) = mpsc::channel(256);
    let (notify_tx, notify_rx) = mpsc::channel(256);
    let task = tokio::spawn(run(session, command_rx, notify_tx));
    RelayHandle {
        commands: command_tx,
        notifications: notify_rx,
        task,
    }
}

/// Driver loop: connect, pump frames, reconnect with backoff
///
/// Returns the document once a [`Command::Leave`] arrives or every
/// command sender is dropped.
pub async fn run(
    mut session: PeerSession,
    mut commands: mpsc::Receiver<Command>,
    notifications: mpsc::Sender<Notification>,
) -> Document {
    let start = Instant::now();
    let clock = move || start.elapsed().as_millis() as Millis;
    let urls = session.config().relay_urls.clone();
    let topic = session.room().as_str().to_string();
    let mut backoff = Backoff::new(
        session.config().reconnect_base_ms,
        session.config().reconnect_max_ms,
        urls.len(),
    );
    let mut ticker = tokio::time::interval(TICK_INTERVAL);

    loop {
        let url = &urls[backoff.endpoint() % urls.len()];
        info!(%url, room = %topic, "connecting to relay");

        let reason = match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((ws_stream, _)) => {
                backoff.reset();
                let (mut writer, mut reader) = ws_stream.split();

                let subscribe = SignalingFrame::Subscribe {
                    topics: vec![topic.clone()],
                };
                if let Err(err) = send_frame(&mut writer, &subscribe).await {
                    err
                } else {
                    session.enqueue(SessionEvent::RelayConnected);
                    let mut ping = tokio::time::interval(PING_INTERVAL);
                    ping.tick().await;

                    let reason = loop {
                        tokio::select! {
                            msg = reader.next() => match msg {
                                Some(Ok(Message::Text(text))) => {
                                    match serde_json::from_str::<SignalingFrame>(text.as_str()) {
                                        Ok(SignalingFrame::Ping) => {
                                            if let Err(err) = send_frame(&mut writer, &SignalingFrame::Pong).await {
                                                break err;
                                            }
                                        }
                                        Ok(frame) => match frame.payload_for(&topic) {
                                            Ok(Some(bytes)) => session.enqueue(SessionEvent::Frame(bytes)),
                                            Ok(None) => {}
                                            Err(err) => warn!(error = %err, "bad publish payload"),
                                        },
                                        Err(err) => debug!(error = %err, "ignoring signaling frame"),
                                    }
                                }
                                Some(Ok(Message::Close(_))) | None => break "relay closed the connection".to_string(),
                                Some(Err(err)) => break err.to_string(),
                                Some(Ok(_)) => {}
                            },
                            cmd = commands.recv() => {
                                if !apply_command(&mut session, cmd) {
                                    session.process(clock());
                                    for out in session.take_outgoing() {
                                        let _ = send_frame(&mut writer, &SignalingFrame::publish(&topic, &out.frame)).await;
                                    }
                                    let unsubscribe = SignalingFrame::Unsubscribe { topics: vec![topic.clone()] };
                                    let _ = send_frame(&mut writer, &unsubscribe).await;
                                    let _ = writer.close().await;
                                    forward(&mut session, &notifications);
                                    info!(room = %topic, "relay driver stopped");
                                    return session.into_document();
                                }
                            }
                            _ = ping.tick() => {
                                if let Err(err) = send_frame(&mut writer, &SignalingFrame::Ping).await {
                                    break err;
                                }
                            }
                            _ = ticker.tick() => {}
                        }

                        session.process(clock());
                        if let Err(err) = publish(&mut writer, &topic, session.take_outgoing()).await {
                            break err;
                        }
                        forward(&mut session, &notifications);
                    };
                    reason
                }
            }
            Err(err) => err.to_string(),
        };

        session.enqueue(SessionEvent::RelayLost {
            reason: reason.clone(),
        });
        session.process(clock());
        session.take_outgoing();
        forward(&mut session, &notifications);

        // Keep accepting local edits while waiting to reconnect
        let delay = backoff.fail();
        warn!(%reason, retry_in_ms = delay, attempt = backoff.attempts(), "relay connection failed");
        let sleep = tokio::time::sleep(Duration::from_millis(delay));
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                cmd = commands.recv() => {
                    if !apply_command(&mut session, cmd) {
                        forward(&mut session, &notifications);
                        return session.into_document();
                    }
                }
                _ = ticker.tick() => {}
            }
            session.process(clock());
            forward(&mut session, &notifications);
        }
    }
}

/// Returns false when the driver should stop
fn apply_command(session: &mut PeerSession, cmd: Option<Command>) -> bool {
    match cmd {
        Some(Command::Edit(ops)) => {
            session.enqueue(SessionEvent::LocalEdit(ops));
            true
        }
        Some(Command::Cursor(cursor)) => {
            session.enqueue(SessionEvent::PresenceChanged(cursor));
            true
        }
        Some(Command::Presence(presence)) => {
            session.set_presence(presence);
            true
        }
        Some(Command::Leave) | None => {
            session.leave();
            false
        }
    }
}

async fn send_frame<S>(writer: &mut S, frame: &SignalingFrame) -> std::result::Result<(), String>
where
    S: futures_util::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let message = frame.to_message().map_err(|e| e.to_string())?;
    writer.send(message).await.map_err(|e| e.to_string())
}

async fn publish<S>(writer: &mut S, topic: &str, frames: Vec<Outgoing>) -> std::result::Result<(), String>
where
    S: futures_util::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    for out in frames {
        send_frame(writer, &SignalingFrame::publish(topic, &out.frame)).await?;
    }
    Ok(())
}

/// Hand notifications to the application without ever stalling sync
fn forward(session: &mut PeerSession, notifications: &mpsc::Sender<Notification>) {
    for notification in session.take_notifications() {
        match notifications.try_send(notification) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                debug!(?dropped, "notification channel full")
            }
            Err(mpsc::error::TrySendError::Closed(_)) => break,
        }
    }
}
