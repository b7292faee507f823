//! Async signaling client for the peerlink relay.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use crate::error::{Result, SdkError};
use crate::types::{ClientRequest, EventKind, RelayEvent};

type Handler = Arc<dyn Fn(&RelayEvent) + Send + Sync + 'static>;
type HandlerMap = Mutex<HashMap<u64, (EventKind, Handler)>>;

/// One relay connection.
///
/// ```rust,no_run
/// use peerlink_sdk::{RelayEvent, SignalingClient};
///
/// #[tokio::main]
/// async fn main() -> peerlink_sdk::Result<()> {
///     let client = SignalingClient::connect("ws://localhost:3000/ws").await?;
///     let mut events = client.subscribe();
///     client.join("b@x.com", "42")?;
///     while let Ok(event) = events.recv().await {
///         if let RelayEvent::IncomingCall { from, offer } = event {
///             client.accept(&from, offer)?;
///         }
///     }
///     Ok(())
/// }
/// ```
pub struct SignalingClient {
    id: String,
    outgoing: mpsc::UnboundedSender<Message>,
    events: broadcast::Sender<RelayEvent>,
    handlers: Arc<HandlerMap>,
    next_handler: AtomicU64,
    connected: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl SignalingClient {
    /// Connect to the relay and wait for it to assign this client an id.
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws, _) = connect_async(url).await?;
        let (mut sink, mut stream) = ws.split();

        let id = loop {
            let Some(msg) = stream.next().await else {
                return Err(SdkError::Handshake("connection closed before session:ready".into()));
            };
            match msg? {
                Message::Text(text) => match serde_json::from_str::<RelayEvent>(text.as_str())? {
                    RelayEvent::SessionReady { id } => break id,
                    other => {
                        return Err(SdkError::Handshake(format!(
                            "expected session:ready, got {:?}",
                            other.kind()
                        )));
                    }
                },
                Message::Close(_) => {
                    return Err(SdkError::Handshake("connection closed before session:ready".into()));
                }
                _ => continue,
            }
        };
        debug!(id = %id, "Relay session ready");

        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        let (events, _) = broadcast::channel(256);
        let handlers: Arc<HandlerMap> = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));

        let writer = tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader = {
            let events = events.clone();
            let handlers = Arc::clone(&handlers);
            let connected = Arc::clone(&connected);
            tokio::spawn(async move {
                while let Some(msg) = stream.next().await {
                    let text = match msg {
                        Ok(Message::Text(text)) => text,
                        Ok(Message::Close(_)) => break,
                        Ok(_) => continue,
                        Err(e) => {
                            warn!("Relay: transport error: {e}");
                            break;
                        }
                    };
                    let event = match serde_json::from_str::<RelayEvent>(text.as_str()) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!("Relay: unrecognised event ({e})");
                            continue;
                        }
                    };
                    dispatch(&handlers, &event);
                    let _ = events.send(event);
                }
                connected.store(false, Ordering::SeqCst);
                debug!("Relay: connection closed");
            })
        };

        Ok(Self {
            id,
            outgoing,
            events,
            handlers,
            next_handler: AtomicU64::new(0),
            connected,
            reader,
            writer,
        })
    }

    /// Id the relay assigned to this connection; peers address us by it.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.outgoing.is_closed()
    }

    /// Subscribe to every relay event received after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.events.subscribe()
    }

    /// Run `handler` for each event of `kind` until the returned guard is dropped.
    pub fn on(
        &self,
        kind: EventKind,
        handler: impl Fn(&RelayEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let key = self.next_handler.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut map) = self.handlers.lock() {
            map.insert(key, (kind, Arc::new(handler)));
        }
        Subscription {
            key,
            handlers: Arc::downgrade(&self.handlers),
        }
    }

    pub fn join(&self, email: &str, room: &str) -> Result<()> {
        self.emit(&ClientRequest::JoinRoom {
            email: email.to_owned(),
            room: room.to_owned(),
        })
    }

    pub fn leave(&self) -> Result<()> {
        self.emit(&ClientRequest::LeaveRoom)
    }

    pub fn call(&self, to: &str, offer: Value) -> Result<()> {
        self.emit(&ClientRequest::Call {
            to: to.to_owned(),
            offer,
        })
    }

    pub fn accept(&self, to: &str, ans: Value) -> Result<()> {
        self.emit(&ClientRequest::CallAccepted {
            to: to.to_owned(),
            ans,
        })
    }

    pub fn negotiation_needed(&self, to: &str, offer: Value) -> Result<()> {
        self.emit(&ClientRequest::NegotiationNeeded {
            to: to.to_owned(),
            offer,
        })
    }

    pub fn negotiation_done(&self, to: &str, ans: Value) -> Result<()> {
        self.emit(&ClientRequest::NegotiationDone {
            to: to.to_owned(),
            ans,
        })
    }

    /// Send a raw text frame. Useful for exercising the relay's error paths.
    pub fn send_raw(&self, text: impl Into<String>) -> Result<()> {
        let text: String = text.into();
        self.outgoing
            .send(Message::Text(text.into()))
            .map_err(|_| SdkError::NotConnected)
    }

    pub fn emit(&self, request: &ClientRequest) -> Result<()> {
        let json = serde_json::to_string(request)?;
        self.send_raw(json)
    }

    /// Close the connection. The relay treats this as a disconnect.
    pub fn close(&self) {
        let _ = self.outgoing.send(Message::Close(None));
    }
}

impl Drop for SignalingClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// Handler registration; dropping it unsubscribes the handler.
#[must_use = "the handler is removed as soon as the subscription is dropped"]
pub struct Subscription {
    key: u64,
    handlers: Weak<HandlerMap>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handlers) = self.handlers.upgrade() {
            if let Ok(mut map) = handlers.lock() {
                map.remove(&self.key);
            }
        }
    }
}

fn dispatch(handlers: &HandlerMap, event: &RelayEvent) {
    let kind = event.kind();
    // Clone out so handlers may (un)subscribe without deadlocking.
    let matching: Vec<Handler> = match handlers.lock() {
        Ok(map) => map
            .values()
            .filter(|(k, _)| *k == kind)
            .map(|(_, h)| Arc::clone(h))
            .collect(),
        Err(_) => return,
    };
    for handler in matching {
        handler(event);
    }
}
