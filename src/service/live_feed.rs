use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::AppError;
use crate::models::{Credentials, Message, OutgoingMessage, WireMessage};
use crate::store::SharedStore;
use crate::transport::{ChannelEvent, ChannelFactory, PushChannel};

/// Lifecycle of the push channel as seen by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Disconnected,
    Connecting,
    Connected,
    Subscribed,
}

pub fn topic_for(conversation_id: &str) -> String {
    format!("/topic/conversation/{conversation_id}")
}

pub fn destination_for(conversation_id: &str) -> String {
    format!("/app/send-message/{conversation_id}")
}

struct FeedScope {
    conversation_id: String,
    credentials: Credentials,
    /// Store generation at activation; pushes after a reset are dropped.
    generation: u64,
}

struct ActiveFeed {
    scope: Arc<FeedScope>,
    outbound: mpsc::UnboundedSender<OutgoingMessage>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Keeps one push subscription for the active conversation and feeds
/// incoming messages into the store.
pub struct LiveFeed<F> {
    factory: Arc<F>,
    store: SharedStore,
    reconnect_delay: Duration,
    state: watch::Sender<FeedState>,
    active: Option<ActiveFeed>,
}

impl<F: ChannelFactory> LiveFeed<F> {
    pub fn new(factory: F, store: SharedStore, reconnect_delay: Duration) -> Self {
        let (state, _) = watch::channel(FeedState::Disconnected);
        Self { factory: Arc::new(factory), store, reconnect_delay, state, active: None }
    }

    pub fn state(&self) -> FeedState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<FeedState> {
        self.state.subscribe()
    }

    /// Tears down any running channel, then starts a new connect/subscribe
    /// cycle if both a credential and a conversation are present.
    pub async fn activate(
        &mut self,
        credentials: Option<Credentials>,
        conversation_id: Option<String>,
    ) {
        self.deactivate().await;

        let (Some(credentials), Some(conversation_id)) = (credentials, conversation_id) else {
            debug!("Live feed idle: credential or conversation missing");
            return;
        };

        let generation = self.store.lock().generation();
        let scope = Arc::new(FeedScope { conversation_id, credentials, generation });
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = oneshot::channel();
        self.state.send_replace(FeedState::Connecting);

        let worker = FeedWorker {
            factory: self.factory.clone(),
            scope: scope.clone(),
            store: self.store.clone(),
            state: self.state.clone(),
            reconnect_delay: self.reconnect_delay,
        };
        let task = tokio::spawn(worker.run(outbound_rx, shutdown_rx));
        self.active = Some(ActiveFeed { scope, outbound, shutdown, task });
    }

    /// Stops the channel and waits until it is fully closed.
    pub async fn deactivate(&mut self) {
        if let Some(active) = self.active.take() {
            info!(conversation_id = %active.scope.conversation_id, "Closing live feed");
            let _ = active.shutdown.send(());
            if let Err(e) = active.task.await {
                error!("Live feed task ended abnormally: {e}");
            }
        }
        self.state.send_replace(FeedState::Disconnected);
    }

    /// Queues `text` for publishing. Returns `false` (and does nothing) unless
    /// the feed is subscribed and the trimmed text is non-empty.
    pub fn send(&self, text: &str) -> bool {
        let content = text.trim();
        if content.is_empty() || self.state() != FeedState::Subscribed {
            return false;
        }
        let Some(active) = &self.active else {
            return false;
        };
        let outgoing = OutgoingMessage {
            sender_id: active.scope.credentials.user_id.clone(),
            content: content.to_string(),
        };
        active.outbound.send(outgoing).is_ok()
    }
}

enum Step {
    Shutdown,
    Outgoing(Option<OutgoingMessage>),
    Event(ChannelEvent),
}

enum Exit {
    Shutdown,
    Dropped,
}

struct FeedWorker<F> {
    factory: Arc<F>,
    scope: Arc<FeedScope>,
    store: SharedStore,
    state: watch::Sender<FeedState>,
    reconnect_delay: Duration,
}

impl<F: ChannelFactory> FeedWorker<F> {
    async fn run(
        self,
        mut outbound: mpsc::UnboundedReceiver<OutgoingMessage>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        loop {
            self.state.send_replace(FeedState::Connecting);
            let mut channel = self.factory.create();

            let established = tokio::select! {
                _ = &mut shutdown => None,
                result = self.establish(&mut channel) => Some(result),
            };
            let exit = match established {
                None => Exit::Shutdown,
                Some(Ok(())) => self.pump(&mut channel, &mut outbound, &mut shutdown).await,
                Some(Err(e)) if e.is_transport() => {
                    warn!("Live feed connect failed: {e}");
                    Exit::Dropped
                }
                Some(Err(e)) => {
                    error!("Live feed setup failed: {e}");
                    Exit::Dropped
                }
            };
            channel.disconnect().await;
            self.state.send_replace(FeedState::Disconnected);

            if let Exit::Shutdown = exit {
                break;
            }
            info!(delay_ms = self.reconnect_delay.as_millis() as u64, "Reconnecting live feed");
            let shut = tokio::select! {
                _ = &mut shutdown => true,
                _ = tokio::time::sleep(self.reconnect_delay) => false,
            };
            if shut {
                break;
            }
        }
        debug!(conversation_id = %self.scope.conversation_id, "Live feed stopped");
    }

    async fn establish(&self, channel: &mut F::Channel) -> Result<(), AppError> {
        let auth = vec![("Authorization".to_string(), self.scope.credentials.bearer())];
        channel.connect(auth).await?;
        self.state.send_replace(FeedState::Connected);
        info!(conversation_id = %self.scope.conversation_id, "Connected to broker");

        channel.subscribe(&topic_for(&self.scope.conversation_id)).await?;
        self.state.send_replace(FeedState::Subscribed);
        Ok(())
    }

    async fn pump(
        &self,
        channel: &mut F::Channel,
        outbound: &mut mpsc::UnboundedReceiver<OutgoingMessage>,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> Exit {
        loop {
            let step = tokio::select! {
                _ = &mut *shutdown => Step::Shutdown,
                outgoing = outbound.recv() => Step::Outgoing(outgoing),
                event = channel.next_event() => Step::Event(event),
            };
            match step {
                Step::Shutdown | Step::Outgoing(None) => return Exit::Shutdown,
                Step::Outgoing(Some(message)) => {
                    if let Err(e) = self.publish(channel, &message).await {
                        warn!("Publish failed, reconnecting: {e}");
                        return Exit::Dropped;
                    }
                }
                Step::Event(ChannelEvent::Message { body, .. }) => self.deliver(&body),
                Step::Event(ChannelEvent::Error(message)) => {
                    error!("Broker reported error: {message}");
                    return Exit::Dropped;
                }
                Step::Event(ChannelEvent::Closed) => {
                    warn!("Disconnected from broker");
                    return Exit::Dropped;
                }
            }
        }
    }

    async fn publish(
        &self,
        channel: &mut F::Channel,
        message: &OutgoingMessage,
    ) -> Result<(), AppError> {
        let body = serde_json::to_string(message).map_err(AppError::MalformedPayload)?;
        let headers = vec![
            ("content-type".to_string(), "application/json".to_string()),
            ("Authorization".to_string(), self.scope.credentials.bearer()),
        ];
        channel
            .publish(&destination_for(&self.scope.conversation_id), headers, body)
            .await
    }

    /// Malformed payloads are dropped; the channel stays up.
    fn deliver(&self, body: &str) {
        let wire: WireMessage = match serde_json::from_str(body) {
            Ok(wire) => wire,
            Err(e) => {
                warn!("Dropping malformed push payload: {}", AppError::MalformedPayload(e));
                return;
            }
        };
        let message = Message::from(wire);
        let mut store = self.store.lock();
        if store.generation() != self.scope.generation
            || store.conversation_id() != Some(self.scope.conversation_id.as_str())
        {
            debug!("Dropping push from a previous scope");
            return;
        }
        debug!(id = %message.id, "Live message received");
        store.push_live(message);
    }
}
