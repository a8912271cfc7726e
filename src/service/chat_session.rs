use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::api::HistoryApi;
use crate::config::ClientConfig;
use crate::models::{Credentials, Message};
use crate::service::history_loader::{HistoryLoader, LoadOutcome};
use crate::service::live_feed::{FeedState, LiveFeed};
use crate::store::{ScrollHint, SharedStore};
use crate::transport::ChannelFactory;

/// Header badge text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Online,
    Offline,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "Connecting...",
            ConnectionStatus::Online => "Online",
            ConnectionStatus::Offline => "Offline",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<FeedState> for ConnectionStatus {
    fn from(state: FeedState) -> Self {
        match state {
            FeedState::Connecting => ConnectionStatus::Connecting,
            FeedState::Connected | FeedState::Subscribed => ConnectionStatus::Online,
            FeedState::Disconnected => ConnectionStatus::Offline,
        }
    }
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatView {
    /// Oldest first; reverse for bottom-anchored layouts.
    pub messages: Vec<Message>,
    pub current_user: Option<String>,
    pub is_connected: bool,
    pub is_connecting: bool,
    pub is_loading_history: bool,
    pub has_more_history: bool,
    pub current_page_index: usize,
    pub scroll: ScrollHint,
    pub status: ConnectionStatus,
}

impl ChatView {
    pub fn is_mine(&self, message: &Message) -> bool {
        self.current_user.as_deref().is_some_and(|user| message.is_from(user))
    }

    /// Shown above the oldest message once history is exhausted.
    pub fn at_start_of_conversation(&self) -> bool {
        !self.has_more_history && !self.messages.is_empty()
    }
}

/// One user's view of one conversation at a time.
pub struct ChatSession<A, F> {
    store: SharedStore,
    loader: HistoryLoader<A>,
    feed: LiveFeed<F>,
    credentials: Option<Credentials>,
    conversation_id: Option<String>,
}

impl<A: HistoryApi, F: ChannelFactory> ChatSession<A, F> {
    pub fn new(api: A, factory: F, config: &ClientConfig) -> Self {
        let store = SharedStore::new(config.page_size);
        Self {
            loader: HistoryLoader::new(Arc::new(api), store.clone()),
            feed: LiveFeed::new(factory, store.clone(), config.reconnect_delay),
            store,
            credentials: None,
            conversation_id: None,
        }
    }

    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    pub fn feed_state(&self) -> FeedState {
        self.feed.state()
    }

    pub fn subscribe_feed_state(&self) -> tokio::sync::watch::Receiver<FeedState> {
        self.feed.subscribe_state()
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Signs in, refreshes or (with `None`) drops the credential.
    pub async fn set_credentials(&mut self, credentials: Option<Credentials>) {
        if self.credentials == credentials {
            return;
        }
        self.credentials = credentials;
        self.rescope().await;
    }

    /// Makes `conversation_id` the active conversation, or clears it.
    pub async fn set_conversation(&mut self, conversation_id: Option<String>) {
        if self.conversation_id == conversation_id {
            return;
        }
        self.conversation_id = conversation_id;
        self.rescope().await;
    }

    /// Tear down, reset, reconnect, then load the newest page.
    async fn rescope(&mut self) {
        let scope = self
            .credentials
            .as_ref()
            .and(self.conversation_id.clone());
        info!(conversation_id = ?scope, "Switching chat scope");
        self.feed.deactivate().await;
        self.store.lock().reset(scope.clone());
        self.feed
            .activate(self.credentials.clone(), self.conversation_id.clone())
            .await;
        if scope.is_some() {
            self.loader.load_page(self.credentials.as_ref(), 0).await;
        }
    }

    /// Fetches the next older page (or page 0 if none loaded yet).
    pub async fn load_next_history_page(&self) -> LoadOutcome {
        self.loader.load_next_page(self.credentials.as_ref()).await
    }

    /// Publishes `text`; a silent no-op when offline, empty, or signed out.
    pub fn send_message(&self, text: &str) -> bool {
        if self.credentials.is_none() || self.conversation_id.is_none() {
            return false;
        }
        self.feed.send(text)
    }

    /// Snapshot for one frame. The scroll hint is handed over once and then
    /// cleared.
    pub fn view(&self) -> ChatView {
        let state = self.feed.state();
        let mut store = self.store.lock();
        ChatView {
            messages: store.messages().to_vec(),
            current_user: self.credentials.as_ref().map(|c| c.user_id.clone()),
            is_connected: matches!(state, FeedState::Connected | FeedState::Subscribed),
            is_connecting: state == FeedState::Connecting,
            is_loading_history: store.is_loading(),
            has_more_history: store.has_more(),
            current_page_index: store.current_page(),
            scroll: store.take_scroll_hint(),
            status: state.into(),
        }
    }

    /// Closes the push channel; the store keeps its contents.
    pub async fn shutdown(&mut self) {
        self.feed.deactivate().await;
    }
}
