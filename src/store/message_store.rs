use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::models::Message;

/// Store handle shared by the history loader, the live feed and the renderer.
#[derive(Debug, Clone)]
pub struct SharedStore(Arc<Mutex<MessageStore>>);

impl SharedStore {
    pub fn new(page_size: usize) -> Self {
        Self(Arc::new(Mutex::new(MessageStore::new(page_size))))
    }

    /// Locks the store. Never hold the guard across an `.await`.
    pub fn lock(&self) -> MutexGuard<'_, MessageStore> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// What the view should do with its scroll position after the last mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrollHint {
    #[default]
    None,
    /// Jump to the newest message.
    Bottom,
    /// Older history grew the top by `prepended` rows; offset the viewport by
    /// the same amount so the visible messages stay put.
    Preserve { prepended: usize },
}

/// Issued when a history fetch starts; the response is applied only if the
/// ticket still matches the active conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub conversation_id: String,
    pub page: usize,
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchRefusal {
    NoConversation,
    InFlight,
    Exhausted,
}

/// Deduplicated, timestamp-ordered messages of the active conversation plus
/// its page cursor.
#[derive(Debug)]
pub struct MessageStore {
    conversation_id: Option<String>,
    generation: u64,
    messages: Vec<Message>,
    page_size: usize,
    current_page: usize,
    page_loaded: bool,
    has_more: bool,
    loading: bool,
    scroll: ScrollHint,
}

impl MessageStore {
    pub fn new(page_size: usize) -> Self {
        Self {
            conversation_id: None,
            generation: 0,
            messages: Vec::new(),
            page_size: page_size.max(1),
            current_page: 0,
            page_loaded: false,
            has_more: true,
            loading: false,
            scroll: ScrollHint::None,
        }
    }

    /// Discards everything and scopes the store to `conversation_id`.
    /// Outstanding fetch tickets become stale.
    pub fn reset(&mut self, conversation_id: Option<String>) {
        debug!(?conversation_id, "Resetting message store");
        self.generation += 1;
        self.conversation_id = conversation_id;
        self.messages.clear();
        self.current_page = 0;
        self.page_loaded = false;
        self.has_more = true;
        self.loading = false;
        self.scroll = ScrollHint::None;
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn scroll_hint(&self) -> ScrollHint {
        self.scroll
    }

    /// Hands the pending hint to the renderer and clears it.
    pub fn take_scroll_hint(&mut self) -> ScrollHint {
        std::mem::take(&mut self.scroll)
    }

    /// Bumped on every reset.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Page that "load older" should request next.
    pub fn next_page(&self) -> usize {
        if self.page_loaded {
            self.current_page + 1
        } else {
            0
        }
    }

    /// Claims the loading flag for `page`.
    pub fn begin_fetch(&mut self, page: usize) -> Result<FetchTicket, FetchRefusal> {
        let conversation_id = self
            .conversation_id
            .clone()
            .ok_or(FetchRefusal::NoConversation)?;
        if self.loading {
            return Err(FetchRefusal::InFlight);
        }
        if page > 0 && !self.has_more {
            return Err(FetchRefusal::Exhausted);
        }
        self.loading = true;
        Ok(FetchTicket { conversation_id, page, generation: self.generation })
    }

    fn is_current(&self, ticket: &FetchTicket) -> bool {
        ticket.generation == self.generation
            && self.conversation_id.as_deref() == Some(ticket.conversation_id.as_str())
    }

    /// Merges a fetched page. Returns `false` when the ticket is stale and the
    /// page was dropped.
    pub fn complete_fetch(&mut self, ticket: &FetchTicket, page: Vec<Message>) -> bool {
        if !self.is_current(ticket) {
            debug!(page = ticket.page, "Dropping history page for inactive conversation");
            return false;
        }
        self.loading = false;

        if page.len() < self.page_size {
            self.has_more = false;
        }

        let before = self.messages.len();
        let mut by_id: HashMap<String, Message> = self
            .messages
            .drain(..)
            .map(|m| (m.id.clone(), m))
            .collect();
        for message in page {
            by_id.insert(message.id.clone(), message);
        }
        let mut merged: Vec<Message> = by_id.into_values().collect();
        merged.sort_by(chronological);
        self.messages = merged;

        self.current_page = ticket.page;
        self.page_loaded = true;
        self.scroll = if ticket.page == 0 {
            ScrollHint::Bottom
        } else {
            ScrollHint::Preserve { prepended: self.messages.len().saturating_sub(before) }
        };
        true
    }

    /// Releases the loading flag after a failed fetch; cursor and contents stay.
    pub fn fail_fetch(&mut self, ticket: &FetchTicket) {
        if self.is_current(ticket) {
            self.loading = false;
        }
    }

    /// Adds a live message at its chronological position, replacing any entry
    /// with the same id. Returns `false` if no conversation is active.
    pub fn push_live(&mut self, message: Message) -> bool {
        if self.conversation_id.is_none() {
            return false;
        }
        if let Some(existing) = self.messages.iter().position(|m| m.id == message.id) {
            self.messages.remove(existing);
        }
        let at = self
            .messages
            .partition_point(|m| chronological(m, &message) != Ordering::Greater);
        self.messages.insert(at, message);
        // An unread Preserve wins; the renderer still has to offset for it.
        if !matches!(self.scroll, ScrollHint::Preserve { .. }) {
            self.scroll = ScrollHint::Bottom;
        }
        true
    }
}

/// Ascending by timestamp; ties broken by id so merges are deterministic.
fn chronological(a: &Message, b: &Message) -> Ordering {
    a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id))
}
