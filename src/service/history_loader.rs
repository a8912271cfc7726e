use std::sync::Arc;

use tracing::{debug, error, info};

use crate::api::HistoryApi;
use crate::models::Credentials;
use crate::store::{FetchRefusal, SharedStore};

/// Result of one `load_page` call, mostly of interest to tests and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { page: usize, received: usize },
    /// Preconditions not met; nothing was requested.
    Skipped,
    Refused(FetchRefusal),
    Failed,
    /// Response arrived after the conversation changed and was dropped.
    Discarded,
}

/// Pulls pages of past messages into the store.
pub struct HistoryLoader<A> {
    api: Arc<A>,
    store: SharedStore,
}

impl<A: HistoryApi> HistoryLoader<A> {
    pub fn new(api: Arc<A>, store: SharedStore) -> Self {
        Self { api, store }
    }

    /// Fetches `page` for the store's active conversation and merges it.
    pub async fn load_page(&self, credentials: Option<&Credentials>, page: usize) -> LoadOutcome {
        let Some(credentials) = credentials else {
            debug!(page, "No credential; skipping history fetch");
            return LoadOutcome::Skipped;
        };

        let (ticket, size) = {
            let mut store = self.store.lock();
            let size = store.page_size();
            match store.begin_fetch(page) {
                Ok(ticket) => (ticket, size),
                Err(FetchRefusal::NoConversation) => return LoadOutcome::Skipped,
                Err(refusal) => {
                    debug!(page, ?refusal, "History fetch refused");
                    return LoadOutcome::Refused(refusal);
                }
            }
        };

        let result = self
            .api
            .fetch_page(credentials, &ticket.conversation_id, page, size)
            .await;

        let mut store = self.store.lock();
        match result {
            Ok(messages) => {
                let received = messages.len();
                if store.complete_fetch(&ticket, messages) {
                    info!(
                        conversation_id = %ticket.conversation_id,
                        page,
                        received,
                        total = store.len(),
                        has_more = store.has_more(),
                        "Merged history page"
                    );
                    LoadOutcome::Loaded { page, received }
                } else {
                    LoadOutcome::Discarded
                }
            }
            Err(e) => {
                error!("Error fetching messages for conversation {}: {e}", ticket.conversation_id);
                store.fail_fetch(&ticket);
                LoadOutcome::Failed
            }
        }
    }

    /// Loads page 0 if nothing is loaded yet, otherwise the next older page.
    pub async fn load_next_page(&self, credentials: Option<&Credentials>) -> LoadOutcome {
        let page = self.store.lock().next_page();
        self.load_page(credentials, page).await
    }
}
