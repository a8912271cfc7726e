pub mod chat_session;
pub mod history_loader;
pub mod live_feed;

#[cfg(test)]
pub(crate) mod testing;

pub use chat_session::{ChatSession, ChatView, ConnectionStatus};
pub use history_loader::{HistoryLoader, LoadOutcome};
pub use live_feed::{FeedState, LiveFeed};
