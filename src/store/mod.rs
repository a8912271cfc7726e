pub mod message_store;

pub use message_store::{FetchRefusal, FetchTicket, MessageStore, ScrollHint, SharedStore};
