//! In-memory stand-ins for the backend used by the service tests.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::{mpsc, Notify};

use crate::api::HistoryApi;
use crate::errors::AppError;
use crate::models::{Credentials, Message};
use crate::transport::{ChannelEvent, Headers, PushChannel};

pub fn creds() -> Credentials {
    Credentials::new("tok", "u1")
}

pub fn base_time() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

/// Polls `check` until it holds or a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(1), fut)
        .await
        .expect("timed out")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryCall {
    pub conversation_id: String,
    pub page: usize,
    pub size: usize,
    pub token: String,
}

#[derive(Default)]
struct HistoryInner {
    total: usize,
    calls: Mutex<Vec<HistoryCall>>,
    fail_next: AtomicBool,
    gated: AtomicBool,
    requested: Notify,
    gate: Notify,
}

/// Serves `total` messages newest-first, `size` per page.
#[derive(Clone, Default)]
pub struct FakeHistory {
    inner: Arc<HistoryInner>,
}

impl FakeHistory {
    pub fn with_total(total: usize) -> Self {
        Self { inner: Arc::new(HistoryInner { total, ..HistoryInner::default() }) }
    }

    /// Requests block until `release` is called.
    pub fn gated(self) -> Self {
        self.inner.gated.store(true, Ordering::SeqCst);
        self
    }

    pub fn fail_next(&self) {
        self.inner.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<HistoryCall> {
        self.inner.calls.lock().unwrap().clone()
    }

    pub async fn wait_for_request(&self) {
        self.inner.requested.notified().await;
    }

    pub fn release(&self) {
        self.inner.gate.notify_one();
    }
}

#[async_trait]
impl HistoryApi for FakeHistory {
    async fn fetch_page(
        &self,
        credentials: &Credentials,
        conversation_id: &str,
        page: usize,
        size: usize,
    ) -> Result<Vec<Message>, AppError> {
        self.inner.calls.lock().unwrap().push(HistoryCall {
            conversation_id: conversation_id.to_string(),
            page,
            size,
            token: credentials.token.clone(),
        });
        self.inner.requested.notify_one();
        if self.inner.gated.load(Ordering::SeqCst) {
            self.inner.gate.notified().await;
        }
        if self.inner.fail_next.swap(false, Ordering::SeqCst) {
            return Err(AppError::UnexpectedStatus { url: "fake".into(), status: 500 });
        }

        let start = (page * size).min(self.inner.total);
        let end = ((page + 1) * size).min(self.inner.total);
        Ok((start..end)
            .map(|i| {
                let sender = if i % 2 == 0 { "u1" } else { "u2" };
                let ts = base_time() - chrono::Duration::seconds(i as i64);
                Message::new(format!("{conversation_id}-m{i}"), sender, format!("msg {i}"), ts)
            })
            .collect())
    }
}

#[derive(Default)]
pub struct BrokerLog {
    pub connects: Vec<Headers>,
    pub subscriptions: Vec<String>,
    pub published: Vec<(String, Headers, String)>,
    pub disconnects: usize,
    pub failing_connects: usize,
    inbound: Vec<mpsc::UnboundedSender<ChannelEvent>>,
}

/// Records everything the live feed does and lets tests push events into the
/// most recently created channel.
#[derive(Clone, Default)]
pub struct FakeBroker {
    log: Arc<Mutex<BrokerLog>>,
}

impl FakeBroker {
    pub fn channel(&self) -> FakeChannel {
        let (tx, rx) = mpsc::unbounded_channel();
        self.log.lock().unwrap().inbound.push(tx);
        FakeChannel { broker: self.clone(), inbound: rx, connected: false }
    }

    pub fn log(&self) -> std::sync::MutexGuard<'_, BrokerLog> {
        self.log.lock().unwrap()
    }

    pub fn fail_connects(&self, count: usize) {
        self.log().failing_connects = count;
    }

    pub fn channels_created(&self) -> usize {
        self.log().inbound.len()
    }

    /// Delivers `event` on the newest channel.
    pub fn push(&self, event: ChannelEvent) {
        let log = self.log();
        let tx = log.inbound.last().expect("no channel created");
        let _ = tx.send(event);
    }

    pub fn push_json(&self, conversation_id: &str, body: &str) {
        self.push(ChannelEvent::Message {
            destination: format!("/topic/conversation/{conversation_id}"),
            body: body.to_string(),
        });
    }
}

pub struct FakeChannel {
    broker: FakeBroker,
    inbound: mpsc::UnboundedReceiver<ChannelEvent>,
    connected: bool,
}

#[async_trait]
impl PushChannel for FakeChannel {
    async fn connect(&mut self, headers: Headers) -> Result<(), AppError> {
        let mut log = self.broker.log();
        log.connects.push(headers);
        if log.failing_connects > 0 {
            log.failing_connects -= 1;
            return Err(AppError::connect("fake", "refused"));
        }
        self.connected = true;
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), AppError> {
        self.broker.log().subscriptions.push(topic.to_string());
        Ok(())
    }

    async fn publish(
        &mut self,
        destination: &str,
        headers: Headers,
        body: String,
    ) -> Result<(), AppError> {
        if !self.connected {
            return Err(AppError::NotConnected);
        }
        self.broker.log().published.push((destination.to_string(), headers, body));
        Ok(())
    }

    async fn next_event(&mut self) -> ChannelEvent {
        self.inbound.recv().await.unwrap_or(ChannelEvent::Closed)
    }

    async fn disconnect(&mut self) {
        self.connected = false;
        self.broker.log().disconnects += 1;
    }
}
