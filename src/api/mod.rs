use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::config::ClientConfig;
use crate::errors::AppError;
use crate::models::{Conversation, Credentials, Message, WireMessage};

/// Source of past messages, one page at a time.
#[async_trait]
pub trait HistoryApi: Send + Sync {
    async fn fetch_page(
        &self,
        credentials: &Credentials,
        conversation_id: &str,
        page: usize,
        size: usize,
    ) -> Result<Vec<Message>, AppError>;
}

/// REST client for the chat endpoints of the job-portal backend.
#[derive(Debug, Clone)]
pub struct HttpChatApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChatApi {
    pub fn new(config: &ClientConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AppError::request(&config.api_base_url, e))?;
        Ok(Self { client, base_url: config.api_base_url.clone() })
    }

    pub fn messages_url(&self, conversation_id: &str) -> String {
        format!("{}/conversation/{conversation_id}/getMessages", self.base_url)
    }

    /// Conversations the signed-in user takes part in.
    pub async fn fetch_conversations(
        &self,
        credentials: &Credentials,
    ) -> Result<Vec<Conversation>, AppError> {
        let url = format!("{}/conversation/my", self.base_url);
        self.get_json(&url, credentials, &[]).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        credentials: &Credentials,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .header(AUTHORIZATION, credentials.bearer())
            .send()
            .await
            .map_err(|e| {
                error!("Request to {url} failed: {e}");
                AppError::request(url, e)
            })?;

        let status = resp.status();
        if !status.is_success() {
            error!("GET {url} returned {status}");
            return Err(AppError::UnexpectedStatus { url: url.to_string(), status: status.as_u16() });
        }

        resp.json::<T>().await.map_err(|e| AppError::DecodeFailed {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl HistoryApi for HttpChatApi {
    async fn fetch_page(
        &self,
        credentials: &Credentials,
        conversation_id: &str,
        page: usize,
        size: usize,
    ) -> Result<Vec<Message>, AppError> {
        let url = self.messages_url(conversation_id);
        let wire: Vec<WireMessage> = self
            .get_json(&url, credentials, &[("page", page.to_string()), ("size", size.to_string())])
            .await?;
        debug!(conversation_id, page, count = wire.len(), "Fetched history page");
        Ok(wire.into_iter().map(Message::from).collect())
    }
}
