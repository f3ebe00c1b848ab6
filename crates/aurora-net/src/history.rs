use async_trait::async_trait;
use tracing::debug;

use aurora_shared::protocol::HistoryRecord;
use aurora_shared::Identity;

use crate::endpoints::Endpoints;
use crate::error::NetError;

/// Source of the persisted ciphertext history of a conversation.
///
/// The returned records are the complete history, oldest first.
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn fetch_history(
        &self,
        me: &Identity,
        peer: &Identity,
    ) -> Result<Vec<HistoryRecord>, NetError>;
}

/// History served by the backend's REST API.
#[derive(Debug, Clone)]
pub struct HttpHistory {
    client: reqwest::Client,
    endpoints: Endpoints,
}

impl HttpHistory {
    pub fn new(endpoints: Endpoints) -> Self {
        Self::with_client(reqwest::Client::new(), endpoints)
    }

    pub fn with_client(client: reqwest::Client, endpoints: Endpoints) -> Self {
        Self { client, endpoints }
    }
}

#[async_trait]
impl HistorySource for HttpHistory {
    async fn fetch_history(
        &self,
        me: &Identity,
        peer: &Identity,
    ) -> Result<Vec<HistoryRecord>, NetError> {
        let url = self.endpoints.history_url(me, peer)?;
        debug!(url = %url, "Fetching conversation history");

        let records = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<HistoryRecord>>()
            .await?;

        debug!(count = records.len(), "History fetched");
        Ok(records)
    }
}
