//! Lead datastore clients

use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;

use voicebridge_config::SinkConfig;

use crate::{CallRecord, PersistenceError};

/// Datastore collaborator accepting one record per terminated call.
#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn save(&self, record: &CallRecord) -> Result<(), PersistenceError>;
}

/// HTTP datastore client: POSTs the record as JSON.
pub struct HttpLeadStore {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpLeadStore {
    pub fn new(config: &SinkConfig) -> Result<Self, PersistenceError> {
        let url = config.url.clone().ok_or(PersistenceError::NotConfigured)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            url,
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl LeadStore for HttpLeadStore {
    async fn save(&self, record: &CallRecord) -> Result<(), PersistenceError> {
        let mut request = self.client.post(&self.url).json(record);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PersistenceError::Rejected {
                status: status.as_u16(),
            });
        }

        tracing::info!(call = %record.call_sid, "lead record persisted");
        Ok(())
    }
}

/// In-memory store, used in tests and when no sink is configured.
#[derive(Default)]
pub struct MemoryLeadStore {
    records: Mutex<Vec<CallRecord>>,
}

impl MemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<CallRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl LeadStore for MemoryLeadStore {
    async fn save(&self, record: &CallRecord) -> Result<(), PersistenceError> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use voicebridge_core::{LeadField, LeadSheet, Transcript};

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryLeadStore::new();
        let mut leads = LeadSheet::new();
        leads.fill(LeadField::Name, "Kyle Reese");
        let mut transcript = Transcript::new();
        transcript.push_caller("this is Kyle Reese");

        let record =
            CallRecord::build("CA9", None, &leads, &transcript, Duration::from_secs(30)).unwrap();
        store.save(&record).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.records()[0].name.as_deref(), Some("Kyle Reese"));
    }

    #[test]
    fn test_http_store_requires_url() {
        let config = SinkConfig::default();
        assert!(matches!(
            HttpLeadStore::new(&config),
            Err(PersistenceError::NotConfigured)
        ));
    }
}
