use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::event::{OpenEvent, SentMessage};
use crate::store::{EventStore, MailRegistry, StoreError};

/// In-memory store with the same semantics as [`super::postgres::PostgresStore`].
/// Backs the dev-mode flag and the test suite; nothing survives a restart.
#[derive(Clone, Default)]
pub struct MemoryStore {
    opens: Arc<Mutex<Vec<OpenEvent>>>,
    emails: Arc<Mutex<Vec<SentMessage>>>,
}

impl MemoryStore {
    pub fn open_count(&self) -> usize {
        self.opens.lock().unwrap().len()
    }

    pub fn opens(&self) -> Vec<OpenEvent> {
        self.opens.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn append(&self, event: OpenEvent) -> Result<(), StoreError> {
        self.opens
            .lock()
            .map_err(|_| StoreError::Unavailable("poisoned event log"))?
            .push(event);
        Ok(())
    }

    async fn opens_for(&self, tracking_id: &str) -> Result<Vec<OpenEvent>, StoreError> {
        let opens = self
            .opens
            .lock()
            .map_err(|_| StoreError::Unavailable("poisoned event log"))?;

        // Push order is insertion order, which is exactly the tie-break
        // the contract asks for; sorting is the aggregation engine's job.
        Ok(opens
            .iter()
            .filter(|e| e.tracking_id == tracking_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MailRegistry for MemoryStore {
    async fn upsert(&self, message: SentMessage) -> Result<(), StoreError> {
        let mut emails = self
            .emails
            .lock()
            .map_err(|_| StoreError::Unavailable("poisoned registry"))?;

        match emails
            .iter_mut()
            .find(|m| m.tracking_id == message.tracking_id)
        {
            Some(existing) => {
                // First non-empty field wins, matching the Postgres upsert.
                if existing.user_email.is_empty() {
                    existing.user_email = message.user_email;
                }
                if existing.recipient.is_empty() {
                    existing.recipient = message.recipient;
                }
                if existing.subject.is_empty() {
                    existing.subject = message.subject;
                }
                if existing.body.is_empty() {
                    existing.body = message.body;
                }
            }
            None => emails.push(message),
        }

        Ok(())
    }

    async fn get(&self, tracking_id: &str) -> Result<Option<SentMessage>, StoreError> {
        let emails = self
            .emails
            .lock()
            .map_err(|_| StoreError::Unavailable("poisoned registry"))?;

        Ok(emails.iter().find(|m| m.tracking_id == tracking_id).cloned())
    }

    async fn list_for_owner(&self, owner: &str) -> Result<Vec<SentMessage>, StoreError> {
        let emails = self
            .emails
            .lock()
            .map_err(|_| StoreError::Unavailable("poisoned registry"))?;

        let mut owned: Vec<SentMessage> = emails
            .iter()
            .filter(|m| m.user_email == owner)
            .cloned()
            .collect();
        // Newest first; equal timestamps keep registration order.
        owned.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        Ok(owned)
    }
}
