use async_trait::async_trait;
use opslock_application::{EventFilter, EventMutation, EventStore};
use opslock_core::{AppError, AppResult};
use opslock_domain::EventRecord;
use tokio::sync::RwLock;

#[cfg(test)]
mod tests;

/// In-memory event store implementation preserving insertion order.
///
/// The development and test stand-in for the document store; it honours
/// the same conditional-write contract as the production adapter.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    records: RwLock<Vec<EventRecord>>,
}

impl InMemoryEventStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn insert_unique(&self, record: EventRecord) -> AppResult<()> {
        let mut records = self.records.write().await;
        if records.iter().any(|existing| existing.id == record.id) {
            return Err(AppError::Conflict(format!(
                "event record already exists for identity '{}'",
                record.id
            )));
        }

        records.push(record);
        Ok(())
    }

    async fn update_matching(
        &self,
        filter: EventFilter,
        mutation: EventMutation,
    ) -> AppResult<u64> {
        let mut records = self.records.write().await;
        match records.iter_mut().find(|record| filter.matches(record)) {
            Some(record) => {
                mutation.apply(record);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_matching(&self, filter: EventFilter) -> AppResult<u64> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|record| !filter.matches(record));
        Ok(u64::try_from(before - records.len()).unwrap_or(u64::MAX))
    }

    async fn scan(&self) -> AppResult<Vec<EventRecord>> {
        Ok(self.records.read().await.clone())
    }
}
