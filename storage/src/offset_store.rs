//! The offset store abstraction and its in-memory implementation.

use async_trait::async_trait;
use rbot_core::Offset;
use tokio::sync::Mutex;

use crate::error::StorageError;

/// Durable cursor of the last fully dispatched batch.
///
/// `commit` must not return `Ok` before the value is durable: after a crash, `load` returns
/// either the previously committed offset or the new one, never a partial value.
#[async_trait]
pub trait OffsetStore: Send + Sync {
    async fn load(&self) -> Result<Option<Offset>, StorageError>;
    async fn commit(&self, offset: &Offset) -> Result<(), StorageError>;
}

/// Keeps the offset in process memory. Every commit is also appended to a history.
#[derive(Default)]
pub struct MemoryOffsetStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    current: Option<Offset>,
    history: Vec<Offset>,
}

impl MemoryOffsetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an already committed offset, as if restored after a restart.
    pub fn with_offset(offset: impl Into<Offset>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                current: Some(offset.into()),
                history: Vec::new(),
            }),
        }
    }

    /// All offsets committed so far, oldest first.
    pub async fn history(&self) -> Vec<Offset> {
        self.state.lock().await.history.clone()
    }
}

#[async_trait]
impl OffsetStore for MemoryOffsetStore {
    async fn load(&self) -> Result<Option<Offset>, StorageError> {
        Ok(self.state.lock().await.current.clone())
    }

    async fn commit(&self, offset: &Offset) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        state.current = Some(offset.clone());
        state.history.push(offset.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_starts_empty() {
        let store = MemoryOffsetStore::new();
        assert_eq!(store.load().await.unwrap(), None);
        assert!(store.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_keeps_latest_commit() {
        let store = MemoryOffsetStore::with_offset("5");
        assert_eq!(store.load().await.unwrap(), Some(Offset::from("5")));

        store.commit(&Offset::from("7")).await.unwrap();
        store.commit(&Offset::from("9")).await.unwrap();

        assert_eq!(store.load().await.unwrap(), Some(Offset::from("9")));
        assert_eq!(
            store.history().await,
            vec![Offset::from("7"), Offset::from("9")]
        );
    }
}
