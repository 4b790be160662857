use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::bot::error::Error;
use crate::db::models::ActionType;

/// Guild-scoped keys of the moderation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    ActiveMutes,
    Lockdowns,
    Cases,
    Settings,
    Actions(ActionType),
}

impl StateKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateKey::ActiveMutes => "activeMutes",
            StateKey::Lockdowns => "lockdowns",
            StateKey::Cases => "cases",
            StateKey::Settings => "settings",
            StateKey::Actions(action) => action.as_str(),
        }
    }
}

/// Raw key-value persistence substrate.
#[async_trait]
pub trait StateBackend: Send + Sync {
    async fn get(&self, guild_id: u64, key: &str) -> Result<Option<Value>, Error>;

    async fn set(&self, guild_id: u64, key: &str, value: Value) -> Result<(), Error>;

    /// Guilds that currently hold a value under `key`
    async fn guilds_with(&self, key: &str) -> Result<Vec<u64>, Error>;
}

/// Typed access to the backend plus named-key mutual exclusion.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn StateBackend>,
    locks: Arc<DashMap<(u64, StateKey), Arc<Mutex<()>>>>,
}

impl Store {
    pub fn new(backend: Arc<dyn StateBackend>) -> Self {
        Self {
            backend,
            locks: Arc::new(DashMap::new()),
        }
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        guild_id: u64,
        key: StateKey,
    ) -> Result<Option<T>, Error> {
        match self.backend.get(guild_id, key.as_str()).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn set<T: Serialize>(
        &self,
        guild_id: u64,
        key: StateKey,
        value: &T,
    ) -> Result<(), Error> {
        let value = serde_json::to_value(value)?;
        self.backend.set(guild_id, key.as_str(), value).await
    }

    pub async fn guilds_with(&self, key: StateKey) -> Result<Vec<u64>, Error> {
        self.backend.guilds_with(key.as_str()).await
    }

    /// Run `f` while holding the exclusive lock for `(guild_id, key)`.
    ///
    /// Every read-modify-write of a guild key must go through here. The lock
    /// is not reentrant: `f` must not call `run_exclusive` on the same key.
    pub async fn run_exclusive<F, Fut, T>(&self, guild_id: u64, key: StateKey, f: F) -> Result<T, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let lock = self
            .locks
            .entry((guild_id, key))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let _guard = lock.lock().await;
        debug!("Acquired {} for guild {}", key.as_str(), guild_id);
        f().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::MemoryBackend;

    #[tokio::test]
    async fn test_typed_round_trip() {
        let store = Store::new(Arc::new(MemoryBackend::new()));
        assert_eq!(store.get::<u64>(1, StateKey::Cases).await.unwrap(), None);

        store.set(1, StateKey::Cases, &5u64).await.unwrap();
        assert_eq!(store.get::<u64>(1, StateKey::Cases).await.unwrap(), Some(5));
        assert_eq!(store.guilds_with(StateKey::Cases).await.unwrap(), vec![1]);
        assert!(store.guilds_with(StateKey::Lockdowns).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exclusive_serializes_same_key() {
        let store = Store::new(Arc::new(MemoryBackend::new()));
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let first = {
            let store = store.clone();
            let order = order.clone();
            tokio::spawn(async move {
                store
                    .run_exclusive(1, StateKey::Cases, || async {
                        order.lock().unwrap().push("first:start");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        order.lock().unwrap().push("first:end");
                        Ok(())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        let second = {
            let store = store.clone();
            let order = order.clone();
            tokio::spawn(async move {
                store
                    .run_exclusive(1, StateKey::Cases, || async {
                        order.lock().unwrap().push("second");
                        Ok(())
                    })
                    .await
            })
        };

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        assert_eq!(
            *order.lock().unwrap(),
            vec!["first:start", "first:end", "second"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exclusive_independent_keys() {
        let store = Store::new(Arc::new(MemoryBackend::new()));
        let other = store.clone();

        let result = store
            .run_exclusive(1, StateKey::Cases, || async move {
                // A different key on the same guild is not blocked.
                other
                    .run_exclusive(1, StateKey::ActiveMutes, || async { Ok(7u64) })
                    .await
            })
            .await
            .unwrap();
        assert_eq!(result, 7);
    }
}
