use std::collections::BTreeMap;

use tracing::debug;

use crate::bot::error::Error;
use crate::db::models::ActionType;
use crate::db::store::{StateKey, Store};

/// `userId -> number of actions`, one map per action type
pub type ActionCounts = BTreeMap<u64, u64>;

/// Per-guild action counters and case numbers
#[derive(Clone)]
pub struct ActionRecorder {
    store: Store,
}

impl ActionRecorder {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Increment the number of times `user_id` received `action`, returning
    /// the new count
    pub async fn count(&self, guild_id: u64, user_id: u64, action: ActionType) -> Result<u64, Error> {
        let key = StateKey::Actions(action);
        self.store
            .run_exclusive(guild_id, key, || async {
                let mut counts: ActionCounts = self.store.get(guild_id, key).await?.unwrap_or_default();
                let count = counts.entry(user_id).or_insert(0);
                *count += 1;
                let value = *count;
                self.store.set(guild_id, key, &counts).await?;

                debug!("User {} now has {} {} in guild {}", user_id, value, action, guild_id);
                Ok(value)
            })
            .await
    }

    pub async fn get_count(&self, guild_id: u64, user_id: u64, action: ActionType) -> Result<u64, Error> {
        let counts: Option<ActionCounts> = self.store.get(guild_id, StateKey::Actions(action)).await?;
        Ok(counts.and_then(|c| c.get(&user_id).copied()).unwrap_or(0))
    }

    /// Take the next case number for the guild
    pub async fn next_case(&self, guild_id: u64) -> Result<u64, Error> {
        self.store
            .run_exclusive(guild_id, StateKey::Cases, || async {
                let case = self
                    .store
                    .get::<u64>(guild_id, StateKey::Cases)
                    .await?
                    .unwrap_or(0)
                    + 1;
                self.store.set(guild_id, StateKey::Cases, &case).await?;
                Ok(case)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::task::JoinSet;
    use tokio_test::assert_ok;

    use super::*;
    use crate::testing::MemoryBackend;

    fn recorder() -> ActionRecorder {
        ActionRecorder::new(Store::new(Arc::new(MemoryBackend::new())))
    }

    #[tokio::test]
    async fn test_count_concurrent_increments() {
        let recorder = recorder();
        let mut tasks = JoinSet::new();
        for _ in 0..50 {
            let recorder = recorder.clone();
            tasks.spawn(async move { recorder.count(7, 42, ActionType::Warning).await });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }

        assert_eq!(recorder.get_count(7, 42, ActionType::Warning).await.unwrap(), 50);
        assert_eq!(recorder.get_count(7, 42, ActionType::Ban).await.unwrap(), 0);
        assert_eq!(recorder.get_count(8, 42, ActionType::Warning).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_count_per_user() {
        let recorder = recorder();
        assert_eq!(assert_ok!(recorder.count(7, 1, ActionType::Kick).await), 1);
        assert_eq!(assert_ok!(recorder.count(7, 2, ActionType::Kick).await), 1);
        assert_eq!(assert_ok!(recorder.count(7, 1, ActionType::Kick).await), 2);
    }

    #[tokio::test]
    async fn test_next_case_strictly_increasing() {
        let recorder = recorder();
        let mut tasks = JoinSet::new();
        for _ in 0..20 {
            let recorder = recorder.clone();
            tasks.spawn(async move { recorder.next_case(7).await });
        }

        let mut cases = Vec::new();
        while let Some(result) = tasks.join_next().await {
            cases.push(assert_ok!(result.unwrap()));
        }
        cases.sort_unstable();
        assert_eq!(cases, (1..=20).collect::<Vec<u64>>());

        assert_eq!(recorder.next_case(7).await.unwrap(), 21);
        assert_eq!(recorder.next_case(9).await.unwrap(), 1);
    }
}
