use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;

use super::StoreError;
use crate::models::{HistoryEntry, UserAccount};

/// In-process backend for development deployments and tests. State layout
/// mirrors the Postgres backend: one account record plus a bounded
/// history list per user.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

struct Inner {
    cooldown: Duration,
    history_limit: usize,
    // The map lock is held only to fetch or insert a user's slot; the
    // per-user mutex guards the whole apply critical section.
    users: Mutex<HashMap<String, Arc<Mutex<UserState>>>>,
}

struct UserState {
    account: UserAccount,
    history: VecDeque<HistoryEntry>,
}

impl MemoryStore {
    pub fn new(cooldown: Duration, history_limit: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                cooldown,
                history_limit,
                users: Mutex::new(HashMap::new()),
            }),
        }
    }

    async fn user_slot(&self, user_id: &str, now: OffsetDateTime) -> Arc<Mutex<UserState>> {
        let mut users = self.inner.users.lock().await;
        users
            .entry(user_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(UserState {
                    account: UserAccount::new(user_id, now),
                    history: VecDeque::new(),
                }))
            })
            .clone()
    }

    pub async fn load_or_create(
        &self,
        user_id: &str,
        now: OffsetDateTime,
    ) -> Result<UserAccount, StoreError> {
        let slot = self.user_slot(user_id, now).await;
        let state = slot.lock().await;
        Ok(state.account.clone())
    }

    pub async fn apply_spin(
        &self,
        user_id: &str,
        now: OffsetDateTime,
        credit: i64,
        win: bool,
        entry: HistoryEntry,
    ) -> Result<UserAccount, StoreError> {
        let slot = self.user_slot(user_id, now).await;
        let mut state = slot.lock().await;

        if let Some(last_spin_at) = state.account.last_spin_at {
            if now < last_spin_at + self.inner.cooldown {
                return Err(StoreError::AlreadySpun { last_spin_at });
            }
        }

        state.account.balance += credit;
        state.account.total_spins += 1;
        if win {
            state.account.total_wins += 1;
        }
        state.account.last_spin_at = Some(now);

        state.history.push_back(entry);
        while state.history.len() > self.inner.history_limit {
            state.history.pop_front();
        }

        Ok(state.account.clone())
    }

    pub async fn history(
        &self,
        user_id: &str,
        now: OffsetDateTime,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        let slot = self.user_slot(user_id, now).await;
        let state = slot.lock().await;
        Ok(state.history.iter().cloned().collect())
    }

    pub async fn clear_history(
        &self,
        user_id: &str,
        now: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let slot = self.user_slot(user_id, now).await;
        let mut state = slot.lock().await;
        state.history.clear();
        Ok(())
    }
}
