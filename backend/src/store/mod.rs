use time::OffsetDateTime;

use crate::models::{HistoryEntry, UserAccount};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

#[derive(Debug)]
pub enum StoreError {
    /// The cooldown re-check failed at the moment of atomic application:
    /// a concurrent spin for the same user won the race. Carries the
    /// account's current last spin so the caller can report the wait.
    AlreadySpun { last_spin_at: OffsetDateTime },
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadySpun { .. } => write!(f, "user already spun this window"),
            Self::Unavailable(detail) => write!(f, "storage unavailable: {}", detail),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Storage backends for the user ledger and spin history.
///
/// `apply_spin` is the single mutating entry point. It executes
/// {re-check cooldown, credit balance, bump counters, stamp
/// `last_spin_at`, append history, prune to the retention limit} as one
/// atomic unit per user: two concurrent applications for the same user
/// can never both succeed, and the ledger update is durably visible iff
/// the history append is. Mutation is partitioned per user identifier —
/// unrelated users never contend.
#[derive(Clone)]
pub enum RouletteStore {
    Memory(MemoryStore),
    Postgres(PostgresStore),
}

impl RouletteStore {
    /// Loads the account, creating it with the default balance and no
    /// cooldown on first touch.
    pub async fn load_or_create(
        &self,
        user_id: &str,
        now: OffsetDateTime,
    ) -> Result<UserAccount, StoreError> {
        match self {
            Self::Memory(store) => store.load_or_create(user_id, now).await,
            Self::Postgres(store) => store.load_or_create(user_id, now).await,
        }
    }

    pub async fn apply_spin(
        &self,
        user_id: &str,
        now: OffsetDateTime,
        credit: i64,
        win: bool,
        entry: HistoryEntry,
    ) -> Result<UserAccount, StoreError> {
        match self {
            Self::Memory(store) => store.apply_spin(user_id, now, credit, win, entry).await,
            Self::Postgres(store) => store.apply_spin(user_id, now, credit, win, entry).await,
        }
    }

    /// History in canonical storage order, oldest first.
    pub async fn history(
        &self,
        user_id: &str,
        now: OffsetDateTime,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        match self {
            Self::Memory(store) => store.history(user_id, now).await,
            Self::Postgres(store) => store.history(user_id, now).await,
        }
    }

    /// Clears the audit log only; the ledger is untouched.
    pub async fn clear_history(
        &self,
        user_id: &str,
        now: OffsetDateTime,
    ) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.clear_history(user_id, now).await,
            Self::Postgres(store) => store.clear_history(user_id, now).await,
        }
    }
}
